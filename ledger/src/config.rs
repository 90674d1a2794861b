//! Pairing, ledger and daily reset configuration.
//!
//! Configuration values are provided by the application at construction time;
//! nothing here reads the environment.

use crate::constants::tickets;
use crate::retry::RetryPolicy;
use chrono::NaiveTime;
use chrono_tz::Tz;
use std::time::Duration;

/// What happens to a room's invite code when its pairing is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InviteCodePolicy {
    /// Keep the existing code so the creator can share it again.
    #[default]
    Retain,
    /// Issue a fresh code; the old one stops resolving.
    Regenerate,
}

/// Pairing state machine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingConfig {
    /// Maximum number of invite codes tried before giving up.
    ///
    /// Default: 16
    pub max_code_attempts: usize,

    /// Invite code handling on cancel.
    ///
    /// Default: [`InviteCodePolicy::Retain`]
    pub invite_code_policy: InviteCodePolicy,
}

impl PairingConfig {
    /// Create pairing configuration with defaults.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_code_attempts: 16,
            invite_code_policy: InviteCodePolicy::Retain,
        }
    }

    /// Set the invite code attempt budget (at least one attempt is always made).
    #[must_use]
    pub const fn with_max_code_attempts(mut self, attempts: usize) -> Self {
        self.max_code_attempts = if attempts == 0 { 1 } else { attempts };
        self
    }

    /// Set the cancel-time invite code policy.
    #[must_use]
    pub const fn with_invite_code_policy(mut self, policy: InviteCodePolicy) -> Self {
        self.invite_code_policy = policy;
        self
    }
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Ticket ledger configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Balance of a freshly created account.
    ///
    /// Default: 2
    pub initial_balance: u32,

    /// `used_today` of a freshly created account.
    ///
    /// Default: `false` (the first earn of the day is available)
    pub initial_used_today: bool,

    /// Time-to-live of cached accounts.
    ///
    /// Default: 24 hours
    pub cache_ttl: Duration,
}

impl LedgerConfig {
    /// Create ledger configuration with defaults.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            initial_balance: tickets::DEFAULT_INITIAL_BALANCE,
            initial_used_today: false,
            cache_ttl: Duration::from_secs(tickets::DEFAULT_CACHE_TTL_SECS),
        }
    }

    /// Set the starting balance of new accounts.
    #[must_use]
    pub const fn with_initial_balance(mut self, balance: u32) -> Self {
        self.initial_balance = balance;
        self
    }

    /// Set the starting `used_today` flag of new accounts.
    #[must_use]
    pub const fn with_initial_used_today(mut self, used_today: bool) -> Self {
        self.initial_used_today = used_today;
        self
    }

    /// Set the cache time-to-live.
    #[must_use]
    pub const fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// When the daily reset sweep runs.
#[derive(Debug, Clone, PartialEq)]
pub struct ResetSchedule {
    /// Whether the sweep runs at all.
    ///
    /// Default: `true`
    pub enabled: bool,

    /// Time zone whose calendar day bounds the earn slot.
    ///
    /// Default: `Asia/Seoul`
    pub time_zone: Tz,

    /// Local wall-clock time of the reset.
    ///
    /// Default: 00:00
    pub reset_at: NaiveTime,

    /// Delay between the reset and the verification pass.
    ///
    /// Default: 60 seconds
    pub verify_delay: Duration,

    /// Backoff applied when the reset hits a transient store failure.
    pub retry: RetryPolicy,
}

impl ResetSchedule {
    /// Create a schedule with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            enabled: true,
            time_zone: chrono_tz::Asia::Seoul,
            reset_at: NaiveTime::MIN,
            verify_delay: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }

    /// Enable or disable the sweep.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the time zone.
    #[must_use]
    pub const fn with_time_zone(mut self, time_zone: Tz) -> Self {
        self.time_zone = time_zone;
        self
    }

    /// Set the local reset time.
    #[must_use]
    pub const fn with_reset_at(mut self, reset_at: NaiveTime) -> Self {
        self.reset_at = reset_at;
        self
    }

    /// Set the verification delay.
    #[must_use]
    pub const fn with_verify_delay(mut self, delay: Duration) -> Self {
        self.verify_delay = delay;
        self
    }

    /// Set the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for ResetSchedule {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pairing_config_defaults() {
        let config = PairingConfig::default();
        assert_eq!(config.max_code_attempts, 16);
        assert_eq!(config.invite_code_policy, InviteCodePolicy::Retain);
    }

    #[test]
    fn test_pairing_config_builder() {
        let config = PairingConfig::new()
            .with_max_code_attempts(0)
            .with_invite_code_policy(InviteCodePolicy::Regenerate);

        assert_eq!(config.max_code_attempts, 1);
        assert_eq!(config.invite_code_policy, InviteCodePolicy::Regenerate);
    }

    #[test]
    fn test_ledger_config_defaults_match_deployment() {
        let config = LedgerConfig::default();
        assert_eq!(config.initial_balance, 2);
        assert!(!config.initial_used_today);
        assert_eq!(config.cache_ttl, Duration::from_secs(86_400));
    }

    #[test]
    fn test_ledger_config_builder() {
        let config = LedgerConfig::new()
            .with_initial_balance(5)
            .with_initial_used_today(true)
            .with_cache_ttl(Duration::from_secs(60));

        assert_eq!(config.initial_balance, 5);
        assert!(config.initial_used_today);
        assert_eq!(config.cache_ttl, Duration::from_secs(60));
    }

    #[test]
    fn test_reset_schedule_builder() {
        let schedule = ResetSchedule::new()
            .with_enabled(false)
            .with_time_zone(chrono_tz::UTC)
            .with_reset_at(NaiveTime::from_hms_opt(4, 30, 0).unwrap_or(NaiveTime::MIN))
            .with_verify_delay(Duration::from_secs(5))
            .with_retry(RetryPolicy::none());

        assert!(!schedule.enabled);
        assert_eq!(schedule.time_zone, chrono_tz::UTC);
        assert_eq!(schedule.reset_at.to_string(), "04:30:00");
        assert_eq!(schedule.verify_delay, Duration::from_secs(5));
        assert_eq!(schedule.retry.max_retries, 0);
    }

    #[test]
    fn test_reset_schedule_defaults_to_seoul_midnight() {
        let schedule = ResetSchedule::default();
        assert!(schedule.enabled);
        assert_eq!(schedule.time_zone, chrono_tz::Asia::Seoul);
        assert_eq!(schedule.reset_at, NaiveTime::MIN);
    }
}
