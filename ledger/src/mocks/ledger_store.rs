//! Mock ticket account store for testing.

use crate::error::{LedgerError, Result};
use crate::providers::LedgerStore;
use crate::state::{PairId, ResetReport, TicketAccount};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

type Accounts = Arc<Mutex<HashMap<PairId, TicketAccount>>>;

/// Mock ticket account store.
///
/// Uses in-memory storage for testing. Conditional updates run under one
/// mutex, matching the row-level atomicity of the SQL implementation.
#[derive(Debug, Clone, Default)]
pub struct MockLedgerStore {
    accounts: Accounts,
    unavailable: Arc<AtomicBool>,
}

impl MockLedgerStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with a storage error until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Read a row without going through the trait (for testing).
    ///
    /// # Errors
    ///
    /// Returns error if lock is poisoned.
    pub fn peek(&self, pair_id: &PairId) -> Result<Option<TicketAccount>> {
        Ok(lock(&self.accounts)?.get(pair_id).cloned())
    }

    /// Overwrite a row directly (for test setup).
    ///
    /// # Errors
    ///
    /// Returns error if lock is poisoned.
    pub fn seed(&self, account: TicketAccount) -> Result<()> {
        lock(&self.accounts)?.insert(account.pair_id.clone(), account);
        Ok(())
    }

    fn check_available(unavailable: &AtomicBool) -> Result<()> {
        if unavailable.load(Ordering::SeqCst) {
            return Err(LedgerError::StorageError("ledger store unavailable".to_string()));
        }
        Ok(())
    }
}

fn lock(accounts: &Accounts) -> Result<MutexGuard<'_, HashMap<PairId, TicketAccount>>> {
    accounts
        .lock()
        .map_err(|_| LedgerError::StorageError("Mutex lock failed".to_string()))
}

impl LedgerStore for MockLedgerStore {
    fn get(&self, pair_id: &PairId) -> impl Future<Output = Result<Option<TicketAccount>>> + Send {
        let accounts = Arc::clone(&self.accounts);
        let unavailable = Arc::clone(&self.unavailable);
        let pair_id = pair_id.clone();

        async move {
            Self::check_available(&unavailable)?;
            Ok(lock(&accounts)?.get(&pair_id).cloned())
        }
    }

    fn insert_if_absent(&self, account: &TicketAccount) -> impl Future<Output = Result<TicketAccount>> + Send {
        let accounts = Arc::clone(&self.accounts);
        let unavailable = Arc::clone(&self.unavailable);
        let account = account.clone();

        async move {
            Self::check_available(&unavailable)?;
            let mut guard = lock(&accounts)?;
            Ok(guard.entry(account.pair_id.clone()).or_insert(account).clone())
        }
    }

    fn decrement_if_positive(
        &self,
        pair_id: &PairId,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Option<TicketAccount>>> + Send {
        let accounts = Arc::clone(&self.accounts);
        let unavailable = Arc::clone(&self.unavailable);
        let pair_id = pair_id.clone();

        async move {
            Self::check_available(&unavailable)?;
            let mut guard = lock(&accounts)?;

            Ok(guard.get_mut(&pair_id).and_then(|account| {
                (account.balance > 0).then(|| {
                    account.balance -= 1;
                    account.last_synced_at = now;
                    account.clone()
                })
            }))
        }
    }

    fn credit_if_unused(
        &self,
        pair_id: &PairId,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Option<TicketAccount>>> + Send {
        let accounts = Arc::clone(&self.accounts);
        let unavailable = Arc::clone(&self.unavailable);
        let pair_id = pair_id.clone();

        async move {
            Self::check_available(&unavailable)?;
            let mut guard = lock(&accounts)?;

            Ok(guard.get_mut(&pair_id).and_then(|account| {
                (!account.used_today).then(|| {
                    account.balance = account.balance.saturating_add(1);
                    account.used_today = true;
                    account.last_synced_at = now;
                    account.clone()
                })
            }))
        }
    }

    fn apply_if_newer(&self, account: &TicketAccount) -> impl Future<Output = Result<bool>> + Send {
        let accounts = Arc::clone(&self.accounts);
        let unavailable = Arc::clone(&self.unavailable);
        let account = account.clone();

        async move {
            Self::check_available(&unavailable)?;
            let mut guard = lock(&accounts)?;

            let stale = guard
                .get(&account.pair_id)
                .is_some_and(|stored| stored.last_synced_at > account.last_synced_at);
            if stale {
                return Ok(false);
            }

            guard.insert(account.pair_id.clone(), account);
            Ok(true)
        }
    }

    fn reset_used_today(&self, now: DateTime<Utc>) -> impl Future<Output = Result<Vec<TicketAccount>>> + Send {
        let accounts = Arc::clone(&self.accounts);
        let unavailable = Arc::clone(&self.unavailable);

        async move {
            Self::check_available(&unavailable)?;
            let mut guard = lock(&accounts)?;

            Ok(guard
                .values_mut()
                .filter(|account| account.used_today)
                .map(|account| {
                    account.used_today = false;
                    account.last_synced_at = now;
                    account.clone()
                })
                .collect())
        }
    }

    fn reset_report(&self) -> impl Future<Output = Result<ResetReport>> + Send {
        let accounts = Arc::clone(&self.accounts);
        let unavailable = Arc::clone(&self.unavailable);

        async move {
            Self::check_available(&unavailable)?;
            let guard = lock(&accounts)?;

            Ok(ResetReport {
                total: guard.len() as u64,
                still_used: guard.values().filter(|account| account.used_today).count() as u64,
            })
        }
    }
}
