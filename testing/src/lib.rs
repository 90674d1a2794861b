//! # Couple Ledger Testing
//!
//! Test support for `couple-ledger`.
//!
//! This crate provides:
//! - Deterministic clocks ([`FixedClock`], [`ManualClock`])
//! - A [`TestHarness`] wiring the pairing engine and ticket ledger over the
//!   in-memory stores
//! - Proptest strategies for invite codes and ledger operation sequences
//!
//! ## Example
//!
//! ```
//! use couple_ledger_testing::TestHarness;
//!
//! # async fn example() -> couple_ledger::Result<()> {
//! let harness = TestHarness::new();
//! let matched = harness.pair("kakao_1", "google_2").await?;
//!
//! assert_eq!(harness.ledger.consume(&matched.pair_id).await?, 1);
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use couple_ledger::providers::Clock;

/// Deterministic clocks.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::{Arc, Mutex};

    /// Fixed clock for deterministic tests.
    ///
    /// Always returns the same time.
    ///
    /// # Example
    ///
    /// ```
    /// use couple_ledger::providers::Clock;
    /// use couple_ledger_testing::mocks::FixedClock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when told to.
    ///
    /// Clones share the same time, so a test can keep a handle while the
    /// engine and ledger hold theirs.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Create a clock starting at `time`.
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        /// Move the clock forward.
        pub fn advance(&self, by: chrono::Duration) {
            if let Ok(mut time) = self.time.lock() {
                *time += by;
            }
        }

        /// Jump to an absolute time.
        pub fn set(&self, to: DateTime<Utc>) {
            if let Ok(mut time) = self.time.lock() {
                *time = to;
            }
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            self.time.lock().map_or_else(|poisoned| *poisoned.into_inner(), |time| *time)
        }
    }

    /// 2025-01-01T00:00:00Z.
    #[must_use]
    pub fn test_time() -> DateTime<Utc> {
        DateTime::from_timestamp(1_735_689_600, 0).unwrap_or_default()
    }

    /// Fixed clock at [`test_time`].
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(test_time())
    }
}

/// Wired engine and ledger over in-memory stores.
pub mod helpers {
    use super::mocks::{ManualClock, test_time};
    use couple_ledger::mocks::{MockLedgerCache, MockLedgerStore, MockPairingStore, ScriptedCodeGenerator};
    use couple_ledger::strategy::CacheAside;
    use couple_ledger::{
        CacheStrategy, LedgerConfig, Match, PairingConfig, PairingEngine, Result, SubjectId, SyncInbox, TicketLedger,
    };
    use std::sync::{Arc, Once};

    /// Pairing engine over the in-memory room store.
    pub type TestEngine = PairingEngine<MockPairingStore, ScriptedCodeGenerator>;

    /// Ticket ledger resolving pairs through [`TestEngine`].
    pub type TestLedger = TicketLedger<Arc<TestEngine>, MockLedgerStore, MockLedgerCache>;

    /// Engine, ledger and handles on every store they use.
    ///
    /// The mock stores share state across clones, so the handles here see
    /// exactly what the engine and ledger wrote.
    #[derive(Debug)]
    pub struct TestHarness {
        /// Shared clock.
        pub clock: ManualClock,
        /// Scripted invite codes and sequential pair ids.
        pub codes: ScriptedCodeGenerator,
        /// Pairing room store.
        pub rooms: MockPairingStore,
        /// Ticket account store.
        pub accounts: MockLedgerStore,
        /// Ticket cache.
        pub cache: MockLedgerCache,
        /// Pairing engine.
        pub engine: Arc<TestEngine>,
        /// Ticket ledger.
        pub ledger: Arc<TestLedger>,
    }

    impl TestHarness {
        /// Cache-aside harness with default configuration.
        #[must_use]
        pub fn new() -> Self {
            Self::with_strategy(Arc::new(CacheAside))
        }

        /// Harness with the given cache strategy.
        #[must_use]
        pub fn with_strategy(strategy: Arc<dyn CacheStrategy>) -> Self {
            Self::with_config(strategy, PairingConfig::default(), LedgerConfig::default())
        }

        /// Fully configured harness.
        #[must_use]
        pub fn with_config(strategy: Arc<dyn CacheStrategy>, pairing: PairingConfig, ledger: LedgerConfig) -> Self {
            let clock = ManualClock::new(test_time());
            let codes = ScriptedCodeGenerator::new();
            let rooms = MockPairingStore::new();
            let accounts = MockLedgerStore::new();
            let cache = MockLedgerCache::new();

            let engine = Arc::new(PairingEngine::new(
                rooms.clone(),
                codes.clone(),
                Arc::new(clock.clone()),
                pairing,
            ));
            let ledger = Arc::new(TicketLedger::new(
                Arc::clone(&engine),
                accounts.clone(),
                cache.clone(),
                strategy,
                Arc::new(clock.clone()),
                ledger,
            ));

            Self {
                clock,
                codes,
                rooms,
                accounts,
                cache,
                engine,
                ledger,
            }
        }

        /// Create a room for `creator` and redeem it as `partner`.
        ///
        /// # Errors
        ///
        /// Returns whatever the engine rejects.
        pub async fn pair(&self, creator: &str, partner: &str) -> Result<Match> {
            let code = self.engine.create_room(&SubjectId::new(creator)).await?;
            self.engine.redeem(&SubjectId::new(partner), code.as_str()).await
        }

        /// Sync inbox writing into this harness's ledger.
        #[must_use]
        pub fn inbox(&self) -> SyncInbox<Arc<TestLedger>> {
            SyncInbox::new(Arc::clone(&self.ledger))
        }
    }

    impl Default for TestHarness {
        fn default() -> Self {
            Self::new()
        }
    }

    static TRACING: Once = Once::new();

    /// Install a test subscriber honoring `RUST_LOG`, once per process.
    pub fn init_tracing() {
        TRACING.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .with_test_writer()
                .try_init();
        });
    }
}

/// Proptest strategies.
pub mod properties {
    use couple_ledger::InviteCode;
    use couple_ledger::constants::invite_code::{CHARSET, LENGTH};
    use proptest::prelude::*;

    /// Operation applied to a ticket account in a generated sequence.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum LedgerOp {
        /// Spend one ticket.
        Consume,
        /// Claim today's earn slot.
        Earn,
        /// Run the daily reset.
        Reset,
    }

    /// Any well-formed invite code.
    pub fn invite_code() -> impl Strategy<Value = InviteCode> {
        proptest::collection::vec(proptest::sample::select(CHARSET), LENGTH).prop_filter_map(
            "charset bytes are ASCII",
            |bytes| String::from_utf8(bytes).ok().and_then(|s| InviteCode::parse(&s).ok()),
        )
    }

    /// One ledger operation.
    pub fn ledger_op() -> impl Strategy<Value = LedgerOp> {
        prop_oneof![
            3 => Just(LedgerOp::Consume),
            2 => Just(LedgerOp::Earn),
            1 => Just(LedgerOp::Reset),
        ]
    }

    /// Up to `max` ledger operations.
    pub fn ledger_ops(max: usize) -> impl Strategy<Value = Vec<LedgerOp>> {
        proptest::collection::vec(ledger_op(), 0..=max)
    }
}

pub use helpers::{TestEngine, TestHarness, TestLedger, init_tracing};
pub use mocks::{FixedClock, ManualClock, test_clock, test_time};
