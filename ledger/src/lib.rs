//! # Couple Ledger
//!
//! Pairs two end-users into a couple through a single-use invite code and
//! keeps the couple's shared ticket balance consistent between a fast cache
//! and a durable store.
//!
//! ## Components
//!
//! - [`PairingEngine`]: invite-code state machine (`PENDING -> ACTIVE -> PENDING | CANCELLED`)
//! - [`TicketLedger`]: read / consume / earn / external write / daily reset
//! - [`DailyResetSweep`]: scheduled daily reset in a configured time zone
//! - [`SyncInbox`]: reconciles ledger changes pushed by an upstream gateway
//!
//! ## Architecture
//!
//! ```text
//! subject ──▶ PairingEngine ──▶ PairingStore
//!                  │ PairResolver
//!                  ▼
//! pair_id ──▶ TicketLedger ──▶ LedgerStore (authoritative)
//!                  │  ▲            ▲
//!                  │  └ CacheStrategy
//!                  ▼               │
//!             LedgerCache     DailyResetSweep, SyncInbox
//! ```
//!
//! ## Example
//!
//! ```rust
//! use couple_ledger::mocks::{MockLedgerCache, MockLedgerStore, MockPairingStore};
//! use couple_ledger::providers::{RandomCodeGenerator, SystemClock};
//! use couple_ledger::strategy::CacheAside;
//! use couple_ledger::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> couple_ledger::Result<()> {
//! let clock = Arc::new(SystemClock);
//! let engine = Arc::new(PairingEngine::new(
//!     MockPairingStore::new(),
//!     RandomCodeGenerator,
//!     clock.clone(),
//!     PairingConfig::default(),
//! ));
//! let ledger = TicketLedger::new(
//!     Arc::clone(&engine),
//!     MockLedgerStore::new(),
//!     MockLedgerCache::new(),
//!     Arc::new(CacheAside),
//!     clock,
//!     LedgerConfig::default(),
//! );
//!
//! let code = engine.create_room(&SubjectId::new("kakao_1")).await?;
//! let matched = engine.redeem(&SubjectId::new("google_2"), code.as_str()).await?;
//! assert_eq!(ledger.consume(&matched.pair_id).await?, 1);
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

pub mod config;
pub mod constants;
pub mod error;
pub mod metrics;
pub mod pairing;
pub mod providers;
pub mod retry;
pub mod state;
pub mod stores;
pub mod strategy;
pub mod sweep;
pub mod sync;
pub mod ticket;

#[cfg(feature = "test-utils")]
pub mod mocks;

pub use config::{InviteCodePolicy, LedgerConfig, PairingConfig, ResetSchedule};
pub use error::{LedgerError, Result};
pub use pairing::{PairResolver, PairingEngine};
pub use state::{
    CoupleInfo, Earned, IdentityProvider, InviteCode, Match, PairId, PairingRoom, ResetReport, RoomState,
    SubjectId, TicketAccount, WriteOutcome,
};
pub use strategy::{CacheAction, CacheEvent, CacheStrategy};
pub use sweep::DailyResetSweep;
pub use sync::{SyncAck, SyncInbox, SyncMessage};
pub use ticket::{DailyReset, ExternalLedgerWrite, TicketLedger};
