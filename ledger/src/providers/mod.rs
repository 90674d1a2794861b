//! Collaborator traits.
//!
//! The engine, the ledger and the sweep depend on these traits only. Tests
//! use the in-memory implementations in [`crate::mocks`]; production wires
//! the Postgres and Redis implementations in [`crate::stores`].
//!
//! ```text
//! PairingEngine ──▶ PairingStore, CodeGenerator, Clock
//! TicketLedger  ──▶ PairResolver, LedgerStore, LedgerCache, Clock
//! ```

pub mod clock;
pub mod codes;
pub mod ledger_cache;
pub mod ledger_store;
pub mod pairing_store;

pub use clock::{Clock, SystemClock};
pub use codes::{CodeGenerator, RandomCodeGenerator};
pub use ledger_cache::LedgerCache;
pub use ledger_store::LedgerStore;
pub use pairing_store::{InsertOutcome, PairingStore};
