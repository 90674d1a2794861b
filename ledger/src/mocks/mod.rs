//! In-memory provider implementations for testing.
//!
//! Enabled by the default `test-utils` feature.

pub mod codes;
pub mod ledger_cache;
pub mod ledger_store;
pub mod pairing_store;

pub use codes::ScriptedCodeGenerator;
pub use ledger_cache::MockLedgerCache;
pub use ledger_store::MockLedgerStore;
pub use pairing_store::MockPairingStore;
