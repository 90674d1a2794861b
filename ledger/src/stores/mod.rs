//! Production store implementations.
//!
//! - [`RedisLedgerCache`]: ticket cache in Redis
//! - [`postgres`]: pairing rooms and ticket accounts in PostgreSQL (feature `postgres`)

pub mod ledger_cache_redis;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use ledger_cache_redis::RedisLedgerCache;
