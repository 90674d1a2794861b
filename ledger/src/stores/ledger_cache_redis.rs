//! Redis ticket cache.
//!
//! Accounts are stored under `couple:ticket:{pair_id}` with `SET EX`, in the
//! gateway's camelCase ticket layout. The pair id lives only in the key:
//!
//! ```json
//! { "ticket": 3, "usedToday": true, "lastSyncedAt": "2024-03-01T09:00:00Z" }
//! ```
//!
//! # Example
//!
//! ```no_run
//! use couple_ledger::stores::RedisLedgerCache;
//!
//! # async fn example() -> couple_ledger::Result<()> {
//! let cache = RedisLedgerCache::new("redis://127.0.0.1:6379").await?;
//! # Ok(())
//! # }
//! ```

use crate::constants::redis_keys;
use crate::error::{LedgerError, Result};
use crate::providers::LedgerCache;
use crate::state::{PairId, TicketAccount};
use crate::sync::TicketData;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::time::Duration;

/// Redis-backed [`LedgerCache`].
#[derive(Clone)]
pub struct RedisLedgerCache {
    /// Connection manager for connection pooling.
    conn_manager: ConnectionManager,
}

impl std::fmt::Debug for RedisLedgerCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisLedgerCache").finish_non_exhaustive()
    }
}

impl RedisLedgerCache {
    /// Connect to Redis.
    ///
    /// # Errors
    ///
    /// Returns error if connection to Redis fails.
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| LedgerError::CacheError(format!("Failed to create Redis client: {e}")))?;

        let conn_manager = ConnectionManager::new(client)
            .await
            .map_err(|e| LedgerError::CacheError(format!("Failed to create Redis connection manager: {e}")))?;

        Ok(Self { conn_manager })
    }

    /// Redis key of a pair's cached account.
    #[must_use]
    pub fn key(pair_id: &PairId) -> String {
        format!("{}{}", redis_keys::TICKET_PREFIX, pair_id.as_str())
    }
}

fn encode(account: &TicketAccount) -> Result<String> {
    serde_json::to_string(&TicketData::from(account)).map_err(|e| LedgerError::SerializationError(e.to_string()))
}

fn decode(pair_id: &PairId, json: &str) -> Result<TicketAccount> {
    let data: TicketData =
        serde_json::from_str(json).map_err(|e| LedgerError::SerializationError(e.to_string()))?;
    data.to_account(pair_id.clone())
        .map_err(|e| LedgerError::SerializationError(e.to_string()))
}

impl LedgerCache for RedisLedgerCache {
    async fn get(&self, pair_id: &PairId) -> Result<Option<TicketAccount>> {
        let mut conn = self.conn_manager.clone();

        let value: Option<String> = conn
            .get(Self::key(pair_id))
            .await
            .map_err(|e| LedgerError::CacheError(format!("Failed to read ticket cache: {e}")))?;

        value.map(|json| decode(pair_id, &json)).transpose()
    }

    async fn put(&self, account: &TicketAccount, ttl: Duration) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let json = encode(account)?;
        let ttl_seconds = ttl.as_secs().max(1);

        let (): () = conn
            .set_ex(Self::key(&account.pair_id), json, ttl_seconds)
            .await
            .map_err(|e| LedgerError::CacheError(format!("Failed to write ticket cache: {e}")))?;

        tracing::debug!(
            pair_id = %account.pair_id,
            balance = account.balance,
            ttl_seconds,
            "Cached ticket account"
        );
        Ok(())
    }

    async fn invalidate(&self, pair_id: &PairId) -> Result<()> {
        let mut conn = self.conn_manager.clone();

        let _: u64 = conn
            .del(Self::key(pair_id))
            .await
            .map_err(|e| LedgerError::CacheError(format!("Failed to invalidate ticket cache: {e}")))?;

        tracing::debug!(pair_id = %pair_id, "Invalidated cached ticket account");
        Ok(())
    }
}
