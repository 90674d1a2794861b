//! Ticket account cache trait.

use crate::error::Result;
use crate::state::{PairId, TicketAccount};
use std::time::Duration;

/// Fast key-value mirror of [`LedgerStore`](crate::providers::LedgerStore) rows.
///
/// Never authoritative. The ledger only writes it after a store commit and
/// tolerates every failure by falling back to the store.
pub trait LedgerCache: Send + Sync {
    /// Cached account, if present and not expired.
    ///
    /// # Errors
    ///
    /// Returns error if the cache is unreachable or the value is corrupt.
    fn get(&self, pair_id: &PairId) -> impl std::future::Future<Output = Result<Option<TicketAccount>>> + Send;

    /// Store `account` with a time-to-live.
    ///
    /// # Errors
    ///
    /// Returns error if the cache is unreachable.
    fn put(&self, account: &TicketAccount, ttl: Duration) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Drop the cached account.
    ///
    /// # Errors
    ///
    /// Returns error if the cache is unreachable.
    fn invalidate(&self, pair_id: &PairId) -> impl std::future::Future<Output = Result<()>> + Send;
}
