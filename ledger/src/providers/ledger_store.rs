//! Ticket account store trait.

use crate::error::Result;
use crate::state::{PairId, ResetReport, TicketAccount};
use chrono::{DateTime, Utc};

/// Durable per-pair ticket balance and daily earn flag.
///
/// Every mutation is a single conditional update so concurrent callers on
/// the same pair can never overdraw or double-credit.
pub trait LedgerStore: Send + Sync {
    /// Load an account.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable.
    fn get(&self, pair_id: &PairId) -> impl std::future::Future<Output = Result<Option<TicketAccount>>> + Send;

    /// Insert `account` unless a row already exists; returns the persisted row.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable.
    fn insert_if_absent(&self, account: &TicketAccount) -> impl std::future::Future<Output = Result<TicketAccount>> + Send;

    /// `balance = balance - 1 WHERE balance > 0`.
    ///
    /// Returns the updated row, or `None` if the row is missing or empty.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable.
    fn decrement_if_positive(
        &self,
        pair_id: &PairId,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<Option<TicketAccount>>> + Send;

    /// `balance = balance + 1, used_today = true WHERE used_today = false`.
    ///
    /// Returns the updated row, or `None` if the slot was already used.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable.
    fn credit_if_unused(
        &self,
        pair_id: &PairId,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<Option<TicketAccount>>> + Send;

    /// Last-writer-wins upsert.
    ///
    /// Applies when no row exists or the stored `last_synced_at` is not newer
    /// than the incoming one. Returns whether the write was applied.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable.
    fn apply_if_newer(&self, account: &TicketAccount) -> impl std::future::Future<Output = Result<bool>> + Send;

    /// Clear `used_today` on every flagged row, stamping `last_synced_at`.
    ///
    /// Returns the rows that changed.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable.
    fn reset_used_today(&self, now: DateTime<Utc>) -> impl std::future::Future<Output = Result<Vec<TicketAccount>>> + Send;

    /// Count all rows and the rows still flagged.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable.
    fn reset_report(&self) -> impl std::future::Future<Output = Result<ResetReport>> + Send;
}
