//! Prometheus metrics for pairing and ticket ledger outcomes.
//!
//! Recording is a no-op until a recorder is installed, so library users that
//! do not export metrics pay nothing beyond the macro call.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `couple_pairing_total{outcome}` - Pairing transitions and their rejections
//! - `couple_tickets_total{operation, outcome}` - Ticket ledger operations
//! - `couple_ledger_cache_total{result}` - Cache hits, misses and failures
//! - `couple_sync_messages_total{ack}` - Externally pushed ledger changes
//! - `couple_daily_reset_accounts_total` - Accounts whose earn slot was reset
//!
//! ## Gauges
//! - `couple_daily_reset_still_used` - Accounts still flagged after the last verification

use metrics::{describe_counter, describe_gauge};

/// Register descriptions for all ledger metrics.
///
/// Call once at startup, after the recorder is installed.
pub fn register_metrics() {
    describe_counter!(
        "couple_pairing_total",
        "Pairing state machine outcomes (created, matched, cancelled, dissolved, withdrawn, rejected)"
    );
    describe_counter!(
        "couple_tickets_total",
        "Ticket ledger operations by operation and outcome"
    );
    describe_counter!(
        "couple_ledger_cache_total",
        "Ticket cache lookups and write failures"
    );
    describe_counter!(
        "couple_sync_messages_total",
        "Externally pushed ledger changes by acknowledgement"
    );
    describe_counter!(
        "couple_daily_reset_accounts_total",
        "Ticket accounts whose daily earn slot was reset"
    );
    describe_gauge!(
        "couple_daily_reset_still_used",
        "Ticket accounts still marked as used after the last reset verification"
    );

    tracing::info!("Ledger metrics registered");
}

// ============================================================================
// Metric Recording Functions
// ============================================================================

/// Record a pairing transition or rejection.
///
/// # Arguments
///
/// * `outcome` - e.g. `"created"`, `"matched"`, `"already_matched"`
pub fn record_pairing(outcome: &'static str) {
    metrics::counter!("couple_pairing_total", "outcome" => outcome).increment(1);
}

/// Record a ticket ledger operation.
pub fn record_ticket(operation: &'static str, outcome: &'static str) {
    metrics::counter!("couple_tickets_total", "operation" => operation, "outcome" => outcome).increment(1);
}

/// Record a cache lookup result or write failure.
pub fn record_cache(result: &'static str) {
    metrics::counter!("couple_ledger_cache_total", "result" => result).increment(1);
}

/// Record how a sync message was acknowledged.
pub fn record_sync(ack: &'static str) {
    metrics::counter!("couple_sync_messages_total", "ack" => ack).increment(1);
}

/// Record the outcome of a daily reset.
pub fn record_daily_reset(reset: usize) {
    metrics::counter!("couple_daily_reset_accounts_total").increment(u64::try_from(reset).unwrap_or(u64::MAX));
    tracing::debug!(reset, "Recorded daily_reset metric");
}

/// Record the result of a reset verification pass.
#[allow(clippy::cast_precision_loss)]
pub fn record_reset_verification(still_used: u64) {
    metrics::gauge!("couple_daily_reset_still_used").set(still_used as f64);
}
