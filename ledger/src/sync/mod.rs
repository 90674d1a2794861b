//! Inbox for ledger changes pushed by an upstream gateway.
//!
//! The gateway writes ticket state into its cache first and then publishes a
//! [`SyncMessage`]. The inbox turns each message into a last-writer-wins
//! [`ExternalLedgerWrite::write`]. Nothing here ever fails the caller:
//! malformed or rejected messages are logged and acknowledged as dropped.
//!
//! Wire format:
//!
//! ```json
//! {
//!   "coupleId": "pair-1",
//!   "ticketData": { "ticket": 3, "usedToday": true, "lastSyncedAt": "2024-03-01T09:00:00Z" },
//!   "timestamp": 1709283600000,
//!   "source": "gateway"
//! }
//! ```

pub mod listener;

pub use listener::RedisSyncListener;

use crate::error::{LedgerError, Result};
use crate::metrics;
use crate::state::{PairId, TicketAccount, WriteOutcome};
use crate::ticket::ExternalLedgerWrite;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ticket fields of a sync message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketData {
    /// Balance as seen by the gateway.
    pub ticket: i64,

    /// Earn flag as seen by the gateway.
    pub used_today: bool,

    /// When the gateway wrote the value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl From<&TicketAccount> for TicketData {
    fn from(account: &TicketAccount) -> Self {
        Self {
            ticket: i64::from(account.balance),
            used_today: account.used_today,
            last_synced_at: Some(account.last_synced_at),
        }
    }
}

impl TicketData {
    /// Typed account for `pair_id`.
    ///
    /// A missing `lastSyncedAt` reads as the Unix epoch so any timestamped
    /// write supersedes it.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidSyncMessage`] for a negative or
    /// oversized balance.
    pub fn to_account(&self, pair_id: PairId) -> Result<TicketAccount> {
        let balance = u32::try_from(self.ticket)
            .map_err(|_| LedgerError::InvalidSyncMessage(format!("ticket out of range: {}", self.ticket)))?;

        Ok(TicketAccount::new(
            pair_id,
            balance,
            self.used_today,
            self.last_synced_at.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        ))
    }
}

/// A ledger change published on the sync channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMessage {
    /// Pair id of the account.
    pub couple_id: String,

    /// New ticket state.
    pub ticket_data: TicketData,

    /// Publish time in epoch milliseconds.
    #[serde(default)]
    pub timestamp: Option<i64>,

    /// Publisher name.
    #[serde(default)]
    pub source: Option<String>,
}

/// A validated, typed ledger write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncWrite {
    /// Target pair.
    pub pair_id: PairId,
    /// New balance.
    pub balance: u32,
    /// New earn flag.
    pub used_today: bool,
    /// Ordering timestamp for last-writer-wins.
    pub synced_at: DateTime<Utc>,
}

impl SyncMessage {
    /// Describe an account the way the gateway publishes it.
    #[must_use]
    pub fn from_account(account: &TicketAccount, source: &str) -> Self {
        Self {
            couple_id: account.pair_id.to_string(),
            ticket_data: TicketData::from(account),
            timestamp: Some(account.last_synced_at.timestamp_millis()),
            source: Some(source.to_string()),
        }
    }

    /// Validate the message.
    ///
    /// `lastSyncedAt` takes precedence; the publish `timestamp` is the fallback.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidSyncMessage`] for an empty pair id, a
    /// negative or oversized balance, or a missing timestamp.
    pub fn to_write(&self) -> Result<SyncWrite> {
        let couple_id = self.couple_id.trim();
        if couple_id.is_empty() {
            return Err(LedgerError::InvalidSyncMessage("coupleId is empty".to_string()));
        }

        let balance = u32::try_from(self.ticket_data.ticket).map_err(|_| {
            LedgerError::InvalidSyncMessage(format!("ticket out of range: {}", self.ticket_data.ticket))
        })?;

        let synced_at = self
            .ticket_data
            .last_synced_at
            .or_else(|| self.timestamp.and_then(DateTime::from_timestamp_millis))
            .ok_or_else(|| LedgerError::InvalidSyncMessage("no lastSyncedAt or timestamp".to_string()))?;

        Ok(SyncWrite {
            pair_id: PairId::new(couple_id),
            balance,
            used_today: self.ticket_data.used_today,
            synced_at,
        })
    }
}

/// How the inbox disposed of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAck {
    /// The write replaced the stored row.
    Applied,
    /// The stored row was newer; nothing changed.
    Stale,
    /// The message was invalid or the write failed; logged and discarded.
    Dropped,
}

impl SyncAck {
    /// Label for logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Stale => "stale",
            Self::Dropped => "dropped",
        }
    }
}

/// Reconciles externally pushed ledger changes into the store.
#[derive(Debug, Clone)]
pub struct SyncInbox<W> {
    ledger: W,
}

impl<W: ExternalLedgerWrite> SyncInbox<W> {
    /// Create an inbox writing through `ledger`.
    #[must_use]
    pub const fn new(ledger: W) -> Self {
        Self { ledger }
    }

    /// Apply a decoded message.
    pub async fn handle(&self, message: &SyncMessage) -> SyncAck {
        let source = message.source.as_deref().unwrap_or("unknown");
        tracing::info!(couple_id = %message.couple_id, source, "Ticket sync message received");

        let ack = match message.to_write() {
            Err(err) => {
                tracing::warn!(couple_id = %message.couple_id, error = %err, "Ticket sync message rejected");
                SyncAck::Dropped
            }
            Ok(write) => match self
                .ledger
                .write(&write.pair_id, write.balance, write.used_today, write.synced_at)
                .await
            {
                Ok(WriteOutcome::Applied) => SyncAck::Applied,
                Ok(WriteOutcome::Stale) => SyncAck::Stale,
                Err(err) => {
                    tracing::error!(couple_id = %write.pair_id, error = %err, "Ticket sync write failed");
                    SyncAck::Dropped
                }
            },
        };

        metrics::record_sync(ack.as_str());
        tracing::info!(couple_id = %message.couple_id, ack = ack.as_str(), "Ticket sync message handled");
        ack
    }

    /// Decode and apply a raw JSON payload.
    pub async fn handle_payload(&self, payload: &str) -> SyncAck {
        match serde_json::from_str::<SyncMessage>(payload) {
            Ok(message) => self.handle(&message).await,
            Err(err) => {
                metrics::record_sync(SyncAck::Dropped.as_str());
                tracing::warn!(error = %err, payload_len = payload.len(), "Undecodable ticket sync payload");
                SyncAck::Dropped
            }
        }
    }
}
