//! Redis pub/sub subscriber feeding the [`SyncInbox`].
//!
//! ```text
//! loop {
//!     subscribe(channel)            (backoff on failure)
//!     for each message:
//!         inbox.handle_payload      (errors logged, never fatal)
//!     stream ended -> reconnect
//! }
//! ```

use super::SyncInbox;
use crate::error::{LedgerError, Result};
use crate::retry::RetryPolicy;
use crate::ticket::ExternalLedgerWrite;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Subscribes to the gateway's sync channel and reconnects on failure.
pub struct RedisSyncListener<W> {
    client: redis::Client,
    channel: String,
    inbox: Arc<SyncInbox<W>>,
    reconnect: RetryPolicy,
}

impl<W> std::fmt::Debug for RedisSyncListener<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisSyncListener")
            .field("channel", &self.channel)
            .field("reconnect", &self.reconnect)
            .finish_non_exhaustive()
    }
}

impl<W: ExternalLedgerWrite + 'static> RedisSyncListener<W> {
    /// Create a listener.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ConfigError`] if the Redis URL is invalid.
    pub fn new(redis_url: &str, channel: impl Into<String>, inbox: Arc<SyncInbox<W>>) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| LedgerError::ConfigError(format!("Failed to create Redis client: {e}")))?;

        Ok(Self {
            client,
            channel: channel.into(),
            inbox,
            reconnect: RetryPolicy::default(),
        })
    }

    /// Set the reconnect backoff.
    #[must_use]
    pub fn with_reconnect(mut self, policy: RetryPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Run the listener in a background task until `shutdown` fires.
    #[must_use]
    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run(shutdown).await;
        })
    }

    async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        info!(channel = %self.channel, "Ticket sync listener started");
        let mut attempt = 0;

        loop {
            match self.listen(&mut shutdown).await {
                Ok(Stop::Shutdown) => break,
                Ok(Stop::StreamEnded) => {
                    attempt = 0;
                    warn!(channel = %self.channel, "Sync subscription ended, reconnecting");
                }
                Err(err) => {
                    error!(channel = %self.channel, attempt, error = %err, "Sync subscription failed");
                }
            }

            let delay = self.reconnect.delay_for_attempt(attempt);
            attempt = attempt.saturating_add(1);
            tokio::select! {
                _ = shutdown.recv() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        info!(channel = %self.channel, "Ticket sync listener stopped");
    }

    async fn listen(&self, shutdown: &mut broadcast::Receiver<()>) -> Result<Stop> {
        let connect = async {
            let mut pubsub = self
                .client
                .get_async_pubsub()
                .await
                .map_err(|e| LedgerError::CacheError(format!("Failed to open Redis pub/sub connection: {e}")))?;
            pubsub
                .subscribe(&self.channel)
                .await
                .map_err(|e| LedgerError::CacheError(format!("Failed to subscribe to {}: {e}", self.channel)))?;
            Ok::<_, LedgerError>(pubsub)
        };

        let mut pubsub = tokio::select! {
            _ = shutdown.recv() => return Ok(Stop::Shutdown),
            connected = connect => connected?,
        };
        info!(channel = %self.channel, "Subscribed to ticket sync channel");

        let mut messages = pubsub.on_message();
        loop {
            tokio::select! {
                _ = shutdown.recv() => return Ok(Stop::Shutdown),
                next = messages.next() => {
                    let Some(message) = next else {
                        return Ok(Stop::StreamEnded);
                    };
                    match message.get_payload::<String>() {
                        Ok(payload) => {
                            self.inbox.handle_payload(&payload).await;
                        }
                        Err(err) => warn!(error = %err, "Non-text sync payload ignored"),
                    }
                }
            }
        }
    }
}

enum Stop {
    Shutdown,
    StreamEnded,
}
