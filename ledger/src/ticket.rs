//! Shared ticket ledger.
//!
//! Balance changes are decided by single conditional updates in the
//! [`LedgerStore`]. The [`LedgerCache`] is written only after a commit and
//! only as the configured [`CacheStrategy`] allows; cache failures degrade to
//! the store and never fail an operation whose store write succeeded.

use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};
use crate::metrics;
use crate::pairing::PairResolver;
use crate::providers::{Clock, LedgerCache, LedgerStore};
use crate::state::{Earned, PairId, ResetReport, SubjectId, TicketAccount, WriteOutcome};
use crate::strategy::{CacheAction, CacheEvent, CacheStrategy};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Daily earn-slot reset, as driven by the sweep.
pub trait DailyReset: Send + Sync {
    /// Clear every consumed earn slot; returns how many accounts changed.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable.
    fn reset_daily(&self) -> impl std::future::Future<Output = Result<usize>> + Send;

    /// Count accounts still flagged after a reset.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable.
    fn verify_reset(&self) -> impl std::future::Future<Output = Result<ResetReport>> + Send;
}

/// Externally originated ledger writes, as delivered by the sync inbox.
pub trait ExternalLedgerWrite: Send + Sync {
    /// Apply a last-writer-wins snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::PairNotFound`] for unknown pairs, or an
    /// infrastructure error.
    fn write(
        &self,
        pair_id: &PairId,
        balance: u32,
        used_today: bool,
        synced_at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<WriteOutcome>> + Send;
}

/// Per-pair ticket balance with cache/store consistency.
pub struct TicketLedger<R, L, C> {
    resolver: R,
    store: L,
    cache: C,
    strategy: Arc<dyn CacheStrategy>,
    clock: Arc<dyn Clock>,
    config: LedgerConfig,
}

impl<R, L, C> std::fmt::Debug for TicketLedger<R, L, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketLedger")
            .field("strategy", &self.strategy.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<R: PairResolver, L: LedgerStore, C: LedgerCache> TicketLedger<R, L, C> {
    /// Create a ledger.
    #[must_use]
    pub fn new(
        resolver: R,
        store: L,
        cache: C,
        strategy: Arc<dyn CacheStrategy>,
        clock: Arc<dyn Clock>,
        config: LedgerConfig,
    ) -> Self {
        Self {
            resolver,
            store,
            cache,
            strategy,
            clock,
            config,
        }
    }

    /// Access the durable store.
    #[must_use]
    pub const fn store(&self) -> &L {
        &self.store
    }

    /// Access the cache.
    #[must_use]
    pub const fn cache(&self) -> &C {
        &self.cache
    }

    /// Current account of an active pair, created with defaults on first use.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::PairNotFound`] if the pair is not ACTIVE
    /// - Store errors if the cache missed and the store is unreachable
    #[tracing::instrument(skip_all, fields(pair_id = %pair_id))]
    pub async fn read(&self, pair_id: &PairId) -> Result<TicketAccount> {
        self.resolver.ensure_active(pair_id).await?;

        match self.cache.get(pair_id).await {
            Ok(Some(account)) => {
                metrics::record_cache("hit");
                return Ok(account);
            }
            Ok(None) => metrics::record_cache("miss"),
            Err(err) => {
                metrics::record_cache("error");
                tracing::warn!(error = %err, "Ticket cache read failed, falling back to store");
            }
        }

        let account = self.load_or_init(pair_id).await?;
        self.sync_cache(CacheEvent::ReadMiss, &account).await;
        Ok(account)
    }

    /// Spend one ticket; returns the remaining balance.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::PairNotFound`] if the pair is not ACTIVE
    /// - [`LedgerError::InsufficientBalance`] if the balance is zero
    #[tracing::instrument(skip_all, fields(pair_id = %pair_id))]
    pub async fn consume(&self, pair_id: &PairId) -> Result<u32> {
        // Not atomic with cancel: a racing cancel can still see this decrement land.
        self.resolver.ensure_active(pair_id).await?;
        let now = self.clock.now();

        let mut updated = self.store.decrement_if_positive(pair_id, now).await?;
        if updated.is_none() && self.store.get(pair_id).await?.is_none() {
            self.load_or_init(pair_id).await?;
            updated = self.store.decrement_if_positive(pair_id, now).await?;
        }

        let Some(account) = updated else {
            metrics::record_ticket("consume", "insufficient");
            tracing::info!("Ticket consume rejected: balance is zero");
            return Err(LedgerError::InsufficientBalance);
        };

        self.sync_cache(CacheEvent::LocalCommit, &account).await;
        metrics::record_ticket("consume", "ok");
        tracing::info!(remaining = account.balance, "Ticket consumed");
        Ok(account.balance)
    }

    /// Credit today's ticket if it has not been earned yet.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::PairNotFound`] if the pair is not ACTIVE.
    #[tracing::instrument(skip_all, fields(pair_id = %pair_id))]
    pub async fn earn(&self, pair_id: &PairId) -> Result<Earned> {
        self.resolver.ensure_active(pair_id).await?;
        let now = self.clock.now();

        let mut credited = self.store.credit_if_unused(pair_id, now).await?;
        if credited.is_none() {
            let current = self.load_or_init(pair_id).await?;
            if current.used_today {
                metrics::record_ticket("earn", "already_used");
                tracing::debug!(balance = current.balance, "Earn slot already used today");
                return Ok(Earned {
                    earned: false,
                    new_balance: current.balance,
                });
            }
            // Row was created just now; try the credit once more.
            credited = self.store.credit_if_unused(pair_id, now).await?;
        }

        match credited {
            Some(account) => {
                self.sync_cache(CacheEvent::LocalCommit, &account).await;
                metrics::record_ticket("earn", "ok");
                tracing::info!(balance = account.balance, "Ticket earned");
                Ok(Earned {
                    earned: true,
                    new_balance: account.balance,
                })
            }
            None => {
                let current = self.load_or_init(pair_id).await?;
                metrics::record_ticket("earn", "already_used");
                Ok(Earned {
                    earned: false,
                    new_balance: current.balance,
                })
            }
        }
    }

    /// Apply an externally originated snapshot if it is not older than the stored one.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::PairNotFound`] if the pair is not ACTIVE.
    #[tracing::instrument(skip_all, fields(pair_id = %pair_id, balance = balance, used_today = used_today))]
    pub async fn write(
        &self,
        pair_id: &PairId,
        balance: u32,
        used_today: bool,
        synced_at: DateTime<Utc>,
    ) -> Result<WriteOutcome> {
        self.resolver.ensure_active(pair_id).await?;

        let account = TicketAccount::new(pair_id.clone(), balance, used_today, synced_at);
        if !self.store.apply_if_newer(&account).await? {
            metrics::record_ticket("write", "stale");
            tracing::info!(synced_at = %synced_at, "External ledger write is older than stored row, ignored");
            return Ok(WriteOutcome::Stale);
        }

        self.sync_cache(CacheEvent::ExternalWrite, &account).await;
        metrics::record_ticket("write", "applied");
        tracing::info!("External ledger write applied");
        Ok(WriteOutcome::Applied)
    }

    /// Clear every consumed earn slot; returns how many accounts changed.
    ///
    /// Re-running only touches accounts flagged since the previous run.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable.
    pub async fn reset_daily(&self) -> Result<usize> {
        let reset = self.store.reset_used_today(self.clock.now()).await?;
        for account in &reset {
            self.sync_cache(CacheEvent::DailyReset, account).await;
        }

        metrics::record_daily_reset(reset.len());
        tracing::info!(reset = reset.len(), "Daily ticket reset applied");
        Ok(reset.len())
    }

    /// Count accounts still flagged; logs a warning if any are.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable.
    pub async fn verify_reset(&self) -> Result<ResetReport> {
        let report = self.store.reset_report().await?;
        metrics::record_reset_verification(report.still_used);

        if report.is_clean() {
            tracing::info!(total = report.total, "Daily reset verified");
        } else {
            tracing::warn!(
                total = report.total,
                still_used = report.still_used,
                "Accounts still marked as used after daily reset"
            );
        }
        Ok(report)
    }

    /// Account of the subject's active pair.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotPaired`] if the subject is not in an ACTIVE room.
    pub async fn balance_for(&self, subject: &SubjectId) -> Result<TicketAccount> {
        let pair_id = self.resolver.resolve_pair_id(subject).await?;
        self.read(&pair_id).await
    }

    async fn load_or_init(&self, pair_id: &PairId) -> Result<TicketAccount> {
        if let Some(account) = self.store.get(pair_id).await? {
            return Ok(account);
        }

        let fresh = TicketAccount::new(
            pair_id.clone(),
            self.config.initial_balance,
            self.config.initial_used_today,
            self.clock.now(),
        );
        let persisted = self.store.insert_if_absent(&fresh).await?;
        tracing::info!(balance = persisted.balance, "Ticket account initialized");
        Ok(persisted)
    }

    /// Bring the cache in line with a committed account.
    async fn sync_cache(&self, event: CacheEvent, account: &TicketAccount) {
        match self.strategy.plan(event) {
            CacheAction::Populate | CacheAction::Overwrite => {
                if let Err(err) = self.cache.put(account, self.config.cache_ttl).await {
                    metrics::record_cache("write_error");
                    tracing::warn!(
                        pair_id = %account.pair_id,
                        ?event,
                        error = %err,
                        "Ticket cache write failed after commit, invalidating"
                    );
                    self.invalidate(&account.pair_id).await;
                }
            }
            CacheAction::Invalidate => self.invalidate(&account.pair_id).await,
            CacheAction::Skip => {}
        }
    }

    async fn invalidate(&self, pair_id: &PairId) {
        if let Err(err) = self.cache.invalidate(pair_id).await {
            metrics::record_cache("invalidate_error");
            tracing::warn!(pair_id = %pair_id, error = %err, "Ticket cache invalidation failed");
        }
    }
}

impl<R: PairResolver, L: LedgerStore, C: LedgerCache> DailyReset for TicketLedger<R, L, C> {
    async fn reset_daily(&self) -> Result<usize> {
        Self::reset_daily(self).await
    }

    async fn verify_reset(&self) -> Result<ResetReport> {
        Self::verify_reset(self).await
    }
}

impl<R: PairResolver, L: LedgerStore, C: LedgerCache> ExternalLedgerWrite for TicketLedger<R, L, C> {
    async fn write(
        &self,
        pair_id: &PairId,
        balance: u32,
        used_today: bool,
        synced_at: DateTime<Utc>,
    ) -> Result<WriteOutcome> {
        Self::write(self, pair_id, balance, used_today, synced_at).await
    }
}

impl<T: DailyReset> DailyReset for Arc<T> {
    fn reset_daily(&self) -> impl std::future::Future<Output = Result<usize>> + Send {
        (**self).reset_daily()
    }

    fn verify_reset(&self) -> impl std::future::Future<Output = Result<ResetReport>> + Send {
        (**self).verify_reset()
    }
}

impl<T: ExternalLedgerWrite> ExternalLedgerWrite for Arc<T> {
    fn write(
        &self,
        pair_id: &PairId,
        balance: u32,
        used_today: bool,
        synced_at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<WriteOutcome>> + Send {
        (**self).write(pair_id, balance, used_today, synced_at)
    }
}
