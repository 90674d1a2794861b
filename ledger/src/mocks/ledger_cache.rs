//! Mock ticket cache for testing.

use crate::error::{LedgerError, Result};
use crate::providers::LedgerCache;
use crate::state::{PairId, TicketAccount};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

type Entries = Arc<Mutex<HashMap<PairId, (TicketAccount, Instant)>>>;

/// Mock ticket cache.
///
/// In-memory map with per-entry expiry. Can be switched into an outage mode
/// to exercise the ledger's store fallback.
#[derive(Debug, Clone, Default)]
pub struct MockLedgerCache {
    entries: Entries,
    unavailable: Arc<AtomicBool>,
    writes: Arc<AtomicUsize>,
}

impl MockLedgerCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with a cache error until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Unexpired entry, read without going through the trait (for testing).
    ///
    /// # Errors
    ///
    /// Returns error if lock is poisoned.
    pub fn peek(&self, pair_id: &PairId) -> Result<Option<TicketAccount>> {
        Ok(lock(&self.entries)?
            .get(pair_id)
            .filter(|(_, expires_at)| *expires_at > Instant::now())
            .map(|(account, _)| account.clone()))
    }

    /// Number of successful `put` calls (for testing).
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_available(unavailable: &AtomicBool) -> Result<()> {
        if unavailable.load(Ordering::SeqCst) {
            return Err(LedgerError::CacheError("cache unavailable".to_string()));
        }
        Ok(())
    }
}

fn lock(entries: &Entries) -> Result<MutexGuard<'_, HashMap<PairId, (TicketAccount, Instant)>>> {
    entries
        .lock()
        .map_err(|_| LedgerError::CacheError("Mutex lock failed".to_string()))
}

impl LedgerCache for MockLedgerCache {
    fn get(&self, pair_id: &PairId) -> impl Future<Output = Result<Option<TicketAccount>>> + Send {
        let entries = Arc::clone(&self.entries);
        let unavailable = Arc::clone(&self.unavailable);
        let pair_id = pair_id.clone();

        async move {
            Self::check_available(&unavailable)?;
            let mut guard = lock(&entries)?;

            let expired = guard
                .get(&pair_id)
                .is_some_and(|(_, expires_at)| *expires_at <= Instant::now());
            if expired {
                guard.remove(&pair_id);
                return Ok(None);
            }

            Ok(guard.get(&pair_id).map(|(account, _)| account.clone()))
        }
    }

    fn put(&self, account: &TicketAccount, ttl: Duration) -> impl Future<Output = Result<()>> + Send {
        let entries = Arc::clone(&self.entries);
        let unavailable = Arc::clone(&self.unavailable);
        let writes = Arc::clone(&self.writes);
        let account = account.clone();

        async move {
            Self::check_available(&unavailable)?;
            lock(&entries)?.insert(account.pair_id.clone(), (account, Instant::now() + ttl));
            writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn invalidate(&self, pair_id: &PairId) -> impl Future<Output = Result<()>> + Send {
        let entries = Arc::clone(&self.entries);
        let unavailable = Arc::clone(&self.unavailable);
        let pair_id = pair_id.clone();

        async move {
            Self::check_available(&unavailable)?;
            lock(&entries)?.remove(&pair_id);
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_entries_expire() {
        let cache = MockLedgerCache::new();
        let account = TicketAccount::new(PairId::new("p1"), 2, false, Utc::now());

        cache.put(&account, Duration::ZERO).await.unwrap();
        assert!(cache.get(&account.pair_id).await.unwrap().is_none());

        cache.put(&account, Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get(&account.pair_id).await.unwrap(), Some(account));
        assert_eq!(cache.write_count(), 2);
    }
}
