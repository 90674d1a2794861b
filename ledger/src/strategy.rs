//! Cache consistency strategies.
//!
//! The ledger never decides on its own what to do with the cache. After every
//! store interaction it reports a [`CacheEvent`] and applies the
//! [`CacheAction`] the configured strategy returns. Store writes always
//! happen first; the cache only ever follows a committed value.

use std::fmt::Debug;

/// Something that happened to a ticket account in the durable store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEvent {
    /// A read missed the cache and was served from the store.
    ReadMiss,
    /// This service committed a consume or earn.
    LocalCommit,
    /// An externally originated write was applied to the store.
    ExternalWrite,
    /// The daily reset cleared the account's earn flag.
    DailyReset,
}

/// What the ledger should do with the cached copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheAction {
    /// Store the value just read.
    Populate,
    /// Replace the cached value with the committed one.
    Overwrite,
    /// Remove the cached value.
    Invalidate,
    /// Leave the cache alone.
    Skip,
}

impl CacheAction {
    /// Whether the action writes the account into the cache.
    #[must_use]
    pub const fn writes(self) -> bool {
        matches!(self, Self::Populate | Self::Overwrite)
    }
}

/// Decides how the cache follows the store.
pub trait CacheStrategy: Send + Sync + Debug {
    /// Short name for logs and configuration.
    fn name(&self) -> &'static str;

    /// Action to take after `event`.
    fn plan(&self, event: CacheEvent) -> CacheAction;
}

/// This service owns the cache.
///
/// Reads populate it, every commit overwrites it, and the daily reset
/// invalidates it.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheAside;

impl CacheStrategy for CacheAside {
    fn name(&self) -> &'static str {
        "cache-aside"
    }

    fn plan(&self, event: CacheEvent) -> CacheAction {
        match event {
            CacheEvent::ReadMiss => CacheAction::Populate,
            CacheEvent::LocalCommit | CacheEvent::ExternalWrite => CacheAction::Overwrite,
            CacheEvent::DailyReset => CacheAction::Invalidate,
        }
    }
}

/// An upstream gateway owns the cache and writes it before the store.
///
/// This service never populates the cache. Its own commits and the reset
/// invalidate the gateway's copy; external writes already came from the
/// gateway's cached value and are left alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteThrough;

impl CacheStrategy for WriteThrough {
    fn name(&self) -> &'static str {
        "write-through"
    }

    fn plan(&self, event: CacheEvent) -> CacheAction {
        match event {
            CacheEvent::ReadMiss | CacheEvent::ExternalWrite => CacheAction::Skip,
            CacheEvent::LocalCommit | CacheEvent::DailyReset => CacheAction::Invalidate,
        }
    }
}

/// Look up a strategy by its [`CacheStrategy::name`].
#[must_use]
pub fn by_name(name: &str) -> Option<std::sync::Arc<dyn CacheStrategy>> {
    match name.trim().to_lowercase().as_str() {
        "cache-aside" | "cache_aside" => Some(std::sync::Arc::new(CacheAside)),
        "write-through" | "write_through" => Some(std::sync::Arc::new(WriteThrough)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EVENTS: [CacheEvent; 4] = [
        CacheEvent::ReadMiss,
        CacheEvent::LocalCommit,
        CacheEvent::ExternalWrite,
        CacheEvent::DailyReset,
    ];

    #[test]
    fn test_write_through_never_writes_the_cache() {
        assert!(EVENTS.iter().all(|event| !WriteThrough.plan(*event).writes()));
    }

    #[test]
    fn test_both_strategies_drop_cache_on_reset() {
        assert_eq!(CacheAside.plan(CacheEvent::DailyReset), CacheAction::Invalidate);
        assert_eq!(WriteThrough.plan(CacheEvent::DailyReset), CacheAction::Invalidate);
    }

    #[test]
    fn test_cache_aside_follows_commits() {
        assert_eq!(CacheAside.plan(CacheEvent::ReadMiss), CacheAction::Populate);
        assert_eq!(CacheAside.plan(CacheEvent::LocalCommit), CacheAction::Overwrite);
        assert_eq!(CacheAside.plan(CacheEvent::ExternalWrite), CacheAction::Overwrite);
    }

    #[test]
    fn test_lookup_by_name() {
        assert_eq!(by_name("Write_Through").map(|s| s.name()), Some("write-through"));
        assert_eq!(by_name("cache-aside").map(|s| s.name()), Some("cache-aside"));
        assert!(by_name("write-behind").is_none());
    }
}
