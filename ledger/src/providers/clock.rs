//! Time source.

use chrono::{DateTime, Utc};

/// Source of the current time.
///
/// Injected into the engine, the ledger and the sweep so tests can pin or
/// advance time. Production code uses [`SystemClock`].
pub trait Clock: Send + Sync {
    /// Current instant in UTC.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
