//! Daily earn-slot reset sweep.
//!
//! Runs [`DailyReset::reset_daily`] once per calendar day at a configured
//! local time, then checks the result after a short delay.
//!
//! ```text
//! loop {
//!     sleep until next reset_at in time_zone   (or shutdown)
//!     reset_daily  (retried on transient failure)
//!     on failure: catch up with backoff until the following reset instant
//!     sleep verify_delay                       (or shutdown)
//!     verify_reset
//! }
//! ```
//!
//! A local date is recorded as done only once its reset succeeded.

use crate::config::ResetSchedule;
use crate::error::Result;
use crate::providers::Clock;
use crate::retry::retry_transient;
use crate::state::ResetReport;
use crate::ticket::DailyReset;
use chrono::{DateTime, Days, Duration as ChronoDuration, NaiveDate, TimeZone, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Floor for the pause between catch-up attempts after a failed reset.
const MIN_CATCH_UP_DELAY: Duration = Duration::from_secs(1);

/// How one scheduled reset ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScheduledRun {
    Completed,
    Abandoned,
    Shutdown,
}

/// Scheduled driver of the daily reset.
pub struct DailyResetSweep<T> {
    ledger: T,
    schedule: ResetSchedule,
    clock: Arc<dyn Clock>,
    last_run: Mutex<Option<NaiveDate>>,
}

impl<T> std::fmt::Debug for DailyResetSweep<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DailyResetSweep")
            .field("schedule", &self.schedule)
            .field("last_run", &self.last_run())
            .finish_non_exhaustive()
    }
}

impl<T> DailyResetSweep<T> {
    /// Local calendar date of the most recent scheduled run.
    #[must_use]
    pub fn last_run(&self) -> Option<NaiveDate> {
        self.last_run.lock().ok().and_then(|guard| *guard)
    }

    /// First reset instant strictly after `now`.
    ///
    /// A reset time that falls into a daylight-saving gap moves forward by
    /// one hour; an ambiguous one resolves to its earlier occurrence.
    #[must_use]
    pub fn next_run_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let tz = self.schedule.time_zone;
        let today = now.with_timezone(&tz).date_naive();

        for offset in 0..=2 {
            let Some(date) = today.checked_add_days(Days::new(offset)) else {
                break;
            };
            let local = date.and_time(self.schedule.reset_at);
            let candidate = tz
                .from_local_datetime(&local)
                .earliest()
                .or_else(|| tz.from_local_datetime(&(local + ChronoDuration::hours(1))).earliest());

            if let Some(candidate) = candidate {
                let candidate = candidate.with_timezone(&Utc);
                if candidate > now {
                    return candidate;
                }
            }
        }

        now + ChronoDuration::days(1)
    }

    /// Local calendar date of an instant in the schedule's time zone.
    #[must_use]
    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.schedule.time_zone).date_naive()
    }

    fn mark_run(&self, date: NaiveDate) {
        if let Ok(mut guard) = self.last_run.lock() {
            *guard = Some(date);
        }
    }
}

impl<T: DailyReset + 'static> DailyResetSweep<T> {
    /// Create a sweep over a ledger.
    #[must_use]
    pub fn new(ledger: T, schedule: ResetSchedule, clock: Arc<dyn Clock>) -> Self {
        Self {
            ledger,
            schedule,
            clock,
            last_run: Mutex::new(None),
        }
    }

    /// Reset now, retrying transient failures per the schedule's policy.
    ///
    /// # Errors
    ///
    /// Returns the last error once retries are exhausted.
    pub async fn run_once(&self) -> Result<usize> {
        let started = self.clock.now();
        info!(date = %self.local_date(started), "Daily ticket reset starting");

        match retry_transient(&self.schedule.retry, "daily_reset", || self.ledger.reset_daily()).await {
            Ok(reset) => {
                info!(reset, "Daily ticket reset finished");
                Ok(reset)
            }
            Err(err) => {
                error!(error = %err, "Daily ticket reset failed");
                Err(err)
            }
        }
    }

    /// Count accounts still flagged.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable.
    pub async fn verify(&self) -> Result<ResetReport> {
        self.ledger.verify_reset().await
    }

    /// Run the sweep in a background task until `shutdown` fires.
    ///
    /// A disabled schedule returns a task that finishes immediately.
    #[must_use]
    pub fn spawn(self: Arc<Self>, shutdown: broadcast::Receiver<()>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run(shutdown).await;
        })
    }

    async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        if !self.schedule.enabled {
            info!("Daily reset sweep disabled");
            return;
        }

        info!(
            time_zone = %self.schedule.time_zone,
            reset_at = %self.schedule.reset_at,
            "Daily reset sweep started"
        );

        let mut cursor = self.clock.now();
        loop {
            let now = self.clock.now();
            let next = self.next_run_after(cursor.max(now));
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            info!(next_run = %next, wait_secs = wait.as_secs(), "Next daily reset scheduled");

            tokio::select! {
                _ = shutdown.recv() => break,
                () = tokio::time::sleep(wait) => {}
            }
            cursor = next;

            let date = self.local_date(next);
            if self.last_run() == Some(date) {
                warn!(%date, "Daily reset already ran for this date, skipping");
                continue;
            }

            let window = (self.next_run_after(next) - next).to_std().unwrap_or(Duration::ZERO);
            match self.run_scheduled(date, window, &mut shutdown).await {
                ScheduledRun::Completed => {}
                ScheduledRun::Abandoned => continue,
                ScheduledRun::Shutdown => break,
            }

            tokio::select! {
                _ = shutdown.recv() => break,
                () = tokio::time::sleep(self.schedule.verify_delay) => {}
            }
            if let Err(err) = self.verify().await {
                warn!(error = %err, "Daily reset verification failed");
            }
        }

        info!("Daily reset sweep stopped");
    }

    /// Reset for `date`, catching up with backoff until `window` has elapsed.
    async fn run_scheduled(
        &self,
        date: NaiveDate,
        window: Duration,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> ScheduledRun {
        let deadline = tokio::time::Instant::now() + window;
        let mut attempt = 0;

        loop {
            match self.run_once().await {
                Ok(_) => {
                    self.mark_run(date);
                    return ScheduledRun::Completed;
                }
                Err(err) => {
                    let delay = self.schedule.retry.delay_for_attempt(attempt).max(MIN_CATCH_UP_DELAY);
                    if tokio::time::Instant::now() + delay >= deadline {
                        error!(%date, error = %err, "Daily reset abandoned for this date");
                        return ScheduledRun::Abandoned;
                    }

                    warn!(
                        %date,
                        attempt,
                        retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Daily reset failed, scheduling catch-up"
                    );
                    tokio::select! {
                        _ = shutdown.recv() => return ScheduledRun::Shutdown,
                        () = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::LedgerError;
    use crate::providers::SystemClock;
    use crate::retry::RetryPolicy;
    use chrono::NaiveTime;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct CountingReset {
        runs: AtomicUsize,
        failures_left: AtomicUsize,
    }

    impl DailyReset for CountingReset {
        async fn reset_daily(&self) -> Result<usize> {
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(LedgerError::StorageError("deadlock detected".into()));
            }
            Ok(self.runs.fetch_add(1, Ordering::SeqCst) + 1)
        }

        async fn verify_reset(&self) -> Result<ResetReport> {
            Ok(ResetReport::default())
        }
    }

    fn sweep(schedule: ResetSchedule) -> DailyResetSweep<Arc<CountingReset>> {
        DailyResetSweep::new(Arc::new(CountingReset::default()), schedule, Arc::new(SystemClock))
    }

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_next_run_uses_local_midnight() {
        let sweep = sweep(ResetSchedule::default());

        // 14:59 UTC is 23:59 in Seoul; midnight Seoul is 15:00 UTC.
        assert_eq!(sweep.next_run_after(utc("2024-03-01T14:59:00Z")), utc("2024-03-01T15:00:00Z"));
        // Exactly at the reset instant the next run is a day later.
        assert_eq!(sweep.next_run_after(utc("2024-03-01T15:00:00Z")), utc("2024-03-02T15:00:00Z"));
    }

    #[test]
    fn test_next_run_skips_dst_gap() {
        let schedule = ResetSchedule::new()
            .with_time_zone(chrono_tz::America::New_York)
            .with_reset_at(NaiveTime::from_hms_opt(2, 30, 0).unwrap());
        let sweep = sweep(schedule);

        // 2024-03-10 02:30 does not exist in New York; 03:30 EDT is 07:30 UTC.
        assert_eq!(sweep.next_run_after(utc("2024-03-10T05:00:00Z")), utc("2024-03-10T07:30:00Z"));
    }

    #[tokio::test]
    async fn test_run_once_retries_transient_failures() {
        let ledger = Arc::new(CountingReset::default());
        ledger.failures_left.store(2, Ordering::SeqCst);
        let schedule = ResetSchedule::new().with_retry(
            RetryPolicy::builder()
                .max_retries(3)
                .initial_delay(Duration::from_millis(1))
                .build(),
        );
        let sweep = DailyResetSweep::new(Arc::clone(&ledger), schedule, Arc::new(SystemClock));

        assert_eq!(sweep.run_once().await.unwrap(), 1);
        assert_eq!(ledger.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disabled_sweep_exits_immediately() {
        let sweep = Arc::new(sweep(ResetSchedule::new().with_enabled(false)));
        let (_tx, rx) = broadcast::channel(1);

        sweep.spawn(rx).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_reset_catches_up_the_same_day() {
        let ledger = Arc::new(CountingReset::default());
        ledger.failures_left.store(10, Ordering::SeqCst);
        let sweep = Arc::new(DailyResetSweep::new(
            Arc::clone(&ledger),
            ResetSchedule::new().with_retry(RetryPolicy::none()),
            Arc::new(SystemClock),
        ));
        let (tx, rx) = broadcast::channel(1);
        let handle = Arc::clone(&sweep).spawn(rx);

        tokio::time::sleep(Duration::from_secs(25 * 60 * 60)).await;
        assert_eq!(ledger.failures_left.load(Ordering::SeqCst), 0);
        assert!(ledger.runs.load(Ordering::SeqCst) >= 1);
        assert!(sweep.last_run().is_some());

        tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_sweep_runs_and_stops_on_shutdown() {
        let ledger = Arc::new(CountingReset::default());
        let sweep = Arc::new(DailyResetSweep::new(
            Arc::clone(&ledger),
            ResetSchedule::new().with_verify_delay(Duration::from_secs(1)),
            Arc::new(SystemClock),
        ));
        let (tx, rx) = broadcast::channel(1);
        let handle = Arc::clone(&sweep).spawn(rx);

        tokio::time::sleep(Duration::from_secs(25 * 60 * 60)).await;
        assert!(ledger.runs.load(Ordering::SeqCst) >= 1);
        assert!(sweep.last_run().is_some());

        tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
