//! Background refresh for the state monitor.
//!
//! Reading the time-in-state table may block (a slow sysfs read, or an `su`
//! round-trip). [`RefreshWorker`] runs the read on tokio's blocking pool and
//! hands back an adjusted [`MonitorSnapshot`] when it completes. The monitor
//! sits behind a single mutex; every mutation replaces whole structures, so
//! the lock is only held for the duration of one operation.
//!
//! While a refresh is in flight further refresh requests are skipped rather
//! than queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use spy_core::error::{Result, SpyError};
use spy_core::models::MonitorSnapshot;
use spy_core::monitor::StateMonitor;

// ── Public types ──────────────────────────────────────────────────────────────

/// Result of a refresh request.
#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    /// The table was re-read; the adjusted view is attached.
    Completed(MonitorSnapshot),
    /// Another refresh was already running; nothing was done.
    Skipped,
}

// ── RefreshWorker ─────────────────────────────────────────────────────────────

/// Shared handle that runs monitor operations off the async executor.
///
/// Cloning is cheap; all clones drive the same monitor.
#[derive(Clone)]
pub struct RefreshWorker {
    monitor: Arc<Mutex<StateMonitor>>,
    updating: Arc<AtomicBool>,
}

impl RefreshWorker {
    pub fn new(monitor: StateMonitor) -> Self {
        Self {
            monitor: Arc::new(Mutex::new(monitor)),
            updating: Arc::new(AtomicBool::new(false)),
        }
    }

    /// `true` while a refresh is running.
    pub fn is_updating(&self) -> bool {
        self.updating.load(Ordering::Acquire)
    }

    /// Re-read the table on the blocking pool and return the adjusted view.
    ///
    /// Returns [`RefreshOutcome::Skipped`] if a refresh is already running.
    pub async fn refresh(&self) -> Result<RefreshOutcome> {
        if self.updating.swap(true, Ordering::AcqRel) {
            tracing::debug!("refresh already in flight; skipping");
            return Ok(RefreshOutcome::Skipped);
        }
        let _updating = UpdatingFlag(self.updating.clone());

        tracing::debug!("starting data update");
        let snapshot = self
            .run_blocking(|monitor| {
                monitor.refresh()?;
                Ok(monitor.snapshot())
            })
            .await?;
        tracing::debug!(states = snapshot.states.len(), "finished data update");

        Ok(RefreshOutcome::Completed(snapshot))
    }

    /// Mark offsets on the blocking pool and return the (all-zero) view.
    pub async fn mark_offsets(&self) -> Result<MonitorSnapshot> {
        self.run_blocking(|monitor| {
            monitor.mark_offsets()?;
            Ok(monitor.snapshot())
        })
        .await
    }

    /// Run `f` with exclusive access to the monitor on the blocking pool.
    ///
    /// The lock may be held by an in-flight refresh (a slow `su` read), so
    /// even quick work never waits for it on an executor thread.
    pub async fn with_monitor<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut StateMonitor) -> R + Send + 'static,
    {
        self.run_blocking(move |monitor| Ok(f(monitor))).await
    }

    async fn run_blocking<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut StateMonitor) -> Result<R> + Send + 'static,
    {
        let monitor = Arc::clone(&self.monitor);
        tokio::task::spawn_blocking(move || f(&mut lock(&monitor)))
            .await
            .map_err(|e| SpyError::Other(anyhow::Error::new(e).context("monitor task failed")))?
    }
}

/// Lock the monitor, recovering the guard if a previous holder panicked.
/// Mutations replace whole structures, so a poisoned monitor is still
/// consistent.
fn lock(monitor: &Mutex<StateMonitor>) -> MutexGuard<'_, StateMonitor> {
    monitor.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Clears the in-flight flag when the refresh finishes or is dropped.
struct UpdatingFlag(Arc<AtomicBool>);

impl Drop for UpdatingFlag {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use spy_core::source::{Clock, TimeInStateSource};
    use std::io::{BufRead, Cursor};
    use std::time::Duration;

    struct StaticSource(&'static str);

    impl TimeInStateSource for StaticSource {
        fn open(&self) -> Result<Box<dyn BufRead + Send>> {
            Ok(Box::new(Cursor::new(self.0.as_bytes())))
        }
        fn describe(&self) -> String {
            "static".to_string()
        }
    }

    /// Blocks every read for a fixed time.
    struct SlowSource(Duration);

    impl TimeInStateSource for SlowSource {
        fn open(&self) -> Result<Box<dyn BufRead + Send>> {
            std::thread::sleep(self.0);
            Ok(Box::new(Cursor::new(&b"100 5\n"[..])))
        }
        fn describe(&self) -> String {
            "slow".to_string()
        }
    }

    struct FixedClock;

    impl Clock for FixedClock {
        fn elapsed_realtime_ms(&self) -> u64 {
            6000
        }
        fn awake_uptime_ms(&self) -> u64 {
            5000
        }
        fn wall_clock_ms(&self) -> i64 {
            1_000_000
        }
    }

    fn worker(source: impl TimeInStateSource + 'static) -> RefreshWorker {
        RefreshWorker::new(StateMonitor::new(Box::new(source), Box::new(FixedClock)))
    }

    #[tokio::test]
    async fn test_refresh_returns_snapshot() {
        let worker = worker(StaticSource("1000000 200\n1300000 50\n"));
        let outcome = worker.refresh().await.unwrap();
        let RefreshOutcome::Completed(snapshot) = outcome else {
            panic!("expected a completed refresh");
        };
        let freqs: Vec<u32> = snapshot.states.iter().map(|s| s.frequency_khz).collect();
        assert_eq!(freqs, vec![1_300_000, 1_000_000, 0]);
        assert_eq!(snapshot.total_ticks, 350);
        assert!(!worker.is_updating());
    }

    #[tokio::test]
    async fn test_refresh_parse_error_propagates() {
        let worker = worker(StaticSource("abc\n"));
        let err = worker.refresh().await.unwrap_err();
        assert!(matches!(err, SpyError::Parse { .. }));
        assert!(!worker.is_updating());
    }

    #[tokio::test]
    async fn test_mark_offsets_zeroes_view() {
        let worker = worker(StaticSource("100 50\n"));
        let snapshot = worker.mark_offsets().await.unwrap();
        assert_eq!(snapshot.total_ticks, 0);
        assert!(snapshot.offsets_active);
        assert_eq!(worker.with_monitor(|m| m.offsets().len()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_with_monitor_clear() {
        let worker = worker(StaticSource("100 50\n"));
        worker.mark_offsets().await.unwrap();
        worker.with_monitor(|m| m.clear_offsets()).await.unwrap();
        assert!(worker.with_monitor(|m| m.offsets().is_empty()).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_overlapping_refresh_is_skipped() {
        let worker = worker(SlowSource(Duration::from_millis(200)));
        let first = {
            let worker = worker.clone();
            tokio::spawn(async move { worker.refresh().await })
        };

        // Let the first refresh claim the flag.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(worker.is_updating());
        let second = worker.refresh().await.unwrap();
        assert!(matches!(second, RefreshOutcome::Skipped));

        let first = first.await.unwrap().unwrap();
        assert!(matches!(first, RefreshOutcome::Completed(_)));
        assert!(!worker.is_updating());
    }

    // Single executor thread: a blocking lock taken on it would stall the timer.
    #[tokio::test]
    async fn test_executor_stays_responsive_during_slow_refresh() {
        let worker = worker(SlowSource(Duration::from_millis(300)));
        let refresh = {
            let worker = worker.clone();
            tokio::spawn(async move { worker.refresh().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Waiting on the monitor lock must not block the task that awaits it.
        let pending = {
            let worker = worker.clone();
            tokio::spawn(async move { worker.with_monitor(|m| m.offsets().len()).await })
        };
        let ticked = tokio::time::timeout(
            Duration::from_millis(100),
            tokio::time::sleep(Duration::from_millis(10)),
        )
        .await;
        assert!(ticked.is_ok(), "timer starved while the monitor was locked");

        assert_eq!(pending.await.unwrap().unwrap(), 0);
        refresh.await.unwrap().unwrap();
    }
}
