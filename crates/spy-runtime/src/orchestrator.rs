//! Periodic watch loop.
//!
//! Drives a [`RefreshWorker`] from a tokio task, sending one [`WatchEvent`]
//! per completed refresh through an `mpsc` channel. The consumer prints and
//! persists; the loop itself never touches the terminal or the state file.

use std::time::Duration;

use spy_core::models::MonitorSnapshot;
use tokio::sync::mpsc;
use tokio::time;

use crate::worker::{RefreshOutcome, RefreshWorker};

// ── Public types ──────────────────────────────────────────────────────────────

/// One tick of the watch loop, as seen by the consumer.
#[derive(Debug, Clone)]
pub enum WatchEvent {
    /// A fresh adjusted view.
    Snapshot(MonitorSnapshot),
    /// The table could not be read (neither directly nor through `su`).
    Unavailable(String),
    /// The table was read but something else went wrong (parse error, I/O).
    Failed(String),
}

// ── WatchOrchestrator ─────────────────────────────────────────────────────────

/// Background watch coordinator.
pub struct WatchOrchestrator {
    interval: Duration,
    worker: RefreshWorker,
}

impl WatchOrchestrator {
    pub fn new(interval_secs: u64, worker: RefreshWorker) -> Self {
        Self {
            interval: Duration::from_secs(interval_secs.max(1)),
            worker,
        }
    }

    /// Spawn the loop. Returns the event receiver and a handle to stop it.
    pub fn start(self) -> (mpsc::Receiver<WatchEvent>, WatchHandle) {
        let (tx, rx) = mpsc::channel(16);

        let handle = tokio::spawn(async move {
            self.watch_loop(tx).await;
        });

        (rx, WatchHandle { handle })
    }

    // ── Private implementation ────────────────────────────────────────────

    /// Fetch immediately, then on every interval tick until the receiver
    /// is dropped.
    async fn watch_loop(self, tx: mpsc::Sender<WatchEvent>) {
        if !self.fetch_and_send(&tx).await {
            return;
        }

        let mut interval = time::interval(self.interval);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Skip);
        // First tick fires immediately; the initial fetch already ran.
        interval.tick().await;

        loop {
            interval.tick().await;

            if tx.is_closed() {
                tracing::debug!("watch channel closed; exiting loop");
                break;
            }

            if !self.fetch_and_send(&tx).await {
                break;
            }
        }
    }

    /// Refresh once and forward the result. Returns `false` once the
    /// receiver is gone.
    async fn fetch_and_send(&self, tx: &mpsc::Sender<WatchEvent>) -> bool {
        let event = match self.worker.refresh().await {
            Ok(RefreshOutcome::Completed(snapshot)) => WatchEvent::Snapshot(snapshot),
            Ok(RefreshOutcome::Skipped) => return true,
            Err(e) if e.is_unavailable() => {
                tracing::warn!(error = %e, "time-in-state unavailable");
                WatchEvent::Unavailable(e.to_string())
            }
            Err(e) => {
                tracing::warn!(error = %e, "refresh failed");
                WatchEvent::Failed(e.to_string())
            }
        };

        if let Err(e) = tx.send(event).await {
            tracing::debug!(error = %e, "watch receiver dropped");
            return false;
        }
        true
    }
}

// ── WatchHandle ───────────────────────────────────────────────────────────────

/// Handle to the background watch task.
pub struct WatchHandle {
    handle: tokio::task::JoinHandle<()>,
}

impl WatchHandle {
    /// Stop the loop immediately.
    pub fn abort(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
