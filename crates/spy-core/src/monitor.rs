//! Per-frequency residency tracking with user-settable offsets.
//!
//! [`StateMonitor`] owns the most recent raw table read from a
//! [`TimeInStateSource`] and an [`OffsetMap`] of baselines. Readers get
//! offset-adjusted values; "resetting" the counters records the current raw
//! values as the new baselines instead of touching the kernel.
//!
//! Offsets only make sense within the boot they were taken in. Two checks
//! enforce that: a persisted boot epoch that no longer matches the current
//! boot discards offsets at load time, and any raw counter found below its
//! offset discards the whole map at read time.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::models::{FrequencyState, MonitorSnapshot, OffsetInvalidation, StateSet};
use crate::offsets::OffsetMap;
use crate::parser::parse_time_in_state;
use crate::source::{Clock, TimeInStateSource};
use crate::time_utils::{self, BOOT_EPOCH_TOLERANCE_MS, MS_PER_TICK};

/// Offsets in the shape handed to the state store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedOffsets {
    /// [`OffsetMap::encode`] output.
    pub encoded: String,
    /// Boot epoch (ms since the Unix epoch) at serialization time.
    pub boot_epoch_ms: i64,
}

/// Reads the time-in-state table and applies offsets to it.
///
/// Not internally synchronised: every mutating call takes `&mut self`, and
/// callers that refresh from a worker thread wrap the monitor in a single
/// mutex.
pub struct StateMonitor {
    source: Box<dyn TimeInStateSource>,
    clock: Box<dyn Clock>,
    /// Last successfully read table, deep sleep included.
    states: StateSet,
    offsets: OffsetMap,
    notice: Option<OffsetInvalidation>,
    ms_per_tick: u64,
    boot_tolerance_ms: i64,
}

impl StateMonitor {
    /// Create a monitor with an empty table and no offsets.
    pub fn new(source: Box<dyn TimeInStateSource>, clock: Box<dyn Clock>) -> Self {
        Self {
            source,
            clock,
            states: StateSet::default(),
            offsets: OffsetMap::new(),
            notice: None,
            ms_per_tick: MS_PER_TICK,
            boot_tolerance_ms: BOOT_EPOCH_TOLERANCE_MS,
        }
    }

    /// Override the clock-to-tick divisor (milliseconds per tick).
    pub fn with_ms_per_tick(mut self, ms_per_tick: u64) -> Self {
        self.ms_per_tick = ms_per_tick.max(1);
        self
    }

    /// Override how far boot-epoch estimates may drift within one boot.
    pub fn with_boot_tolerance_ms(mut self, tolerance_ms: i64) -> Self {
        self.boot_tolerance_ms = tolerance_ms;
        self
    }

    // ── Reading ───────────────────────────────────────────────────────────

    /// Re-read the source, append the deep-sleep bucket, and replace the raw
    /// table.
    ///
    /// On failure the previous table is kept. Offsets are never touched.
    pub fn refresh(&mut self) -> Result<&StateSet> {
        let reader = self.source.open()?;
        let mut parsed = parse_time_in_state(reader)?;

        let sleep_ticks = time_utils::deep_sleep_ticks(self.clock.as_ref(), self.ms_per_tick);
        parsed.push(FrequencyState::deep_sleep(sleep_ticks));

        self.states = StateSet::from_unsorted(parsed);
        debug!(
            source = %self.source.describe(),
            states = self.states.len(),
            sleep_ticks,
            "time-in-state refreshed"
        );
        Ok(&self.states)
    }

    /// The last raw table, without offsets.
    pub fn raw_states(&self) -> &StateSet {
        &self.states
    }

    /// The raw table with offsets subtracted.
    ///
    /// If any offset exceeds its raw duration the counters have restarted
    /// since the offsets were taken: every offset is dropped, a
    /// [`OffsetInvalidation::CounterRollback`] notice is recorded, and the
    /// raw table is returned unchanged.
    pub fn adjusted_states(&mut self) -> StateSet {
        let mut adjusted = Vec::with_capacity(self.states.len());

        for state in &self.states {
            let duration = match self.offsets.get(state.frequency_khz) {
                None => state.duration_ticks,
                Some(offset) if offset <= state.duration_ticks => state.duration_ticks - offset,
                Some(offset) => {
                    let notice = OffsetInvalidation::CounterRollback {
                        frequency_khz: state.frequency_khz,
                        offset_ticks: offset,
                        duration_ticks: state.duration_ticks,
                    };
                    warn!(
                        frequency_khz = state.frequency_khz,
                        offset_ticks = offset,
                        duration_ticks = state.duration_ticks,
                        "offset exceeds counter; discarding all offsets"
                    );
                    self.offsets.clear();
                    self.notice = Some(notice);
                    return self.states.clone();
                }
            };
            adjusted.push(FrequencyState::new(state.frequency_khz, duration));
        }

        StateSet::from_unsorted(adjusted)
    }

    /// Total adjusted time across all states.
    ///
    /// Computed from [`adjusted_states`](Self::adjusted_states), so the
    /// rollback check applies here too and offsets for frequencies absent
    /// from the current table do not count.
    pub fn total_adjusted_time(&mut self) -> u64 {
        self.adjusted_states().total_ticks()
    }

    /// Adjusted table and total packaged for a renderer. Drains any pending
    /// notice into the snapshot.
    pub fn snapshot(&mut self) -> MonitorSnapshot {
        let states = self.adjusted_states();
        MonitorSnapshot {
            total_ticks: states.total_ticks(),
            states,
            offsets_active: !self.offsets.is_empty(),
            notice: self.notice.take(),
            taken_at: Utc::now(),
        }
    }

    // ── Offsets ───────────────────────────────────────────────────────────

    /// Refresh, then make the fresh raw values the new baselines so every
    /// adjusted duration reads zero. Replaces, never merges. On refresh
    /// failure the existing offsets stay in place.
    pub fn mark_offsets(&mut self) -> Result<()> {
        self.refresh()?;
        self.offsets = OffsetMap::from_states(&self.states);
        info!(entries = self.offsets.len(), "offsets marked");
        Ok(())
    }

    /// Drop every offset so raw counters show through.
    pub fn clear_offsets(&mut self) {
        self.offsets.clear();
        info!("offsets cleared");
    }

    pub fn offsets(&self) -> &OffsetMap {
        &self.offsets
    }

    /// Load persisted offsets.
    ///
    /// When `saved_boot_epoch_ms` is given and is further than the tolerance
    /// window from the current boot epoch, the offsets belong to an earlier
    /// boot: they are discarded and a
    /// [`OffsetInvalidation::StaleBootEpoch`] notice is recorded. A blob that
    /// does not decode leaves the map empty and returns the error.
    pub fn load_offsets(&mut self, encoded: &str, saved_boot_epoch_ms: Option<i64>) -> Result<()> {
        self.offsets.clear();
        let decoded = OffsetMap::decode(encoded)?;

        if let Some(saved) = saved_boot_epoch_ms {
            let current = self.boot_epoch_ms();
            if !time_utils::same_boot(saved, current, self.boot_tolerance_ms) {
                if !decoded.is_empty() {
                    warn!(
                        saved_boot_epoch_ms = saved,
                        current_boot_epoch_ms = current,
                        "persisted offsets predate current boot; discarding"
                    );
                    self.notice = Some(OffsetInvalidation::StaleBootEpoch {
                        saved_boot_epoch_ms: saved,
                        current_boot_epoch_ms: current,
                    });
                }
                return Ok(());
            }
        }

        debug!(entries = decoded.len(), "offsets loaded");
        self.offsets = decoded;
        Ok(())
    }

    /// Offsets plus the current boot epoch, ready for the state store.
    pub fn serialize_offsets(&self) -> PersistedOffsets {
        PersistedOffsets {
            encoded: self.offsets.encode(),
            boot_epoch_ms: self.boot_epoch_ms(),
        }
    }

    /// Current estimate of the boot time, ms since the Unix epoch.
    pub fn boot_epoch_ms(&self) -> i64 {
        time_utils::boot_epoch_ms(self.clock.as_ref())
    }

    /// Take the most recent self-healing notice, if any.
    pub fn take_notice(&mut self) -> Option<OffsetInvalidation> {
        self.notice.take()
    }

    pub fn source_description(&self) -> String {
        self.source.describe()
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
