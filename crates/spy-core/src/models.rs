use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Frequency value reserved for the synthetic deep-sleep bucket.
pub const DEEP_SLEEP_FREQ_KHZ: u32 = 0;

/// Time spent at one CPU frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrequencyState {
    /// Clock frequency in kHz; `0` denotes deep sleep.
    pub frequency_khz: u32,
    /// Residency in ticks of 10 ms.
    pub duration_ticks: u64,
}

impl FrequencyState {
    pub fn new(frequency_khz: u32, duration_ticks: u64) -> Self {
        Self {
            frequency_khz,
            duration_ticks,
        }
    }

    /// The synthetic deep-sleep entry with the given duration.
    pub fn deep_sleep(duration_ticks: u64) -> Self {
        Self::new(DEEP_SLEEP_FREQ_KHZ, duration_ticks)
    }

    pub fn is_deep_sleep(&self) -> bool {
        self.frequency_khz == DEEP_SLEEP_FREQ_KHZ
    }

    /// Human-readable name: `"Deep Sleep"` or `"<MHz> MHz"`.
    pub fn label(&self) -> String {
        if self.is_deep_sleep() {
            "Deep Sleep".to_string()
        } else {
            format!("{} MHz", self.frequency_khz / 1000)
        }
    }
}

/// Ordering used by [`StateSet`]: highest frequency first.
fn descending_by_frequency(a: &FrequencyState, b: &FrequencyState) -> Ordering {
    b.frequency_khz.cmp(&a.frequency_khz)
}

/// An ordered, frequency-unique table of [`FrequencyState`]s, highest
/// frequency first (deep sleep last).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateSet {
    states: Vec<FrequencyState>,
}

impl StateSet {
    /// Build a set from entries in any order.
    ///
    /// Callers guarantee frequency uniqueness; the parser rejects duplicate
    /// frequencies before they reach this point.
    pub fn from_unsorted(mut states: Vec<FrequencyState>) -> Self {
        states.sort_by(descending_by_frequency);
        Self { states }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FrequencyState> {
        self.states.iter()
    }

    /// Look up the entry for `frequency_khz`.
    pub fn get(&self, frequency_khz: u32) -> Option<&FrequencyState> {
        self.states
            .iter()
            .find(|s| s.frequency_khz == frequency_khz)
    }

    /// Sum of every entry's duration, deep sleep included.
    pub fn total_ticks(&self) -> u64 {
        self.states.iter().map(|s| s.duration_ticks).sum()
    }

    /// Entries that have accumulated no time.
    pub fn unused(&self) -> impl Iterator<Item = &FrequencyState> {
        self.states.iter().filter(|s| s.duration_ticks == 0)
    }
}

impl<'a> IntoIterator for &'a StateSet {
    type Item = &'a FrequencyState;
    type IntoIter = std::slice::Iter<'a, FrequencyState>;

    fn into_iter(self) -> Self::IntoIter {
        self.states.iter()
    }
}

/// Why offsets were thrown away without the user asking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OffsetInvalidation {
    /// A raw counter fell below its offset, so the device rebooted since the
    /// offsets were taken.
    CounterRollback {
        frequency_khz: u32,
        offset_ticks: u64,
        duration_ticks: u64,
    },
    /// The persisted boot epoch does not match the current boot.
    StaleBootEpoch {
        saved_boot_epoch_ms: i64,
        current_boot_epoch_ms: i64,
    },
}

impl std::fmt::Display for OffsetInvalidation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OffsetInvalidation::CounterRollback { frequency_khz, .. } => write!(
                f,
                "counters for {} kHz went backwards; offsets were reset",
                frequency_khz
            ),
            OffsetInvalidation::StaleBootEpoch { .. } => {
                write!(f, "device rebooted since offsets were saved; offsets were reset")
            }
        }
    }
}

/// Offset-adjusted view handed to renderers after a refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSnapshot {
    /// Adjusted states, highest frequency first.
    pub states: StateSet,
    /// Sum of the adjusted durations.
    pub total_ticks: u64,
    /// Whether any offsets are currently applied.
    pub offsets_active: bool,
    /// Set when this read discarded stale offsets.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<OffsetInvalidation>,
    /// When the snapshot was taken.
    pub taken_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_frequency_and_sleep() {
        assert_eq!(FrequencyState::new(1_300_000, 5).label(), "1300 MHz");
        assert_eq!(FrequencyState::new(245_760, 5).label(), "245 MHz");
        assert_eq!(FrequencyState::deep_sleep(7).label(), "Deep Sleep");
    }

    #[test]
    fn test_state_set_sorts_descending_with_sleep_last() {
        let set = StateSet::from_unsorted(vec![
            FrequencyState::new(1_000_000, 200),
            FrequencyState::deep_sleep(100),
            FrequencyState::new(1_300_000, 50),
        ]);
        let freqs: Vec<u32> = set.iter().map(|s| s.frequency_khz).collect();
        assert_eq!(freqs, vec![1_300_000, 1_000_000, 0]);
    }

    #[test]
    fn test_state_set_total_and_get() {
        let set = StateSet::from_unsorted(vec![
            FrequencyState::new(200, 300),
            FrequencyState::deep_sleep(1000),
        ]);
        assert_eq!(set.total_ticks(), 1300);
        assert_eq!(set.get(200).map(|s| s.duration_ticks), Some(300));
        assert!(set.get(999).is_none());
    }

    #[test]
    fn test_state_set_unused() {
        let set = StateSet::from_unsorted(vec![
            FrequencyState::new(400_000, 0),
            FrequencyState::new(800_000, 12),
            FrequencyState::deep_sleep(0),
        ]);
        let unused: Vec<String> = set.unused().map(|s| s.label()).collect();
        assert_eq!(unused, vec!["400 MHz", "Deep Sleep"]);
    }

    #[test]
    fn test_state_set_serializes_as_array() {
        let set = StateSet::from_unsorted(vec![FrequencyState::new(100, 5)]);
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"[{"frequency_khz":100,"duration_ticks":5}]"#);
    }

    #[test]
    fn test_invalidation_display() {
        let n = OffsetInvalidation::CounterRollback {
            frequency_khz: 100,
            offset_ticks: 500,
            duration_ticks: 300,
        };
        assert!(n.to_string().contains("100 kHz"));
        let n = OffsetInvalidation::StaleBootEpoch {
            saved_boot_epoch_ms: 0,
            current_boot_epoch_ms: 60_000,
        };
        assert!(n.to_string().contains("rebooted"));
    }
}
