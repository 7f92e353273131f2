//! Offset baselines and their persisted string form.
//!
//! The encoded form is `"<freq> <ticks>,<freq> <ticks>,"`: one
//! space-separated pair per entry, each followed by a comma. Decoding
//! tolerates blank segments and spaces after commas.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpyError};
use crate::models::StateSet;

/// Frequency (kHz) → baseline ticks subtracted from raw readings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OffsetMap {
    entries: BTreeMap<u32, u64>,
}

impl OffsetMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Baselines equal to every duration in `states`.
    pub fn from_states(states: &StateSet) -> Self {
        Self {
            entries: states
                .iter()
                .map(|s| (s.frequency_khz, s.duration_ticks))
                .collect(),
        }
    }

    pub fn get(&self, frequency_khz: u32) -> Option<u64> {
        self.entries.get(&frequency_khz).copied()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encode to the persisted `"f d,f d,"` form. An empty map encodes to `""`.
    pub fn encode(&self) -> String {
        self.entries
            .iter()
            .map(|(freq, ticks)| format!("{} {},", freq, ticks))
            .collect()
    }

    /// Decode the persisted form produced by [`OffsetMap::encode`].
    pub fn decode(encoded: &str) -> Result<Self> {
        let mut entries = BTreeMap::new();

        for segment in encoded.split(',') {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }

            let mut parts = segment.split_whitespace();
            let pair = match (parts.next(), parts.next(), parts.next()) {
                (Some(freq), Some(ticks), None) => {
                    freq.parse::<u32>().ok().zip(ticks.parse::<u64>().ok())
                }
                _ => None,
            };

            let Some((freq, ticks)) = pair else {
                return Err(SpyError::OffsetDecode(format!("segment {:?}", segment)));
            };
            entries.insert(freq, ticks);
        }

        Ok(Self { entries })
    }
}

impl FromIterator<(u32, u64)> for OffsetMap {
    fn from_iter<I: IntoIterator<Item = (u32, u64)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
