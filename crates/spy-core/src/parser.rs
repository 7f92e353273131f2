//! Parser for the kernel's `time_in_state` table.

use std::collections::HashSet;
use std::io::BufRead;

use tracing::debug;

use crate::error::{Result, SpyError};
use crate::models::{FrequencyState, DEEP_SLEEP_FREQ_KHZ};

/// Parse every line of a time-in-state stream.
///
/// Each non-blank line must hold exactly two whitespace-separated unsigned
/// integers, `frequency_khz duration_ticks`. The whole parse fails on the
/// first malformed line so a truncated table never reaches the caller.
/// A frequency of `0` is reserved for the deep-sleep bucket and a frequency
/// may only appear once; both are rejected as malformed.
pub fn parse_time_in_state<R: BufRead>(mut reader: R) -> Result<Vec<FrequencyState>> {
    let mut states = Vec::new();
    let mut seen = HashSet::new();
    let mut buf = Vec::new();
    let mut line_number = 0;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        line_number += 1;

        // Non-UTF-8 bytes are a malformed line, not an I/O failure.
        let line = match std::str::from_utf8(&buf) {
            Ok(text) => text.trim_end_matches(&['\n', '\r'][..]).to_string(),
            Err(_) => {
                return Err(SpyError::Parse {
                    line_number,
                    line: String::from_utf8_lossy(&buf).trim_end().to_string(),
                })
            }
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let state = parse_line(trimmed).ok_or_else(|| SpyError::Parse {
            line_number,
            line: line.clone(),
        })?;

        if state.frequency_khz == DEEP_SLEEP_FREQ_KHZ || !seen.insert(state.frequency_khz) {
            return Err(SpyError::Parse { line_number, line });
        }

        states.push(state);
    }

    debug!(states = states.len(), "parsed time-in-state table");
    Ok(states)
}

fn parse_line(line: &str) -> Option<FrequencyState> {
    let mut tokens = line.split_whitespace();
    let freq = tokens.next()?.parse::<u32>().ok()?;
    let ticks = tokens.next()?.parse::<u64>().ok()?;
    if tokens.next().is_some() {
        return None;
    }
    Some(FrequencyState::new(freq, ticks))
}
