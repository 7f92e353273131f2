use crate::models::StateSet;
use crate::time_utils::TICKS_PER_SECOND;

/// Format a tick count as `h:mm:ss`. Hours are not wrapped into days.
///
/// # Examples
///
/// ```
/// use spy_core::formatting::format_hms;
///
/// assert_eq!(format_hms(0), "0:00:00");
/// assert_eq!(format_hms(6_100), "0:01:01");
/// assert_eq!(format_hms(9_000_000), "25:00:00");
/// ```
pub fn format_hms(ticks: u64) -> String {
    let total_secs = ticks / TICKS_PER_SECOND;
    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;
    format!("{}:{:02}:{:02}", hours, mins, secs)
}

/// Format an integer with thousands separators.
///
/// # Examples
///
/// ```
/// use spy_core::formatting::format_count;
///
/// assert_eq!(format_count(5), "5");
/// assert_eq!(format_count(1_234_567), "1,234,567");
/// ```
pub fn format_count(value: u64) -> String {
    group_thousands(&value.to_string())
}

/// Whole-number percentage of `part` in `whole`, truncated toward zero.
///
/// Returns `0` if `whole` is zero to avoid division by zero.
///
/// # Examples
///
/// ```
/// use spy_core::formatting::percent_of;
///
/// assert_eq!(percent_of(1, 3), 33);
/// assert_eq!(percent_of(0, 0), 0);
/// ```
pub fn percent_of(part: u64, whole: u64) -> u32 {
    if whole == 0 {
        return 0;
    }
    ((u128::from(part) * 100) / u128::from(whole)).min(100) as u32
}

/// A fixed-width text bar filled to `percent`.
pub fn percent_bar(percent: u32, width: usize) -> String {
    let filled = (percent.min(100) as usize * width) / 100;
    let mut bar = String::with_capacity(width * 3);
    bar.push_str(&"█".repeat(filled));
    bar.push_str(&"░".repeat(width - filled));
    bar
}

/// Comma-separated labels of states with no recorded time, or `None` when
/// every state has been used.
///
/// # Examples
///
/// ```
/// use spy_core::formatting::unused_states_line;
/// use spy_core::models::{FrequencyState, StateSet};
///
/// let set = StateSet::from_unsorted(vec![
///     FrequencyState::new(245_000, 0),
///     FrequencyState::new(1_000_000, 5),
///     FrequencyState::deep_sleep(0),
/// ]);
/// assert_eq!(unused_states_line(&set).as_deref(), Some("245 MHz, Deep Sleep"));
/// ```
pub fn unused_states_line(states: &StateSet) -> Option<String> {
    let labels: Vec<String> = states.unused().map(|s| s.label()).collect();
    if labels.is_empty() {
        None
    } else {
        Some(labels.join(", "))
    }
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// Insert commas every three digits from the right of an integer string.
fn group_thousands(s: &str) -> String {
    if s.len() <= 3 {
        return s.to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    let remainder = chars.len() % 3;
    for (i, &c) in chars.iter().enumerate() {
        if i != 0 && (i % 3 == remainder) {
            result.push(',');
        }
        result.push(c);
    }
    result
}

// ── Tests ──────────────────────────────────────────────────────────────────────
