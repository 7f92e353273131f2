//! Text and JSON rendering of monitor snapshots.

use chrono::{DateTime, Local};
use serde_json::Value;
use spy_core::formatting::{format_count, format_hms, percent_bar, percent_of, unused_states_line};
use spy_core::models::{MonitorSnapshot, StateSet};
use spy_data::reader::CpuTable;

const BAR_WIDTH: usize = 20;

/// Which view of the counters a report shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    /// Counters since boot, offsets ignored.
    Raw,
    /// Counters since the last reset.
    Adjusted,
}

impl View {
    fn as_str(self) -> &'static str {
        match self {
            View::Raw => "raw",
            View::Adjusted => "adjusted",
        }
    }
}

/// Everything printed for one table.
#[derive(Debug, Clone)]
pub struct Report {
    pub view: View,
    pub source: String,
    pub snapshot: MonitorSnapshot,
    pub kernel: Option<String>,
    pub boot_time: Option<DateTime<Local>>,
}

// ── Text ──────────────────────────────────────────────────────────────────────

/// Render the full text report: header, table, totals, footer.
pub fn render_text(report: &Report) -> String {
    let snapshot = &report.snapshot;
    let mut out = String::new();

    if let Some(notice) = &snapshot.notice {
        out.push_str(&format!("Note: {notice}\n"));
    }

    let heading = match (report.view, snapshot.offsets_active) {
        (View::Raw, _) => "Time in state since boot",
        (View::Adjusted, true) => "Time in state since reset",
        (View::Adjusted, false) => "Time in state since boot (no reset)",
    };
    out.push_str(heading);
    out.push('\n');

    out.push_str(&render_states(&snapshot.states, snapshot.total_ticks));

    if let Some(kernel) = &report.kernel {
        out.push_str(&format!("Kernel: {kernel}\n"));
    }
    if let Some(boot) = &report.boot_time {
        out.push_str(&format!("Booted: {}\n", boot.format("%Y-%m-%d %H:%M:%S")));
    }
    out
}

/// Table rows for every state with recorded time, followed by the total and
/// the unused-state line. An empty set renders a warning instead.
pub fn render_states(states: &StateSet, total_ticks: u64) -> String {
    if states.is_empty() {
        return "Warning: no time-in-state data available\n".to_string();
    }

    let label_width = states
        .iter()
        .map(|s| s.label().len())
        .max()
        .unwrap_or(0)
        .max("State".len());

    let mut out = format!("{:<label_width$}  {:>10}  {:>4}\n", "State", "Time", "%");
    for state in states.iter().filter(|s| s.duration_ticks > 0) {
        let pct = percent_of(state.duration_ticks, total_ticks);
        out.push_str(&format!(
            "{:<label_width$}  {:>10}  {:>3}%  {}\n",
            state.label(),
            format_hms(state.duration_ticks),
            pct,
            percent_bar(pct, BAR_WIDTH),
        ));
    }

    out.push_str(&format!(
        "Total state time: {} ({} ticks)\n",
        format_hms(total_ticks),
        format_count(total_ticks)
    ));
    if let Some(unused) = unused_states_line(states) {
        out.push_str(&format!("Unused states: {unused}\n"));
    }
    out
}

/// One line per CPU that exposes a table; the selected CPU is starred.
pub fn render_sources(tables: &[CpuTable], selected_cpu: u32) -> String {
    if tables.is_empty() {
        return "No CPU exposes a time-in-state table\n".to_string();
    }
    tables
        .iter()
        .map(|t| {
            format!(
                "{} cpu{:<3} {}{}\n",
                if t.cpu == selected_cpu { '*' } else { ' ' },
                t.cpu,
                t.path.display(),
                if t.readable { "" } else { " (needs root)" },
            )
        })
        .collect()
}

// ── JSON ──────────────────────────────────────────────────────────────────────

/// JSON form of a report.
///
/// Shape: `{ view, source, states: [ { frequency_khz, label, duration_ticks,
/// duration, percent } ], total_ticks, total, offsets_active, notice?,
/// kernel?, boot_time?, taken_at }`.
pub fn report_to_json(report: &Report) -> Value {
    let snapshot = &report.snapshot;
    let states: Vec<Value> = snapshot
        .states
        .iter()
        .map(|s| {
            serde_json::json!({
                "frequency_khz": s.frequency_khz,
                "label": s.label(),
                "duration_ticks": s.duration_ticks,
                "duration": format_hms(s.duration_ticks),
                "percent": percent_of(s.duration_ticks, snapshot.total_ticks),
            })
        })
        .collect();

    let mut doc = serde_json::json!({
        "view": report.view.as_str(),
        "source": report.source,
        "states": states,
        "total_ticks": snapshot.total_ticks,
        "total": format_hms(snapshot.total_ticks),
        "offsets_active": snapshot.offsets_active,
        "taken_at": snapshot.taken_at.to_rfc3339(),
    });

    if let Value::Object(map) = &mut doc {
        if let Some(notice) = &snapshot.notice {
            map.insert(
                "notice".to_string(),
                serde_json::to_value(notice).unwrap_or(Value::Null),
            );
        }
        if let Some(kernel) = &report.kernel {
            map.insert("kernel".to_string(), Value::String(kernel.clone()));
        }
        if let Some(boot) = &report.boot_time {
            map.insert("boot_time".to_string(), Value::String(boot.to_rfc3339()));
        }
    }
    doc
}

/// JSON form of the CPU discovery listing.
pub fn sources_to_json(tables: &[CpuTable], selected_cpu: u32) -> Value {
    let cpus: Vec<Value> = tables
        .iter()
        .map(|t| {
            serde_json::json!({
                "cpu": t.cpu,
                "path": t.path.display().to_string(),
                "readable": t.readable,
                "selected": t.cpu == selected_cpu,
            })
        })
        .collect();
    serde_json::json!({ "cpus": cpus })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
