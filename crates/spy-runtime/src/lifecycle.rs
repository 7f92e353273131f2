//! Monitor lifecycle: build from settings, restore offsets, persist them.
//!
//! The monitor itself knows nothing about files. This module is the owner
//! that loads the state file at start-up and writes it back after every
//! change to the offsets.

use std::path::Path;

use spy_core::error::Result;
use spy_core::models::MonitorSnapshot;
use spy_core::monitor::StateMonitor;
use spy_core::settings::Settings;
use spy_core::source::{Clock, TimeInStateSource};
use spy_core::store::PersistedState;
use spy_data::clock::SystemClock;
use spy_data::reader::source_from_settings;

/// Build a monitor for `settings` and load persisted offsets into it.
pub fn open_monitor(settings: &Settings) -> StateMonitor {
    let monitor = StateMonitor::new(source_from_settings(settings), Box::new(SystemClock::new()))
        .with_boot_tolerance_ms(settings.boot_tolerance_ms());
    restore_offsets(monitor, &settings.state_path())
}

/// Build a monitor from explicit parts and load persisted offsets from
/// `state_path`.
pub fn open_monitor_with(
    source: Box<dyn TimeInStateSource>,
    clock: Box<dyn Clock>,
    state_path: &Path,
) -> StateMonitor {
    restore_offsets(StateMonitor::new(source, clock), state_path)
}

fn restore_offsets(mut monitor: StateMonitor, state_path: &Path) -> StateMonitor {
    let saved = PersistedState::load_from(state_path);
    if let Err(e) = monitor.load_offsets(&saved.offsets, saved.boot_epoch_ms) {
        tracing::warn!(
            path = %state_path.display(),
            error = %e,
            "persisted offsets unreadable; starting without offsets"
        );
    }
    tracing::debug!(
        path = %state_path.display(),
        offsets = monitor.offsets().len(),
        "monitor opened"
    );
    monitor
}

/// Write the monitor's offsets and current boot epoch to `state_path`.
pub fn persist_offsets(monitor: &StateMonitor, state_path: &Path) -> Result<()> {
    let state = PersistedState::from(monitor.serialize_offsets());
    state.save_to(state_path)?;
    tracing::debug!(
        path = %state_path.display(),
        offsets = monitor.offsets().len(),
        "offsets persisted"
    );
    Ok(())
}

/// Persist the offsets when `snapshot` reports that they were invalidated,
/// so the discarded offsets do not come back on the next start. Returns
/// whether anything was written.
pub fn persist_if_invalidated(
    monitor: &StateMonitor,
    snapshot: &MonitorSnapshot,
    state_path: &Path,
) -> Result<bool> {
    let Some(notice) = &snapshot.notice else {
        return Ok(false);
    };
    tracing::info!(%notice, "offsets invalidated; updating state file");
    persist_offsets(monitor, state_path)?;
    Ok(true)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use spy_data::reader::FileSource;
    use tempfile::TempDir;

    struct FixedClock {
        wall: i64,
    }

    impl Clock for FixedClock {
        fn elapsed_realtime_ms(&self) -> u64 {
            6000
        }
        fn awake_uptime_ms(&self) -> u64 {
            5000
        }
        fn wall_clock_ms(&self) -> i64 {
            self.wall
        }
    }

    fn table(tmp: &TempDir, text: &str) -> Box<dyn TimeInStateSource> {
        let path = tmp.path().join("time_in_state");
        std::fs::write(&path, text).unwrap();
        Box::new(FileSource::new(path))
    }

    #[test]
    fn test_persist_then_reopen_same_boot() {
        let tmp = TempDir::new().unwrap();
        let state_path = tmp.path().join("state.json");

        let mut monitor = open_monitor_with(
            table(&tmp, "100 30\n"),
            Box::new(FixedClock { wall: 1_000_000 }),
            &state_path,
        );
        assert!(monitor.offsets().is_empty());
        monitor.mark_offsets().unwrap();
        persist_offsets(&monitor, &state_path).unwrap();

        let saved = PersistedState::load_from(&state_path);
        assert_eq!(saved.offsets, "0 100,100 30,");
        assert_eq!(saved.boot_epoch_ms, Some(994_000));

        // Ten seconds later, same boot.
        let reopened = open_monitor_with(
            table(&tmp, "100 30\n"),
            Box::new(FixedClock { wall: 1_010_000 }),
            &state_path,
        );
        assert_eq!(reopened.offsets().get(100), Some(30));
    }

    #[test]
    fn test_reopen_after_reboot_discards_offsets() {
        let tmp = TempDir::new().unwrap();
        let state_path = tmp.path().join("state.json");
        PersistedState {
            offsets: "100 30,".to_string(),
            boot_epoch_ms: Some(0),
        }
        .save_to(&state_path)
        .unwrap();

        let mut monitor = open_monitor_with(
            table(&tmp, "100 30\n"),
            Box::new(FixedClock { wall: 3_600_000 }),
            &state_path,
        );
        assert!(monitor.offsets().is_empty());
        assert!(monitor.take_notice().is_some());
    }

    #[test]
    fn test_unreadable_offsets_start_empty() {
        let tmp = TempDir::new().unwrap();
        let state_path = tmp.path().join("state.json");
        PersistedState {
            offsets: "garbage".to_string(),
            boot_epoch_ms: None,
        }
        .save_to(&state_path)
        .unwrap();

        let monitor = open_monitor_with(
            table(&tmp, "100 30\n"),
            Box::new(FixedClock { wall: 1_000_000 }),
            &state_path,
        );
        assert!(monitor.offsets().is_empty());
    }

    #[test]
    fn test_missing_state_file_starts_empty() {
        let tmp = TempDir::new().unwrap();
        let monitor = open_monitor_with(
            table(&tmp, "100 30\n"),
            Box::new(FixedClock { wall: 1_000_000 }),
            &tmp.path().join("absent.json"),
        );
        assert!(monitor.offsets().is_empty());
    }

    #[test]
    fn test_open_monitor_from_settings() {
        let tmp = TempDir::new().unwrap();
        let tis = tmp.path().join("time_in_state");
        std::fs::write(&tis, "100 30\n").unwrap();
        let state = tmp.path().join("state.json");

        let settings = Settings::load_from_args([
            "cpu-spy".to_string(),
            "--no-root-fallback".to_string(),
            "--source-path".to_string(),
            tis.display().to_string(),
            "--state-file".to_string(),
            state.display().to_string(),
        ]);
        let mut monitor = open_monitor(&settings);
        let raw = monitor.refresh().unwrap();
        assert_eq!(raw.get(100).map(|s| s.duration_ticks), Some(30));
        assert!(raw.get(0).is_some());
    }

    #[test]
    fn test_rollback_notice_persists_empty_offsets() {
        let tmp = TempDir::new().unwrap();
        let state_path = tmp.path().join("state.json");
        let tis = tmp.path().join("time_in_state");
        std::fs::write(&tis, "100 500\n").unwrap();

        let mut monitor = open_monitor_with(
            Box::new(FileSource::new(&tis)),
            Box::new(FixedClock { wall: 1_000_000 }),
            &state_path,
        );
        monitor.mark_offsets().unwrap();
        persist_offsets(&monitor, &state_path).unwrap();

        // Counters went backwards: the next read discards every offset.
        std::fs::write(&tis, "100 300\n").unwrap();
        monitor.refresh().unwrap();
        let snapshot = monitor.snapshot();
        assert!(snapshot.notice.is_some());

        assert!(persist_if_invalidated(&monitor, &snapshot, &state_path).unwrap());
        assert_eq!(PersistedState::load_from(&state_path).offsets, "");
    }

    #[test]
    fn test_no_notice_leaves_state_file_alone() {
        let tmp = TempDir::new().unwrap();
        let state_path = tmp.path().join("state.json");
        let mut monitor = open_monitor_with(
            table(&tmp, "100 30\n"),
            Box::new(FixedClock { wall: 1_000_000 }),
            &state_path,
        );
        monitor.refresh().unwrap();
        let snapshot = monitor.snapshot();

        assert!(!persist_if_invalidated(&monitor, &snapshot, &state_path).unwrap());
        assert!(!state_path.exists());
    }

    #[test]
    fn test_stale_boot_notice_persists_current_epoch() {
        let tmp = TempDir::new().unwrap();
        let state_path = tmp.path().join("state.json");
        PersistedState {
            offsets: "100 30,".to_string(),
            boot_epoch_ms: Some(0),
        }
        .save_to(&state_path)
        .unwrap();

        let mut monitor = open_monitor_with(
            table(&tmp, "100 30\n"),
            Box::new(FixedClock { wall: 3_600_000 }),
            &state_path,
        );
        monitor.refresh().unwrap();
        let snapshot = monitor.snapshot();

        assert!(persist_if_invalidated(&monitor, &snapshot, &state_path).unwrap());
        let saved = PersistedState::load_from(&state_path);
        assert_eq!(saved.offsets, "");
        assert_eq!(saved.boot_epoch_ms, Some(3_594_000));
    }
}
