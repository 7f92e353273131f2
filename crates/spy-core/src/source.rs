//! Seams through which the monitor reaches the operating system.
//!
//! The monitor never touches files, processes or clocks directly; it is
//! handed a [`TimeInStateSource`] and a [`Clock`]. Concrete implementations
//! live in `spy-data`.

use std::io::BufRead;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Default location of the kernel's cpufreq residency table for CPU 0.
pub const TIME_IN_STATE_PATH: &str = "/sys/devices/system/cpu/cpu0/cpufreq/stats/time_in_state";

/// Directory holding one `cpuN` entry per logical CPU.
pub const CPU_SYSFS_ROOT: &str = "/sys/devices/system/cpu";

/// Path of the time-in-state table for `cpu` under `root`.
pub fn time_in_state_path(root: &Path, cpu: u32) -> PathBuf {
    root.join(format!("cpu{}", cpu))
        .join("cpufreq")
        .join("stats")
        .join("time_in_state")
}

/// A producer of the kernel's time-in-state text, one
/// `"<frequency_khz> <duration_ticks>"` pair per line.
pub trait TimeInStateSource: Send + Sync {
    /// Open a fresh stream over the current table.
    ///
    /// Fails with [`SpyError::SourceUnavailable`](crate::error::SpyError)
    /// when the table cannot be reached.
    fn open(&self) -> Result<Box<dyn BufRead + Send>>;

    /// Short description for logs and error messages.
    fn describe(&self) -> String;
}

/// Monotonic counters used to estimate deep-sleep time and the boot epoch.
pub trait Clock: Send + Sync {
    /// Milliseconds since boot, including time spent suspended.
    fn elapsed_realtime_ms(&self) -> u64;

    /// Milliseconds since boot, excluding time spent suspended.
    fn awake_uptime_ms(&self) -> u64;

    /// Wall-clock milliseconds since the Unix epoch.
    fn wall_clock_ms(&self) -> i64;
}

impl<T: TimeInStateSource + ?Sized> TimeInStateSource for Box<T> {
    fn open(&self) -> Result<Box<dyn BufRead + Send>> {
        (**self).open()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

impl<T: Clock + ?Sized> Clock for Box<T> {
    fn elapsed_realtime_ms(&self) -> u64 {
        (**self).elapsed_realtime_ms()
    }

    fn awake_uptime_ms(&self) -> u64 {
        (**self).awake_uptime_ms()
    }

    fn wall_clock_ms(&self) -> i64 {
        (**self).wall_clock_ms()
    }
}
