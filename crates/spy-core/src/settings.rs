use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::source::{time_in_state_path, CPU_SYSFS_ROOT};
use crate::store::PersistedState;

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Per-frequency CPU residency with resettable counters
#[derive(Parser, Debug, Clone)]
#[command(
    name = "cpu-spy",
    about = "Per-frequency CPU residency with resettable counters",
    version
)]
pub struct Settings {
    #[command(subcommand)]
    pub command: Option<SpyCommand>,

    /// CPU whose time-in-state table is read
    #[arg(long, global = true, env = "CPUSPY_CPU", default_value = "0")]
    pub cpu: u32,

    /// Read this file instead of the cpufreq stats table for --cpu
    #[arg(long, global = true, env = "CPUSPY_SOURCE_PATH")]
    pub source_path: Option<PathBuf>,

    /// Where offsets are persisted between runs
    #[arg(long, global = true, env = "CPUSPY_STATE_FILE")]
    pub state_file: Option<PathBuf>,

    /// Do not retry through `su` when the table is not readable
    #[arg(long, global = true)]
    pub no_root_fallback: bool,

    /// `su` binary used for the privileged fallback
    #[arg(long, global = true, env = "CPUSPY_SU", default_value = "su")]
    pub su_path: String,

    /// Seconds to wait for the privileged fallback (1-120)
    #[arg(long, global = true, default_value = "10", value_parser = clap::value_parser!(u64).range(1..=120))]
    pub su_timeout_secs: u64,

    /// Allowed drift in seconds between boot-time estimates of the same boot
    #[arg(long, global = true, default_value = "30")]
    pub boot_tolerance_secs: u64,

    /// Print JSON instead of a table
    #[arg(long, global = true)]
    pub json: bool,

    /// Logging level
    #[arg(long, global = true, env = "CPUSPY_LOG", default_value = "WARNING", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR"])]
    pub log_level: String,

    /// Log file path
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

/// Actions on the residency counters.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum SpyCommand {
    /// Re-read the table and print raw counters since boot
    Refresh,
    /// Zero the counters by recording the current values as offsets
    Reset,
    /// Remove offsets so counters show time since boot again
    Restore,
    /// Print the offset-adjusted table and total (default)
    Query,
    /// Re-print the adjusted table periodically until interrupted
    Watch {
        /// Seconds between refreshes (1-3600)
        #[arg(long, default_value = "5", value_parser = clap::value_parser!(u64).range(1..=3600))]
        interval: u64,
    },
    /// List CPUs that expose a time-in-state table
    Sources,
}

// ── Settings impl ──────────────────────────────────────────────────────────────

impl Settings {
    /// Parse process arguments and apply derived values.
    pub fn load() -> Self {
        Self::load_from_args(std::env::args_os())
    }

    /// Same as [`load`](Self::load) but with an explicit argument list.
    pub fn load_from_args<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Self::resolve(Settings::parse_from(args))
    }

    /// `--debug` overrides the log level.
    fn resolve(mut settings: Settings) -> Settings {
        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }
        settings
    }

    /// The subcommand to run; `query` when none was given.
    pub fn action(&self) -> SpyCommand {
        self.command.clone().unwrap_or(SpyCommand::Query)
    }

    /// Time-in-state file to read.
    pub fn time_in_state_path(&self) -> PathBuf {
        self.source_path
            .clone()
            .unwrap_or_else(|| time_in_state_path(Path::new(CPU_SYSFS_ROOT), self.cpu))
    }

    /// State file holding persisted offsets.
    pub fn state_path(&self) -> PathBuf {
        self.state_file
            .clone()
            .unwrap_or_else(PersistedState::default_path)
    }

    pub fn boot_tolerance_ms(&self) -> i64 {
        i64::try_from(self.boot_tolerance_secs.saturating_mul(1000)).unwrap_or(i64::MAX)
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
