//! Time-in-state producers and CPU discovery for CPU Spy.
//!
//! The kernel table is normally world-readable, but some vendor kernels
//! restrict it. [`FileSource`] reads it directly, [`PrivilegedSource`] reads
//! it through `su`, and [`FallbackSource`] tries one then the other. All of
//! them hand the monitor the same line format.

use std::fs::File;
use std::io::{BufRead, Cursor, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant};

use regex::Regex;
use spy_core::error::{Result, SpyError};
use spy_core::settings::Settings;
use spy_core::source::{time_in_state_path, TimeInStateSource};
use tracing::{debug, warn};

/// How often a running `su` child is polled for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

// ── FileSource ────────────────────────────────────────────────────────────────

/// Reads the table straight from the filesystem.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TimeInStateSource for FileSource {
    /// Reads the whole table up front, so a read that fails part-way (for
    /// example `EACCES` on a restricted sysfs node) counts as unavailable
    /// and can fall back like a failed open.
    fn open(&self) -> Result<Box<dyn BufRead + Send>> {
        let unavailable = |e: std::io::Error| SpyError::SourceUnavailable {
            source_name: self.describe(),
            source: e,
        };
        let mut bytes = Vec::new();
        File::open(&self.path)
            .and_then(|mut file| file.read_to_end(&mut bytes))
            .map_err(unavailable)?;
        Ok(Box::new(Cursor::new(bytes)))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

// ── PrivilegedSource ──────────────────────────────────────────────────────────

/// Reads the table by running `cat` under `su`.
///
/// The child is killed if it has not exited within the timeout, which covers
/// `su` waiting on a permission prompt nobody answers.
#[derive(Debug, Clone)]
pub struct PrivilegedSource {
    path: PathBuf,
    su_path: String,
    timeout: Duration,
}

impl PrivilegedSource {
    pub fn new(path: impl Into<PathBuf>, su_path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            su_path: su_path.into(),
            timeout,
        }
    }

    /// Run the child and return its stdout.
    fn run(&self) -> Result<Vec<u8>> {
        let mut child = Command::new(&self.su_path)
            .arg("-c")
            .arg(format!("cat {}", shell_quote(&self.path.display().to_string())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| SpyError::SourceUnavailable {
                source_name: self.describe(),
                source: e,
            })?;

        // Drain the pipes on their own threads so a chatty child cannot block
        // on a full pipe while we poll for its exit.
        let stdout_reader = child.stdout.take().map(spawn_drain);
        let stderr_reader = child.stderr.take().map(spawn_drain);

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                warn!(
                    su = %self.su_path,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "privileged read timed out; killing"
                );
                let _ = child.kill();
                let _ = child.wait();
                return Err(SpyError::PrivilegedRead(format!(
                    "{} did not finish within {:?}",
                    self.su_path, self.timeout
                )));
            }
            thread::sleep(POLL_INTERVAL);
        };

        let stdout = join_drain(stdout_reader);
        let stderr = join_drain(stderr_reader);

        if !status.success() {
            return Err(SpyError::PrivilegedRead(format!(
                "{} exited with {}: {}",
                self.su_path,
                status,
                String::from_utf8_lossy(&stderr).trim()
            )));
        }

        debug!(bytes = stdout.len(), "privileged read complete");
        Ok(stdout)
    }
}

impl TimeInStateSource for PrivilegedSource {
    fn open(&self) -> Result<Box<dyn BufRead + Send>> {
        let bytes = self.run()?;
        Ok(Box::new(Cursor::new(bytes)))
    }

    fn describe(&self) -> String {
        format!("{} -c cat {}", self.su_path, self.path.display())
    }
}

/// Single-quote `arg` for `sh -c`, escaping embedded single quotes.
fn shell_quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', r"'\''"))
}

fn spawn_drain<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn join_drain(handle: Option<thread::JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

// ── FallbackSource ────────────────────────────────────────────────────────────

/// Tries `primary`, and only when it reports the table unreachable, tries
/// `fallback`. Parse-level problems are never retried.
pub struct FallbackSource {
    primary: Box<dyn TimeInStateSource>,
    fallback: Box<dyn TimeInStateSource>,
}

impl FallbackSource {
    pub fn new(primary: Box<dyn TimeInStateSource>, fallback: Box<dyn TimeInStateSource>) -> Self {
        Self { primary, fallback }
    }
}

impl TimeInStateSource for FallbackSource {
    fn open(&self) -> Result<Box<dyn BufRead + Send>> {
        match self.primary.open() {
            Ok(reader) => Ok(reader),
            Err(e) if e.is_unavailable() => {
                warn!(
                    primary = %self.primary.describe(),
                    fallback = %self.fallback.describe(),
                    error = %e,
                    "primary source unavailable; trying fallback"
                );
                self.fallback.open()
            }
            Err(e) => Err(e),
        }
    }

    fn describe(&self) -> String {
        format!(
            "{} (fallback: {})",
            self.primary.describe(),
            self.fallback.describe()
        )
    }
}

/// Build the source described by `settings`: a direct read of the configured
/// table, backed by `su` unless the fallback is disabled.
pub fn source_from_settings(settings: &Settings) -> Box<dyn TimeInStateSource> {
    let path = settings.time_in_state_path();
    let direct = FileSource::new(&path);
    if settings.no_root_fallback {
        return Box::new(direct);
    }

    let privileged = PrivilegedSource::new(
        path,
        settings.su_path.clone(),
        Duration::from_secs(settings.su_timeout_secs),
    );
    Box::new(FallbackSource::new(Box::new(direct), Box::new(privileged)))
}

// ── Discovery ─────────────────────────────────────────────────────────────────

/// A CPU that exposes a time-in-state table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuTable {
    /// Logical CPU number (`N` in `cpuN`).
    pub cpu: u32,
    /// Full path of its `time_in_state` file.
    pub path: PathBuf,
    /// Whether the current user can open it without `su`.
    pub readable: bool,
}

fn cpu_dir_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^cpu(\d+)$").expect("regex is valid"))
}

/// Find every `cpuN` directory directly under `root` (normally
/// `/sys/devices/system/cpu`) that has a time-in-state table, sorted by CPU
/// number.
pub fn find_time_in_state_tables(root: &Path) -> Vec<CpuTable> {
    if !root.exists() {
        warn!("CPU sysfs root does not exist: {}", root.display());
        return Vec::new();
    }

    let mut tables: Vec<CpuTable> = walkdir::WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().to_str()?.to_string();
            let cpu = cpu_dir_pattern()
                .captures(&name)?
                .get(1)?
                .as_str()
                .parse::<u32>()
                .ok()?;
            let path = time_in_state_path(root, cpu);
            if !path.exists() {
                return None;
            }
            let readable = File::open(&path).is_ok();
            Some(CpuTable {
                cpu,
                path,
                readable,
            })
        })
        .collect();

    tables.sort_by_key(|t| t.cpu);
    debug!("Found {} time-in-state tables under {}", tables.len(), root.display());
    tables
}

// ── Tests ─────────────────────────────────────────────────────────────────────
