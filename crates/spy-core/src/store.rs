use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::Result;
use crate::monitor::PersistedOffsets;

// ── PersistedState ─────────────────────────────────────────────────────────────

/// Offsets and boot epoch saved to `~/.cpu-spy/state.json` between runs.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct PersistedState {
    /// Encoded offset map (`"<freq> <ticks>,..."`); empty when no offsets.
    #[serde(default)]
    pub offsets: String,
    /// Boot epoch (ms since the Unix epoch) the offsets were taken in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boot_epoch_ms: Option<i64>,
}

impl From<PersistedOffsets> for PersistedState {
    fn from(p: PersistedOffsets) -> Self {
        PersistedState {
            offsets: p.encoded,
            boot_epoch_ms: Some(p.boot_epoch_ms),
        }
    }
}

impl PersistedState {
    /// Return the default path to the state file.
    /// Uses `~/.cpu-spy/state.json`.
    pub fn default_path() -> PathBuf {
        Self::path_in(&dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    /// Return the state path rooted at `base_dir` (used for testing).
    pub fn path_in(base_dir: &Path) -> PathBuf {
        base_dir.join(".cpu-spy").join("state.json")
    }

    /// Load persisted state from an explicit path.
    /// Returns `Default` when the file is absent or cannot be parsed.
    pub fn load_from(path: &Path) -> Self {
        match Self::read_from(path) {
            Ok(Some(state)) => state,
            Ok(None) => Self::default(),
            Err(e) => {
                warn!("Ignoring unreadable state file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Read persisted state, `None` when the file does not exist.
    pub fn read_from(path: &Path) -> Result<Option<Self>> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Atomically write state to an explicit path, creating parent
    /// directories if needed.
    pub fn save_to(&self, path: &Path) -> std::result::Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;

        // Write to a temp file then rename for atomicity.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, path)?;

        Ok(())
    }

    /// Delete the state file at an explicit path if it exists.
    pub fn clear_at(path: &Path) -> std::result::Result<(), std::io::Error> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
