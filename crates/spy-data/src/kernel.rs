//! Kernel identification shown under the state table.

use std::path::Path;

use tracing::warn;

/// Default location of the kernel version banner.
pub const KERNEL_VERSION_PATH: &str = "/proc/version";

/// Read the kernel version banner: the last non-empty line of
/// `/proc/version`, or `None` if it cannot be read.
pub fn kernel_version() -> Option<String> {
    kernel_version_from(Path::new(KERNEL_VERSION_PATH))
}

/// Same as [`kernel_version`] but from an explicit path.
pub fn kernel_version_from(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(contents) => contents
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .last()
            .map(str::to_string),
        Err(e) => {
            warn!("Problem reading kernel version file {}: {}", path.display(), e);
            None
        }
    }
}
