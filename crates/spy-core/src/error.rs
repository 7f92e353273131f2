use thiserror::Error;

/// All errors produced by CPU Spy.
#[derive(Error, Debug)]
pub enum SpyError {
    /// The time-in-state source could not be opened or read.
    #[error("Time-in-state source {source_name} unavailable: {source}")]
    SourceUnavailable {
        source_name: String,
        #[source]
        source: std::io::Error,
    },

    /// The privileged (`su`) read ran but did not produce usable output.
    #[error("Privileged read failed: {0}")]
    PrivilegedRead(String),

    /// A time-in-state line did not split into two unsigned integers.
    #[error("Malformed time-in-state line {line_number}: {line:?}")]
    Parse { line_number: usize, line: String },

    /// The persisted offset blob could not be decoded.
    #[error("Invalid offset encoding: {0}")]
    OffsetDecode(String),

    /// A JSON document could not be parsed.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Pass-through for any raw I/O error that does not carry a source name.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Catch-all for errors from third-party crates via `anyhow`.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SpyError {
    /// `true` when the error means the data could not be reached at all, as
    /// opposed to being reached and found malformed.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            SpyError::SourceUnavailable { .. } | SpyError::PrivilegedRead(_)
        )
    }
}

/// Convenience alias used throughout the spy crates.
pub type Result<T> = std::result::Result<T, SpyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_source_unavailable() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = SpyError::SourceUnavailable {
            source_name: "/sys/devices/system/cpu/cpu0/cpufreq/stats/time_in_state".to_string(),
            source: io_err,
        };
        let msg = err.to_string();
        assert!(msg.contains("unavailable"));
        assert!(msg.contains("cpu0/cpufreq/stats/time_in_state"));
        assert!(msg.contains("denied"));
        assert!(err.is_unavailable());
    }

    #[test]
    fn test_error_display_parse() {
        let err = SpyError::Parse {
            line_number: 3,
            line: "abc".to_string(),
        };
        assert_eq!(err.to_string(), "Malformed time-in-state line 3: \"abc\"");
        assert!(!err.is_unavailable());
    }

    #[test]
    fn test_error_display_privileged_read() {
        let err = SpyError::PrivilegedRead("su exited with status 1".to_string());
        assert_eq!(err.to_string(), "Privileged read failed: su exited with status 1");
        assert!(err.is_unavailable());
    }

    #[test]
    fn test_error_display_offset_decode() {
        let err = SpyError::OffsetDecode("segment \"100\"".to_string());
        assert_eq!(err.to_string(), "Invalid offset encoding: segment \"100\"");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: SpyError = io_err.into();
        assert!(err.to_string().contains("gone"));
        assert!(!err.is_unavailable());
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{invalid}").unwrap_err();
        let err: SpyError = json_err.into();
        assert!(err.to_string().contains("Failed to parse JSON"));
    }
}
