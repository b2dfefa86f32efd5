//! Error types for FlushGuard setup operations
//!
//! The flush protocol itself never fails outward: per-file and cross-runtime
//! failures are folded into summaries and reports. `FlushError` covers the
//! fallible edges around it (opening settings, resolving directories,
//! spawning the engine thread, validating configuration).

use std::path::PathBuf;

use thiserror::Error;

/// FlushGuard error types with detailed context
#[derive(Debug, Clone, Error)]
pub enum FlushError {
    /// I/O operation failed
    #[error("I/O error{}: {message} ({kind})", at_path(.path))]
    Io {
        /// The file path where the error occurred
        path: Option<PathBuf>,
        /// The underlying I/O error kind
        kind: std::io::ErrorKind,
        /// Human-readable description
        message: String,
    },

    /// Settings file exists but could not be decoded
    #[error("settings file {} is corrupted: {reason}", path.display())]
    SettingsCorrupted {
        /// Path to the settings file
        path: PathBuf,
        /// Description of the corruption
        reason: String,
    },

    /// Settings payload could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Configuration rejected by `Config::validate`
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The managed-runtime engine thread could not be started
    #[error("failed to spawn engine thread `{name}`: {message}")]
    EngineSpawn {
        /// Thread name
        name: String,
        /// Spawn failure description
        message: String,
    },

    /// The platform reports no per-user documents directory
    #[error("documents directory is not available on this platform")]
    DocumentsDirUnavailable,
}

fn at_path(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| format!(" in {}", p.display()))
        .unwrap_or_default()
}

impl FlushError {
    /// Build an `Io` error carrying the path it happened on.
    pub fn io_at(path: impl Into<PathBuf>, err: &std::io::Error, what: &str) -> Self {
        FlushError::Io {
            path: Some(path.into()),
            kind: err.kind(),
            message: format!("{}: {}", what, err),
        }
    }
}

/// Convert std::io::Error to FlushError::Io
impl From<std::io::Error> for FlushError {
    fn from(err: std::io::Error) -> Self {
        FlushError::Io {
            path: None,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for FlushError {
    fn from(err: serde_json::Error) -> Self {
        FlushError::Serialization(err.to_string())
    }
}

/// Result type alias for FlushGuard operations
pub type FlushResult<T> = Result<T, FlushError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FlushError::SettingsCorrupted {
            path: PathBuf::from("/tmp/flushguard.settings"),
            reason: "checksum mismatch".into(),
        };

        let display = format!("{}", err);
        assert!(display.contains("flushguard.settings"));
        assert!(display.contains("checksum mismatch"));
    }

    #[test]
    fn test_io_display_with_and_without_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let with_path = FlushError::io_at("/var/mobile/Documents", &io_err, "Failed to list directory");
        let shown = with_path.to_string();
        assert!(shown.contains("/var/mobile/Documents"));
        assert!(shown.contains("Failed to list directory"));

        let without: FlushError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(without.to_string().starts_with("I/O error: gone"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: FlushError = io_err.into();

        match err {
            FlushError::Io { kind, .. } => assert_eq!(kind, std::io::ErrorKind::NotFound),
            _ => panic!("Expected Io error"),
        }
    }
}
