//! Error types for telemetry decoding and export.
//!
//! All errors carry enough context (a byte offset, a variable name, or a file path) to
//! locate the failure without re-reading the source file. See the module-level docs on
//! [`TelemetryError`] for the retry/recovery story.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for telemetry operations.
pub type Result<T, E = TelemetryError> = std::result::Result<T, E>;

/// Errors produced while decoding an `.ibt` file or exporting it to Parquet.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TelemetryError {
    #[error("file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("truncated read at offset {offset}: needed {needed} bytes, found {found}")]
    Truncated { offset: u64, needed: usize, found: usize },

    #[error("unsupported SDK version: expected 2, found {found}")]
    UnsupportedVersion { found: i32 },

    #[error("variable header {index} ('{name}') has unknown type tag {tag}")]
    UnknownVarType { index: usize, name: String, tag: i32 },

    #[error(
        "variable '{name}' (offset {offset}, count {count}) extends past the {buf_len}-byte frame"
    )]
    VarOutOfFrame { name: String, offset: i32, count: i32, buf_len: i32 },

    #[error("session info YAML malformed: {details}")]
    SessionInfoMalformed { details: String },

    #[error("projection resolved no variables")]
    ProjectionEmpty,

    #[error("operation cancelled")]
    Cancelled,
}

impl TelemetryError {
    /// Whether retrying the same operation could plausibly succeed.
    ///
    /// Every error in this enum is a property of a specific file's bytes, so none of
    /// them heal on retry unless the caller replaces the underlying file.
    pub fn is_retryable(&self) -> bool {
        false
    }

    /// Suggested next steps for a caller surfacing this error to a human.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            TelemetryError::NotFound { .. } => vec!["Check the file path and permissions"],
            TelemetryError::Io { .. } => {
                vec!["Check disk health and available file descriptors", "Retry the read"]
            }
            TelemetryError::Truncated { .. } => {
                vec!["The file is shorter than its own header declares; re-export or re-copy it"]
            }
            TelemetryError::UnsupportedVersion { .. } => {
                vec!["Only SDK version 2 .ibt files are supported by this decoder"]
            }
            TelemetryError::UnknownVarType { .. } => {
                vec!["The variable dictionary contains a type tag outside 0..=5; the file may be corrupt or from a newer SDK"]
            }
            TelemetryError::VarOutOfFrame { .. } => {
                vec!["The variable header's offset/count is inconsistent with the declared frame size"]
            }
            TelemetryError::SessionInfoMalformed { .. } => vec![
                "Open with on_session_info_error = empty to proceed without session metadata",
                "Inspect the raw YAML blob for unescaped characters",
            ],
            TelemetryError::ProjectionEmpty { .. } => {
                vec!["None of the requested variable names matched this file's dictionary"]
            }
            TelemetryError::Cancelled => vec!["The caller's cancellation token was triggered"],
        }
    }

    pub(crate) fn truncated(offset: u64, needed: usize, found: usize) -> Self {
        TelemetryError::Truncated { offset, needed, found }
    }
}

impl From<std::io::Error> for TelemetryError {
    fn from(source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            TelemetryError::NotFound { path: PathBuf::new() }
        } else {
            TelemetryError::Io { path: PathBuf::new(), source }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_not_retryable() {
        let err = TelemetryError::NotFound { path: PathBuf::from("missing.ibt") };
        assert!(!err.is_retryable());
        assert!(!err.recovery_suggestions().is_empty());
    }

    #[test]
    fn io_error_conversion_defaults_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: TelemetryError = io_err.into();
        assert!(matches!(err, TelemetryError::Io { .. }));
    }

    #[test]
    fn not_found_conversion_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: TelemetryError = io_err.into();
        assert!(matches!(err, TelemetryError::NotFound { .. }));
    }

    #[test]
    fn messages_carry_context() {
        let err = TelemetryError::UnknownVarType { index: 7, name: "Foo".into(), tag: 9 };
        let msg = err.to_string();
        assert!(msg.contains('7'));
        assert!(msg.contains("Foo"));
        assert!(msg.contains('9'));
    }
}
