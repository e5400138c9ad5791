//! # Design
//!
//! - Provide structured errors for every pipeline stage.
//! - Capture operation context (paths, batch indexes) so failures are
//!   reproducible without log archaeology.
//! - Only structural failures live here; missing scenes and missing results
//!   are reported through summaries, not errors.

use std::io;
use std::path::PathBuf;

use scenesync_remote::RemoteError;
use thiserror::Error;

/// Result type for pipeline operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors produced by the sync and dispatch engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// IO failures while interacting with the local filesystem.
    #[error("io failure during {operation} at {}", .path.display())]
    Io {
        /// Operation that triggered the IO failure.
        operation: &'static str,
        /// Path involved in the IO failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// JSON parsing or serialization failures.
    #[error("json failure during {operation} at {}", .path.display())]
    Json {
        /// Operation that triggered the JSON failure.
        operation: &'static str,
        /// Path involved in the JSON failure.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
    /// Walkdir traversal failures.
    #[error("directory walk failed during {operation} at {}", .path.display())]
    Walkdir {
        /// Operation that triggered the walk.
        operation: &'static str,
        /// Root of the walk.
        path: PathBuf,
        /// Underlying walkdir error.
        source: walkdir::Error,
    },
    /// A scene directory exists but cannot be read.
    #[error("scene directory {} is unreadable", .path.display())]
    Discovery {
        /// Scene directory that failed.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// The descriptor template is not usable.
    #[error("descriptor template {} is invalid: {reason}", .path.display())]
    Template {
        /// Template file.
        path: PathBuf,
        /// Static reason for the rejection.
        reason: &'static str,
    },
    /// A remote call failed.
    #[error("remote {operation} failed")]
    Remote {
        /// Pipeline operation that issued the call.
        operation: &'static str,
        /// Underlying remote error.
        source: RemoteError,
    },
    /// The inference program exited non-zero for a batch.
    #[error("batch {batch} failed with exit status {exit_code}")]
    BatchFailed {
        /// 1-based batch number.
        batch: usize,
        /// Exit status reported by the remote command.
        exit_code: i32,
        /// Diagnostic output captured from the remote command.
        stderr: String,
    },
    /// The dispatch ledger exists but cannot be parsed.
    #[error("dispatch ledger {} is corrupt", .path.display())]
    Ledger {
        /// Ledger file.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
}

impl EngineError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: serde_json::Error,
    ) -> Self {
        Self::Json {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn walkdir(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: walkdir::Error,
    ) -> Self {
        Self::Walkdir {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) const fn remote(operation: &'static str, source: RemoteError) -> Self {
        Self::Remote { operation, source }
    }
}
