//! # Design
//!
//! - Classify remote failures by cause instead of parsing process output at
//!   call sites.
//! - Only connectivity failures and timeouts are transient; everything else
//!   is reported as-is.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result alias for remote operations.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Errors produced while talking to the remote worker.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The local transport program (ssh/scp) could not be started.
    #[error("failed to launch {program}")]
    Spawn {
        /// Program that failed to start.
        program: &'static str,
        /// Underlying IO error.
        source: io::Error,
    },
    /// The transport could not reach or authenticate against the host.
    #[error("remote host unreachable during {operation}")]
    Unreachable {
        /// Operation that was attempted.
        operation: &'static str,
        /// Diagnostic output captured from the transport.
        stderr: String,
    },
    /// The remote side ran the operation and reported failure.
    #[error("remote {operation} exited with status {exit_code}")]
    CommandFailed {
        /// Operation that was attempted.
        operation: &'static str,
        /// Exit status reported by the transport.
        exit_code: i32,
        /// Diagnostic output captured from the transport.
        stderr: String,
    },
    /// The operation did not finish within its time budget.
    #[error("remote {operation} timed out")]
    Timeout {
        /// Operation that was attempted.
        operation: &'static str,
        /// Budget that expired.
        timeout: Duration,
    },
    /// The transport process was terminated by a signal.
    #[error("remote {operation} was terminated before exiting")]
    Terminated {
        /// Operation that was attempted.
        operation: &'static str,
    },
    /// A local filesystem operation backing a transfer failed.
    #[error("local io failure during {operation}")]
    Io {
        /// Operation that was attempted.
        operation: &'static str,
        /// Local path involved.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
}

impl RemoteError {
    /// Whether the failure may succeed on retry without side effects.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unreachable { .. } | Self::Timeout { .. })
    }

    /// Operation label attached to the failure, when one exists.
    #[must_use]
    pub const fn operation(&self) -> Option<&'static str> {
        match self {
            Self::Unreachable { operation, .. }
            | Self::CommandFailed { operation, .. }
            | Self::Timeout { operation, .. }
            | Self::Terminated { operation }
            | Self::Io { operation, .. } => Some(*operation),
            Self::Spawn { .. } => None,
        }
    }
}
