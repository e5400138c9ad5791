//! CLI error type and exit-code policy.

use std::path::PathBuf;

/// Failure modes surfaced to the operator.
#[derive(Debug)]
pub(crate) enum CliError {
    /// Bad flags or configuration. Exit code 2.
    Validation(String),
    /// Fatal operational failure. Exit code 3.
    Failure(anyhow::Error),
    /// The run finished but some results are missing. Exit code 4.
    Incomplete {
        /// Number of work items without a result.
        missing: usize,
        /// Dispatch ledger whose completed markers suppress re-dispatch.
        ledger: PathBuf,
    },
}

pub(crate) type CliResult<T> = Result<T, CliError>;

impl CliError {
    pub(crate) fn validation(error: impl Into<anyhow::Error>) -> Self {
        Self::Validation(format!("{:#}", error.into()))
    }

    pub(crate) fn failure(error: impl Into<anyhow::Error>) -> Self {
        Self::Failure(error.into())
    }

    pub(crate) const fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) => 2,
            Self::Failure(_) => 3,
            Self::Incomplete { .. } => 4,
        }
    }

    pub(crate) fn display_message(&self) -> String {
        match self {
            Self::Validation(message) => message.clone(),
            Self::Failure(error) => format!("{error:#}"),
            Self::Incomplete { missing, ledger } => format!(
                "{missing} result(s) missing; re-run with --download-only once the remote job has finished, \
                 or delete {} to dispatch the unreconciled batches again",
                ledger.display()
            ),
        }
    }
}
