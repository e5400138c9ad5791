//! Capability set of the remote worker.
//!
//! # Design
//! - The pipeline depends only on this trait, so the ssh transport can be
//!   replaced by an in-process fake in tests.
//! - Every call is a single network exchange; batching and retries live in
//!   callers or wrappers.

use std::collections::BTreeSet;
use std::path::Path;

use async_trait::async_trait;

use crate::command::RemoteCommand;
use crate::error::RemoteResult;

/// Captured result of a remote command that ran to completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit status of the remote command.
    pub exit_code: i32,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Whether the command exited with status zero.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Operations the pipeline needs from the remote worker.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// List absolute paths of every regular file under `remote_dir`.
    ///
    /// A missing directory yields an empty set.
    async fn list_files(&self, remote_dir: &str) -> RemoteResult<BTreeSet<String>>;

    /// Create `remote_dir` and any missing parents.
    async fn ensure_dir(&self, remote_dir: &str) -> RemoteResult<()>;

    /// Copy one local file to the exact remote path `remote_path`.
    async fn upload_file(&self, local: &Path, remote_path: &str) -> RemoteResult<()>;

    /// Copy the local directory `local` recursively into `remote_parent`,
    /// keeping its name. Files already present under the target are
    /// overwritten; other files there are left alone.
    async fn upload_dir(&self, local: &Path, remote_parent: &str) -> RemoteResult<()>;

    /// Copy every file in `remote_dir` whose name matches the shell glob
    /// `pattern` into `local_dir`, returning how many were copied.
    ///
    /// Zero matches is not an error.
    async fn download_glob(
        &self,
        remote_dir: &str,
        pattern: &str,
        local_dir: &Path,
    ) -> RemoteResult<usize>;

    /// Run a command on the worker and capture its output.
    ///
    /// A non-zero exit is reported through [`CommandOutput::exit_code`],
    /// not as an error.
    async fn run_command(&self, command: &RemoteCommand) -> RemoteResult<CommandOutput>;
}
