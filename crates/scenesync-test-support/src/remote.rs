//! Directory-backed stand-in for the remote worker.
//!
//! Remote absolute paths map onto a local root directory. The batch command
//! behaves like the inference program: it reads each descriptor's `name` and
//! writes `<output>/<name>.<ext>`.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use globset::Glob;
use scenesync_remote::{CommandOutput, RemoteCommand, RemoteError, RemoteExecutor, RemoteResult};
use walkdir::WalkDir;

/// One call observed by [`FakeRemote`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    /// `list_files(remote_dir)`.
    ListFiles(String),
    /// `ensure_dir(remote_dir)`.
    EnsureDir(String),
    /// `upload_file(local, remote_path)`.
    UploadFile {
        /// Local source file.
        local: PathBuf,
        /// Remote destination path.
        remote_path: String,
    },
    /// `upload_dir(local, remote_parent)`.
    UploadDir {
        /// Local source directory.
        local: PathBuf,
        /// Remote parent directory.
        remote_parent: String,
    },
    /// `download_glob(remote_dir, pattern, _)`.
    DownloadGlob {
        /// Remote directory searched.
        remote_dir: String,
        /// Shell glob applied to file names.
        pattern: String,
    },
    /// `run_command(command)`.
    RunCommand {
        /// Operation label of the command.
        operation: &'static str,
        /// Script text.
        script: String,
    },
}

#[derive(Default)]
struct FakeState {
    calls: Vec<RemoteCall>,
    batches: Vec<Vec<String>>,
    fail_listing: bool,
    fail_downloads: bool,
    failing_batches: BTreeSet<usize>,
    withheld: BTreeSet<String>,
}

/// In-process [`RemoteExecutor`] that records calls and can script failures.
pub struct FakeRemote {
    root: PathBuf,
    result_extension: String,
    state: Mutex<FakeState>,
}

impl FakeRemote {
    /// Serve remote paths from `root`, producing `.jpg` results.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            result_extension: "jpg".to_string(),
            state: Mutex::new(FakeState::default()),
        }
    }

    /// Make every listing fail as if the host were unreachable.
    pub fn fail_listing(&self) {
        self.state().fail_listing = true;
    }

    /// Make every download fail with a non-zero transfer status.
    pub fn fail_downloads(&self) {
        self.state().fail_downloads = true;
    }

    /// Make the batch command with 0-based invocation `index` exit non-zero
    /// without producing output.
    pub fn fail_batch(&self, index: usize) {
        self.state().failing_batches.insert(index);
    }

    /// Suppress the result for `result_name` when batches run.
    pub fn withhold_result(&self, result_name: &str) {
        self.state().withheld.insert(result_name.to_string());
    }

    /// Every call observed so far.
    #[must_use]
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.state().calls.clone()
    }

    /// Descriptor paths passed to each batch invocation, in order.
    #[must_use]
    pub fn batches(&self) -> Vec<Vec<String>> {
        self.state().batches.clone()
    }

    /// Number of upload calls (files and directories).
    #[must_use]
    pub fn upload_calls(&self) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|call| matches!(call, RemoteCall::UploadFile { .. } | RemoteCall::UploadDir { .. }))
            .count()
    }

    /// Clear the call log, keeping remote contents and scripted failures.
    pub fn reset_calls(&self) {
        self.state().calls.clear();
    }

    /// Local path backing the remote absolute path `remote`.
    #[must_use]
    pub fn local_path(&self, remote: &str) -> PathBuf {
        self.root.join(remote.trim_start_matches('/'))
    }

    /// Place a file on the fake remote.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing file cannot be written.
    pub fn seed_file(&self, remote: &str, contents: &str) -> io::Result<()> {
        let path = self.local_path(remote);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: RemoteCall) {
        self.state().calls.push(call);
    }

    fn remote_name(&self, path: &Path) -> Option<String> {
        path.strip_prefix(&self.root)
            .ok()
            .map(|relative| format!("/{}", relative.to_string_lossy()))
    }

    fn run_batch(&self, script: &str) -> RemoteResult<CommandOutput> {
        let (descriptors, output_dir) = parse_batch(script);
        let index = {
            let mut state = self.state();
            state.batches.push(descriptors.clone());
            state.batches.len() - 1
        };
        if self.state().failing_batches.contains(&index) {
            return Ok(CommandOutput {
                exit_code: 1,
                stdout: String::new(),
                stderr: "CUDA out of memory".to_string(),
            });
        }
        let Some(output_dir) = output_dir else {
            return Ok(failed_output("missing output directory"));
        };
        let output_root = self.local_path(&output_dir);
        fs::create_dir_all(&output_root).map_err(|source| io_error(&output_root, source))?;
        for descriptor in descriptors {
            let path = self.local_path(&descriptor);
            let Ok(raw) = fs::read_to_string(&path) else {
                return Ok(failed_output("descriptor not found"));
            };
            let name = serde_json::from_str::<serde_json::Value>(&raw)
                .ok()
                .and_then(|value| value.get("name").and_then(|name| name.as_str().map(str::to_string)));
            let Some(name) = name else {
                return Ok(failed_output("descriptor has no name"));
            };
            if self.state().withheld.contains(&name) {
                continue;
            }
            let result = output_root.join(format!("{name}.{}", self.result_extension));
            fs::write(&result, format!("inferred {name}")).map_err(|source| io_error(&result, source))?;
        }
        Ok(CommandOutput::default())
    }
}

fn parse_batch(script: &str) -> (Vec<String>, Option<String>) {
    let tokens: Vec<String> = script
        .split_whitespace()
        .map(|token| token.trim_matches('\'').to_string())
        .collect();
    let mut descriptors = Vec::new();
    let mut output = None;
    if let Some(start) = tokens.iter().position(|token| token == "-i") {
        let mut rest = tokens[start + 1..].iter();
        for token in rest.by_ref() {
            if token == "-o" {
                break;
            }
            descriptors.push(token.clone());
        }
        output = rest.next().cloned();
    }
    (descriptors, output)
}

fn failed_output(stderr: &str) -> CommandOutput {
    CommandOutput {
        exit_code: 1,
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

fn io_error(path: &Path, source: io::Error) -> RemoteError {
    RemoteError::Io {
        operation: "fake_remote",
        path: path.to_path_buf(),
        source,
    }
}

#[async_trait]
impl RemoteExecutor for FakeRemote {
    async fn list_files(&self, remote_dir: &str) -> RemoteResult<BTreeSet<String>> {
        self.record(RemoteCall::ListFiles(remote_dir.to_string()));
        if self.state().fail_listing {
            return Err(RemoteError::Unreachable {
                operation: "list_files",
                stderr: "ssh: connect to host worker.test port 22: Connection refused".to_string(),
            });
        }
        let dir = self.local_path(remote_dir);
        if !dir.is_dir() {
            return Ok(BTreeSet::new());
        }
        let mut files = BTreeSet::new();
        for entry in WalkDir::new(&dir) {
            let entry = entry.map_err(|source| io_error(&dir, io::Error::other(source)))?;
            if entry.file_type().is_file()
                && let Some(name) = self.remote_name(entry.path())
            {
                files.insert(name);
            }
        }
        Ok(files)
    }

    async fn ensure_dir(&self, remote_dir: &str) -> RemoteResult<()> {
        self.record(RemoteCall::EnsureDir(remote_dir.to_string()));
        let dir = self.local_path(remote_dir);
        fs::create_dir_all(&dir).map_err(|source| io_error(&dir, source))
    }

    async fn upload_file(&self, local: &Path, remote_path: &str) -> RemoteResult<()> {
        self.record(RemoteCall::UploadFile {
            local: local.to_path_buf(),
            remote_path: remote_path.to_string(),
        });
        let target = self.local_path(remote_path);
        fs::copy(local, &target).map_err(|source| io_error(&target, source))?;
        Ok(())
    }

    async fn upload_dir(&self, local: &Path, remote_parent: &str) -> RemoteResult<()> {
        self.record(RemoteCall::UploadDir {
            local: local.to_path_buf(),
            remote_parent: remote_parent.to_string(),
        });
        let Some(name) = local.file_name() else {
            return Err(io_error(local, io::Error::from(io::ErrorKind::InvalidInput)));
        };
        let target_root = self.local_path(remote_parent).join(name);
        for entry in WalkDir::new(local) {
            let entry = entry.map_err(|source| io_error(local, io::Error::other(source)))?;
            let Ok(relative) = entry.path().strip_prefix(local) else {
                continue;
            };
            let target = target_root.join(relative);
            if entry.file_type().is_dir() {
                fs::create_dir_all(&target).map_err(|source| io_error(&target, source))?;
            } else {
                fs::copy(entry.path(), &target).map_err(|source| io_error(&target, source))?;
            }
        }
        Ok(())
    }

    async fn download_glob(
        &self,
        remote_dir: &str,
        pattern: &str,
        local_dir: &Path,
    ) -> RemoteResult<usize> {
        self.record(RemoteCall::DownloadGlob {
            remote_dir: remote_dir.to_string(),
            pattern: pattern.to_string(),
        });
        if self.state().fail_downloads {
            return Err(RemoteError::CommandFailed {
                operation: "download_glob",
                exit_code: 1,
                stderr: "scp: connection closed".to_string(),
            });
        }
        let matcher = Glob::new(pattern)
            .map_err(|source| io_error(local_dir, io::Error::other(source)))?
            .compile_matcher();
        let dir = self.local_path(remote_dir);
        if !dir.is_dir() {
            return Ok(0);
        }
        let entries = fs::read_dir(&dir).map_err(|source| io_error(&dir, source))?;
        let mut copied = 0;
        for entry in entries {
            let entry = entry.map_err(|source| io_error(&dir, source))?;
            let path = entry.path();
            if path.is_file() && matcher.is_match(entry.file_name()) {
                let target = local_dir.join(entry.file_name());
                fs::copy(&path, &target).map_err(|source| io_error(&target, source))?;
                copied += 1;
            }
        }
        Ok(copied)
    }

    async fn run_command(&self, command: &RemoteCommand) -> RemoteResult<CommandOutput> {
        self.record(RemoteCall::RunCommand {
            operation: command.operation(),
            script: command.script().to_string(),
        });
        if command.operation() == "run_batch" {
            self.run_batch(command.script())
        } else {
            Ok(CommandOutput::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[tokio::test]
    async fn listing_maps_back_to_remote_paths() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let remote = FakeRemote::new(dir.path());
        remote.seed_file("/ws/assets/scene_0/rgb_0001.png", "x")?;
        remote.seed_file("/ws/assets/scene_0_rgb_0001.json", "{}")?;

        let listed = remote.list_files("/ws/assets").await?;
        assert_eq!(
            listed,
            BTreeSet::from([
                "/ws/assets/scene_0/rgb_0001.png".to_string(),
                "/ws/assets/scene_0_rgb_0001.json".to_string(),
            ])
        );
        assert!(remote.list_files("/ws/missing").await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn batch_command_writes_named_results() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let remote = FakeRemote::new(dir.path());
        remote.seed_file("/ws/assets/a.json", r#"{"name": "scene_0_rgb_0001_inferred"}"#)?;
        remote.seed_file("/ws/assets/b.json", r#"{"name": "scene_0_rgb_0002_inferred"}"#)?;
        remote.withhold_result("scene_0_rgb_0002_inferred");

        let command = RemoteCommand::new(
            "run_batch",
            "cd /ws && python infer.py -i /ws/assets/a.json /ws/assets/b.json -o /ws/out",
        );
        let output = remote.run_command(&command).await?;
        assert!(output.success());
        assert!(remote.local_path("/ws/out/scene_0_rgb_0001_inferred.jpg").is_file());
        assert!(!remote.local_path("/ws/out/scene_0_rgb_0002_inferred.jpg").exists());
        assert_eq!(
            remote.batches(),
            vec![vec!["/ws/assets/a.json".to_string(), "/ws/assets/b.json".to_string()]]
        );
        Ok(())
    }

    #[tokio::test]
    async fn download_glob_copies_matching_files_only() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let local = tempfile::tempdir()?;
        let remote = FakeRemote::new(dir.path());
        remote.seed_file("/ws/out/a.jpg", "a")?;
        remote.seed_file("/ws/out/b.mp4", "b")?;

        let copied = remote.download_glob("/ws/out", "*.jpg", local.path()).await?;
        assert_eq!(copied, 1);
        assert!(local.path().join("a.jpg").is_file());
        assert!(!local.path().join("b.mp4").exists());
        Ok(())
    }

    #[tokio::test]
    async fn scripted_failures_surface() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let remote = FakeRemote::new(dir.path());
        remote.fail_listing();
        remote.fail_batch(0);
        assert!(remote.list_files("/ws").await.is_err());
        let output = remote
            .run_command(&RemoteCommand::new("run_batch", "true -i -o /ws/out"))
            .await?;
        assert_eq!(output.exit_code, 1);
        Ok(())
    }
}
