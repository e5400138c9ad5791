//! ssh/scp implementation of [`RemoteExecutor`].
//!
//! # Design
//! - Argument vectors are built by pure functions so they can be asserted
//!   without a network.
//! - Every call runs under a timeout; dispatch may opt out via configuration.
//! - Child processes are killed when their future is dropped, so a timeout
//!   never leaves a transfer running in the background.

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use scenesync_config::RemoteSettings;
use tokio::process::Command;
use tracing::debug;

use crate::command::RemoteCommand;
use crate::error::{RemoteError, RemoteResult};
use crate::executor::{CommandOutput, RemoteExecutor};

const SSH: &str = "ssh";
const SCP: &str = "scp";
/// Exit status ssh and scp use for connection and authentication failures.
const TRANSPORT_FAILURE: i32 = 255;

/// Talks to the worker through the system `ssh` and `scp` binaries.
#[derive(Debug, Clone)]
pub struct SshExecutor {
    settings: RemoteSettings,
}

impl SshExecutor {
    /// Build an executor for the configured worker.
    #[must_use]
    pub const fn new(settings: RemoteSettings) -> Self {
        Self { settings }
    }

    /// Connection settings in use.
    #[must_use]
    pub const fn settings(&self) -> &RemoteSettings {
        &self.settings
    }

    /// Arguments for `ssh` running `script` on the worker.
    #[must_use]
    pub fn ssh_args(&self, script: &str) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-p".into(), self.settings.port.to_string().into()];
        self.push_common(&mut args);
        args.push(self.settings.destination().into());
        args.push(script.into());
        args
    }

    /// Arguments for `scp` copying `sources` to `target`.
    ///
    /// Remote endpoints are given as `user@host:path` via [`Self::remote_spec`].
    #[must_use]
    pub fn scp_args(&self, recursive: bool, sources: &[OsString], target: OsString) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-P".into(), self.settings.port.to_string().into()];
        self.push_common(&mut args);
        if recursive {
            args.push("-r".into());
        }
        args.extend(sources.iter().cloned());
        args.push(target);
        args
    }

    /// Render a remote endpoint for scp.
    #[must_use]
    pub fn remote_spec(&self, remote_path: &str) -> OsString {
        format!("{}:{remote_path}", self.settings.destination()).into()
    }

    fn push_common(&self, args: &mut Vec<OsString>) {
        args.push("-o".into());
        args.push("BatchMode=yes".into());
        for option in &self.settings.ssh_options {
            args.push("-o".into());
            args.push(option.into());
        }
        if let Some(identity) = &self.settings.identity_file {
            args.push("-i".into());
            args.push(identity.as_os_str().to_owned());
        }
    }

    async fn checked(
        &self,
        program: &'static str,
        operation: &'static str,
        args: Vec<OsString>,
    ) -> RemoteResult<CommandOutput> {
        let output = spawn(program, operation, args, Some(self.settings.call_timeout)).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(RemoteError::CommandFailed {
                operation,
                exit_code: output.exit_code,
                stderr: output.stderr,
            })
        }
    }

    async fn ssh_checked(&self, command: &RemoteCommand) -> RemoteResult<CommandOutput> {
        self.checked(SSH, command.operation(), self.ssh_args(command.script()))
            .await
    }
}

async fn spawn(
    program: &'static str,
    operation: &'static str,
    args: Vec<OsString>,
    timeout: Option<Duration>,
) -> RemoteResult<CommandOutput> {
    let started = Instant::now();
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match timeout {
        Some(limit) => tokio::time::timeout(limit, command.output())
            .await
            .map_err(|_| RemoteError::Timeout {
                operation,
                timeout: limit,
            })?,
        None => command.output().await,
    }
    .map_err(|source| RemoteError::Spawn { program, source })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    debug!(
        operation,
        program,
        status = ?output.status.code(),
        elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        "remote call finished"
    );

    match output.status.code() {
        None => Err(RemoteError::Terminated { operation }),
        Some(TRANSPORT_FAILURE) => Err(RemoteError::Unreachable { operation, stderr }),
        Some(exit_code) => Ok(CommandOutput {
            exit_code,
            stdout,
            stderr,
        }),
    }
}

fn non_empty_lines(stdout: &str) -> impl Iterator<Item = &str> {
    stdout.lines().map(str::trim_end).filter(|line| !line.is_empty())
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn list_files(&self, remote_dir: &str) -> RemoteResult<BTreeSet<String>> {
        let output = self.ssh_checked(&RemoteCommand::list_files(remote_dir)).await?;
        Ok(non_empty_lines(&output.stdout).map(str::to_string).collect())
    }

    async fn ensure_dir(&self, remote_dir: &str) -> RemoteResult<()> {
        self.ssh_checked(&RemoteCommand::make_dir(remote_dir)).await?;
        Ok(())
    }

    async fn upload_file(&self, local: &Path, remote_path: &str) -> RemoteResult<()> {
        let args = self.scp_args(
            false,
            &[local.as_os_str().to_owned()],
            self.remote_spec(remote_path),
        );
        self.checked(SCP, "upload_file", args).await?;
        Ok(())
    }

    async fn upload_dir(&self, local: &Path, remote_parent: &str) -> RemoteResult<()> {
        let target = format!("{}/", remote_parent.trim_end_matches('/'));
        let args = self.scp_args(true, &[local.as_os_str().to_owned()], self.remote_spec(&target));
        self.checked(SCP, "upload_dir", args).await?;
        Ok(())
    }

    async fn download_glob(
        &self,
        remote_dir: &str,
        pattern: &str,
        local_dir: &Path,
    ) -> RemoteResult<usize> {
        let listing = self
            .ssh_checked(&RemoteCommand::list_matching(remote_dir, pattern))
            .await?;
        let sources: Vec<OsString> = non_empty_lines(&listing.stdout)
            .map(|path| self.remote_spec(path))
            .collect();
        if sources.is_empty() {
            return Ok(0);
        }
        let args = self.scp_args(false, &sources, local_dir.as_os_str().to_owned());
        self.checked(SCP, "download_glob", args).await?;
        Ok(sources.len())
    }

    async fn run_command(&self, command: &RemoteCommand) -> RemoteResult<CommandOutput> {
        let args = self.ssh_args(command.script());
        spawn(SSH, command.operation(), args, self.settings.dispatch_timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scenesync_config::RetrySettings;
    use std::path::PathBuf;

    fn settings(identity: Option<&str>) -> RemoteSettings {
        RemoteSettings {
            host: "10.0.0.5".to_string(),
            port: 2222,
            user: "root".to_string(),
            identity_file: identity.map(PathBuf::from),
            ssh_options: vec!["StrictHostKeyChecking=accept-new".to_string()],
            call_timeout: Duration::from_secs(5),
            dispatch_timeout: None,
            retry: RetrySettings {
                max_retries: 0,
                base_delay: Duration::from_millis(1),
            },
        }
    }

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn ssh_args_carry_port_options_and_identity() {
        let executor = SshExecutor::new(settings(Some("/keys/worker")));
        let args = executor.ssh_args("mkdir -p /ws");
        assert_eq!(
            strings(&args),
            vec![
                "-p",
                "2222",
                "-o",
                "BatchMode=yes",
                "-o",
                "StrictHostKeyChecking=accept-new",
                "-i",
                "/keys/worker",
                "root@10.0.0.5",
                "mkdir -p /ws",
            ]
        );
    }

    #[test]
    fn scp_args_use_capital_port_flag_and_recursion() {
        let executor = SshExecutor::new(settings(None));
        let args = executor.scp_args(
            true,
            &["/stage/scene_3".into()],
            executor.remote_spec("/ws/assets/"),
        );
        assert_eq!(
            strings(&args),
            vec![
                "-P",
                "2222",
                "-o",
                "BatchMode=yes",
                "-o",
                "StrictHostKeyChecking=accept-new",
                "-r",
                "/stage/scene_3",
                "root@10.0.0.5:/ws/assets/",
            ]
        );
    }

    #[test]
    fn scp_args_accept_multiple_remote_sources() {
        let executor = SshExecutor::new(settings(None));
        let sources = vec![
            executor.remote_spec("/ws/out/a.jpg"),
            executor.remote_spec("/ws/out/b.jpg"),
        ];
        let args = strings(&executor.scp_args(false, &sources, "/tmp/results".into()));
        assert!(!args.contains(&"-r".to_string()));
        assert_eq!(
            &args[args.len() - 3..],
            &["root@10.0.0.5:/ws/out/a.jpg", "root@10.0.0.5:/ws/out/b.jpg", "/tmp/results"]
        );
    }

    #[test]
    fn listing_output_ignores_blank_lines() {
        let lines: Vec<&str> = non_empty_lines("/a\n\n/b \n").collect();
        assert_eq!(lines, vec!["/a", "/b"]);
    }

    fn os_args(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[tokio::test]
    async fn expired_call_timeout_is_reported_as_timeout() {
        let result = spawn(
            "sleep",
            "list_files",
            os_args(&["5"]),
            Some(Duration::from_millis(50)),
        )
        .await;
        assert!(matches!(
            result,
            Err(RemoteError::Timeout {
                operation: "list_files",
                ..
            })
        ));
        assert!(result.is_err_and(|err| err.is_transient()));
    }

    #[tokio::test]
    async fn transport_exit_status_is_reported_as_unreachable() {
        let result = spawn("sh", "ensure_dir", os_args(&["-c", "echo refused >&2; exit 255"]), None).await;
        match result {
            Err(RemoteError::Unreachable { operation, stderr }) => {
                assert_eq!(operation, "ensure_dir");
                assert_eq!(stderr.trim(), "refused");
            }
            other => panic!("expected unreachable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn other_exit_statuses_are_returned_as_output() -> RemoteResult<()> {
        let output = spawn("sh", "run_batch", os_args(&["-c", "echo done; exit 3"]), None).await?;
        assert_eq!(output.exit_code, 3);
        assert_eq!(output.stdout.trim(), "done");
        assert!(!output.success());
        Ok(())
    }

    #[tokio::test]
    async fn missing_program_is_reported_as_spawn_failure() {
        let result = spawn(
            "scenesync-no-such-program",
            "upload_file",
            Vec::new(),
            None,
        )
        .await;
        assert!(matches!(result, Err(RemoteError::Spawn { .. })));
    }
}
