//! Retries for transient failures of idempotent remote calls.
//!
//! # Design
//! - Wraps any [`RemoteExecutor`]; callers see the same trait.
//! - Listing, directory creation, and transfers are safe to repeat. Command
//!   execution is not, so [`RemoteExecutor::run_command`] is never retried.
//! - Backoff doubles from the configured base delay.

use std::collections::BTreeSet;
use std::future::Future;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use scenesync_config::RetrySettings;
use scenesync_telemetry::Metrics;
use tracing::warn;

use crate::command::RemoteCommand;
use crate::error::RemoteResult;
use crate::executor::{CommandOutput, RemoteExecutor};

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    /// Build a policy allowing `max_retries` retries after the first attempt.
    #[must_use]
    pub const fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Whether retry number `attempt` (0-indexed) is within budget.
    #[must_use]
    pub const fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    /// Delay before retry number `attempt` (0-indexed).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2_u32.saturating_pow(attempt))
    }
}

impl From<RetrySettings> for RetryPolicy {
    fn from(settings: RetrySettings) -> Self {
        Self::new(settings.max_retries, settings.base_delay)
    }
}

/// [`RemoteExecutor`] decorator that retries transient failures.
pub struct RetryingExecutor<E> {
    inner: E,
    policy: RetryPolicy,
    metrics: Option<Metrics>,
}

impl<E: RemoteExecutor> RetryingExecutor<E> {
    /// Wrap `inner` with `policy`.
    #[must_use]
    pub const fn new(inner: E, policy: RetryPolicy) -> Self {
        Self {
            inner,
            policy,
            metrics: None,
        }
    }

    /// Count retries in `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Wrapped executor.
    #[must_use]
    pub const fn inner(&self) -> &E {
        &self.inner
    }

    async fn attempt<T, F, Fut>(&self, operation: &'static str, mut call: F) -> RemoteResult<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = RemoteResult<T>> + Send,
    {
        let mut attempt = 0;
        loop {
            match call().await {
                Err(err) if err.is_transient() && self.policy.should_retry(attempt) => {
                    let delay = self.policy.delay(attempt);
                    warn!(
                        operation,
                        retry = attempt + 1,
                        max_retries = self.policy.max_retries,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "transient remote failure, retrying"
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.inc_remote_retry(operation);
                    }
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

#[async_trait]
impl<E: RemoteExecutor> RemoteExecutor for RetryingExecutor<E> {
    async fn list_files(&self, remote_dir: &str) -> RemoteResult<BTreeSet<String>> {
        self.attempt("list_files", || self.inner.list_files(remote_dir))
            .await
    }

    async fn ensure_dir(&self, remote_dir: &str) -> RemoteResult<()> {
        self.attempt("ensure_dir", || self.inner.ensure_dir(remote_dir))
            .await
    }

    async fn upload_file(&self, local: &Path, remote_path: &str) -> RemoteResult<()> {
        self.attempt("upload_file", || self.inner.upload_file(local, remote_path))
            .await
    }

    async fn upload_dir(&self, local: &Path, remote_parent: &str) -> RemoteResult<()> {
        self.attempt("upload_dir", || self.inner.upload_dir(local, remote_parent))
            .await
    }

    async fn download_glob(
        &self,
        remote_dir: &str,
        pattern: &str,
        local_dir: &Path,
    ) -> RemoteResult<usize> {
        self.attempt("download_glob", || {
            self.inner.download_glob(remote_dir, pattern, local_dir)
        })
        .await
    }

    async fn run_command(&self, command: &RemoteCommand) -> RemoteResult<CommandOutput> {
        self.inner.run_command(command).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteError;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails every call with `failure` until `failures` calls have been made.
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
        failure: fn() -> RemoteError,
    }

    impl Flaky {
        fn new(failures: u32, failure: fn() -> RemoteError) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
                failure,
            }
        }

        fn call(&self) -> RemoteResult<()> {
            let seen = self.calls.fetch_add(1, Ordering::SeqCst);
            if seen < self.failures {
                Err((self.failure)())
            } else {
                Ok(())
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RemoteExecutor for Flaky {
        async fn list_files(&self, _remote_dir: &str) -> RemoteResult<BTreeSet<String>> {
            self.call().map(|()| BTreeSet::from(["/ws/a".to_string()]))
        }

        async fn ensure_dir(&self, _remote_dir: &str) -> RemoteResult<()> {
            self.call()
        }

        async fn upload_file(&self, _local: &Path, _remote_path: &str) -> RemoteResult<()> {
            self.call()
        }

        async fn upload_dir(&self, _local: &Path, _remote_parent: &str) -> RemoteResult<()> {
            self.call()
        }

        async fn download_glob(
            &self,
            _remote_dir: &str,
            _pattern: &str,
            _local_dir: &Path,
        ) -> RemoteResult<usize> {
            self.call().map(|()| 0)
        }

        async fn run_command(&self, _command: &RemoteCommand) -> RemoteResult<CommandOutput> {
            self.call().map(|()| CommandOutput::default())
        }
    }

    fn unreachable() -> RemoteError {
        RemoteError::Unreachable {
            operation: "test",
            stderr: "Connection reset".to_string(),
        }
    }

    fn failed() -> RemoteError {
        RemoteError::CommandFailed {
            operation: "test",
            exit_code: 1,
            stderr: String::new(),
        }
    }

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries, Duration::from_millis(1))
    }

    #[test]
    fn delay_doubles_per_retry() {
        let policy = RetryPolicy::new(3, Duration::from_millis(250));
        assert_eq!(policy.delay(0), Duration::from_millis(250));
        assert_eq!(policy.delay(1), Duration::from_millis(500));
        assert_eq!(policy.delay(2), Duration::from_secs(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_success() -> anyhow::Result<()> {
        let metrics = Metrics::new()?;
        let executor =
            RetryingExecutor::new(Flaky::new(2, unreachable), policy(2)).with_metrics(metrics.clone());
        let listed = executor.list_files("/ws").await?;
        assert_eq!(listed.len(), 1);
        assert_eq!(executor.inner().calls(), 3);
        assert!(
            metrics
                .render()?
                .contains(r#"scenesync_remote_retries_total{operation="list_files"} 2"#)
        );
        Ok(())
    }

    #[tokio::test]
    async fn retries_stop_at_budget() {
        let executor = RetryingExecutor::new(Flaky::new(5, unreachable), policy(1));
        let result = executor.ensure_dir("/ws").await;
        assert!(matches!(result, Err(RemoteError::Unreachable { .. })));
        assert_eq!(executor.inner().calls(), 2);
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let executor = RetryingExecutor::new(Flaky::new(1, failed), policy(3));
        let result = executor.upload_file(Path::new("/tmp/a"), "/ws/a").await;
        assert!(matches!(result, Err(RemoteError::CommandFailed { .. })));
        assert_eq!(executor.inner().calls(), 1);
    }

    #[tokio::test]
    async fn command_execution_is_never_retried() {
        let executor = RetryingExecutor::new(Flaky::new(1, unreachable), policy(3));
        let result = executor
            .run_command(&RemoteCommand::new("run_batch", "true"))
            .await;
        assert!(matches!(result, Err(RemoteError::Unreachable { .. })));
        assert_eq!(executor.inner().calls(), 1);
    }
}
