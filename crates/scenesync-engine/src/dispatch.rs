//! Sequential batch dispatch to the remote inference program.
//!
//! # Design
//! - Batches are contiguous slices of the discovery-ordered work list; they
//!   are never re-sorted or interleaved.
//! - One remote invocation per batch, strictly one at a time.
//! - A non-zero exit aborts the run. There is no partial-batch retry since
//!   the set of outputs a failed batch produced is unknown.

use std::time::Instant;

use scenesync_config::{DispatchSettings, RemotePaths};
use scenesync_remote::{InferenceInvocation, RemoteExecutor};
use scenesync_telemetry::Metrics;
use serde::Serialize;
use tracing::{info, warn};

use crate::discovery::WorkItem;
use crate::error::{EngineError, EngineResult};
use crate::ledger::{DispatchLedger, MarkerStatus};
use crate::planner::remote_descriptor_path;

/// Contiguous slice of the work list sent in one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Batch<'a> {
    /// 1-based position of the batch in the run.
    pub number: usize,
    /// Items in discovery order.
    pub items: &'a [WorkItem],
}

impl Batch<'_> {
    /// Result names of the batch's items, in order.
    #[must_use]
    pub fn result_names(&self) -> Vec<String> {
        self.items.iter().map(|item| item.result_name.clone()).collect()
    }

    /// Remote descriptor paths of the batch's items, in order.
    #[must_use]
    pub fn descriptor_paths(&self, assets_root: &str) -> Vec<String> {
        self.items
            .iter()
            .map(|item| remote_descriptor_path(assets_root, item))
            .collect()
    }
}

/// Split `items` into consecutive batches of at most `batch_size` items.
///
/// A `batch_size` of zero is treated as one.
#[must_use]
pub fn partition(items: &[WorkItem], batch_size: usize) -> Vec<Batch<'_>> {
    items
        .chunks(batch_size.max(1))
        .enumerate()
        .map(|(index, items)| Batch {
            number: index + 1,
            items,
        })
        .collect()
}

/// What happened to a batch in this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Invoked and exited successfully.
    Completed,
    /// Already completed by an earlier run; not invoked again.
    Resumed,
}

impl BatchStatus {
    /// Metric and log label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Resumed => "resumed",
        }
    }
}

/// Outcome of one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    /// 1-based batch number.
    pub number: usize,
    /// Items in the batch.
    pub items: usize,
    /// Outcome.
    pub status: BatchStatus,
}

/// Run every batch of `items` on the remote worker, in order.
///
/// # Errors
///
/// Returns [`EngineError::BatchFailed`] when the inference program exits
/// non-zero, [`EngineError::Remote`] when the command cannot be issued, and
/// ledger errors when markers cannot be persisted. Remaining batches are
/// not issued after a failure.
pub async fn run_batches(
    items: &[WorkItem],
    settings: &DispatchSettings,
    remote_paths: &RemotePaths,
    executor: &dyn RemoteExecutor,
    ledger: &mut DispatchLedger,
    metrics: &Metrics,
) -> EngineResult<Vec<BatchResult>> {
    let batches = partition(items, settings.batch_size);
    let total = batches.len();
    let mut results = Vec::with_capacity(total);

    for batch in batches {
        let result_names = batch.result_names();
        match ledger.status_of(&result_names) {
            Some(MarkerStatus::Completed) => {
                warn!(
                    batch = batch.number,
                    total,
                    unreconciled = batch.items.len(),
                    ledger = %ledger.path().display(),
                    "batch completed by an earlier run but not yet reconciled, not dispatching; \
                     remove its ledger marker to force a re-dispatch"
                );
                metrics.inc_batch(BatchStatus::Resumed.as_str());
                results.push(BatchResult {
                    number: batch.number,
                    items: batch.items.len(),
                    status: BatchStatus::Resumed,
                });
                continue;
            }
            Some(MarkerStatus::Dispatched) => {
                warn!(
                    batch = batch.number,
                    total,
                    "batch was interrupted in an earlier run, dispatching again"
                );
            }
            None => {}
        }

        let descriptors = batch.descriptor_paths(&remote_paths.assets);
        let command = InferenceInvocation {
            workdir: &remote_paths.base,
            settings,
            descriptors: &descriptors,
            output_dir: &remote_paths.output,
        }
        .command();

        ledger.mark_dispatched(batch.number, &result_names)?;
        info!(
            batch = batch.number,
            total,
            items = batch.items.len(),
            "dispatching batch"
        );
        let started = Instant::now();
        let output = executor
            .run_command(&command)
            .await
            .map_err(|source| EngineError::remote("dispatch", source))?;
        if !output.success() {
            metrics.inc_batch("failed");
            return Err(EngineError::BatchFailed {
                batch: batch.number,
                exit_code: output.exit_code,
                stderr: output.stderr,
            });
        }

        ledger.mark_completed(batch.number, &result_names)?;
        metrics.inc_batch(BatchStatus::Completed.as_str());
        info!(
            batch = batch.number,
            total,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "batch completed"
        );
        results.push(BatchResult {
            number: batch.number,
            items: batch.items.len(),
            status: BatchStatus::Completed,
        });
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use scenesync_test_support::{FakeRemote, RemoteCall};

    fn items(count: usize) -> Vec<WorkItem> {
        (1..=count)
            .map(|index| WorkItem::new(u32::from(index > 4), format!("rgb_{index:04}.png")))
            .collect()
    }

    fn settings(batch_size: usize) -> DispatchSettings {
        DispatchSettings {
            batch_size,
            program: "python examples/inference.py".to_string(),
            setup: Some("source .venv/bin/activate".to_string()),
            input_flag: "-i".to_string(),
            output_flag: "-o".to_string(),
        }
    }

    fn remote_paths() -> RemotePaths {
        RemotePaths {
            base: "/ws".to_string(),
            assets: "/ws/assets/image_example".to_string(),
            output: "/ws/outputs/image2image".to_string(),
        }
    }

    fn seed_descriptors(remote: &FakeRemote, items: &[WorkItem]) -> Result<()> {
        for item in items {
            remote.seed_file(
                &remote_descriptor_path(&remote_paths().assets, item),
                &format!(r#"{{"name": "{}"}}"#, item.result_name),
            )?;
        }
        Ok(())
    }

    #[test]
    fn partition_covers_the_list_in_order() {
        let items = items(7);
        for batch_size in 1..=8 {
            let batches = partition(&items, batch_size);
            assert_eq!(batches.len(), items.len().div_ceil(batch_size));
            assert!(batches.iter().all(|batch| batch.items.len() <= batch_size));
            let flattened: Vec<WorkItem> = batches
                .iter()
                .flat_map(|batch| batch.items.iter().cloned())
                .collect();
            assert_eq!(flattened, items);
            let numbers: Vec<usize> = batches.iter().map(|batch| batch.number).collect();
            assert_eq!(numbers, (1..=batches.len()).collect::<Vec<_>>());
        }
    }

    #[test]
    fn partition_of_nothing_is_empty() {
        assert!(partition(&[], 4).is_empty());
    }

    #[tokio::test]
    async fn each_batch_is_one_invocation() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let remote = FakeRemote::new(dir.path().join("remote"));
        let mut ledger = DispatchLedger::open(&dir.path().join("state"))?;
        let metrics = Metrics::new()?;
        let items = items(5);
        seed_descriptors(&remote, &items)?;

        let results = run_batches(
            &items,
            &settings(2),
            &remote_paths(),
            &remote,
            &mut ledger,
            &metrics,
        )
        .await?;

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|result| result.status == BatchStatus::Completed));
        let batches = remote.batches();
        assert_eq!(batches.len(), 3);
        assert_eq!(
            batches[0],
            vec![
                "/ws/assets/image_example/scene_0_rgb_0001.json".to_string(),
                "/ws/assets/image_example/scene_0_rgb_0002.json".to_string(),
            ]
        );
        assert_eq!(
            batches[2],
            vec!["/ws/assets/image_example/scene_1_rgb_0005.json".to_string()]
        );
        let Some(RemoteCall::RunCommand { script, .. }) = remote.calls().into_iter().next() else {
            anyhow::bail!("expected a run_command call");
        };
        assert!(script.starts_with("cd /ws && source .venv/bin/activate && python examples/inference.py -i "));
        assert!(script.ends_with(" -o /ws/outputs/image2image"));
        assert!(
            ledger
                .markers()
                .iter()
                .all(|marker| marker.status == MarkerStatus::Completed)
        );
        Ok(())
    }

    #[tokio::test]
    async fn failed_batch_aborts_remaining_batches() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let remote = FakeRemote::new(dir.path().join("remote"));
        remote.fail_batch(1);
        let mut ledger = DispatchLedger::open(&dir.path().join("state"))?;
        let metrics = Metrics::new()?;
        let items = items(6);
        seed_descriptors(&remote, &items)?;

        let result = run_batches(
            &items,
            &settings(2),
            &remote_paths(),
            &remote,
            &mut ledger,
            &metrics,
        )
        .await;

        assert!(matches!(
            result,
            Err(EngineError::BatchFailed { batch: 2, exit_code: 1, .. })
        ));
        assert_eq!(remote.batches().len(), 2);
        let second = partition(&items, 2)[1].result_names();
        assert_eq!(ledger.status_of(&second), Some(MarkerStatus::Dispatched));
        assert!(metrics.render()?.contains(r#"scenesync_batches_total{status="failed"} 1"#));
        Ok(())
    }

    #[tokio::test]
    async fn ledger_resumes_completed_and_redispatches_interrupted() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let remote = FakeRemote::new(dir.path().join("remote"));
        let mut ledger = DispatchLedger::open(&dir.path().join("state"))?;
        let metrics = Metrics::new()?;
        let items = items(4);
        seed_descriptors(&remote, &items)?;
        let batches = partition(&items, 2);
        ledger.mark_completed(1, &batches[0].result_names())?;
        ledger.mark_dispatched(2, &batches[1].result_names())?;

        let results = run_batches(
            &items,
            &settings(2),
            &remote_paths(),
            &remote,
            &mut ledger,
            &metrics,
        )
        .await?;

        assert_eq!(results[0].status, BatchStatus::Resumed);
        assert_eq!(results[1].status, BatchStatus::Completed);
        assert_eq!(remote.batches().len(), 1);
        assert_eq!(
            ledger.status_of(&batches[1].result_names()),
            Some(MarkerStatus::Completed)
        );
        Ok(())
    }
}
