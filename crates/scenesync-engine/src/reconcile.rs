//! Result download and reconciliation against the work list.
//!
//! # Design
//! - One bulk download per pass into a temporary directory under the state
//!   directory; the directory is removed on every exit path.
//! - Results are joined to work items by `result_name` only, so completion
//!   order on the remote side does not matter.
//! - A matched result is moved, never copied, so a leftover file cannot be
//!   claimed twice.
//! - Missing results are reported, not raised.

use std::fs;
use std::io;
use std::path::Path;

use scenesync_remote::RemoteExecutor;
use scenesync_telemetry::Metrics;
use serde::Serialize;
use tracing::{info, warn};

use crate::discovery::WorkItem;
use crate::error::{EngineError, EngineResult};

/// Per-item reconciliation result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationOutcome {
    /// The result was downloaded and moved into the source tree.
    Matched,
    /// No result was found for the item.
    Missing,
}

impl ReconciliationOutcome {
    /// Metric and log label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Matched => "matched",
            Self::Missing => "missing",
        }
    }
}

/// Aggregate of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationSummary {
    /// Files fetched from the remote output directory.
    pub downloaded: usize,
    /// Result names moved into the source tree, in work-list order.
    pub matched: Vec<String>,
    /// Result names with no downloaded file, in work-list order.
    pub missing: Vec<String>,
}

impl ReconciliationSummary {
    /// Whether every item was matched.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Local destinations for a reconciliation pass.
#[derive(Debug, Clone, Copy)]
pub struct ResultLayout<'a> {
    /// Scene-indexed tree that receives results.
    pub source_root: &'a Path,
    /// Parent of the temporary download directory.
    pub state_dir: &'a Path,
    /// Result file extension, without the dot.
    pub extension: &'a str,
}

/// Download results from `remote_output_dir` and move each item's result to
/// `<source_root>/scene_<id>/<result_name>.<ext>`.
///
/// # Errors
///
/// Returns [`EngineError::Remote`] when the download fails and IO errors
/// when results cannot be moved. The temporary directory is removed in
/// either case.
pub async fn reconcile(
    items: &[WorkItem],
    remote_output_dir: &str,
    layout: ResultLayout<'_>,
    executor: &dyn RemoteExecutor,
    metrics: &Metrics,
) -> EngineResult<ReconciliationSummary> {
    fs::create_dir_all(layout.state_dir)
        .map_err(|source| EngineError::io("reconcile.create_state", layout.state_dir, source))?;
    let results_dir = tempfile::Builder::new()
        .prefix("results-")
        .tempdir_in(layout.state_dir)
        .map_err(|source| EngineError::io("reconcile.create_tmp", layout.state_dir, source))?;

    let pattern = format!("*.{}", layout.extension);
    let downloaded = executor
        .download_glob(remote_output_dir, &pattern, results_dir.path())
        .await
        .map_err(|source| EngineError::remote("download", source))?;
    info!(remote_output_dir, downloaded, "downloaded results");

    let mut summary = ReconciliationSummary {
        downloaded,
        ..ReconciliationSummary::default()
    };
    for item in items {
        let file_name = item.result_file_name(layout.extension);
        let fetched = results_dir.path().join(&file_name);
        let outcome = if fetched.is_file() {
            let destination = layout.source_root.join(item.scene_dir()).join(&file_name);
            move_file(&fetched, &destination)?;
            info!(
                scene_id = item.scene_id,
                result = %file_name,
                destination = %destination.display(),
                "result matched"
            );
            summary.matched.push(item.result_name.clone());
            ReconciliationOutcome::Matched
        } else {
            warn!(scene_id = item.scene_id, result = %file_name, "result missing");
            summary.missing.push(item.result_name.clone());
            ReconciliationOutcome::Missing
        };
        metrics.inc_result(outcome.as_str());
    }

    let tmp_path = results_dir.path().to_path_buf();
    results_dir
        .close()
        .map_err(|source| EngineError::io("reconcile.cleanup", tmp_path, source))?;
    info!(
        matched = summary.matched.len(),
        missing = summary.missing.len(),
        "reconciliation complete"
    );
    Ok(summary)
}

fn move_file(source: &Path, destination: &Path) -> EngineResult<()> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| EngineError::io("reconcile.create_parent", parent, err))?;
    }
    match fs::rename(source, destination) {
        Ok(()) => Ok(()),
        Err(_rename_err) => {
            fs::copy(source, destination)
                .map_err(|err| EngineError::io("reconcile.copy", destination, err))?;
            match fs::remove_file(source) {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(err) => Err(EngineError::io("reconcile.remove", source, err)),
            }
        }
    }
}
