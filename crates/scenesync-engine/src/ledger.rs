//! Crash-safe record of dispatched batches.
//!
//! # Design
//! - One marker per batch, keyed by the batch's ordered result names, so a
//!   marker only matches a later batch with identical membership.
//! - `dispatched` is written before the remote command runs and becomes
//!   `completed` once it exits successfully. A leftover `dispatched` marker
//!   therefore means the previous run died mid-batch.
//! - Markers are dropped once reconciliation has matched every item of
//!   their batch.
//! - The ledger file is replaced atomically (write then rename).

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EngineError, EngineResult};

/// File name of the ledger inside the state directory.
pub const LEDGER_FILE_NAME: &str = "dispatch-ledger.json";

/// Progress of one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerStatus {
    /// The remote command was issued and has not been confirmed.
    Dispatched,
    /// The remote command exited successfully.
    Completed,
}

/// Ledger entry for one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchMarker {
    /// 1-based batch number in the run that wrote the marker.
    pub batch: usize,
    /// Ordered result names of the batch's items.
    pub result_names: Vec<String>,
    /// Current status.
    pub status: MarkerStatus,
    /// Time of the last status change.
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerDocument {
    markers: Vec<BatchMarker>,
}

/// Batch markers persisted under the state directory.
#[derive(Debug, Clone)]
pub struct DispatchLedger {
    path: PathBuf,
    markers: Vec<BatchMarker>,
}

impl DispatchLedger {
    /// Load the ledger from `state_dir`, starting empty when none exists.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Ledger`] when the file exists but is not a
    /// valid ledger, or an IO error when it cannot be read.
    pub fn open(state_dir: &Path) -> EngineResult<Self> {
        let path = state_dir.join(LEDGER_FILE_NAME);
        let markers = match fs::read_to_string(&path) {
            Ok(raw) => {
                serde_json::from_str::<LedgerDocument>(&raw)
                    .map_err(|source| EngineError::Ledger {
                        path: path.clone(),
                        source,
                    })?
                    .markers
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(source) => return Err(EngineError::io("ledger.read", &path, source)),
        };
        debug!(path = %path.display(), markers = markers.len(), "opened dispatch ledger");
        Ok(Self { path, markers })
    }

    /// Ledger file location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Markers currently recorded.
    #[must_use]
    pub fn markers(&self) -> &[BatchMarker] {
        &self.markers
    }

    /// Status of the batch with exactly these result names, if recorded.
    #[must_use]
    pub fn status_of(&self, result_names: &[String]) -> Option<MarkerStatus> {
        self.markers
            .iter()
            .find(|marker| marker.result_names == result_names)
            .map(|marker| marker.status)
    }

    /// Completed batches with results still missing, as `(batch, missing)`.
    ///
    /// Later full runs skip these batches until their marker is removed.
    #[must_use]
    pub fn unreconciled(&self, missing: &BTreeSet<String>) -> Vec<(usize, usize)> {
        self.markers
            .iter()
            .filter(|marker| marker.status == MarkerStatus::Completed)
            .filter_map(|marker| {
                let count = marker
                    .result_names
                    .iter()
                    .filter(|name| missing.contains(*name))
                    .count();
                (count > 0).then_some((marker.batch, count))
            })
            .collect()
    }

    /// Record that `batch` is about to be issued.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be persisted.
    pub fn mark_dispatched(&mut self, batch: usize, result_names: &[String]) -> EngineResult<()> {
        self.upsert(batch, result_names, MarkerStatus::Dispatched);
        self.persist()
    }

    /// Record that `batch` finished successfully on the remote side.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be persisted.
    pub fn mark_completed(&mut self, batch: usize, result_names: &[String]) -> EngineResult<()> {
        self.upsert(batch, result_names, MarkerStatus::Completed);
        self.persist()
    }

    /// Drop every marker whose items were all matched, returning how many
    /// were dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be persisted.
    pub fn clear_matched(&mut self, matched: &BTreeSet<String>) -> EngineResult<usize> {
        let before = self.markers.len();
        self.markers.retain(|marker| {
            !marker
                .result_names
                .iter()
                .all(|name| matched.contains(name))
        });
        let cleared = before - self.markers.len();
        if cleared > 0 {
            self.persist()?;
        }
        Ok(cleared)
    }

    fn upsert(&mut self, batch: usize, result_names: &[String], status: MarkerStatus) {
        let updated_at = Utc::now();
        if let Some(marker) = self
            .markers
            .iter_mut()
            .find(|marker| marker.result_names == result_names)
        {
            marker.batch = batch;
            marker.status = status;
            marker.updated_at = updated_at;
            return;
        }
        self.markers.push(BatchMarker {
            batch,
            result_names: result_names.to_vec(),
            status,
            updated_at,
        });
    }

    fn persist(&self) -> EngineResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| EngineError::io("ledger.create_dir", parent, source))?;
        }
        let document = LedgerDocument {
            markers: self.markers.clone(),
        };
        let serialised = serde_json::to_string_pretty(&document)
            .map_err(|source| EngineError::json("ledger.serialize", &self.path, source))?;
        let staged = self.path.with_extension("json.tmp");
        fs::write(&staged, serialised)
            .map_err(|source| EngineError::io("ledger.write", &staged, source))?;
        fs::rename(&staged, &self.path)
            .map_err(|source| EngineError::io("ledger.replace", &self.path, source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn missing_ledger_opens_empty() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let ledger = DispatchLedger::open(&dir.path().join("state"))?;
        assert!(ledger.markers().is_empty());
        assert!(!ledger.path().exists());
        Ok(())
    }

    #[test]
    fn markers_survive_reopen_and_progress() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let batch = names(&["scene_0_rgb_0001_inferred", "scene_0_rgb_0002_inferred"]);

        let mut ledger = DispatchLedger::open(dir.path())?;
        ledger.mark_dispatched(1, &batch)?;
        let reopened = DispatchLedger::open(dir.path())?;
        assert_eq!(reopened.status_of(&batch), Some(MarkerStatus::Dispatched));

        ledger.mark_completed(1, &batch)?;
        let reopened = DispatchLedger::open(dir.path())?;
        assert_eq!(reopened.status_of(&batch), Some(MarkerStatus::Completed));
        assert_eq!(reopened.markers().len(), 1);
        Ok(())
    }

    #[test]
    fn membership_must_match_exactly() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut ledger = DispatchLedger::open(dir.path())?;
        ledger.mark_completed(1, &names(&["a", "b"]))?;

        assert_eq!(ledger.status_of(&names(&["a"])), None);
        assert_eq!(ledger.status_of(&names(&["b", "a"])), None);
        assert_eq!(
            ledger.status_of(&names(&["a", "b"])),
            Some(MarkerStatus::Completed)
        );
        Ok(())
    }

    #[test]
    fn clear_matched_keeps_partially_matched_batches() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut ledger = DispatchLedger::open(dir.path())?;
        ledger.mark_completed(1, &names(&["a", "b"]))?;
        ledger.mark_completed(2, &names(&["c", "d"]))?;

        let matched: BTreeSet<String> = names(&["a", "b", "c"]).into_iter().collect();
        assert_eq!(ledger.clear_matched(&matched)?, 1);

        let reopened = DispatchLedger::open(dir.path())?;
        assert_eq!(reopened.markers().len(), 1);
        assert_eq!(reopened.markers()[0].batch, 2);
        Ok(())
    }

    #[test]
    fn unreconciled_reports_completed_batches_with_missing_results() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut ledger = DispatchLedger::open(dir.path())?;
        ledger.mark_completed(1, &names(&["a", "b"]))?;
        ledger.mark_completed(2, &names(&["c", "d"]))?;
        ledger.mark_dispatched(3, &names(&["e"]))?;

        let missing: BTreeSet<String> = names(&["b", "c", "d", "e"]).into_iter().collect();
        assert_eq!(ledger.unreconciled(&missing), vec![(1, 1), (2, 2)]);
        assert!(ledger.unreconciled(&BTreeSet::new()).is_empty());
        Ok(())
    }

    #[test]
    fn corrupt_ledger_is_reported() -> Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join(LEDGER_FILE_NAME), "[not a ledger")?;
        assert!(matches!(
            DispatchLedger::open(dir.path()),
            Err(EngineError::Ledger { .. })
        ));
        Ok(())
    }
}
