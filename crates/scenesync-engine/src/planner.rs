//! Remote sync planning and upload execution.
//!
//! # Design
//! - The remote asset root is listed once per pass; a path's presence is
//!   taken as proof of a prior successful upload (no content comparison).
//! - A failed listing degrades to "nothing exists remotely" so the run can
//!   make progress at the cost of redundant uploads.
//! - Uploads are grouped by remote directory; each directory is created once
//!   before its files are sent.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use scenesync_remote::RemoteExecutor;
use scenesync_telemetry::Metrics;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::discovery::WorkItem;
use crate::error::{EngineError, EngineResult};
use crate::staging::StagingArea;

/// Remote path of the item's asset under the asset root.
#[must_use]
pub fn remote_asset_path(assets_root: &str, item: &WorkItem) -> String {
    format!("{assets_root}/{}", item.video_path())
}

/// Remote path of the item's descriptor under the asset root.
#[must_use]
pub fn remote_descriptor_path(assets_root: &str, item: &WorkItem) -> String {
    format!("{assets_root}/{}", item.descriptor_file_name())
}

/// Kind of staged file being transferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    /// Source asset copy.
    Asset,
    /// Job descriptor.
    Descriptor,
}

impl FileKind {
    /// Metric and log label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asset => "asset",
            Self::Descriptor => "descriptor",
        }
    }
}

/// One file to transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadEntry {
    /// Staged local file.
    pub local: PathBuf,
    /// Remote absolute destination path.
    pub remote_path: String,
    /// What the file is.
    pub kind: FileKind,
}

/// Files sharing one remote destination directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadGroup {
    /// Remote directory created before transferring.
    pub remote_dir: String,
    /// Files to transfer, in work-item order.
    pub entries: Vec<UploadEntry>,
    /// Staged scene directory to send in one recursive transfer when the
    /// group covers every asset of that scene.
    pub whole_dir: Option<PathBuf>,
}

/// Minimal set of files to transfer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadPlan {
    /// Groups ordered by remote directory.
    pub groups: Vec<UploadGroup>,
    /// Staged files already present remotely.
    pub skipped: usize,
    /// Whether the remote listing failed and every file was planned.
    pub listing_degraded: bool,
}

impl UploadPlan {
    /// Number of files to transfer.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.groups.iter().map(|group| group.entries.len()).sum()
    }

    /// Whether nothing needs to be transferred.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Outcome of [`execute_upload`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UploadReport {
    /// Files transferred.
    pub uploaded: usize,
    /// Files skipped because they already existed remotely.
    pub skipped: usize,
}

/// Compute which staged files are absent from the remote asset root.
///
/// Never fails on a listing error; see [`UploadPlan::listing_degraded`].
pub async fn plan_upload(
    items: &[WorkItem],
    area: &StagingArea,
    assets_root: &str,
    executor: &dyn RemoteExecutor,
    metrics: &Metrics,
) -> UploadPlan {
    let (remote_files, listing_degraded) = match executor.list_files(assets_root).await {
        Ok(files) => {
            debug!(assets_root, remote_files = files.len(), "listed remote assets");
            (files, false)
        }
        Err(err) => {
            warn!(
                assets_root,
                error = %err,
                "remote listing failed, assuming nothing exists remotely"
            );
            metrics.inc_listing_degraded();
            (BTreeSet::new(), true)
        }
    };

    let mut grouped: BTreeMap<String, Vec<UploadEntry>> = BTreeMap::new();
    let mut scene_assets: BTreeMap<u32, usize> = BTreeMap::new();
    let mut skipped = 0;
    for item in items {
        *scene_assets.entry(item.scene_id).or_default() += 1;
        let candidates = [
            (
                FileKind::Asset,
                area.asset_path(item),
                remote_asset_path(assets_root, item),
                format!("{assets_root}/{}", item.scene_dir()),
            ),
            (
                FileKind::Descriptor,
                area.descriptor_path(item),
                remote_descriptor_path(assets_root, item),
                assets_root.to_string(),
            ),
        ];
        for (kind, local, remote_path, remote_dir) in candidates {
            if remote_files.contains(&remote_path) {
                debug!(kind = kind.as_str(), remote_path = %remote_path, "already on remote, skipping");
                metrics.inc_upload_skip();
                skipped += 1;
                continue;
            }
            info!(kind = kind.as_str(), remote_path = %remote_path, "scheduled for upload");
            grouped.entry(remote_dir).or_default().push(UploadEntry {
                local,
                remote_path,
                kind,
            });
        }
    }

    let groups = grouped
        .into_iter()
        .map(|(remote_dir, entries)| {
            let whole_dir = whole_scene(items, area, assets_root, &remote_dir, &entries, &scene_assets);
            UploadGroup {
                remote_dir,
                entries,
                whole_dir,
            }
        })
        .collect();

    UploadPlan {
        groups,
        skipped,
        listing_degraded,
    }
}

fn whole_scene(
    items: &[WorkItem],
    area: &StagingArea,
    assets_root: &str,
    remote_dir: &str,
    entries: &[UploadEntry],
    scene_assets: &BTreeMap<u32, usize>,
) -> Option<PathBuf> {
    let first = entries.first()?;
    if first.kind != FileKind::Asset {
        return None;
    }
    let scene_id = items
        .iter()
        .find(|item| remote_asset_path(assets_root, item) == first.remote_path)?
        .scene_id;
    let total = scene_assets.get(&scene_id).copied().unwrap_or_default();
    (entries.len() == total && remote_dir.ends_with(&format!("/scene_{scene_id}")))
        .then(|| area.scene_dir(scene_id))
}

/// Transfer every file in `plan`.
///
/// # Errors
///
/// Returns [`EngineError::Remote`] on the first failed directory creation
/// or transfer.
pub async fn execute_upload(
    plan: &UploadPlan,
    executor: &dyn RemoteExecutor,
    metrics: &Metrics,
) -> EngineResult<UploadReport> {
    let mut uploaded = 0;
    for group in &plan.groups {
        executor
            .ensure_dir(&group.remote_dir)
            .await
            .map_err(|source| EngineError::remote("upload", source))?;

        if let Some(scene_dir) = &group.whole_dir {
            let parent = group
                .remote_dir
                .rsplit_once('/')
                .map_or("/", |(parent, _)| parent);
            executor
                .upload_dir(scene_dir, parent)
                .await
                .map_err(|source| EngineError::remote("upload", source))?;
            info!(
                remote_dir = %group.remote_dir,
                files = group.entries.len(),
                "uploaded scene directory"
            );
            for entry in &group.entries {
                metrics.inc_upload(entry.kind.as_str());
            }
            uploaded += group.entries.len();
            continue;
        }

        for entry in &group.entries {
            executor
                .upload_file(&entry.local, &entry.remote_path)
                .await
                .map_err(|source| EngineError::remote("upload", source))?;
            debug!(kind = entry.kind.as_str(), remote_path = %entry.remote_path, "uploaded");
            metrics.inc_upload(entry.kind.as_str());
            uploaded += 1;
        }
    }

    info!(uploaded, skipped = plan.skipped, "upload complete");
    Ok(UploadReport {
        uploaded,
        skipped: plan.skipped,
    })
}
