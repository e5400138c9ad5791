//! Work-item discovery over the scene-indexed source tree.
//!
//! # Design
//! - Output order is `(scene_id, file name)` ascending; batch membership
//!   depends on it.
//! - A missing scene directory is expected and only warned about; an
//!   unreadable one aborts the run.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::Path;

use regex::Regex;
use scenesync_config::SceneRange;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};

/// One source asset to be processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkItem {
    /// Scene the asset belongs to.
    pub scene_id: u32,
    /// File name of the source asset inside its scene directory.
    pub source_filename: String,
    /// File name without its extension; unique within a scene.
    pub item_name: String,
    /// Join key between dispatched work and downloaded results.
    pub result_name: String,
}

impl WorkItem {
    /// Derive a work item from its scene and source file name.
    #[must_use]
    pub fn new(scene_id: u32, source_filename: impl Into<String>) -> Self {
        let source_filename = source_filename.into();
        let item_name = source_filename
            .rsplit_once('.')
            .map_or(source_filename.as_str(), |(stem, _)| stem)
            .to_string();
        let result_name = format!("scene_{scene_id}_{item_name}_inferred");
        Self {
            scene_id,
            source_filename,
            item_name,
            result_name,
        }
    }

    /// Directory name of the item's scene (`scene_<id>`).
    #[must_use]
    pub fn scene_dir(&self) -> String {
        scene_dir_name(self.scene_id)
    }

    /// Scene-relative path of the source asset (`scene_<id>/<file>`).
    #[must_use]
    pub fn video_path(&self) -> String {
        format!("{}/{}", self.scene_dir(), self.source_filename)
    }

    /// File name of the item's job descriptor.
    #[must_use]
    pub fn descriptor_file_name(&self) -> String {
        format!("scene_{}_{}.json", self.scene_id, self.item_name)
    }

    /// File name of the item's result with the given extension.
    #[must_use]
    pub fn result_file_name(&self, extension: &str) -> String {
        format!("{}.{extension}", self.result_name)
    }
}

/// Directory name used for a scene in every tree the pipeline touches.
#[must_use]
pub fn scene_dir_name(scene_id: u32) -> String {
    format!("scene_{scene_id}")
}

/// Scan `source_root` for source assets in every scene of `scenes`.
///
/// # Errors
///
/// Returns [`EngineError::Discovery`] when a scene directory exists but
/// cannot be listed.
pub fn discover(
    source_root: &Path,
    scenes: SceneRange,
    pattern: &Regex,
) -> EngineResult<Vec<WorkItem>> {
    let mut items = Vec::new();
    let mut scenes_found = 0_usize;
    for scene_id in scenes.ids() {
        let scene_dir = source_root.join(scene_dir_name(scene_id));
        let names = match list_file_names(&scene_dir) {
            Ok(names) => names,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                warn!(scene_id, path = %scene_dir.display(), "scene directory missing, skipping");
                continue;
            }
            Err(source) => {
                return Err(EngineError::Discovery {
                    path: scene_dir,
                    source,
                });
            }
        };
        scenes_found += 1;

        let mut seen = BTreeSet::new();
        let before = items.len();
        for name in names.into_iter().filter(|name| pattern.is_match(name)) {
            let item = WorkItem::new(scene_id, name);
            if !seen.insert(item.item_name.clone()) {
                warn!(
                    scene_id,
                    file = %item.source_filename,
                    "duplicate item name within scene, skipping"
                );
                continue;
            }
            items.push(item);
        }
        debug!(scene_id, items = items.len() - before, "scene scanned");
    }
    info!(
        scenes_found,
        items = items.len(),
        "discovery complete"
    );
    Ok(items)
}

fn list_file_names(dir: &Path) -> io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.path().is_file() {
            continue;
        }
        if let Ok(name) = entry.file_name().into_string() {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}
