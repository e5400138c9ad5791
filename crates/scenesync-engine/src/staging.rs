//! Local staging cache mirroring the remote asset layout.
//!
//! # Design
//! - Layout: `<root>/scene_<id>/<asset>` for assets and a flat
//!   `<root>/scene_<id>_<item>.json` per descriptor.
//! - Complete means every item has both its staged asset and descriptor. A
//!   complete area is reused verbatim; anything less is deleted and rebuilt
//!   in full so descriptors never mix template versions.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::descriptor::{DescriptorTemplate, write_descriptor};
use crate::discovery::{WorkItem, scene_dir_name};
use crate::error::{EngineError, EngineResult};

/// Handle to the staging directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    /// Address a staging area rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Staging root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the staged assets of `scene_id`.
    #[must_use]
    pub fn scene_dir(&self, scene_id: u32) -> PathBuf {
        self.root.join(scene_dir_name(scene_id))
    }

    /// Staged copy of the item's source asset.
    #[must_use]
    pub fn asset_path(&self, item: &WorkItem) -> PathBuf {
        self.scene_dir(item.scene_id).join(&item.source_filename)
    }

    /// Staged job descriptor of the item.
    #[must_use]
    pub fn descriptor_path(&self, item: &WorkItem) -> PathBuf {
        self.root.join(item.descriptor_file_name())
    }

    /// Count files and bytes currently in the staging tree.
    ///
    /// # Errors
    ///
    /// Returns an error if the tree cannot be walked.
    pub fn inventory(&self) -> EngineResult<StagingInventory> {
        let mut inventory = StagingInventory::default();
        for entry in WalkDir::new(&self.root) {
            let entry =
                entry.map_err(|source| EngineError::walkdir("staging.inventory", &self.root, source))?;
            if entry.file_type().is_file() {
                let metadata = entry
                    .metadata()
                    .map_err(|source| EngineError::walkdir("staging.inventory", entry.path(), source))?;
                inventory.files += 1;
                inventory.bytes += metadata.len();
            }
        }
        Ok(inventory)
    }
}

/// File count and size of a staging tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StagingInventory {
    /// Regular files in the tree.
    pub files: u64,
    /// Total size of those files.
    pub bytes: u64,
}

/// How [`prepare_staging`] satisfied the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StagingStatus {
    /// The existing area was complete and reused.
    Reused,
    /// The area was deleted and rebuilt.
    Rebuilt,
}

impl StagingStatus {
    /// Stable label for logs and summaries.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Reused => "reused",
            Self::Rebuilt => "rebuilt",
        }
    }
}

/// Whether every item has both its staged asset and descriptor on disk.
#[must_use]
pub fn check_staging_complete(area: &StagingArea, items: &[WorkItem]) -> bool {
    area.root().is_dir()
        && items
            .iter()
            .all(|item| area.asset_path(item).is_file() && area.descriptor_path(item).is_file())
}

/// Return a complete staging area for `items`, rebuilding it when needed.
///
/// # Errors
///
/// Returns an error if the old area cannot be removed or any asset or
/// descriptor cannot be written.
pub fn prepare_staging(
    area: &StagingArea,
    source_root: &Path,
    items: &[WorkItem],
    template: &DescriptorTemplate,
) -> EngineResult<StagingStatus> {
    if check_staging_complete(area, items) {
        info!(root = %area.root().display(), items = items.len(), "staging cache hit");
        return Ok(StagingStatus::Reused);
    }

    info!(root = %area.root().display(), items = items.len(), "staging incomplete, rebuilding");
    match fs::remove_dir_all(area.root()) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(source) => return Err(EngineError::io("staging.remove", area.root(), source)),
    }
    fs::create_dir_all(area.root())
        .map_err(|source| EngineError::io("staging.create_root", area.root(), source))?;

    for item in items {
        let scene_dir = area.scene_dir(item.scene_id);
        fs::create_dir_all(&scene_dir)
            .map_err(|source| EngineError::io("staging.create_scene", &scene_dir, source))?;

        let source = source_root.join(item.video_path());
        let staged = area.asset_path(item);
        fs::copy(&source, &staged)
            .map_err(|err| EngineError::io("staging.copy_asset", &source, err))?;

        let descriptor_path = area.descriptor_path(item);
        write_descriptor(&descriptor_path, &template.render(item))?;
        debug!(
            scene_id = item.scene_id,
            item = %item.item_name,
            descriptor = %descriptor_path.display(),
            "staged item"
        );
    }

    let inventory = area.inventory()?;
    info!(
        root = %area.root().display(),
        files = inventory.files,
        bytes = inventory.bytes,
        "staging rebuilt"
    );
    Ok(StagingStatus::Rebuilt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use scenesync_test_support::fixtures::{TEMPLATE, write_scene};
    use serde_json::Value;

    struct Fixture {
        _dir: tempfile::TempDir,
        source_root: PathBuf,
        area: StagingArea,
        template: DescriptorTemplate,
        items: Vec<WorkItem>,
    }

    fn fixture() -> Result<Fixture> {
        let dir = tempfile::tempdir()?;
        let source_root = dir.path().join("renders");
        write_scene(&source_root, 0, &["rgb_0001.png", "rgb_0002.png"])?;
        write_scene(&source_root, 1, &["rgb_0001.png"])?;
        let items = vec![
            WorkItem::new(0, "rgb_0001.png"),
            WorkItem::new(0, "rgb_0002.png"),
            WorkItem::new(1, "rgb_0001.png"),
        ];
        let template =
            DescriptorTemplate::from_value(Path::new("template.json"), serde_json::from_str(TEMPLATE)?)?;
        Ok(Fixture {
            area: StagingArea::new(dir.path().join("staging")),
            source_root,
            template,
            items,
            _dir: dir,
        })
    }

    #[test]
    fn absent_area_is_incomplete() -> Result<()> {
        let fx = fixture()?;
        assert!(!check_staging_complete(&fx.area, &fx.items));
        Ok(())
    }

    #[test]
    fn completeness_detects_a_single_missing_descriptor() -> Result<()> {
        let fx = fixture()?;
        prepare_staging(&fx.area, &fx.source_root, &fx.items, &fx.template)?;
        assert!(check_staging_complete(&fx.area, &fx.items));

        fs::remove_file(fx.area.descriptor_path(&fx.items[1]))?;
        assert!(!check_staging_complete(&fx.area, &fx.items));
        Ok(())
    }

    #[test]
    fn rebuild_stages_assets_and_descriptors() -> Result<()> {
        let fx = fixture()?;
        let status = prepare_staging(&fx.area, &fx.source_root, &fx.items, &fx.template)?;
        assert_eq!(status, StagingStatus::Rebuilt);

        let asset = fx.area.root().join("scene_1").join("rgb_0001.png");
        assert_eq!(fs::read_to_string(asset)?, "scene 1 rgb_0001.png");

        let raw = fs::read_to_string(fx.area.root().join("scene_0_rgb_0002.json"))?;
        let descriptor: Value = serde_json::from_str(&raw)?;
        assert_eq!(descriptor["video_path"], "scene_0/rgb_0002.png");
        assert_eq!(descriptor["name"], "scene_0_rgb_0002_inferred");

        let inventory = fx.area.inventory()?;
        assert_eq!(inventory.files, 6);
        assert!(inventory.bytes > 0);
        Ok(())
    }

    #[test]
    fn complete_area_is_reused_verbatim() -> Result<()> {
        let fx = fixture()?;
        prepare_staging(&fx.area, &fx.source_root, &fx.items, &fx.template)?;
        let marker = fx.area.root().join("operator-note.txt");
        fs::write(&marker, "keep")?;

        let status = prepare_staging(&fx.area, &fx.source_root, &fx.items, &fx.template)?;
        assert_eq!(status, StagingStatus::Reused);
        assert!(marker.is_file());
        Ok(())
    }

    #[test]
    fn incomplete_area_is_rebuilt_from_scratch() -> Result<()> {
        let fx = fixture()?;
        prepare_staging(&fx.area, &fx.source_root, &fx.items, &fx.template)?;
        let stale = fx.area.root().join("scene_9_rgb_0001.json");
        fs::write(&stale, "{}")?;
        fs::remove_file(fx.area.asset_path(&fx.items[0]))?;

        let status = prepare_staging(&fx.area, &fx.source_root, &fx.items, &fx.template)?;
        assert_eq!(status, StagingStatus::Rebuilt);
        assert!(!stale.exists());
        assert!(check_staging_complete(&fx.area, &fx.items));
        Ok(())
    }

    #[test]
    fn missing_source_asset_is_fatal() -> Result<()> {
        let fx = fixture()?;
        let mut items = fx.items.clone();
        items.push(WorkItem::new(1, "rgb_0099.png"));
        let result = prepare_staging(&fx.area, &fx.source_root, &items, &fx.template);
        assert!(matches!(
            result,
            Err(EngineError::Io { operation: "staging.copy_asset", .. })
        ));
        Ok(())
    }
}
