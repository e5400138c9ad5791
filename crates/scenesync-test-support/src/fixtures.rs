//! Source trees, descriptor templates, and configurations for pipeline tests.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use scenesync_config::{PipelineConfig, parse_config};

/// Remote working directory used by [`Workspace::config`].
pub const REMOTE_BASE: &str = "/ws";

/// Base descriptor template with fields the pipeline must override and
/// fields it must pass through untouched.
pub const TEMPLATE: &str = r#"{
    "prompt": "a rainy road at dusk",
    "guidance": 7,
    "video_path": "assets/placeholder.png",
    "name": "template",
    "num_video_frames_per_chunk": 93,
    "max_frames": 121,
    "edge": {
        "control_weight": 0.5
    }
}"#;

/// Isolated directory layout for one pipeline test.
pub struct Workspace {
    dir: tempfile::TempDir,
}

impl Workspace {
    /// Create an empty workspace with the template already written.
    ///
    /// # Errors
    ///
    /// Returns an error if the temporary directory or template cannot be created.
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("scenesync-").tempdir()?;
        let workspace = Self { dir };
        fs::create_dir_all(workspace.source_root())?;
        fs::create_dir_all(workspace.remote_root())?;
        fs::write(workspace.template_path(), TEMPLATE)?;
        Ok(workspace)
    }

    /// Root of the workspace.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Scene-indexed source tree.
    #[must_use]
    pub fn source_root(&self) -> PathBuf {
        self.path().join("renders")
    }

    /// Staging cache.
    #[must_use]
    pub fn staging_dir(&self) -> PathBuf {
        self.path().join("staging")
    }

    /// Ledger and temporary results directory.
    #[must_use]
    pub fn state_dir(&self) -> PathBuf {
        self.path().join("state")
    }

    /// Descriptor template file.
    #[must_use]
    pub fn template_path(&self) -> PathBuf {
        self.path().join("template.json")
    }

    /// Local directory standing in for the remote filesystem root.
    #[must_use]
    pub fn remote_root(&self) -> PathBuf {
        self.path().join("remote")
    }

    /// Write source assets for one scene and return the scene directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the files cannot be written.
    pub fn write_scene(&self, scene_id: u32, files: &[&str]) -> Result<PathBuf> {
        write_scene(&self.source_root(), scene_id, files)
    }

    /// Build a validated configuration pointing at this workspace.
    ///
    /// # Errors
    ///
    /// Returns an error if the generated document fails validation.
    pub fn config(&self, start: u32, end: u32, batch_size: usize) -> Result<PipelineConfig> {
        let raw = format!(
            "remote:\n  host: worker.test\n  retry:\n    max_retries: 0\n    base_delay_ms: 1\n\
             local:\n  source_root: '{}'\n  staging_dir: '{}'\n  state_dir: '{}'\n  template_path: '{}'\n\
             remote_paths:\n  base: {REMOTE_BASE}\n\
             scenes:\n  start: {start}\n  end: {end}\n\
             dispatch:\n  batch_size: {batch_size}\n",
            self.source_root().display(),
            self.staging_dir().display(),
            self.state_dir().display(),
            self.template_path().display(),
        );
        parse_config(&raw, "fixture").context("fixture configuration rejected")
    }
}

/// Write placeholder source assets for `scene_id` under `source_root`.
///
/// # Errors
///
/// Returns an error if the directory or files cannot be written.
pub fn write_scene(source_root: &Path, scene_id: u32, files: &[&str]) -> Result<PathBuf> {
    let scene_dir = source_root.join(format!("scene_{scene_id}"));
    fs::create_dir_all(&scene_dir)?;
    for file in files {
        fs::write(scene_dir.join(file), format!("scene {scene_id} {file}"))?;
    }
    Ok(scene_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_config_points_into_workspace() -> Result<()> {
        let workspace = Workspace::new()?;
        let config = workspace.config(0, 2, 3)?;
        assert_eq!(config.local.source_root, workspace.source_root());
        assert_eq!(config.remote_paths.assets, "/ws/assets/image_example");
        assert_eq!(config.remote_paths.output, "/ws/outputs/image2image");
        assert_eq!(config.dispatch.batch_size, 3);
        assert_eq!(config.remote.retry.max_retries, 0);
        Ok(())
    }

    #[test]
    fn write_scene_creates_named_files() -> Result<()> {
        let workspace = Workspace::new()?;
        let dir = workspace.write_scene(4, &["rgb_0001.png", "depth_0001.png"])?;
        assert!(dir.join("rgb_0001.png").is_file());
        assert!(dir.join("depth_0001.png").is_file());
        assert!(dir.ends_with("scene_4"));
        Ok(())
    }
}
