//! Fallback values applied when the configuration document omits a field.
//!
//! # Design
//! - Mirror the layout of the remote inference checkout so a minimal file only
//!   needs the host, the local paths, and the scene range.

pub(crate) const SSH_PORT: u16 = 22;
pub(crate) const SSH_USER: &str = "root";
pub(crate) const SSH_OPTIONS: &[&str] = &["StrictHostKeyChecking=accept-new"];
pub(crate) const CALL_TIMEOUT_SECS: u64 = 120;
pub(crate) const RETRY_MAX: u32 = 2;
pub(crate) const RETRY_BASE_DELAY_MS: u64 = 1_000;

pub(crate) const STATE_DIR: &str = ".scenesync";
pub(crate) const ASSETS_SUBDIR: &str = "assets/image_example";
pub(crate) const OUTPUT_SUBDIR: &str = "outputs/image2image";

pub(crate) const SOURCE_PATTERN: &str = r"^rgb_\d{4}\.png$";
pub(crate) const RESULT_EXTENSION: &str = "jpg";

pub(crate) const BATCH_SIZE: usize = 16;
pub(crate) const PROGRAM: &str = "python examples/inference.py";
pub(crate) const SETUP: &str = "source .venv/bin/activate";
pub(crate) const INPUT_FLAG: &str = "-i";
pub(crate) const OUTPUT_FLAG: &str = "-o";
