//! YAML configuration loading.
//!
//! # Design
//! - Parse into permissive document types first, then validate into the
//!   typed [`PipelineConfig`] so every default and check lives in one place.
//! - Unknown fields are rejected to catch typos in hand-written files.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::model::PipelineConfig;
use crate::validate;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ConfigDocument {
    pub(crate) remote: RemoteDocument,
    pub(crate) local: LocalDocument,
    pub(crate) remote_paths: RemotePathsDocument,
    pub(crate) scenes: ScenesDocument,
    #[serde(default)]
    pub(crate) discovery: DiscoveryDocument,
    #[serde(default)]
    pub(crate) dispatch: DispatchDocument,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RemoteDocument {
    pub(crate) host: String,
    pub(crate) port: Option<u16>,
    pub(crate) user: Option<String>,
    pub(crate) identity_file: Option<PathBuf>,
    pub(crate) ssh_options: Option<Vec<String>>,
    pub(crate) call_timeout_secs: Option<u64>,
    pub(crate) dispatch_timeout_secs: Option<u64>,
    #[serde(default)]
    pub(crate) retry: RetryDocument,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RetryDocument {
    pub(crate) max_retries: Option<u32>,
    pub(crate) base_delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct LocalDocument {
    pub(crate) source_root: PathBuf,
    pub(crate) staging_dir: PathBuf,
    pub(crate) state_dir: Option<PathBuf>,
    pub(crate) template_path: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RemotePathsDocument {
    pub(crate) base: String,
    pub(crate) assets: Option<String>,
    pub(crate) output: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ScenesDocument {
    pub(crate) start: u32,
    pub(crate) end: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct DiscoveryDocument {
    pub(crate) source_pattern: Option<String>,
    pub(crate) result_extension: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct DispatchDocument {
    pub(crate) batch_size: Option<usize>,
    pub(crate) program: Option<String>,
    pub(crate) setup: Option<String>,
    pub(crate) input_flag: Option<String>,
    pub(crate) output_flag: Option<String>,
}

/// Read and validate the configuration file at `path`.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when the file cannot be read,
/// [`ConfigError::Parse`] for malformed YAML or unknown fields, and
/// [`ConfigError::InvalidField`] when a value fails validation.
pub fn load_config(path: &Path) -> ConfigResult<PipelineConfig> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), "loaded configuration document");
    parse_config(&raw, &path.display().to_string())
}

/// Parse and validate a configuration document held in memory.
///
/// `origin` labels the document in error messages.
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] for malformed YAML or unknown fields and
/// [`ConfigError::InvalidField`] when a value fails validation.
pub fn parse_config(raw: &str, origin: &str) -> ConfigResult<PipelineConfig> {
    let document: ConfigDocument =
        serde_yaml::from_str(raw).map_err(|source| ConfigError::Parse {
            origin: origin.to_string(),
            source,
        })?;
    validate::pipeline_config(document)
}
