//! Typed configuration handed to every pipeline component.
//!
//! # Design
//! - Values are validated once at load time and immutable afterwards.
//! - Components receive the section they need by reference; there is no
//!   process-wide configuration state.

use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;

use regex::Regex;

/// Complete, validated pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Connection settings for the remote worker.
    pub remote: RemoteSettings,
    /// Local directories used by the pipeline.
    pub local: LocalPaths,
    /// Directories on the remote worker.
    pub remote_paths: RemotePaths,
    /// Inclusive range of scenes to process.
    pub scenes: SceneRange,
    /// Source asset matching and result naming.
    pub discovery: DiscoverySettings,
    /// Batch sizing and the remote inference invocation.
    pub dispatch: DispatchSettings,
}

/// Connection settings for the single remote worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSettings {
    /// Hostname or IP address of the worker.
    pub host: String,
    /// SSH port.
    pub port: u16,
    /// Login user.
    pub user: String,
    /// Optional private key passed to ssh/scp with `-i`.
    pub identity_file: Option<PathBuf>,
    /// Extra `-o` options passed to ssh/scp.
    pub ssh_options: Vec<String>,
    /// Timeout applied to listing, directory creation, and transfers.
    pub call_timeout: Duration,
    /// Optional timeout for a batch dispatch; unbounded when absent.
    pub dispatch_timeout: Option<Duration>,
    /// Retry policy for transient remote failures.
    pub retry: RetrySettings,
}

impl RemoteSettings {
    /// Render the `user@host` destination used by ssh and scp.
    #[must_use]
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}

/// Retry policy for transient remote failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySettings {
    /// Number of retries after the first failed attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub base_delay: Duration,
}

/// Local directories used by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalPaths {
    /// Scene-indexed source tree (`<root>/scene_<id>/<asset>`).
    pub source_root: PathBuf,
    /// Staging cache mirroring the remote asset layout.
    pub staging_dir: PathBuf,
    /// Directory holding the dispatch ledger and temporary results.
    pub state_dir: PathBuf,
    /// Base job-descriptor template (JSON object).
    pub template_path: PathBuf,
}

/// Directories on the remote worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePaths {
    /// Working directory of the inference checkout.
    pub base: String,
    /// Remote asset root that mirrors the staging cache.
    pub assets: String,
    /// Directory the inference program writes results into.
    pub output: String,
}

/// Inclusive scene-id range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneRange {
    /// First scene id.
    pub start: u32,
    /// Last scene id (inclusive).
    pub end: u32,
}

impl SceneRange {
    /// Iterate over every scene id in ascending order.
    #[must_use]
    pub const fn ids(&self) -> RangeInclusive<u32> {
        self.start..=self.end
    }
}

/// Source asset matching and result naming.
#[derive(Debug, Clone)]
pub struct DiscoverySettings {
    /// Pattern a file name must match to be a source asset.
    pub source_pattern: Regex,
    /// Extension of result files produced by the inference program.
    pub result_extension: String,
}

/// Batch sizing and the remote inference invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchSettings {
    /// Maximum number of work items per remote invocation.
    pub batch_size: usize,
    /// Inference program (and fixed leading arguments).
    pub program: String,
    /// Optional shell prelude run before the program (e.g. venv activation).
    pub setup: Option<String>,
    /// Flag preceding the descriptor path list.
    pub input_flag: String,
    /// Flag preceding the output directory.
    pub output_flag: String,
}
