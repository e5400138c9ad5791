#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! File-backed pipeline configuration.
//!
//! Layout: `model.rs` (typed, validated configuration handed to every
//! component), `loader.rs` (YAML document parsing), `validate.rs`
//! (field validation), `defaults.rs` (fallback values).

mod defaults;
pub mod error;
pub mod loader;
pub mod model;
mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_config, parse_config};
pub use model::{
    DiscoverySettings, DispatchSettings, LocalPaths, PipelineConfig, RemotePaths, RemoteSettings,
    RetrySettings, SceneRange,
};
