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
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions, clippy::multiple_crate_versions)]

//! Synchronization and batch-dispatch engine.
//!
//! Layout: `discovery.rs` (work items), `descriptor.rs` (job descriptors),
//! `staging.rs` (staging cache), `planner.rs` (sync planning and upload),
//! `dispatch.rs` (batches), `ledger.rs` (batch markers), `reconcile.rs`
//! (results), `pipeline.rs` (run orchestration), `error.rs`.

pub mod descriptor;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod ledger;
pub mod pipeline;
pub mod planner;
pub mod reconcile;
pub mod staging;

pub use descriptor::{DescriptorTemplate, write_descriptor};
pub use discovery::{WorkItem, discover, scene_dir_name};
pub use dispatch::{Batch, BatchResult, BatchStatus, partition, run_batches};
pub use error::{EngineError, EngineResult};
pub use ledger::{BatchMarker, DispatchLedger, LEDGER_FILE_NAME, MarkerStatus};
pub use pipeline::{Pipeline, RunMode, RunSummary};
pub use planner::{
    FileKind, UploadEntry, UploadGroup, UploadPlan, UploadReport, execute_upload, plan_upload,
    remote_asset_path, remote_descriptor_path,
};
pub use reconcile::{ReconciliationOutcome, ReconciliationSummary, ResultLayout, reconcile};
pub use staging::{
    StagingArea, StagingInventory, StagingStatus, check_staging_complete, prepare_staging,
};
