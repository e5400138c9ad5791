//! End-to-end orchestration of one run.
//!
//! # Design
//! - Full mode: discovery, staging, sync planning, upload, dispatch,
//!   reconciliation. Download-only mode re-enters at reconciliation with a
//!   fresh discovery.
//! - Stages run strictly in sequence; each remote call completes before the
//!   next is issued.
//! - Configuration is borrowed, never copied into globals.

use std::collections::BTreeSet;

use scenesync_config::PipelineConfig;
use scenesync_remote::RemoteExecutor;
use scenesync_telemetry::Metrics;
use serde::Serialize;
use tracing::{info, warn};

use crate::descriptor::DescriptorTemplate;
use crate::discovery::{WorkItem, discover};
use crate::dispatch::{BatchStatus, run_batches};
use crate::error::EngineResult;
use crate::ledger::DispatchLedger;
use crate::planner::{execute_upload, plan_upload};
use crate::reconcile::{ReconciliationSummary, ResultLayout, reconcile};
use crate::staging::{StagingArea, StagingStatus, prepare_staging};

/// Which stages a run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Every stage.
    Full,
    /// Reconciliation only.
    DownloadOnly,
}

impl RunMode {
    /// Stable label for logs and summaries.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::DownloadOnly => "download_only",
        }
    }
}

/// Totals reported at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Mode the run executed in.
    pub mode: RunMode,
    /// Work items discovered.
    pub work_items: usize,
    /// How staging was satisfied; absent in download-only mode.
    pub staging: Option<StagingStatus>,
    /// Files transferred to the remote asset root.
    pub uploaded: usize,
    /// Files skipped because they already existed remotely.
    pub upload_skipped: usize,
    /// Whether the remote listing failed and everything was uploaded.
    pub listing_degraded: bool,
    /// Batches invoked in this run.
    pub batches_dispatched: usize,
    /// Batches skipped because an earlier run completed them.
    pub batches_resumed: usize,
    /// Files fetched from the remote output directory.
    pub downloaded: usize,
    /// Items whose result was placed into the source tree.
    pub matched: usize,
    /// Items with no result.
    pub missing: usize,
    /// Result names of the missing items.
    pub missing_results: Vec<String>,
}

impl RunSummary {
    const fn empty(mode: RunMode) -> Self {
        Self {
            mode,
            work_items: 0,
            staging: None,
            uploaded: 0,
            upload_skipped: 0,
            listing_degraded: false,
            batches_dispatched: 0,
            batches_resumed: 0,
            downloaded: 0,
            matched: 0,
            missing: 0,
            missing_results: Vec::new(),
        }
    }

    fn record_reconciliation(&mut self, reconciliation: ReconciliationSummary) {
        self.downloaded = reconciliation.downloaded;
        self.matched = reconciliation.matched.len();
        self.missing = reconciliation.missing.len();
        self.missing_results = reconciliation.missing;
    }

    /// Whether every work item has its result.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.missing == 0
    }
}

/// Runs the pipeline against one remote worker.
pub struct Pipeline<'a> {
    config: &'a PipelineConfig,
    executor: &'a dyn RemoteExecutor,
    metrics: Metrics,
}

impl<'a> Pipeline<'a> {
    /// Bind a configuration, executor, and metrics registry.
    #[must_use]
    pub const fn new(
        config: &'a PipelineConfig,
        executor: &'a dyn RemoteExecutor,
        metrics: Metrics,
    ) -> Self {
        Self {
            config,
            executor,
            metrics,
        }
    }

    /// Metrics registry updated by the run.
    #[must_use]
    pub const fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Execute the stages for `mode`.
    ///
    /// # Errors
    ///
    /// Returns the first structural failure: an unreadable scene directory,
    /// a staging write failure, an upload failure, a failed batch, a failed
    /// download, or a ledger failure.
    pub async fn run(&self, mode: RunMode) -> EngineResult<RunSummary> {
        match mode {
            RunMode::Full => self.run_full().await,
            RunMode::DownloadOnly => self.run_download_only().await,
        }
    }

    /// Discovery through reconciliation.
    ///
    /// # Errors
    ///
    /// See [`Pipeline::run`].
    pub async fn run_full(&self) -> EngineResult<RunSummary> {
        let mut summary = RunSummary::empty(RunMode::Full);
        let items = self.discover()?;
        summary.work_items = items.len();
        if items.is_empty() {
            warn!("no work items discovered, nothing to do");
            return Ok(summary);
        }

        let template = DescriptorTemplate::load(&self.config.local.template_path)?;
        let area = StagingArea::new(&self.config.local.staging_dir);
        summary.staging = Some(prepare_staging(
            &area,
            &self.config.local.source_root,
            &items,
            &template,
        )?);

        let assets_root = &self.config.remote_paths.assets;
        let plan = plan_upload(&items, &area, assets_root, self.executor, &self.metrics).await;
        summary.listing_degraded = plan.listing_degraded;
        let report = execute_upload(&plan, self.executor, &self.metrics).await?;
        summary.uploaded = report.uploaded;
        summary.upload_skipped = report.skipped;

        let mut ledger = DispatchLedger::open(&self.config.local.state_dir)?;
        let batches = run_batches(
            &items,
            &self.config.dispatch,
            &self.config.remote_paths,
            self.executor,
            &mut ledger,
            &self.metrics,
        )
        .await?;
        summary.batches_dispatched = batches
            .iter()
            .filter(|batch| batch.status == BatchStatus::Completed)
            .count();
        summary.batches_resumed = batches.len() - summary.batches_dispatched;

        let reconciliation = self.reconcile(&items, &mut ledger).await?;
        summary.record_reconciliation(reconciliation);
        log_summary(&summary);
        Ok(summary)
    }

    /// Reconciliation of the current work list only.
    ///
    /// # Errors
    ///
    /// See [`Pipeline::run`].
    pub async fn run_download_only(&self) -> EngineResult<RunSummary> {
        let mut summary = RunSummary::empty(RunMode::DownloadOnly);
        let items = self.discover()?;
        summary.work_items = items.len();
        if items.is_empty() {
            warn!("no work items discovered, nothing to reconcile");
            return Ok(summary);
        }

        let mut ledger = DispatchLedger::open(&self.config.local.state_dir)?;
        let reconciliation = self.reconcile(&items, &mut ledger).await?;
        summary.record_reconciliation(reconciliation);
        log_summary(&summary);
        Ok(summary)
    }

    fn discover(&self) -> EngineResult<Vec<WorkItem>> {
        let items = discover(
            &self.config.local.source_root,
            self.config.scenes,
            &self.config.discovery.source_pattern,
        )?;
        self.metrics.set_work_items(items.len());
        Ok(items)
    }

    async fn reconcile(
        &self,
        items: &[WorkItem],
        ledger: &mut DispatchLedger,
    ) -> EngineResult<ReconciliationSummary> {
        let layout = ResultLayout {
            source_root: &self.config.local.source_root,
            state_dir: &self.config.local.state_dir,
            extension: &self.config.discovery.result_extension,
        };
        let reconciliation = reconcile(
            items,
            &self.config.remote_paths.output,
            layout,
            self.executor,
            &self.metrics,
        )
        .await?;
        let matched: BTreeSet<String> = reconciliation.matched.iter().cloned().collect();
        let cleared = ledger.clear_matched(&matched)?;
        if cleared > 0 {
            info!(cleared, "cleared reconciled batch markers");
        }
        let missing_names: BTreeSet<String> = reconciliation.missing.iter().cloned().collect();
        for (batch, missing) in ledger.unreconciled(&missing_names) {
            warn!(
                batch,
                missing,
                ledger = %ledger.path().display(),
                "completed batch is still missing results and will not be dispatched again \
                 until its ledger marker is removed"
            );
        }
        Ok(reconciliation)
    }
}

fn log_summary(summary: &RunSummary) {
    info!(
        mode = summary.mode.as_str(),
        work_items = summary.work_items,
        uploaded = summary.uploaded,
        upload_skipped = summary.upload_skipped,
        batches_dispatched = summary.batches_dispatched,
        batches_resumed = summary.batches_resumed,
        matched = summary.matched,
        missing = summary.missing,
        "run finished"
    );
}
