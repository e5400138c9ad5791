//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - A run is short-lived, so metrics are exported as a textfile at the end
//!   of the run rather than served over HTTP.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::error::{Result, TelemetryError};

/// Prometheus-backed metrics registry shared by the pipeline stages.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    uploads_total: IntCounterVec,
    upload_skips_total: IntCounter,
    listing_degraded_total: IntCounter,
    batches_total: IntCounterVec,
    results_total: IntCounterVec,
    remote_retries_total: IntCounterVec,
    work_items: IntGauge,
}

/// Snapshot of the run counters for summaries and tests.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    /// Work items discovered in the current run.
    pub work_items: i64,
    /// Files skipped because they already exist remotely.
    pub upload_skips_total: u64,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let uploads_total = counter_vec(
            &registry,
            "scenesync_uploads_total",
            "Files uploaded to the remote asset store by kind",
            &["kind"],
        )?;
        let upload_skips_total = counter(
            &registry,
            "scenesync_upload_skips_total",
            "Files skipped because they already exist remotely",
        )?;
        let listing_degraded_total = counter(
            &registry,
            "scenesync_listing_degraded_total",
            "Sync passes that fell back to a full upload after a failed remote listing",
        )?;
        let batches_total = counter_vec(
            &registry,
            "scenesync_batches_total",
            "Inference batches by outcome",
            &["status"],
        )?;
        let results_total = counter_vec(
            &registry,
            "scenesync_results_total",
            "Reconciled work items by outcome",
            &["outcome"],
        )?;
        let remote_retries_total = counter_vec(
            &registry,
            "scenesync_remote_retries_total",
            "Retries of transient remote failures by operation",
            &["operation"],
        )?;
        let work_items = IntGauge::with_opts(Opts::new(
            "scenesync_work_items",
            "Work items discovered in the current run",
        ))
        .map_err(|source| TelemetryError::MetricsRegister {
            name: "scenesync_work_items",
            source,
        })?;
        registry
            .register(Box::new(work_items.clone()))
            .map_err(|source| TelemetryError::MetricsRegister {
                name: "scenesync_work_items",
                source,
            })?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                uploads_total,
                upload_skips_total,
                listing_degraded_total,
                batches_total,
                results_total,
                remote_retries_total,
                work_items,
            }),
        })
    }

    /// Increment the upload counter for a file kind (`asset` or `descriptor`).
    pub fn inc_upload(&self, kind: &str) {
        self.inner.uploads_total.with_label_values(&[kind]).inc();
    }

    /// Increment the counter of files skipped because they exist remotely.
    pub fn inc_upload_skip(&self) {
        self.inner.upload_skips_total.inc();
    }

    /// Record a sync pass that degraded to a full upload.
    pub fn inc_listing_degraded(&self) {
        self.inner.listing_degraded_total.inc();
    }

    /// Increment the batch counter for an outcome (`completed`, `failed`, `resumed`).
    pub fn inc_batch(&self, status: &str) {
        self.inner.batches_total.with_label_values(&[status]).inc();
    }

    /// Increment the reconciliation counter for an outcome (`matched`, `missing`).
    pub fn inc_result(&self, outcome: &str) {
        self.inner.results_total.with_label_values(&[outcome]).inc();
    }

    /// Increment the retry counter for a remote operation.
    pub fn inc_remote_retry(&self, operation: &str) {
        self.inner
            .remote_retries_total
            .with_label_values(&[operation])
            .inc();
    }

    /// Record the number of work items discovered.
    pub fn set_work_items(&self, count: usize) {
        self.inner
            .work_items
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    /// Render the metrics registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|source| TelemetryError::MetricsEncode { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::MetricsUtf8 { source })
    }

    /// Render the registry and write it to `path` (textfile collector format).
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails or the file cannot be written.
    pub fn write_textfile(&self, path: &Path) -> Result<()> {
        let rendered = self.render()?;
        fs::write(path, rendered).map_err(|source| TelemetryError::MetricsWrite {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Take a point-in-time snapshot of the run counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            work_items: self.inner.work_items.get(),
            upload_skips_total: self.inner.upload_skips_total.get(),
        }
    }
}

fn counter(registry: &Registry, name: &'static str, help: &str) -> Result<IntCounter> {
    let counter = IntCounter::with_opts(Opts::new(name, help))
        .map_err(|source| TelemetryError::MetricsRegister { name, source })?;
    registry
        .register(Box::new(counter.clone()))
        .map_err(|source| TelemetryError::MetricsRegister { name, source })?;
    Ok(counter)
}

fn counter_vec(
    registry: &Registry,
    name: &'static str,
    help: &str,
    labels: &[&str],
) -> Result<IntCounterVec> {
    let counter = IntCounterVec::new(Opts::new(name, help), labels)
        .map_err(|source| TelemetryError::MetricsRegister { name, source })?;
    registry
        .register(Box::new(counter.clone()))
        .map_err(|source| TelemetryError::MetricsRegister { name, source })?;
    Ok(counter)
}
