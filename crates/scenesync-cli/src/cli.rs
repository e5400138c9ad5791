//! Argument parsing, bootstrap, and run dispatch.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, ValueEnum};
use scenesync_config::load_config;
use scenesync_engine::{LEDGER_FILE_NAME, Pipeline, RunMode, RunSummary};
use scenesync_remote::{RetryPolicy, RetryingExecutor, SshExecutor};
use scenesync_telemetry::{
    DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, Metrics, RunContextGuard, init_logging,
};
use tracing::{error, info};

use crate::error::{CliError, CliResult};
use crate::output::{OutputFormat, render_summary};

const DEFAULT_CONFIG_PATH: &str = "scenesync.yaml";

#[derive(Parser, Debug)]
#[command(
    name = "scenesync",
    version,
    about = "Sync scene renders to a remote inference worker, run batched inference, and collect results"
)]
struct Cli {
    #[arg(
        long,
        env = "SCENESYNC_CONFIG",
        default_value = DEFAULT_CONFIG_PATH,
        help = "Pipeline configuration file"
    )]
    config: PathBuf,
    #[arg(
        short = 'd',
        long = "download-only",
        help = "Skip staging, upload, and dispatch; only reconcile results"
    )]
    download_only: bool,
    #[arg(
        long = "output",
        alias = "format",
        value_enum,
        default_value_t = OutputFormat::Table,
        help = "Select the run summary format"
    )]
    output: OutputFormat,
    #[arg(
        long,
        env = "SCENESYNC_LOG_LEVEL",
        default_value = DEFAULT_LOG_LEVEL,
        help = "Log level used when RUST_LOG is unset"
    )]
    log_level: String,
    #[arg(long, value_enum, help = "Log format (defaults to pretty in debug builds, json otherwise)")]
    log_format: Option<LogFormatArg>,
    #[arg(long, help = "Write Prometheus metrics to this file when the run ends")]
    metrics_file: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormatArg {
    Pretty,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(value: LogFormatArg) -> Self {
        match value {
            LogFormatArg::Pretty => Self::Pretty,
            LogFormatArg::Json => Self::Json,
        }
    }
}

impl Cli {
    const fn mode(&self) -> RunMode {
        if self.download_only {
            RunMode::DownloadOnly
        } else {
            RunMode::Full
        }
    }
}

/// Entry point for the CLI; returns the desired process exit code.
pub async fn run() -> i32 {
    let cli = Cli::parse();
    let logging = LoggingConfig {
        level: &cli.log_level,
        format: cli.log_format.map_or_else(LogFormat::infer, LogFormat::from),
        ..LoggingConfig::default()
    };
    if let Err(err) = init_logging(&logging) {
        let err = CliError::failure(err);
        eprintln!("error: {}", err.display_message());
        return err.exit_code();
    }

    match execute(&cli).await {
        Ok(()) => 0,
        Err(err) => {
            let message = err.display_message();
            if matches!(err, CliError::Incomplete { .. }) {
                eprintln!("warning: {message}");
            } else {
                error!(error = %message, "run failed");
                eprintln!("error: {message}");
            }
            err.exit_code()
        }
    }
}

async fn execute(cli: &Cli) -> CliResult<()> {
    let mode = cli.mode();
    let context = RunContextGuard::new(mode.as_str());
    info!(run_id = %context.run_id(), config = %cli.config.display(), "starting run");

    let config = load_config(&cli.config).map_err(CliError::validation)?;
    let metrics = Metrics::new().map_err(CliError::failure)?;
    let executor = RetryingExecutor::new(
        SshExecutor::new(config.remote.clone()),
        RetryPolicy::from(config.remote.retry),
    )
    .with_metrics(metrics.clone());

    let pipeline = Pipeline::new(&config, &executor, metrics.clone());
    let result = pipeline.run(mode).await;

    if let Some(path) = &cli.metrics_file {
        write_metrics(&metrics, path)?;
    }

    let summary = result
        .with_context(|| format!("{} run failed", mode.as_str()))
        .map_err(CliError::failure)?;
    render_summary(&summary, cli.output)?;
    completion(&summary, &config.local.state_dir)
}

fn write_metrics(metrics: &Metrics, path: &Path) -> CliResult<()> {
    metrics
        .write_textfile(path)
        .with_context(|| format!("failed to write metrics to {}", path.display()))
        .map_err(CliError::failure)
}

fn completion(summary: &RunSummary, state_dir: &Path) -> CliResult<()> {
    if summary.is_complete() {
        Ok(())
    } else {
        Err(CliError::Incomplete {
            missing: summary.missing,
            ledger: state_dir.join(LEDGER_FILE_NAME),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn download_only_short_flag_selects_mode() -> Result<(), clap::Error> {
        let cli = Cli::try_parse_from(["scenesync", "-d", "--config", "/etc/scenesync.yaml"])?;
        assert_eq!(cli.mode(), RunMode::DownloadOnly);
        assert_eq!(cli.config, PathBuf::from("/etc/scenesync.yaml"));

        let cli = Cli::try_parse_from(["scenesync", "--output", "json", "--log-format", "json"])?;
        assert_eq!(cli.mode(), RunMode::Full);
        assert_eq!(cli.output, OutputFormat::Json);
        assert_eq!(cli.log_format.map(LogFormat::from), Some(LogFormat::Json));
        Ok(())
    }

    #[test]
    fn unknown_flags_are_rejected() {
        assert!(Cli::try_parse_from(["scenesync", "--upload-only"]).is_err());
    }

    #[test]
    fn missing_config_is_a_validation_error() {
        let err = load_config(Path::new("/definitely/missing/scenesync.yaml"))
            .map_err(CliError::validation)
            .err();
        assert_eq!(err.as_ref().map(CliError::exit_code), Some(2));
        assert!(
            err.map(|err| err.display_message())
                .is_some_and(|message| message.contains("/definitely/missing/scenesync.yaml"))
        );
    }

    #[test]
    fn incomplete_summary_maps_to_exit_code_four() {
        let summary = RunSummary {
            mode: RunMode::DownloadOnly,
            work_items: 2,
            staging: None,
            uploaded: 0,
            upload_skipped: 0,
            listing_degraded: false,
            batches_dispatched: 0,
            batches_resumed: 0,
            downloaded: 1,
            matched: 1,
            missing: 1,
            missing_results: vec!["scene_0_rgb_0002_inferred".to_string()],
        };
        let err = completion(&summary, Path::new("/var/lib/scenesync")).err();
        assert_eq!(err.as_ref().map(CliError::exit_code), Some(4));
        assert!(
            err.map(|err| err.display_message())
                .is_some_and(|message| message.contains("/var/lib/scenesync/dispatch-ledger.json"))
        );
    }
}
