//! Output renderers for run summaries.

use clap::ValueEnum;
use scenesync_engine::RunSummary;

use crate::error::{CliError, CliResult};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    #[default]
    Table,
    Json,
}

pub(crate) fn render_summary(summary: &RunSummary, format: OutputFormat) -> CliResult<()> {
    println!("{}", format_summary(summary, format)?);
    Ok(())
}

pub(crate) fn format_summary(summary: &RunSummary, format: OutputFormat) -> CliResult<String> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(summary).map_err(CliError::failure),
        OutputFormat::Table => {
            let staging = summary.staging.map_or("-", |status| status.as_str());
            let rows = [
                ("mode", summary.mode.as_str().to_string()),
                ("work items", summary.work_items.to_string()),
                ("staging", staging.to_string()),
                ("uploaded", summary.uploaded.to_string()),
                ("upload skipped", summary.upload_skipped.to_string()),
                ("listing degraded", yes_no(summary.listing_degraded).to_string()),
                ("batches dispatched", summary.batches_dispatched.to_string()),
                ("batches resumed", summary.batches_resumed.to_string()),
                ("downloaded", summary.downloaded.to_string()),
                ("matched", summary.matched.to_string()),
                ("missing", summary.missing.to_string()),
            ];
            let mut lines: Vec<String> = rows
                .iter()
                .map(|(label, value)| format!("{label:<20} {value}"))
                .collect();
            lines.extend(
                summary
                    .missing_results
                    .iter()
                    .map(|name| format!("{:<20} {name}", "missing result")),
            );
            Ok(lines.join("\n"))
        }
    }
}

const fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
