use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use flatline_convert::{ConversionProgress, ConversionScheduler, OutputFormat};
use serde_json::json;
use tracing::warn;

use super::app::CommonArg;
use super::scan::{open_sandbox, scan_input};
use crate::config::Config;
use crate::ui::table::stats_table;
use crate::ui::tracker::{ProgressTrackerBuilder, Tracker};

/// Failures listed after the summary table.
const SHOWN_ERRORS: usize = 20;

#[derive(Args, Clone, Debug)]
pub struct ConvertArg {
    #[command(flatten)]
    pub common: CommonArg,

    /// Output directory; one sub-directory per group
    #[arg(long, short)]
    pub out: PathBuf,

    /// Only convert these groups (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub groups: Vec<String>,

    /// Output format: csv or tsv
    #[arg(long)]
    pub format: Option<OutputFormat>,

    /// Fixed worker count instead of the size-based plan
    #[arg(long)]
    pub workers: Option<usize>,

    /// Element that starts a record; auto-detected when unset
    #[arg(long)]
    pub record_tag: Option<String>,

    /// Parent directory for the extraction sandbox
    #[arg(long)]
    pub sandbox: Option<PathBuf>,
}

impl ConvertArg {
    /// Command-line flags take precedence over the settings file.
    fn apply(&self, config: &mut Config) {
        if !self.groups.is_empty() {
            config.convert.groups = Some(self.groups.clone());
        }
        if let Some(format) = self.format {
            config.convert.format = format;
        }
        if let Some(workers) = self.workers {
            config.convert.workers = Some(workers);
        }
        if let Some(ref tag) = self.record_tag {
            config.flatten.record_tag = Some(tag.clone());
        }
    }
}

pub fn run(arg: ConvertArg, quiet: bool) -> Result<()> {
    let mut config = Config::load_or_default(arg.common.config.as_deref())?;
    arg.apply(&mut config);
    config.validate()?;

    let hide_progress = quiet || arg.common.json;
    let sandbox = open_sandbox(arg.sandbox.as_deref())?;
    let scan = scan_input(&arg.common.input, &config, &sandbox, hide_progress)?;

    let tracker = ProgressTrackerBuilder::default()
        .with_len(scan.entries.len() as u64)
        .with_prefix("Converting")
        .with_finish("done")
        .hidden(hide_progress)
        .build();
    let sink = tracker.clone();

    let scheduler = ConversionScheduler::new(config.convert.clone(), config.flatten.clone())
        .on_progress(Arc::new(move |progress: ConversionProgress| sink.update(progress)));
    let report = scheduler
        .run_blocking(scan.entries.clone(), &arg.out)
        .with_context(|| format!("failed to convert into '{}'", arg.out.display()));
    tracker.finish();
    let report = report?;

    if arg.common.json {
        let output = json!({
            "scan": {
                "documents": scan.entries.len(),
                "total_bytes": scan.total_bytes,
                "archives_visited": scan.archives_visited,
                "groups": scan.groups,
                "skipped": scan.skipped,
                "limit_reached": scan.limit_reached,
            },
            "conversion": report,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("{}", stats_table(&report.stats));
    let failures: Vec<_> = report.failures().collect();
    for error in failures.iter().take(SHOWN_ERRORS) {
        eprintln!("  {} [{}]: {}", error.logical_path, error.group, error.message);
    }
    if failures.len() > SHOWN_ERRORS {
        eprintln!("  ... and {} more", failures.len() - SHOWN_ERRORS);
    }
    if report.stats.success == 0 && report.stats.total > 0 {
        warn!("no document was converted");
    }
    Ok(())
}
