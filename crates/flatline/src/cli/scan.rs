use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use flatline_archive::{ArchiveScanner, GroupClassifier, Sandbox, ScanProgress, ScanReport};
use tracing::{info, warn};

use super::app::CommonArg;
use crate::config::Config;
use crate::ui::table::scan_table;
use crate::ui::tracker::{ProgressTrackerBuilder, Tracker};

#[derive(Args, Clone, Debug)]
pub struct ScanArg {
    #[command(flatten)]
    pub common: CommonArg,

    /// Parent directory for the extraction sandbox
    #[arg(long)]
    pub sandbox: Option<PathBuf>,

    /// Keep the extracted documents instead of removing them on exit
    #[arg(long)]
    pub keep: bool,
}

pub fn open_sandbox(parent: Option<&Path>) -> Result<Sandbox> {
    let sandbox = match parent {
        Some(dir) => Sandbox::new_in(dir),
        None => Sandbox::new(),
    };
    sandbox.context("failed to create extraction sandbox")
}

/// Scan `input` into `sandbox` with a spinner on stderr.
pub fn scan_input(input: &Path, config: &Config, sandbox: &Sandbox, quiet: bool) -> Result<ScanReport> {
    let classifier = GroupClassifier::from_options(&config.classify)
        .context("invalid [classify] settings")?;

    let tracker = ProgressTrackerBuilder::default()
        .with_prefix("Scanning")
        .hidden(quiet)
        .build();
    let sink = tracker.clone();
    let options = config
        .scan
        .clone()
        .on_progress(Arc::new(move |progress: ScanProgress| sink.update(progress)));

    let report = ArchiveScanner::new(options, classifier)
        .scan_path(input, sandbox)
        .with_context(|| format!("failed to scan '{}'", input.display()));
    tracker.finish();
    let report = report?;

    for skipped in &report.skipped {
        warn!(path = %skipped.logical_path, reason = %skipped.reason, "skipped entry");
    }
    if let Some(limit) = report.limit_reached {
        warn!(?limit, "scan stopped at a resource limit, inventory is partial");
    }
    Ok(report)
}

pub fn run(arg: ScanArg, quiet: bool) -> Result<()> {
    let config = Config::load_or_default(arg.common.config.as_deref())?;
    let sandbox = open_sandbox(arg.sandbox.as_deref())?;

    let report = scan_input(&arg.common.input, &config, &sandbox, quiet || arg.common.json)?;

    if arg.common.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", scan_table(&report));
    }

    if arg.keep {
        let kept = sandbox.persist();
        info!(path = %kept.display(), "kept extracted documents");
        eprintln!("extracted documents kept in {}", kept.display());
    }
    Ok(())
}
