use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use flatline_archive::{DocumentEntry, canonical_group};
use flatline_xml::FlattenOptions;
use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::converter::{Conversion, DocumentConverter, XmlConverter};
use crate::error::{ConvertError, Error, FailureKind, Result};
use crate::plan::{DEFAULT_WORKER_CEILING, Isolation, WorkerPlan, available_cores};
use crate::pool::{TaskOutcome, WorkerPool};
use crate::report::{ConversionProgress, ConversionReport, ConversionResult, ConvertedFile, FileError, Tally};
use crate::task::{ConversionTask, OutputNamer};
use crate::writer::OutputFormat;

pub type ConversionProgressCallback = Arc<dyn Fn(ConversionProgress) + Send + Sync>;

/// Batch conversion settings.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConvertOptions {
    pub format: OutputFormat,
    /// Only these groups are converted; others are counted as skipped.
    pub groups: Option<Vec<String>>,
    /// Fixed worker count instead of the size-based plan.
    pub workers: Option<usize>,
    pub isolation: Option<Isolation>,
    pub timeout_ms: u64,
    pub worker_ceiling: usize,
    pub progress_interval_ms: u64,
    /// Group per logical path or bare file name, applied before filtering.
    pub group_overrides: HashMap<String, String>,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            format: OutputFormat::Csv,
            groups: None,
            workers: None,
            isolation: None,
            timeout_ms: 5 * 60 * 1000,
            worker_ceiling: DEFAULT_WORKER_CEILING,
            progress_interval_ms: 500,
            group_overrides: HashMap::new(),
        }
    }
}

impl ConvertOptions {
    pub fn format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = Some(groups.into_iter().map(Into::into).collect());
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn isolation(mut self, isolation: Isolation) -> Self {
        self.isolation = Some(isolation);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn worker_ceiling(mut self, ceiling: usize) -> Self {
        self.worker_ceiling = ceiling;
        self
    }

    pub fn progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn group_override(mut self, key: impl Into<String>, group: impl Into<String>) -> Self {
        self.group_overrides.insert(key.into(), group.into());
        self
    }

    fn timeout_duration(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(1))
    }
}

/// Converts scanned documents on a bounded worker pool.
///
/// Every entry ends up in exactly one of `success`, `failed` or
/// `skipped`. Failures stay per document: a bad, hung or panicking
/// conversion never stops its siblings.
pub struct ConversionScheduler<C = XmlConverter> {
    options: ConvertOptions,
    converter: Arc<C>,
    stop: Arc<AtomicBool>,
    on_progress: Option<ConversionProgressCallback>,
}

impl ConversionScheduler<XmlConverter> {
    pub fn new(options: ConvertOptions, flatten: FlattenOptions) -> Self {
        Self::with_converter(options, XmlConverter::new(flatten))
    }
}

impl<C: DocumentConverter> ConversionScheduler<C> {
    pub fn with_converter(options: ConvertOptions, converter: C) -> Self {
        Self {
            options,
            converter: Arc::new(converter),
            stop: Arc::new(AtomicBool::new(false)),
            on_progress: None,
        }
    }

    pub fn on_progress(mut self, callback: ConversionProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    pub fn options(&self) -> &ConvertOptions {
        &self.options
    }

    /// Raising this flag stops new tasks from starting. Running tasks
    /// finish normally; the rest are reported as cancelled.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn plan(&self, entries: &[DocumentEntry]) -> WorkerPlan {
        self.plan_for(entries.iter())
    }

    fn plan_for<'a>(&self, entries: impl ExactSizeIterator<Item = &'a DocumentEntry>) -> WorkerPlan {
        let count = entries.len();
        let avg_mb = if count == 0 {
            0.0
        } else {
            entries.map(DocumentEntry::size_mb).sum::<f64>() / count as f64
        };

        let ceiling = self.options.worker_ceiling;
        let mut plan = WorkerPlan::for_batch(avg_mb, count, available_cores(), ceiling)
            .with_override(self.options.workers, ceiling);
        if let Some(isolation) = self.options.isolation {
            plan.isolation = isolation;
        }
        plan
    }

    /// Group used for `entry`: an override by logical path, then by file
    /// name, then the scanned group.
    pub fn resolve_group(&self, entry: &DocumentEntry) -> String {
        let overrides = &self.options.group_overrides;
        overrides
            .get(&entry.logical_path)
            .or_else(|| overrides.get(&entry.filename))
            .map(|group| canonical_group(group))
            .unwrap_or_else(|| entry.group.clone())
    }

    /// Convert `entries` into `output_dir`.
    ///
    /// Only setup failures are errors. Per-document problems are part of
    /// the report, so a batch where every document fails still returns
    /// `Ok`.
    pub async fn run(&self, entries: Vec<DocumentEntry>, output_dir: &Path) -> Result<ConversionReport> {
        std::fs::create_dir_all(output_dir)?;

        let total = entries.len();
        let namer = OutputNamer::new(output_dir, self.options.format);
        let allowed: Option<HashSet<String>> = self
            .options
            .groups
            .as_ref()
            .map(|groups| groups.iter().map(|g| canonical_group(g)).collect());

        let mut tally = Tally::new(total);
        let mut ticker = ProgressTicker::new(self.on_progress.clone(), self.options.progress_interval_ms);
        let mut tasks = Vec::with_capacity(total);

        for entry in entries {
            let group = self.resolve_group(&entry);
            if allowed.as_ref().is_some_and(|allowed| !allowed.contains(&group)) {
                debug!(path = %entry.logical_path, %group, "group filtered out");
                let error = file_error(
                    &entry,
                    &group,
                    FailureKind::Filtered,
                    "group not selected",
                    Duration::ZERO,
                );
                tally.record(ConversionResult::Skipped(error), 0);
                continue;
            }

            let output_path = namer.reserve(&group, &entry);
            tasks.push(ConversionTask {
                entry,
                group,
                output_path,
                format: self.options.format,
            });
        }

        let plan = self.plan_for(tasks.iter().map(|t| &t.entry));
        info!(
            tasks = tasks.len(),
            filtered = total - tasks.len(),
            workers = plan.workers,
            isolation = %plan.isolation,
            "starting conversion"
        );

        let pool = WorkerPool::new(plan, Arc::clone(&self.stop));
        let timeout = self.options.timeout_duration();
        let mut pending = FuturesUnordered::new();

        for task in tasks {
            let task = Arc::new(task);
            let job_task = Arc::clone(&task);
            let converter = Arc::clone(&self.converter);
            let handle = pool.submit(
                move || {
                    let started = Instant::now();
                    let result = converter.convert(&job_task);
                    (result, started.elapsed())
                },
                timeout,
            );
            let submitted = Instant::now();
            pending.push(async move {
                let outcome = handle.await_result().await;
                (task, outcome, submitted.elapsed())
            });
        }

        ticker.tick(&tally);
        while let Some((task, outcome, waited)) = pending.next().await {
            let result = settle(&task, outcome, waited);
            tally.record(result, task.entry.size_bytes);
            ticker.tick(&tally);
        }
        ticker.finish(&tally);

        let report = tally.finish(plan);
        let stats = &report.stats;
        info!(
            total = stats.total,
            success = stats.success,
            failed = stats.failed,
            skipped = stats.skipped,
            rows = stats.total_rows,
            duration_ms = stats.duration_ms,
            "conversion finished"
        );
        Ok(report)
    }

    /// Run [`Self::run`] on a fresh multi-threaded runtime.
    ///
    /// Threads still running abandoned, timed-out jobs are not waited for.
    pub fn run_blocking(&self, entries: Vec<DocumentEntry>, output_dir: &Path) -> Result<ConversionReport> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .thread_name("flatline-convert")
            .enable_time()
            .build()
            .map_err(|e| Error::Runtime(e.to_string()))?;

        let report = runtime.block_on(self.run(entries, output_dir));
        runtime.shutdown_background();
        report
    }
}

impl<C> fmt::Debug for ConversionScheduler<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionScheduler")
            .field("options", &self.options)
            .field("stopped", &self.stop.load(Ordering::Relaxed))
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

fn settle(
    task: &ConversionTask,
    outcome: TaskOutcome<(std::result::Result<Conversion, ConvertError>, Duration)>,
    waited: Duration,
) -> ConversionResult {
    let entry = &task.entry;
    let failed = |kind: FailureKind, message: String, elapsed: Duration| {
        warn!(path = %entry.logical_path, ?kind, %message, "conversion failed");
        ConversionResult::Failed(file_error(entry, &task.group, kind, message, elapsed))
    };

    match outcome {
        TaskOutcome::Completed((Ok(conversion), elapsed)) => {
            debug!(
                path = %entry.logical_path,
                rows = conversion.rows,
                columns = conversion.columns,
                "converted"
            );
            ConversionResult::Converted(ConvertedFile {
                filename: entry.filename.clone(),
                logical_path: entry.logical_path.clone(),
                group: task.group.clone(),
                output_path: task.output_path.clone(),
                rows: conversion.rows,
                columns: conversion.columns,
                format: task.format,
                record: conversion.record,
                duration_ms: elapsed.as_millis() as u64,
            })
        }
        TaskOutcome::Completed((Err(e), elapsed)) => failed(e.kind(), e.to_string(), elapsed),
        TaskOutcome::TimedOut(after) => failed(
            FailureKind::Timeout,
            format!("timed out after {}ms", after.as_millis()),
            after,
        ),
        // No in-job clock survives a panic; the wait since submission stands in.
        TaskOutcome::Panicked(message) => failed(FailureKind::Panicked, message, waited),
        TaskOutcome::Unavailable(message) => failed(FailureKind::Io, message, waited),
        TaskOutcome::Cancelled => ConversionResult::Skipped(file_error(
            entry,
            &task.group,
            FailureKind::Cancelled,
            "batch stopped before start",
            Duration::ZERO,
        )),
    }
}

fn file_error(
    entry: &DocumentEntry,
    group: &str,
    kind: FailureKind,
    message: impl Into<String>,
    elapsed: Duration,
) -> FileError {
    FileError {
        filename: entry.filename.clone(),
        logical_path: entry.logical_path.clone(),
        group: group.to_string(),
        kind,
        message: message.into(),
        duration_ms: elapsed.as_millis() as u64,
    }
}

/// Rate-limits progress callbacks to one per interval plus a final one.
struct ProgressTicker {
    callback: Option<ConversionProgressCallback>,
    interval: Duration,
    last: Option<Instant>,
}

impl ProgressTicker {
    fn new(callback: Option<ConversionProgressCallback>, interval_ms: u64) -> Self {
        Self {
            callback,
            interval: Duration::from_millis(interval_ms),
            last: None,
        }
    }

    fn tick(&mut self, tally: &Tally) {
        if self.callback.is_none() {
            return;
        }
        if self.last.is_some_and(|last| last.elapsed() < self.interval) {
            return;
        }
        self.last = Some(Instant::now());
        self.emit(tally);
    }

    fn finish(&self, tally: &Tally) {
        self.emit(tally);
    }

    fn emit(&self, tally: &Tally) {
        if let Some(ref callback) = self.callback {
            callback(tally.progress());
        }
    }
}
