use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::error::FailureKind;
use crate::plan::{Isolation, WorkerPlan};
use crate::writer::OutputFormat;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConvertedFile {
    pub filename: String,
    pub logical_path: String,
    pub group: String,
    pub output_path: PathBuf,
    pub rows: u64,
    pub columns: usize,
    pub format: OutputFormat,
    pub record: String,
    pub duration_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FileError {
    pub filename: String,
    pub logical_path: String,
    pub group: String,
    pub kind: FailureKind,
    pub message: String,
    /// Time spent on the document; zero when it never started.
    pub duration_ms: u64,
}

/// Outcome of one document.
#[derive(Clone, Debug, PartialEq)]
pub enum ConversionResult {
    Converted(ConvertedFile),
    Failed(FileError),
    /// Filtered out or cancelled before it started.
    Skipped(FileError),
}

impl ConversionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Converted(_))
    }

    pub fn duration(&self) -> Duration {
        let ms = match self {
            Self::Converted(file) => file.duration_ms,
            Self::Failed(error) | Self::Skipped(error) => error.duration_ms,
        };
        Duration::from_millis(ms)
    }

    pub fn group(&self) -> &str {
        match self {
            Self::Converted(file) => &file.group,
            Self::Failed(error) | Self::Skipped(error) => &error.group,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ConversionStats {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
    pub total_rows: u64,
    /// Successful conversions per group.
    pub per_group: BTreeMap<String, usize>,
    pub input_bytes: u64,
    pub duration_ms: u64,
    pub files_per_sec: f64,
    pub mb_per_sec: f64,
    pub workers: usize,
    pub isolation: Option<Isolation>,
}

impl ConversionStats {
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.success as f64 / self.total as f64
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConversionProgress {
    pub done: usize,
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
    pub files_per_sec: f64,
    pub mb_per_sec: f64,
    pub eta: Option<Duration>,
}

impl ConversionProgress {
    pub fn percentage(&self) -> Option<f32> {
        (self.total > 0).then(|| self.done as f32 / self.total as f32 * 100.0)
    }
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct ConversionReport {
    pub stats: ConversionStats,
    pub files: Vec<ConvertedFile>,
    /// Failed and skipped documents; `kind` tells them apart.
    pub errors: Vec<FileError>,
}

impl ConversionReport {
    pub fn failures(&self) -> impl Iterator<Item = &FileError> {
        self.errors.iter().filter(|e| !e.kind.is_skip())
    }
}

/// Running totals for one batch.
pub(crate) struct Tally {
    started: Instant,
    stats: ConversionStats,
    files: Vec<ConvertedFile>,
    errors: Vec<FileError>,
    done: usize,
    bytes_done: u64,
}

impl Tally {
    pub(crate) fn new(total: usize) -> Self {
        Self {
            started: Instant::now(),
            stats: ConversionStats {
                total,
                ..ConversionStats::default()
            },
            files: Vec::new(),
            errors: Vec::new(),
            done: 0,
            bytes_done: 0,
        }
    }

    pub(crate) fn record(&mut self, result: ConversionResult, input_bytes: u64) {
        self.done += 1;
        self.bytes_done += input_bytes;

        match result {
            ConversionResult::Converted(file) => {
                self.stats.success += 1;
                self.stats.total_rows += file.rows;
                self.stats.input_bytes += input_bytes;
                *self.stats.per_group.entry(file.group.clone()).or_default() += 1;
                self.files.push(file);
            }
            ConversionResult::Failed(error) => {
                self.stats.failed += 1;
                self.errors.push(error);
            }
            ConversionResult::Skipped(error) => {
                self.stats.skipped += 1;
                self.errors.push(error);
            }
        }
    }

    pub(crate) fn progress(&self) -> ConversionProgress {
        let elapsed = self.started.elapsed().as_secs_f64();
        let (files_per_sec, mb_per_sec) = rates(self.done, self.bytes_done, elapsed);
        let remaining = self.stats.total.saturating_sub(self.done);
        let eta = (files_per_sec > 0.0)
            .then(|| Duration::from_secs_f64(remaining as f64 / files_per_sec));

        ConversionProgress {
            done: self.done,
            total: self.stats.total,
            success: self.stats.success,
            failed: self.stats.failed,
            skipped: self.stats.skipped,
            files_per_sec,
            mb_per_sec,
            eta,
        }
    }

    pub(crate) fn finish(mut self, plan: WorkerPlan) -> ConversionReport {
        let elapsed = self.started.elapsed();
        let (files_per_sec, mb_per_sec) =
            rates(self.done, self.bytes_done, elapsed.as_secs_f64());

        self.stats.duration_ms = elapsed.as_millis() as u64;
        self.stats.files_per_sec = files_per_sec;
        self.stats.mb_per_sec = mb_per_sec;
        self.stats.workers = plan.workers;
        self.stats.isolation = Some(plan.isolation);

        self.files.sort_by(|a, b| a.logical_path.cmp(&b.logical_path));
        self.errors.sort_by(|a, b| a.logical_path.cmp(&b.logical_path));

        ConversionReport {
            stats: self.stats,
            files: self.files,
            errors: self.errors,
        }
    }
}

fn rates(done: usize, bytes: u64, elapsed_secs: f64) -> (f64, f64) {
    if elapsed_secs <= 0.0 {
        return (0.0, 0.0);
    }
    (
        done as f64 / elapsed_secs,
        bytes as f64 / (1024.0 * 1024.0) / elapsed_secs,
    )
}
