use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

pub const DEFAULT_MAX_DEPTH: usize = 10;
pub const DEFAULT_MAX_FILES: usize = 100_000;
pub const DEFAULT_MAX_TOTAL_BYTES: u64 = 10 * 1024 * 1024 * 1024;
pub const DEFAULT_MAX_COMPRESSION_RATIO: f64 = 200.0;
pub const DEFAULT_MIN_RATIO_CHECK_BYTES: u64 = 50 * 1024;

pub type ProgressCallback = Arc<dyn Fn(ScanProgress) + Send + Sync>;

/// Resource and security bounds for one scan.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct ScanOptions {
    pub max_depth: usize,
    pub max_files: usize,
    pub max_total_extracted_bytes: u64,
    pub max_compression_ratio: f64,
    /// Entries at or below this uncompressed size skip the ratio check.
    pub min_ratio_check_bytes: u64,
    pub progress_every: usize,
    #[serde(skip)]
    pub on_progress: Option<ProgressCallback>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScanProgress {
    pub entries_done: u64,
    pub entries_total_estimate: u64,
    pub xml_found: u64,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_files: DEFAULT_MAX_FILES,
            max_total_extracted_bytes: DEFAULT_MAX_TOTAL_BYTES,
            max_compression_ratio: DEFAULT_MAX_COMPRESSION_RATIO,
            min_ratio_check_bytes: DEFAULT_MIN_RATIO_CHECK_BYTES,
            progress_every: 100,
            on_progress: None,
        }
    }
}

impl fmt::Debug for ScanOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanOptions")
            .field("max_depth", &self.max_depth)
            .field("max_files", &self.max_files)
            .field("max_total_extracted_bytes", &self.max_total_extracted_bytes)
            .field("max_compression_ratio", &self.max_compression_ratio)
            .field("min_ratio_check_bytes", &self.min_ratio_check_bytes)
            .field("progress_every", &self.progress_every)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

impl ScanOptions {
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn max_files(mut self, files: usize) -> Self {
        self.max_files = files;
        self
    }

    pub fn max_total_extracted_bytes(mut self, bytes: u64) -> Self {
        self.max_total_extracted_bytes = bytes;
        self
    }

    pub fn max_compression_ratio(mut self, ratio: f64) -> Self {
        self.max_compression_ratio = ratio;
        self
    }

    pub fn progress_every(mut self, entries: usize) -> Self {
        self.progress_every = entries.max(1);
        self
    }

    pub fn on_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    /// Whether an entry trips the zip-bomb heuristic.
    pub fn exceeds_ratio(&self, uncompressed: u64, compressed: u64) -> Option<f64> {
        if uncompressed <= self.min_ratio_check_bytes {
            return None;
        }
        let ratio = compression_ratio(uncompressed, compressed);
        (ratio > self.max_compression_ratio).then_some(ratio)
    }

    pub(crate) fn report(&self, progress: ScanProgress) {
        if let Some(ref callback) = self.on_progress {
            callback(progress);
        }
    }
}

pub fn compression_ratio(uncompressed: u64, compressed: u64) -> f64 {
    if compressed == 0 {
        if uncompressed == 0 { 1.0 } else { f64::INFINITY }
    } else {
        uncompressed as f64 / compressed as f64
    }
}

impl ScanProgress {
    pub fn percentage(&self) -> Option<f32> {
        (self.entries_total_estimate > 0)
            .then(|| (self.entries_done as f32 / self.entries_total_estimate as f32) * 100.0)
    }
}
