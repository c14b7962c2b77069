//! Parallel conversion of scanned XML documents into delimited files.
//!
//! # Architecture
//!
//! - `plan.rs` - Worker count and isolation from the batch shape
//! - `pool.rs` - Semaphore-bounded worker pool with per-task timeouts
//! - `task.rs` - Conversion tasks and collision-free output names
//! - `converter.rs` - The per-document conversion seam
//! - `writer.rs` - CSV/TSV output, direct or spooled
//! - `scheduler.rs` - Batch dispatch, filtering and progress
//! - `report.rs` - Per-file results and aggregate stats

pub use converter::{Conversion, DocumentConverter, XmlConverter};
pub use error::{ConvertError, Error, FailureKind, Result};
pub use plan::{DEFAULT_WORKER_CEILING, Isolation, WorkerPlan, available_cores};
pub use pool::{TaskHandle, TaskOutcome, WorkerPool};
pub use report::{
    ConversionProgress, ConversionReport, ConversionResult, ConversionStats, ConvertedFile,
    FileError,
};
pub use scheduler::{ConversionProgressCallback, ConversionScheduler, ConvertOptions};
pub use task::{ConversionTask, OutputNamer, output_stem};
pub use writer::{OutputFormat, OutputWriter, SpooledOutput};

mod converter;
mod error;
mod plan;
mod pool;
mod report;
mod scheduler;
mod task;
mod writer;
