//! Bounded traversal of nested ZIP archives.
//!
//! # Architecture
//!
//! - `detect.rs` - Input format detection
//! - `sanitize.rs` - Entry path sanitization (zip-slip prevention)
//! - `sandbox.rs` - Exclusive extraction directory per scan session
//! - `extract/` - Archive entry sources and bounded copies
//! - `scan.rs` - Work-list driven scanner
//! - `classify.rs` - Business-module grouping from container names
//! - `entry.rs` - Scan inventory types

pub use classify::{
    ClassifyOptions, ContainerPredicate, GroupClassifier, GroupClassifierBuilder, NumberedBatch,
    PatternPredicate, ROOT_GROUP, TimestampOrLongName, canonical_group,
};
pub use detect::{InputKind, detect_kind, kind_from_name};
pub use entry::{DocumentEntry, GroupSummary, LimitReached, ScanReport, SkipReason, SkippedEntry};
pub use error::{Error, Result};
pub use options::{ProgressCallback, ScanOptions, ScanProgress};
pub use sandbox::Sandbox;
pub use sanitize::{SanitizedPath, normalize_entry_name, sanitize_file_name, sanitize_path};
pub use scan::ArchiveScanner;

pub mod classify;
mod detect;
pub mod entry;
mod error;
mod extract;
pub mod options;
mod sandbox;
mod sanitize;
mod scan;
