use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use flatline_archive::{DocumentEntry, sanitize_file_name};

use crate::writer::OutputFormat;

/// One document ready for dispatch.
#[derive(Clone, Debug)]
pub struct ConversionTask {
    pub entry: DocumentEntry,
    /// Group after overrides, used for the output directory and stats.
    pub group: String,
    pub output_path: PathBuf,
    pub format: OutputFormat,
}

/// Hands out collision-free output paths of the form
/// `<root>/<GROUP>/<stem>.<ext>`.
///
/// Uniqueness is case-insensitive so outputs survive case-folding file
/// systems.
#[derive(Debug)]
pub struct OutputNamer {
    root: PathBuf,
    extension: &'static str,
    used: Mutex<HashSet<String>>,
}

impl OutputNamer {
    pub fn new(root: impl Into<PathBuf>, format: OutputFormat) -> Self {
        Self {
            root: root.into(),
            extension: format.extension(),
            used: Mutex::new(HashSet::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn reserve(&self, group: &str, entry: &DocumentEntry) -> PathBuf {
        let dir = sanitize_file_name(group);
        let stem = output_stem(entry);
        let mut used = self.used.lock().unwrap_or_else(PoisonError::into_inner);

        let mut candidate = format!("{stem}.{}", self.extension);
        let mut n = 2;
        while !used.insert(format!("{dir}/{candidate}").to_lowercase()) {
            candidate = format!("{stem}_{n}.{}", self.extension);
            n += 1;
        }

        self.root.join(dir).join(candidate)
    }
}

/// Logical path segments below the root container, joined with `_`, with
/// the document extension dropped.
pub fn output_stem(entry: &DocumentEntry) -> String {
    let mut segments: Vec<&str> = entry.relative_segments().collect();
    if segments.is_empty() {
        segments.push(&entry.filename);
    }

    let joined = segments.join("_");
    let stem = match Path::new(&joined).extension() {
        Some(ext) => &joined[..joined.len() - ext.len() - 1],
        None => joined.as_str(),
    };
    sanitize_file_name(stem)
}
