use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("scan failed for '{path}': {reason}")]
    ScanFailed { path: PathBuf, reason: String },

    #[error("unsupported input format")]
    UnsupportedFormat,

    #[error("unsafe entry path '{entry}' resolves to '{resolved}'")]
    UnsafePath { entry: String, resolved: PathBuf },

    #[error("entry path contains null byte")]
    InvalidPath,

    #[error("archive is corrupted")]
    Corrupted,

    #[error("failed to extract '{path}': {source}")]
    ExtractionFailed { path: PathBuf, source: io::Error },

    #[error("failed to create sandbox: {source}")]
    Sandbox { source: io::Error },

    #[error("invalid container pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn scan_failed(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::ScanFailed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
