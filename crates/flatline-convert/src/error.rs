use std::io;

use serde::Serialize;

/// Batch-level failures. Per-document problems are reported as
/// [`ConvertError`] inside the conversion report instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error("runtime error: {0}")]
    Runtime(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Why one document did not produce an output file.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("no records found")]
    NoRecords,

    #[error(transparent)]
    Xml(#[from] flatline_xml::Error),

    #[error(transparent)]
    Output(#[from] Error),
}

impl From<io::Error> for ConvertError {
    fn from(e: io::Error) -> Self {
        Self::Output(Error::Io(e))
    }
}

impl From<csv::Error> for ConvertError {
    fn from(e: csv::Error) -> Self {
        Self::Output(Error::Csv(e))
    }
}

impl ConvertError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::NoRecords => FailureKind::NoRecords,
            Self::Xml(_) | Self::Output(_) => FailureKind::Io,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NoRecords,
    Io,
    Timeout,
    Panicked,
    /// Not started because the batch was stopped. Counted as skipped.
    Cancelled,
    /// Excluded by the group allow-list. Counted as skipped.
    Filtered,
}

impl FailureKind {
    pub fn is_skip(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Filtered)
    }
}
