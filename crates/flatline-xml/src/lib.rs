//! XML to flat rows.
//!
//! A document is split into records (an explicit tag, the most frequent
//! repeating root child, each root child, or the whole document), and every
//! record becomes one row keyed by element paths such as `item.name` and
//! `item@id`.
//!
//! Small documents are parsed into an arena tree and flattened in memory.
//! Large ones go through [`RowStream`], which yields row batches and never
//! holds more than the record being built. Both modes produce identical
//! rows and header order. Malformed documents produce no rows.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;

use tracing::{debug, warn};

pub use error::{Error, Result};
pub use flatten::truncate;
pub use options::{FlattenOptions, Mode};
pub use row::{HeaderSet, Row};
pub use selector::{RecordSelector, Survey};
pub use stream::RowStream;

mod dom;
mod error;
mod events;
mod flatten;
pub mod options;
mod row;
mod selector;
mod stream;

/// Rows of one document with their header list.
#[derive(Clone, Debug, PartialEq)]
pub struct FlattenOutput {
    pub rows: Vec<Row>,
    pub headers: Vec<String>,
    /// The record boundary actually used.
    pub selector: RecordSelector,
}

impl FlattenOutput {
    fn empty() -> Self {
        Self {
            rows: Vec::new(),
            headers: Vec::new(),
            selector: RecordSelector::Document,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Result of [`flatten_file`]: complete rows or a lazy stream of batches.
pub enum Flattened {
    InMemory(FlattenOutput),
    Streaming(RowStream<BufReader<File>>),
}

impl Flattened {
    pub fn selector(&self) -> &RecordSelector {
        match self {
            Self::InMemory(output) => &output.selector,
            Self::Streaming(stream) => stream.selector(),
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming(_))
    }

    pub fn into_output(self) -> Result<FlattenOutput> {
        match self {
            Self::InMemory(output) => Ok(output),
            Self::Streaming(stream) => stream.into_output(),
        }
    }
}

/// Flatten a whole document held in memory.
pub fn flatten_bytes(bytes: &[u8], options: &FlattenOptions) -> FlattenOutput {
    let document = match dom::Document::parse(bytes) {
        Ok(document) => document,
        Err(e) => {
            warn!(error = %e, "malformed document, no rows produced");
            return FlattenOutput::empty();
        }
    };

    let selector = RecordSelector::resolve(options.explicit_tag(), document.survey());
    let (rows, headers) = document.flatten(&selector, options);
    debug!(%selector, rows = rows.len(), columns = headers.len(), "flattened document");

    FlattenOutput {
        rows,
        headers: headers.into_vec(),
        selector,
    }
}

/// Flatten a document on disk, streaming when it is large.
///
/// Only I/O failures are errors; malformed XML yields an empty result.
pub fn flatten_file(path: &Path, options: &FlattenOptions) -> Result<Flattened> {
    let size = fs::metadata(path)?.len();
    if options.should_stream(size) {
        debug!(path = %path.display(), size, "streaming document");
        return Ok(Flattened::Streaming(RowStream::open(path, options)?));
    }

    let bytes = fs::read(path)?;
    Ok(Flattened::InMemory(flatten_bytes(&bytes, options)))
}
