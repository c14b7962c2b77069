use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::{debug, warn};

use crate::FlattenOutput;
use crate::error::Result;
use crate::events::{EventReader, XmlEvent};
use crate::flatten::RecordBuilder;
use crate::options::FlattenOptions;
use crate::row::{HeaderSet, Row};
use crate::selector::{RecordSelector, Survey};

const READ_BUFFER: usize = 1024 * 1024;

/// Forward-only flattening that yields rows in batches of `chunk_size`.
///
/// A survey pass runs before any row is produced, so a malformed document
/// yields no batches at all and auto-detection matches in-memory mode.
/// Only the elements of the record currently being built are held.
pub struct RowStream<R> {
    events: Option<EventReader<R>>,
    options: FlattenOptions,
    selector: RecordSelector,
    root: String,
    builder: Option<RecordBuilder>,
    headers: HeaderSet,
    rows_emitted: u64,
}

impl RowStream<BufReader<File>> {
    pub fn open(path: &Path, options: &FlattenOptions) -> Result<Self> {
        let survey = match Survey::scan(BufReader::with_capacity(READ_BUFFER, File::open(path)?)) {
            Ok(survey) => survey,
            Err(e) if e.is_malformed() => {
                warn!(path = %path.display(), error = %e, "malformed document, no rows produced");
                return Ok(Self::empty(options));
            }
            Err(e) => return Err(e),
        };

        let reader = BufReader::with_capacity(READ_BUFFER, File::open(path)?);
        Ok(Self::with_survey(reader, &survey, options))
    }
}

impl<'a> RowStream<&'a [u8]> {
    pub fn from_slice(bytes: &'a [u8], options: &FlattenOptions) -> Self {
        match Survey::scan(bytes) {
            Ok(survey) => Self::with_survey(bytes, &survey, options),
            Err(e) => {
                warn!(error = %e, "malformed document, no rows produced");
                Self::empty(options)
            }
        }
    }
}

impl<R: BufRead> RowStream<R> {
    fn with_survey(reader: R, survey: &Survey, options: &FlattenOptions) -> Self {
        let selector = RecordSelector::resolve(options.explicit_tag(), survey);
        debug!(%selector, root = %survey.root, "streaming records");
        Self {
            events: Some(EventReader::new(reader)),
            options: options.clone(),
            selector,
            root: survey.root.clone(),
            builder: None,
            headers: HeaderSet::new(),
            rows_emitted: 0,
        }
    }

    fn empty(options: &FlattenOptions) -> Self {
        Self {
            events: None,
            options: options.clone(),
            selector: RecordSelector::Document,
            root: String::new(),
            builder: None,
            headers: HeaderSet::new(),
            rows_emitted: 0,
        }
    }

    pub fn selector(&self) -> &RecordSelector {
        &self.selector
    }

    /// Headers of every row yielded so far, in first-appearance order.
    pub fn headers(&self) -> &[String] {
        self.headers.as_slice()
    }

    pub fn rows_emitted(&self) -> u64 {
        self.rows_emitted
    }

    /// Drain the stream into a complete in-memory result.
    pub fn into_output(mut self) -> Result<FlattenOutput> {
        let mut rows = Vec::new();
        while let Some(batch) = self.next_batch()? {
            rows.extend(batch);
        }
        Ok(FlattenOutput {
            rows,
            headers: self.headers.into_vec(),
            selector: self.selector,
        })
    }

    fn next_batch(&mut self) -> Result<Option<Vec<Row>>> {
        let Some(events) = self.events.as_mut() else {
            return Ok(None);
        };
        let chunk_size = self.options.chunk_size.max(1);
        let mut batch = Vec::new();

        loop {
            let depth = events.depth();
            let event = match events.next_event() {
                Ok(event) => event,
                Err(e) => {
                    self.events = None;
                    return Err(e);
                }
            };

            match event {
                XmlEvent::Start { name, attributes } => match self.builder {
                    Some(ref mut builder) => builder.enter(&name, &attributes),
                    None if self.selector.starts_record(&name, depth) => {
                        let prefix = (self.options.include_root && depth > 0)
                            .then_some(self.root.as_str());
                        let mut builder = RecordBuilder::new(&self.options, prefix);
                        builder.enter(&name, &attributes);
                        self.builder = Some(builder);
                    }
                    None => {}
                },
                XmlEvent::Text(text) => {
                    if let Some(ref mut builder) = self.builder {
                        builder.text(&text);
                    }
                }
                XmlEvent::End => {
                    let closed = match self.builder {
                        Some(ref mut builder) => builder.exit(),
                        None => false,
                    };
                    if closed {
                        if let Some(row) = self.builder.take().and_then(RecordBuilder::finish) {
                            self.headers.observe(&row);
                            self.rows_emitted += 1;
                            batch.push(row);
                            if batch.len() >= chunk_size {
                                return Ok(Some(batch));
                            }
                        }
                    }
                }
                XmlEvent::Eof => {
                    self.events = None;
                    return Ok((!batch.is_empty()).then_some(batch));
                }
            }
        }
    }
}

impl<R: BufRead> Iterator for RowStream<R> {
    type Item = Result<Vec<Row>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_batch().transpose()
    }
}
