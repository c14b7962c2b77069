use std::fs;

use flatline_xml::{FlattenOptions, Flattened, flatten_file};
use tracing::debug;

use crate::error::ConvertError;
use crate::task::ConversionTask;
use crate::writer::OutputWriter;

/// What a successful conversion produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Conversion {
    pub rows: u64,
    pub columns: usize,
    /// Record rule applied, e.g. `invoice`.
    pub record: String,
}

/// Turns one scanned document into one output file.
pub trait DocumentConverter: Send + Sync + 'static {
    fn convert(&self, task: &ConversionTask) -> Result<Conversion, ConvertError>;
}

/// Flattens XML and writes it with [`OutputWriter`].
#[derive(Clone, Debug, Default)]
pub struct XmlConverter {
    options: FlattenOptions,
}

impl XmlConverter {
    pub fn new(options: FlattenOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &FlattenOptions {
        &self.options
    }
}

impl DocumentConverter for XmlConverter {
    fn convert(&self, task: &ConversionTask) -> Result<Conversion, ConvertError> {
        let writer = OutputWriter::new(task.format);

        match flatten_file(&task.entry.physical_path, &self.options)? {
            Flattened::InMemory(output) => {
                if output.is_empty() {
                    return Err(ConvertError::NoRecords);
                }
                ensure_parent(task)?;
                writer.write_all(&task.output_path, &output.headers, &output.rows)?;

                Ok(Conversion {
                    rows: output.rows.len() as u64,
                    columns: output.headers.len(),
                    record: output.selector.to_string(),
                })
            }
            Flattened::Streaming(mut stream) => {
                let Some(first) = stream.next().transpose()? else {
                    return Err(ConvertError::NoRecords);
                };
                ensure_parent(task)?;

                let mut spool = writer.spool(&task.output_path)?;
                spool.push(stream.headers(), &first)?;
                while let Some(batch) = stream.next() {
                    spool.push(stream.headers(), &batch?)?;
                }

                let record = stream.selector().to_string();
                let columns = stream.headers().len();
                let rows = spool.finish(stream.headers())?;
                debug!(output = %task.output_path.display(), rows, "streamed conversion");

                Ok(Conversion { rows, columns, record })
            }
        }
    }
}

fn ensure_parent(task: &ConversionTask) -> Result<(), ConvertError> {
    if let Some(parent) = task.output_path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}
