use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use csv::{ByteRecord, ReaderBuilder, WriterBuilder};
use flatline_xml::Row;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Csv,
    Tsv,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Tsv => "tsv",
        }
    }

    pub fn delimiter(&self) -> u8 {
        match self {
            Self::Csv => b',',
            Self::Tsv => b'\t',
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "tsv" => Ok(Self::Tsv),
            other => Err(format!("unknown output format '{other}' (expected csv or tsv)")),
        }
    }
}

/// Writes rows under a fixed header row.
///
/// Columns follow `headers` exactly; a key missing from a row becomes an
/// empty field. Files appear at their target path only once complete.
#[derive(Clone, Copy, Debug)]
pub struct OutputWriter {
    format: OutputFormat,
}

impl OutputWriter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn write_all(&self, target: &Path, headers: &[String], rows: &[Row]) -> Result<()> {
        let mut temp = temp_beside(target)?;
        {
            let mut writer = WriterBuilder::new()
                .delimiter(self.format.delimiter())
                .from_writer(temp.as_file_mut());
            writer.write_record(headers)?;
            for row in rows {
                writer.write_record(row.values_for(headers))?;
            }
            writer.flush()?;
        }
        persist(temp, target)
    }

    /// Start an output whose header row is only known at the end.
    pub fn spool(&self, target: &Path) -> Result<SpooledOutput> {
        let spool = temp_beside(target)?;
        let writer = WriterBuilder::new()
            .delimiter(self.format.delimiter())
            .flexible(true)
            .from_writer(spool.reopen()?);

        Ok(SpooledOutput {
            target: target.to_path_buf(),
            format: self.format,
            spool,
            writer,
            rows: 0,
        })
    }
}

/// Body rows buffered on disk until the final header row is known.
pub struct SpooledOutput {
    target: PathBuf,
    format: OutputFormat,
    spool: NamedTempFile,
    writer: csv::Writer<File>,
    rows: u64,
}

impl SpooledOutput {
    /// Append rows laid out against the headers known so far. Headers may
    /// only grow by appending between calls.
    pub fn push(&mut self, headers: &[String], rows: &[Row]) -> Result<()> {
        for row in rows {
            self.writer.write_record(row.values_for(headers))?;
        }
        self.rows += rows.len() as u64;
        Ok(())
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Write the header row, re-stream the spool padded to full width and
    /// move the result into place. Returns the number of body rows.
    pub fn finish(mut self, headers: &[String]) -> Result<u64> {
        self.writer.flush()?;
        drop(self.writer);

        let mut reader = ReaderBuilder::new()
            .delimiter(self.format.delimiter())
            .has_headers(false)
            .flexible(true)
            .from_path(self.spool.path())?;

        let mut temp = temp_beside(&self.target)?;
        {
            let mut writer = WriterBuilder::new()
                .delimiter(self.format.delimiter())
                .from_writer(temp.as_file_mut());
            writer.write_record(headers)?;

            let mut record = ByteRecord::new();
            while reader.read_byte_record(&mut record)? {
                for _ in record.len()..headers.len() {
                    record.push_field(b"");
                }
                writer.write_byte_record(&record)?;
            }
            writer.flush()?;
        }

        persist(temp, &self.target)?;
        Ok(self.rows)
    }
}

fn temp_beside(target: &Path) -> Result<NamedTempFile> {
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    Ok(tempfile::Builder::new()
        .prefix(".flatline-")
        .tempfile_in(dir)?)
}

fn persist(mut temp: NamedTempFile, target: &Path) -> Result<()> {
    temp.as_file_mut().flush()?;
    temp.persist(target).map_err(|e| Error::Io(e.error))?;
    Ok(())
}
