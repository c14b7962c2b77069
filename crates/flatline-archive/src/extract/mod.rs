use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::Result;

mod zip;

pub(crate) use self::zip::ZipSource;

pub(crate) trait ReadSeek: Read + Seek {}

impl<T: Read + Seek> ReadSeek for T {}

/// Where the bytes of an archive on the work-list live.
#[derive(Clone, Debug)]
pub(crate) enum ArchiveSource {
    File(PathBuf),
    Memory(Arc<[u8]>),
}

impl ArchiveSource {
    pub(crate) fn open(&self) -> io::Result<Box<dyn ReadSeek>> {
        match self {
            Self::File(path) => Ok(Box::new(BufReader::new(File::open(path)?))),
            Self::Memory(bytes) => Ok(Box::new(Cursor::new(Arc::clone(bytes)))),
        }
    }
}

/// One entry of an open archive, with its content reader.
pub(crate) struct PendingEntry<'a> {
    pub name: String,
    pub size: u64,
    pub compressed_size: u64,
    pub is_dir: bool,
    pub reader: Box<dyn Read + 'a>,
}

pub(crate) trait EntrySource {
    fn next_entry(&mut self) -> Option<Result<PendingEntry<'_>>>;

    fn len(&self) -> usize;
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Copied {
    Complete(u64),
    OverBudget,
}

/// Copy at most `limit` bytes into a new file at `dest`.
///
/// The destination is removed when the source holds more than `limit`
/// bytes or the copy fails.
pub(crate) fn copy_bounded(reader: &mut dyn Read, dest: &Path, limit: u64) -> io::Result<Copied> {
    let outcome = copy_into(reader, dest, limit);
    if !matches!(outcome, Ok(Copied::Complete(_))) {
        let _ = fs::remove_file(dest);
    }
    outcome
}

fn copy_into(reader: &mut dyn Read, dest: &Path, limit: u64) -> io::Result<Copied> {
    let mut writer = BufWriter::new(File::create(dest)?);
    let written = io::copy(&mut Read::take(&mut *reader, limit), &mut writer)?;

    if written == limit {
        let mut probe = [0u8; 1];
        if reader.read(&mut probe)? > 0 {
            return Ok(Copied::OverBudget);
        }
    }

    writer.flush()?;
    Ok(Copied::Complete(written))
}
