use crate::error::Error;
use crate::extract::{EntrySource, PendingEntry, ReadSeek};
use crate::Result;

pub(crate) struct ZipSource {
    archive: zip::ZipArchive<Box<dyn ReadSeek>>,
    index: usize,
}

impl ZipSource {
    pub(crate) fn new(reader: Box<dyn ReadSeek>) -> Result<Self> {
        let archive = zip::ZipArchive::new(reader).map_err(|_| Error::Corrupted)?;
        Ok(Self { archive, index: 0 })
    }
}

impl EntrySource for ZipSource {
    fn next_entry(&mut self) -> Option<Result<PendingEntry<'_>>> {
        if self.index >= self.archive.len() {
            return None;
        }
        let index = self.index;
        self.index += 1;

        let file = match self.archive.by_index(index) {
            Ok(f) => f,
            Err(_) => return Some(Err(Error::Corrupted)),
        };

        // raw name, sanitized by the scanner
        let name = file.name().to_string();
        let size = file.size();
        let compressed_size = file.compressed_size();
        let is_dir = file.is_dir();

        Some(Ok(PendingEntry {
            name,
            size,
            compressed_size,
            is_dir,
            reader: Box::new(file),
        }))
    }

    fn len(&self) -> usize {
        self.archive.len()
    }
}
