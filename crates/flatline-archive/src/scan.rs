use std::collections::{HashSet, VecDeque};
use std::fs::File;
use std::io::{BufReader, Read};
use std::ops::ControlFlow;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::classify::{GroupClassifier, ROOT_GROUP};
use crate::detect::{InputKind, detect_from_reader, detect_kind, is_archive_name, is_xml_name, kind_from_name};
use crate::entry::{DocumentEntry, LimitReached, ScanReport, SkipReason, SkippedEntry};
use crate::error::{Error, Result};
use crate::extract::{ArchiveSource, Copied, EntrySource, PendingEntry, ZipSource, copy_bounded};
use crate::options::{ScanOptions, ScanProgress};
use crate::sandbox::Sandbox;
use crate::sanitize::normalize_entry_name;

/// Walks a root archive and every archive nested inside it, extracting XML
/// documents into a [`Sandbox`].
///
/// Traversal uses an explicit work-list, so nesting depth never grows the
/// call stack. Limits stop the walk early with a partial report.
#[derive(Clone, Debug, Default)]
pub struct ArchiveScanner {
    options: ScanOptions,
    classifier: GroupClassifier,
}

/// An archive waiting on the work-list.
struct PendingArchive {
    source: ArchiveSource,
    /// Container names, outermost first.
    chain: Vec<String>,
    depth: usize,
    group: Option<String>,
    /// Extracted into the sandbox by this scan; removed once visited.
    owned: bool,
}

#[derive(Default)]
struct ScanState {
    queue: VecDeque<PendingArchive>,
    entries: Vec<DocumentEntry>,
    seen: HashSet<String>,
    skipped: Vec<SkippedEntry>,
    extracted_bytes: u64,
    entries_done: u64,
    entries_estimate: u64,
    archives_visited: usize,
    limit: Option<LimitReached>,
}

impl ScanState {
    fn skip(&mut self, logical_path: String, reason: SkipReason) {
        warn!(path = %logical_path, %reason, "skipping entry");
        self.skipped.push(SkippedEntry {
            logical_path,
            reason,
        });
    }

    fn progress(&self) -> ScanProgress {
        ScanProgress {
            entries_done: self.entries_done,
            entries_total_estimate: self.entries_estimate.max(self.entries_done),
            xml_found: self.entries.len() as u64,
        }
    }
}

impl ArchiveScanner {
    pub fn new(options: ScanOptions, classifier: GroupClassifier) -> Self {
        Self {
            options,
            classifier,
        }
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    pub fn classifier(&self) -> &GroupClassifier {
        &self.classifier
    }

    /// Scan a root archive or standalone XML document on disk.
    pub fn scan_path(&self, path: &Path, sandbox: &Sandbox) -> Result<ScanReport> {
        let name = root_name(path);
        let file = File::open(path).map_err(|e| Error::scan_failed(path, e))?;
        let mut reader = BufReader::new(file);
        let kind = detect_from_reader(&mut reader, &name).map_err(|e| Error::scan_failed(path, e))?;

        match kind {
            Some(InputKind::Zip) => {
                drop(reader);
                self.scan_archive(path, &name, ArchiveSource::File(path.to_path_buf()), sandbox)
            }
            Some(InputKind::Xml) => self.scan_document(path, &name, &mut reader, sandbox),
            None => Err(Error::scan_failed(path, Error::UnsupportedFormat)),
        }
    }

    /// Scan an in-memory root. `name` stands in for the file name.
    pub fn scan_bytes(&self, name: &str, data: Vec<u8>, sandbox: &Sandbox) -> Result<ScanReport> {
        let origin = PathBuf::from(name);
        match detect_kind(&data).or_else(|| kind_from_name(name)) {
            Some(InputKind::Zip) => {
                self.scan_archive(&origin, name, ArchiveSource::Memory(Arc::from(data)), sandbox)
            }
            Some(InputKind::Xml) => self.scan_document(&origin, name, &mut data.as_slice(), sandbox),
            None => Err(Error::scan_failed(origin, Error::UnsupportedFormat)),
        }
    }

    fn scan_document(
        &self,
        origin: &Path,
        name: &str,
        reader: &mut dyn Read,
        sandbox: &Sandbox,
    ) -> Result<ScanReport> {
        let mut state = ScanState {
            entries_done: 1,
            entries_estimate: 1,
            ..ScanState::default()
        };

        if self.options.max_files == 0 {
            state.limit = Some(LimitReached::MaxFiles);
            return Ok(self.finish(state));
        }

        let dest = sandbox.allocate(name, name)?;
        match copy_bounded(reader, &dest, self.options.max_total_extracted_bytes) {
            Ok(Copied::Complete(size)) => {
                state.extracted_bytes = size;
                state.entries.push(DocumentEntry {
                    logical_path: name.to_string(),
                    physical_path: dest,
                    size_bytes: size,
                    group: ROOT_GROUP.to_string(),
                    filename: name.to_string(),
                });
            }
            Ok(Copied::OverBudget) => state.limit = Some(LimitReached::MaxTotalBytes),
            Err(e) => return Err(Error::scan_failed(origin, e)),
        }

        Ok(self.finish(state))
    }

    fn scan_archive(
        &self,
        origin: &Path,
        name: &str,
        source: ArchiveSource,
        sandbox: &Sandbox,
    ) -> Result<ScanReport> {
        let mut state = ScanState::default();
        state.queue.push_back(PendingArchive {
            source,
            chain: vec![name.to_string()],
            depth: 0,
            group: self.classifier.resolve(None, name),
            owned: false,
        });

        while let Some(archive) = state.queue.pop_front() {
            let flow = self.visit_archive(origin, &archive, sandbox, &mut state);

            if archive.owned {
                if let ArchiveSource::File(ref path) = archive.source {
                    let _ = std::fs::remove_file(path);
                }
            }

            if flow?.is_break() {
                break;
            }
        }

        Ok(self.finish(state))
    }

    fn visit_archive(
        &self,
        origin: &Path,
        archive: &PendingArchive,
        sandbox: &Sandbox,
        state: &mut ScanState,
    ) -> Result<ControlFlow<()>> {
        let logical = archive.chain.join("/");
        let opened = archive
            .source
            .open()
            .map_err(Error::from)
            .and_then(ZipSource::new);

        let mut source = match opened {
            Ok(source) => source,
            Err(e) if archive.depth == 0 => return Err(Error::scan_failed(origin, e)),
            Err(_) => {
                state.skip(logical, SkipReason::CorruptArchive);
                return Ok(ControlFlow::Continue(()));
            }
        };

        debug!(archive = %logical, depth = archive.depth, entries = source.len(), "visiting archive");
        state.archives_visited += 1;
        state.entries_estimate += source.len() as u64;

        while let Some(next) = source.next_entry() {
            state.entries_done += 1;
            if state.entries_done % self.options.progress_every.max(1) as u64 == 0 {
                self.options.report(state.progress());
            }

            let flow = match next {
                Ok(entry) => self.visit_entry(archive, entry, sandbox, state)?,
                Err(e) => {
                    state.skip(
                        format!("{logical}/#{}", state.entries_done),
                        SkipReason::Unreadable {
                            message: e.to_string(),
                        },
                    );
                    ControlFlow::Continue(())
                }
            };

            if flow.is_break() {
                return Ok(flow);
            }
        }

        Ok(ControlFlow::Continue(()))
    }

    fn visit_entry(
        &self,
        archive: &PendingArchive,
        mut entry: PendingEntry<'_>,
        sandbox: &Sandbox,
        state: &mut ScanState,
    ) -> Result<ControlFlow<()>> {
        if entry.is_dir {
            return Ok(ControlFlow::Continue(()));
        }

        let container = archive.chain.join("/");
        let relative = match normalize_entry_name(&entry.name) {
            Ok(path) => slash_path(&path),
            Err(_) => {
                state.skip(format!("{container}/{}", entry.name), SkipReason::UnsafePath);
                return Ok(ControlFlow::Continue(()));
            }
        };
        let logical_path = format!("{container}/{relative}");

        let is_xml = is_xml_name(&relative);
        if !is_xml && !is_archive_name(&relative) {
            return Ok(ControlFlow::Continue(()));
        }

        if let Some(ratio) = self
            .options
            .exceeds_ratio(entry.size, entry.compressed_size)
        {
            state.skip(logical_path, SkipReason::CompressionRatio { ratio });
            return Ok(ControlFlow::Continue(()));
        }

        if !is_xml && archive.depth >= self.options.max_depth {
            state.skip(logical_path, SkipReason::DepthExceeded);
            return Ok(ControlFlow::Continue(()));
        }

        if state.seen.contains(&logical_path) {
            state.skip(logical_path, SkipReason::DuplicatePath);
            return Ok(ControlFlow::Continue(()));
        }

        if is_xml && state.entries.len() >= self.options.max_files {
            info!(max_files = self.options.max_files, "file limit reached");
            state.limit = Some(LimitReached::MaxFiles);
            return Ok(ControlFlow::Break(()));
        }

        let remaining = self
            .options
            .max_total_extracted_bytes
            .saturating_sub(state.extracted_bytes);
        if entry.size > remaining {
            info!(path = %logical_path, "extraction budget exhausted");
            state.limit = Some(LimitReached::MaxTotalBytes);
            return Ok(ControlFlow::Break(()));
        }

        let file_name = relative.rsplit('/').next().unwrap_or(&relative).to_string();
        let dest = sandbox.allocate(&logical_path, &file_name)?;
        if !sandbox.contains(&dest) {
            state.skip(logical_path, SkipReason::UnsafePath);
            return Ok(ControlFlow::Continue(()));
        }

        // Headers may understate the inflated size; the copy stops at the
        // declared size, which already fits the remaining budget.
        let size = match copy_bounded(entry.reader.as_mut(), &dest, entry.size) {
            Ok(Copied::Complete(size)) => size,
            Ok(Copied::OverBudget) => {
                warn!(
                    path = %logical_path,
                    declared = entry.size,
                    "entry inflates past its declared size"
                );
                state.skip(
                    logical_path,
                    SkipReason::SizeMismatch {
                        declared: entry.size,
                    },
                );
                return Ok(ControlFlow::Continue(()));
            }
            Err(e) => {
                state.skip(
                    logical_path,
                    SkipReason::Unreadable {
                        message: e.to_string(),
                    },
                );
                return Ok(ControlFlow::Continue(()));
            }
        };

        state.extracted_bytes += size;
        state.seen.insert(logical_path.clone());

        if is_xml {
            state.entries.push(DocumentEntry {
                logical_path,
                physical_path: dest,
                size_bytes: size,
                group: archive
                    .group
                    .clone()
                    .unwrap_or_else(|| ROOT_GROUP.to_string()),
                filename: file_name,
            });
        } else {
            let mut chain = archive.chain.clone();
            chain.push(relative.clone());
            state.queue.push_back(PendingArchive {
                source: ArchiveSource::File(dest),
                chain,
                depth: archive.depth + 1,
                group: self.classifier.resolve(archive.group.as_deref(), &file_name),
                owned: true,
            });
        }

        Ok(ControlFlow::Continue(()))
    }

    fn finish(&self, state: ScanState) -> ScanReport {
        self.options.report(state.progress());

        let mut report = ScanReport::from_entries(state.entries);
        let mut skipped = state.skipped;
        skipped.append(&mut report.skipped);
        report.skipped = skipped;
        report.archives_visited = state.archives_visited;
        report.limit_reached = state.limit;

        info!(
            documents = report.entries.len(),
            groups = report.groups.len(),
            archives = report.archives_visited,
            skipped = report.skipped.len(),
            partial = report.is_partial(),
            "scan finished"
        );
        report
    }
}

fn root_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

fn slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
