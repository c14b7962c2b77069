use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::classify::canonical_group;

/// One XML document found during a scan.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DocumentEntry {
    /// Container chain joined with the in-archive path, e.g.
    /// `Export_20240101.zip/AR.zip/invoices/a.xml`.
    pub logical_path: String,
    pub physical_path: PathBuf,
    pub size_bytes: u64,
    pub group: String,
    pub filename: String,
}

impl DocumentEntry {
    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / (1024.0 * 1024.0)
    }

    /// Logical path segments below the outermost container.
    pub fn relative_segments(&self) -> impl Iterator<Item = &str> {
        self.logical_path.split('/').skip(1).filter(|s| !s.is_empty())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct GroupSummary {
    pub count: usize,
    pub total_bytes: u64,
    pub files: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    CompressionRatio { ratio: f64 },
    UnsafePath,
    DepthExceeded,
    CorruptArchive,
    DuplicatePath,
    /// The entry inflated past the size its header declares.
    SizeMismatch { declared: u64 },
    Unreadable { message: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CompressionRatio { ratio } => write!(f, "compression ratio {ratio:.0} exceeds limit"),
            Self::UnsafePath => f.write_str("unsafe entry path"),
            Self::DepthExceeded => f.write_str("nesting depth exceeded"),
            Self::CorruptArchive => f.write_str("corrupted nested archive"),
            Self::DuplicatePath => f.write_str("duplicate logical path"),
            Self::SizeMismatch { declared } => {
                write!(f, "entry exceeds its declared size of {declared} bytes")
            }
            Self::Unreadable { message } => write!(f, "unreadable entry: {message}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SkippedEntry {
    pub logical_path: String,
    pub reason: SkipReason,
}

/// Why a scan stopped before visiting everything.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitReached {
    MaxFiles,
    MaxTotalBytes,
}

/// Scan inventory. Counts are lower bounds when `limit_reached` is set.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ScanReport {
    pub entries: Vec<DocumentEntry>,
    pub groups: BTreeMap<String, GroupSummary>,
    pub total_bytes: u64,
    pub archives_visited: usize,
    pub skipped: Vec<SkippedEntry>,
    pub limit_reached: Option<LimitReached>,
}

impl ScanReport {
    /// Canonicalize group keys and build the group index.
    ///
    /// Entries sharing a logical path keep the first occurrence; later ones
    /// are recorded as skipped duplicates.
    pub fn from_entries(entries: Vec<DocumentEntry>) -> Self {
        let mut report = ScanReport::default();
        let mut seen = HashSet::with_capacity(entries.len());

        for mut entry in entries {
            if !seen.insert(entry.logical_path.clone()) {
                report.skipped.push(SkippedEntry {
                    logical_path: entry.logical_path,
                    reason: SkipReason::DuplicatePath,
                });
                continue;
            }

            entry.group = canonical_group(&entry.group);
            let summary = report.groups.entry(entry.group.clone()).or_default();
            summary.count += 1;
            summary.total_bytes += entry.size_bytes;
            summary.files.push(entry.logical_path.clone());

            report.total_bytes += entry.size_bytes;
            report.entries.push(entry);
        }

        report
    }

    pub fn is_partial(&self) -> bool {
        self.limit_reached.is_some()
    }

    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, group: &str, size: u64) -> DocumentEntry {
        DocumentEntry {
            logical_path: path.to_string(),
            physical_path: PathBuf::from("/sandbox").join(path.replace('/', "_")),
            size_bytes: size,
            group: group.to_string(),
            filename: path.rsplit('/').next().unwrap_or(path).to_string(),
        }
    }

    #[test]
    fn spellings_merge_into_one_group() {
        let report = ScanReport::from_entries(vec![
            entry("root.zip/AR_PAYMENT_TERM.zip/a.xml", "AR_PAYMENT_TERM", 10),
            entry("root.zip/ar_payment_term.zip/b.xml", "ar_payment_term", 20),
            entry("root.zip/JOURNAL.zip/c.xml", "JOURNAL", 5),
        ]);

        assert_eq!(report.groups.len(), 2);
        let ar = &report.groups["AR_PAYMENT_TERM"];
        assert_eq!(ar.count, 2);
        assert_eq!(ar.total_bytes, 30);
        assert!(report.entries.iter().all(|e| e.group == e.group.to_uppercase()));
    }

    #[test]
    fn identity_collision_keeps_first_assignment() {
        let report = ScanReport::from_entries(vec![
            entry("root.zip/x.xml", "ar", 10),
            entry("root.zip/x.xml", "JOURNAL", 10),
        ]);

        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.entries[0].group, "AR");
        assert!(!report.groups.contains_key("JOURNAL"));
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].reason, SkipReason::DuplicatePath);
    }

    #[test]
    fn group_counts_cover_every_entry() {
        let report = ScanReport::from_entries(vec![
            entry("r.zip/a.xml", " gl ", 1),
            entry("r.zip/b.xml", "GL", 1),
            entry("r.zip/c.xml", "ROOT", 1),
        ]);
        let total: usize = report.groups.values().map(|g| g.count).sum();
        assert_eq!(total, report.entries.len());
        assert_eq!(report.groups["GL"].count, 2);
    }

    #[test]
    fn trailing_punctuation_does_not_merge() {
        let report = ScanReport::from_entries(vec![
            entry("r.zip/a.xml", "AR_PAYMENT_TERM.", 1),
            entry("r.zip/b.xml", "AR_PAYMENT_TERM", 1),
        ]);
        assert_eq!(report.groups.len(), 2);
    }

    #[test]
    fn relative_segments_skip_outer_container() {
        let e = entry("Export.zip/AR.zip/inv/a.xml", "AR", 1);
        let segments: Vec<_> = e.relative_segments().collect();
        assert_eq!(segments, vec!["AR.zip", "inv", "a.xml"]);
    }
}
