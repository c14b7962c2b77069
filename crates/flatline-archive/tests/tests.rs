use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use flatline_archive::{
    ArchiveScanner, Error, GroupClassifier, LimitReached, ROOT_GROUP, Sandbox, ScanOptions,
    SkipReason, canonical_group, sanitize_path,
};
use proptest::prelude::*;
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

fn build_zip(files: &[(&str, &[u8])]) -> Vec<u8> {
    build_zip_with(files, CompressionMethod::Stored)
}

fn build_zip_with(files: &[(&str, &[u8])], method: CompressionMethod) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(method);

    for (name, content) in files {
        writer.start_file(name.to_string(), options).unwrap();
        writer.write_all(content).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn scanner(options: ScanOptions) -> ArchiveScanner {
    ArchiveScanner::new(options, GroupClassifier::default())
}

fn files_under(dir: &Path) -> Vec<std::path::PathBuf> {
    let mut found = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                pending.push(path);
            } else {
                found.push(path);
            }
        }
    }
    found
}

#[test]
fn nested_archives_are_grouped_by_business_module() {
    let ar_upper = build_zip(&[("a.xml", b"<r/>")]);
    let ar_lower = build_zip(&[("b.xml", b"<r/>")]);
    let journal = build_zip(&[("j.xml", b"<r/>")]);
    let batch = build_zip(&[("JOURNAL.zip", &journal)]);
    let root = build_zip(&[
        ("AR_PAYMENT_TERM.zip", &ar_upper),
        ("nested/ar_payment_term.zip", &ar_lower),
        ("1_BATCH.zip", &batch),
        ("readme.txt", b"ignored"),
        ("loose.xml", b"<r/>"),
    ]);

    let sandbox = Sandbox::new().unwrap();
    let report = scanner(ScanOptions::default())
        .scan_bytes("Export_20240115_093000.zip", root, &sandbox)
        .unwrap();

    assert_eq!(report.entries.len(), 4);
    assert_eq!(report.groups["AR_PAYMENT_TERM"].count, 2);
    assert_eq!(report.groups["JOURNAL"].count, 1);
    assert_eq!(report.groups[ROOT_GROUP].count, 1);
    assert_eq!(report.archives_visited, 5);

    let total: usize = report.groups.values().map(|g| g.count).sum();
    assert_eq!(total, report.entries.len());

    let nested = report
        .entries
        .iter()
        .find(|e| e.filename == "b.xml")
        .unwrap();
    assert_eq!(
        nested.logical_path,
        "Export_20240115_093000.zip/nested/ar_payment_term.zip/b.xml"
    );
}

#[test]
fn compression_bomb_is_skipped() {
    let zeros = vec![0u8; 10 * 1024 * 1024];
    let root = build_zip_with(
        &[("bomb.xml", &zeros), ("ok.xml", b"<r/>")],
        CompressionMethod::Deflated,
    );

    let sandbox = Sandbox::new().unwrap();
    let report = scanner(ScanOptions::default())
        .scan_bytes("upload.zip", root, &sandbox)
        .unwrap();

    assert_eq!(report.entries.len(), 1);
    assert_eq!(report.entries[0].filename, "ok.xml");
    assert!(matches!(
        report.skipped[0].reason,
        SkipReason::CompressionRatio { ratio } if ratio > 200.0
    ));
    assert!(!report.is_partial());
}

/// Overwrite the uncompressed size of the first entry in both the local
/// header and the central directory.
fn understate_size(mut zip: Vec<u8>, declared: u32) -> Vec<u8> {
    let central = zip
        .windows(4)
        .rposition(|w| w == b"PK\x01\x02")
        .unwrap();
    let size = declared.to_le_bytes();
    zip[22..26].copy_from_slice(&size);
    zip[central + 24..central + 28].copy_from_slice(&size);
    zip
}

#[test]
fn understated_entry_size_is_not_extracted() {
    let filler = vec![b'a'; 10 * 1024 * 1024];
    let root = understate_size(
        build_zip_with(&[("bomb.xml", &filler)], CompressionMethod::Deflated),
        1000,
    );

    let sandbox = Sandbox::new().unwrap();
    let report = scanner(ScanOptions::default())
        .scan_bytes("upload.zip", root, &sandbox)
        .unwrap();

    assert!(report.entries.is_empty());
    assert_eq!(report.total_bytes, 0);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].logical_path, "upload.zip/bomb.xml");
    assert_eq!(
        report.skipped[0].reason,
        SkipReason::SizeMismatch { declared: 1000 }
    );
    assert!(files_under(sandbox.root()).is_empty());
}

#[test]
fn deep_nesting_stops_at_max_depth() {
    let mut inner = build_zip(&[("doc59.xml", b"<r/>")]);
    for level in (0..59).rev() {
        let doc = format!("doc{level}.xml");
        let child = format!("level{}.zip", level + 1);
        inner = build_zip(&[(doc.as_str(), b"<r/>"), (child.as_str(), &inner)]);
    }

    let sandbox = Sandbox::new().unwrap();
    let report = scanner(ScanOptions::default().max_depth(10))
        .scan_bytes("level0.zip", inner, &sandbox)
        .unwrap();

    assert_eq!(report.entries.len(), 11);
    assert_eq!(report.archives_visited, 11);
    assert!(report.entries.iter().all(|e| {
        let level: usize = e.filename[3..e.filename.len() - 4].parse().unwrap();
        level <= 10
    }));
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].reason, SkipReason::DepthExceeded);
}

#[test]
fn crafted_paths_never_escape_sandbox() {
    let root = build_zip(&[
        ("../../evil.xml", b"<r/>"),
        ("..\\..\\win.xml", b"<r/>"),
        ("ok/../../../escape.xml", b"<r/>"),
        ("ok/good.xml", b"<r/>"),
    ]);

    let sandbox = Sandbox::new().unwrap();
    let report = scanner(ScanOptions::default())
        .scan_bytes("root.zip", root, &sandbox)
        .unwrap();

    assert_eq!(report.entries.len(), 1);
    assert_eq!(report.entries[0].logical_path, "root.zip/ok/good.xml");
    assert_eq!(report.skipped.len(), 3);
    assert!(
        report
            .skipped
            .iter()
            .all(|s| s.reason == SkipReason::UnsafePath)
    );

    for entry in &report.entries {
        assert!(entry.physical_path.starts_with(sandbox.root()));
        assert_ne!(entry.physical_path, sandbox.root());
    }
    for path in files_under(sandbox.root()) {
        assert!(path.starts_with(sandbox.root()));
    }
}

#[test]
fn corrupt_root_archive_is_fatal() {
    let sandbox = Sandbox::new().unwrap();
    let err = scanner(ScanOptions::default())
        .scan_bytes("broken.zip", b"PK\x03\x04 definitely not a zip".to_vec(), &sandbox)
        .unwrap_err();

    assert!(matches!(err, Error::ScanFailed { .. }));
}

#[test]
fn corrupt_nested_archive_is_skipped() {
    let root = build_zip(&[
        ("broken.zip", b"not an archive"),
        ("fine.xml", b"<r/>"),
    ]);

    let sandbox = Sandbox::new().unwrap();
    let report = scanner(ScanOptions::default())
        .scan_bytes("root.zip", root, &sandbox)
        .unwrap();

    assert_eq!(report.entries.len(), 1);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].logical_path, "root.zip/broken.zip");
    assert_eq!(report.skipped[0].reason, SkipReason::CorruptArchive);
}

#[test]
fn file_limit_returns_partial_report() {
    let root = build_zip(&[
        ("a.xml", b"<r/>"),
        ("b.xml", b"<r/>"),
        ("c.xml", b"<r/>"),
        ("d.xml", b"<r/>"),
    ]);

    let sandbox = Sandbox::new().unwrap();
    let report = scanner(ScanOptions::default().max_files(2))
        .scan_bytes("root.zip", root, &sandbox)
        .unwrap();

    assert_eq!(report.entries.len(), 2);
    assert_eq!(report.limit_reached, Some(LimitReached::MaxFiles));
}

#[test]
fn byte_budget_returns_partial_report() {
    let root = build_zip(&[("a.xml", b"<row>1</row>"), ("b.xml", b"<row>2</row>")]);

    let sandbox = Sandbox::new().unwrap();
    let report = scanner(ScanOptions::default().max_total_extracted_bytes(20))
        .scan_bytes("root.zip", root, &sandbox)
        .unwrap();

    assert_eq!(report.entries.len(), 1);
    assert_eq!(report.total_bytes, 12);
    assert_eq!(report.limit_reached, Some(LimitReached::MaxTotalBytes));
}

#[test]
fn duplicate_names_keep_first_entry() {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    writer.start_file("dup.xml", options).unwrap();
    writer.write_all(b"<first/>").unwrap();
    writer.start_file("sub/../dup.xml", options).unwrap();
    writer.write_all(b"<second/>").unwrap();
    let root = writer.finish().unwrap().into_inner();

    let sandbox = Sandbox::new().unwrap();
    let report = scanner(ScanOptions::default())
        .scan_bytes("root.zip", root, &sandbox)
        .unwrap();

    assert_eq!(report.entries.len(), 1);
    assert_eq!(fs::read(&report.entries[0].physical_path).unwrap(), b"<first/>");
    assert_eq!(report.skipped[0].reason, SkipReason::DuplicatePath);
}

#[test]
fn progress_reports_final_counts() {
    let root = build_zip(&[("a.xml", b"<r/>"), ("b.xml", b"<r/>"), ("c.txt", b"x")]);
    let last_found = Arc::new(AtomicU64::new(0));
    let calls = Arc::new(AtomicU64::new(0));
    let (found, count) = (last_found.clone(), calls.clone());

    let options = ScanOptions::default()
        .progress_every(1)
        .on_progress(Arc::new(move |p| {
            assert!(p.entries_done <= p.entries_total_estimate);
            found.store(p.xml_found, Ordering::SeqCst);
            count.fetch_add(1, Ordering::SeqCst);
        }));

    let sandbox = Sandbox::new().unwrap();
    scanner(options).scan_bytes("root.zip", root, &sandbox).unwrap();

    assert_eq!(last_found.load(Ordering::SeqCst), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[test]
fn nested_archive_copies_are_cleaned_up() {
    let inner = build_zip(&[("x.xml", b"<r/>")]);
    let root = build_zip(&[("GL.zip", &inner)]);

    let sandbox = Sandbox::new().unwrap();
    let report = scanner(ScanOptions::default())
        .scan_bytes("Export_2024-01-31.zip", root, &sandbox)
        .unwrap();

    assert_eq!(report.entries.len(), 1);
    assert_eq!(report.entries[0].group, "GL");
    let leftovers = files_under(sandbox.root());
    assert_eq!(leftovers, vec![report.entries[0].physical_path.clone()]);
}

#[test]
fn scan_path_reads_root_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("AP.zip");
    fs::write(&path, build_zip(&[("inv.xml", b"<r/>")])).unwrap();

    let sandbox = Sandbox::new_in(dir.path().join("work")).unwrap();
    let report = scanner(ScanOptions::default())
        .scan_path(&path, &sandbox)
        .unwrap();

    assert_eq!(report.entries.len(), 1);
    assert_eq!(report.entries[0].group, "AP");
    assert_eq!(report.entries[0].logical_path, "AP.zip/inv.xml");
    assert!(path.exists());
}

#[test]
fn missing_root_is_scan_failure() {
    let sandbox = Sandbox::new().unwrap();
    let err = scanner(ScanOptions::default())
        .scan_path(Path::new("/nonexistent/flatline/root.zip"), &sandbox)
        .unwrap_err();
    assert!(matches!(err, Error::ScanFailed { .. }));
}

proptest! {
    #[test]
    fn sanitized_paths_stay_inside_base(name in "[a-z./\\\\]{1,24}") {
        let base = Path::new("/sandbox/session");
        if let Ok(sanitized) = sanitize_path(&name, base) {
            prop_assert!(sanitized.resolved.starts_with(base));
            prop_assert_ne!(sanitized.resolved.as_path(), base);
        }
    }

    #[test]
    fn canonical_group_is_idempotent(name in "[ a-zA-Z_]{0,20}") {
        let once = canonical_group(&name);
        prop_assert_eq!(canonical_group(&once), once.clone());
    }
}
