use std::io::{self, Read, Seek};
use std::path::Path;

/// What a scan input turned out to be.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputKind {
    Zip,
    Xml,
}

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

pub fn detect_kind(data: &[u8]) -> Option<InputKind> {
    match data {
        [0x50, 0x4B, 0x03, 0x04, ..] | [0x50, 0x4B, 0x05, 0x06, ..] => Some(InputKind::Zip),
        _ if looks_like_xml(data) => Some(InputKind::Xml),
        _ => None,
    }
}

fn looks_like_xml(data: &[u8]) -> bool {
    let data = data.strip_prefix(UTF8_BOM).unwrap_or(data);
    data.iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|b| *b == b'<')
}

/// Sniff the head of `reader` and fall back to the file extension.
pub fn detect_from_reader<R: Read + Seek>(
    reader: &mut R,
    name: &str,
) -> io::Result<Option<InputKind>> {
    let mut header = [0u8; 64];
    let mut filled = 0;
    while filled < header.len() {
        let n = reader.read(&mut header[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    reader.rewind()?;

    Ok(detect_kind(&header[..filled]).or_else(|| kind_from_name(name)))
}

pub fn kind_from_name(name: &str) -> Option<InputKind> {
    let extension = Path::new(name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase());
    match extension.as_deref() {
        Some("zip") => Some(InputKind::Zip),
        Some("xml") => Some(InputKind::Xml),
        _ => None,
    }
}

pub(crate) fn is_archive_name(name: &str) -> bool {
    kind_from_name(name) == Some(InputKind::Zip)
}

pub(crate) fn is_xml_name(name: &str) -> bool {
    kind_from_name(name) == Some(InputKind::Xml)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn detect_zip_format() {
        let zip_header = [0x50, 0x4B, 0x03, 0x04, 0x14, 0x00, 0x00, 0x00];
        assert_eq!(detect_kind(&zip_header), Some(InputKind::Zip));
    }

    #[test]
    fn detect_empty_zip() {
        let eocd = [0x50, 0x4B, 0x05, 0x06, 0x00, 0x00];
        assert_eq!(detect_kind(&eocd), Some(InputKind::Zip));
    }

    #[test]
    fn detect_xml_with_bom_and_whitespace() {
        let mut data = UTF8_BOM.to_vec();
        data.extend_from_slice(b"  \n<?xml version=\"1.0\"?><root/>");
        assert_eq!(detect_kind(&data), Some(InputKind::Xml));
    }

    #[test]
    fn detect_unknown() {
        assert_eq!(detect_kind(&[0xDE, 0xAD, 0xBE, 0xEF]), None);
        assert_eq!(detect_kind(&[]), None);
    }

    #[test]
    fn reader_detection_rewinds() {
        let mut cursor = Cursor::new(b"<root/>".to_vec());
        let kind = detect_from_reader(&mut cursor, "doc.bin").unwrap();
        assert_eq!(kind, Some(InputKind::Xml));
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn extension_fallback() {
        let mut cursor = Cursor::new(Vec::new());
        let kind = detect_from_reader(&mut cursor, "Empty.XML").unwrap();
        assert_eq!(kind, Some(InputKind::Xml));
        assert!(is_archive_name("nested/1_BATCH.Zip"));
        assert!(!is_archive_name("notes.txt"));
    }
}
