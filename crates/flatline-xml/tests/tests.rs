use std::fs;

use flatline_xml::{
    FlattenOptions, FlattenOutput, Mode, RecordSelector, Row, RowStream, flatten_bytes,
    flatten_file,
};
use proptest::prelude::*;

const ITEM_FIXTURE: &str =
    r#"<root><item id="1"><name>Alice</name><tags><tag>x</tag><tag>y</tag></tags></item></root>"#;

fn row(pairs: &[(&str, &str)]) -> Row {
    pairs.iter().copied().collect()
}

fn both_modes(xml: &str, options: &FlattenOptions) -> (FlattenOutput, FlattenOutput) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc.xml");
    fs::write(&path, xml).unwrap();

    let in_memory = flatten_file(&path, &options.clone().mode(Mode::InMemory)).unwrap();
    let streaming = flatten_file(&path, &options.clone().mode(Mode::Streaming)).unwrap();
    assert!(!in_memory.is_streaming());
    assert!(streaming.is_streaming());

    (
        in_memory.into_output().unwrap(),
        streaming.into_output().unwrap(),
    )
}

#[test]
fn item_fixture_yields_one_row() {
    let output = flatten_bytes(ITEM_FIXTURE.as_bytes(), &FlattenOptions::default());

    assert_eq!(output.rows.len(), 1);
    assert_eq!(
        output.rows[0],
        row(&[
            ("item@id", "1"),
            ("item.name", "Alice"),
            ("item.tags.tag", "x"),
            ("item.tags.tag[2]", "y"),
        ])
    );
    assert_eq!(
        output.headers,
        ["item@id", "item.name", "item.tags.tag", "item.tags.tag[2]"]
    );
    assert_eq!(output.selector, RecordSelector::Tag("item".to_string()));
    assert_eq!(output.selector.to_string(), "item");
}

#[test]
fn forced_modes_agree_on_fixture() {
    let (in_memory, streaming) = both_modes(ITEM_FIXTURE, &FlattenOptions::default());
    assert_eq!(in_memory, streaming);
}

#[test]
fn repeating_children_become_records() {
    let xml = r#"
        <export>
            <meta generated="2024-01-15"/>
            <invoice no="A1"><total>10.00</total></invoice>
            <invoice no="A2"><total>12.50</total><note>late</note></invoice>
            <invoice no="A3"/>
        </export>"#;

    let (output, streaming) = both_modes(xml, &FlattenOptions::default());
    assert_eq!(output, streaming);
    assert_eq!(output.selector, RecordSelector::Tag("invoice".into()));
    assert_eq!(output.rows.len(), 3);
    assert_eq!(
        output.headers,
        ["invoice@no", "invoice.total", "invoice.note"]
    );
    assert_eq!(output.rows[2].get("invoice.total"), None);
}

#[test]
fn explicit_tag_ignores_namespaces_and_nesting() {
    let xml = r#"
        <ns:batch xmlns:ns="urn:ledger">
            <ns:group>
                <ns:line ns:id="1"><ns:amount>5</ns:amount></ns:line>
                <ns:line ns:id="2"><ns:amount>7</ns:amount><ns:line>inner</ns:line></ns:line>
            </ns:group>
        </ns:batch>"#;

    let options = FlattenOptions::default().record_tag("ns:line");
    let (output, streaming) = both_modes(xml, &options);
    assert_eq!(output, streaming);
    assert_eq!(output.rows.len(), 2);
    assert_eq!(output.rows[0].get("line@id"), Some("1"));
    assert_eq!(output.rows[1].get("line.line"), Some("inner"));
    assert!(output.headers.iter().all(|h| !h.contains("xmlns")));
}

#[test]
fn include_root_prefixes_keys() {
    let xml = "<ledger><entry>1</entry><entry>2</entry></ledger>";
    let options = FlattenOptions::default().include_root(true);
    let (output, streaming) = both_modes(xml, &options);
    assert_eq!(output, streaming);
    assert_eq!(output.headers, ["ledger.entry"]);

    let whole = flatten_bytes(b"<ledger>only</ledger>", &options);
    assert_eq!(whole.selector, RecordSelector::Document);
    assert_eq!(whole.headers, ["ledger"]);
}

#[test]
fn custom_separator_and_truncation() {
    let long = "é".repeat(400);
    let xml = format!("<root><row><a><b>{long}</b></a></row><row><a><b>x</b></a></row></root>");
    let options = FlattenOptions::default()
        .path_separator("/")
        .max_field_len(10);

    let (output, streaming) = both_modes(&xml, &options);
    assert_eq!(output, streaming);
    assert_eq!(output.rows[0].get("row/a/b"), Some("éééééééééé"));
}

#[test]
fn first_writer_wins_within_record() {
    let xml = r#"<root><r a="attr"><a>text</a></r><r a="2"/></root>"#;
    let output = flatten_bytes(xml.as_bytes(), &FlattenOptions::default().path_separator("@"));
    assert_eq!(output.rows[0].get("r@a"), Some("attr"));
    assert_eq!(output.rows[0].len(), 1);
}

#[test]
fn malformed_documents_yield_no_rows_in_either_mode() {
    for xml in [
        "<root><r>1</r><r>2</root>",
        "<root><r>1</r>",
        "<root/><root/>",
        "<root><r>&nope;</r></root>",
        "not xml at all",
    ] {
        let (in_memory, streaming) = both_modes(xml, &FlattenOptions::default());
        assert!(in_memory.is_empty(), "{xml:?}");
        assert!(streaming.is_empty(), "{xml:?}");
    }
}

#[test]
fn empty_records_are_dropped() {
    let xml = "<root><r/><r>  </r><r>v</r></root>";
    let output = flatten_bytes(xml.as_bytes(), &FlattenOptions::default());
    assert_eq!(output.rows, vec![row(&[("r", "v")])]);
}

#[test]
fn auto_mode_streams_above_threshold() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc.xml");
    fs::write(&path, ITEM_FIXTURE).unwrap();

    let options = FlattenOptions::default().streaming_threshold_mb(0);
    assert!(flatten_file(&path, &options).unwrap().is_streaming());
    assert!(!flatten_file(&path, &FlattenOptions::default()).unwrap().is_streaming());
}

#[test]
fn missing_file_is_io_error() {
    let err = flatten_file(
        std::path::Path::new("/nonexistent/flatline.xml"),
        &FlattenOptions::default(),
    )
    .err()
    .unwrap();
    assert!(!err.is_malformed());
}

#[test]
fn large_stream_batches_cover_all_rows() {
    let mut xml = String::from("<rows>");
    for i in 0..2_500 {
        xml.push_str(&format!(r#"<row n="{i}"><v>{i}</v></row>"#));
    }
    xml.push_str("</rows>");

    let options = FlattenOptions::default().chunk_size(1_000);
    let batches: Vec<Vec<Row>> = RowStream::from_slice(xml.as_bytes(), &options)
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(batches.len(), 3);
    assert_eq!(batches.iter().map(Vec::len).sum::<usize>(), 2_500);
    assert_eq!(batches[2][499].get("row.v"), Some("2499"));
}

#[derive(Clone, Debug)]
struct Element {
    name: String,
    attribute: Option<String>,
    text: Option<String>,
    children: Vec<Element>,
}

impl Element {
    fn render(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        if let Some(ref value) = self.attribute {
            out.push_str(&format!(r#" k="{value}""#));
        }
        out.push('>');
        if let Some(ref text) = self.text {
            out.push_str(text);
        }
        for child in &self.children {
            child.render(out);
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

fn element() -> impl Strategy<Value = Element> {
    let leaf = (
        "[abc]",
        proptest::option::of("[a-z0-9]{1,6}"),
        proptest::option::of("[a-z ]{1,8}"),
    )
        .prop_map(|(name, attribute, text)| Element {
            name,
            attribute,
            text,
            children: Vec::new(),
        });

    leaf.prop_recursive(4, 48, 5, |inner| {
        (
            "[abc]",
            proptest::option::of("[a-z0-9]{1,6}"),
            proptest::option::of("[a-z ]{1,8}"),
            proptest::collection::vec(inner, 0..5),
        )
            .prop_map(|(name, attribute, text, children)| Element {
                name,
                attribute,
                text,
                children,
            })
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn streaming_matches_in_memory(root in element(), include_root in any::<bool>()) {
        let mut xml = String::new();
        root.render(&mut xml);

        let options = FlattenOptions::default().include_root(include_root).chunk_size(3);
        let in_memory = flatten_bytes(xml.as_bytes(), &options);
        let streaming = RowStream::from_slice(xml.as_bytes(), &options)
            .into_output()
            .unwrap();

        prop_assert_eq!(in_memory, streaming);
    }
}
