use std::io::{self, BufRead};

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::error::{Error, Result};

/// Owned, namespace-stripped XML event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum XmlEvent {
    Start {
        name: String,
        attributes: Vec<(String, String)>,
    },
    Text(String),
    End,
    Eof,
}

/// Pull reader that rejects anything that is not a single well-formed
/// element tree.
pub(crate) struct EventReader<R> {
    reader: Reader<R>,
    buf: Vec<u8>,
    depth: usize,
    seen_root: bool,
    pending_end: bool,
}

impl<R: BufRead> EventReader<R> {
    pub(crate) fn new(inner: R) -> Self {
        let mut reader = Reader::from_reader(inner);
        let config = reader.config_mut();
        config.expand_empty_elements = true;
        config.check_end_names = true;

        Self {
            reader,
            buf: Vec::with_capacity(8192),
            depth: 0,
            seen_root: false,
            pending_end: false,
        }
    }

    pub(crate) fn depth(&self) -> usize {
        self.depth
    }

    pub(crate) fn next_event(&mut self) -> Result<XmlEvent> {
        if self.pending_end {
            self.pending_end = false;
            self.depth -= 1;
            return Ok(XmlEvent::End);
        }

        loop {
            self.buf.clear();
            let event = match self.reader.read_event_into(&mut self.buf) {
                Ok(event) => event,
                Err(quick_xml::Error::Io(e)) => {
                    return Err(Error::Io(io::Error::new(e.kind(), e.to_string())));
                }
                Err(e) => return Err(Error::malformed(self.reader.error_position() as u64, e)),
            };
            let position = self.reader.buffer_position() as u64;

            match event {
                Event::Start(ref e) => {
                    let start = open_element(e, position, self.depth, self.seen_root)?;
                    self.depth += 1;
                    self.seen_root = true;
                    return Ok(start);
                }
                Event::Empty(ref e) => {
                    let start = open_element(e, position, self.depth, self.seen_root)?;
                    self.depth += 1;
                    self.seen_root = true;
                    self.pending_end = true;
                    return Ok(start);
                }
                Event::End(_) => {
                    if self.depth == 0 {
                        return Err(Error::malformed(position, "unexpected closing tag"));
                    }
                    self.depth -= 1;
                    return Ok(XmlEvent::End);
                }
                Event::Text(ref e) => {
                    let text = e.unescape().map_err(|err| Error::malformed(position, err))?;
                    if self.depth > 0 {
                        return Ok(XmlEvent::Text(text.into_owned()));
                    }
                    if !is_blank(&text) {
                        return Err(Error::malformed(position, "text outside the root element"));
                    }
                }
                Event::CData(ref e) => {
                    if self.depth == 0 {
                        return Err(Error::malformed(position, "CDATA outside the root element"));
                    }
                    return Ok(XmlEvent::Text(String::from_utf8_lossy(e).into_owned()));
                }
                Event::Eof => {
                    if self.depth > 0 {
                        return Err(Error::malformed(position, "unclosed element at end of input"));
                    }
                    if !self.seen_root {
                        return Err(Error::malformed(position, "no root element"));
                    }
                    return Ok(XmlEvent::Eof);
                }
                _ => {}
            }
        }
    }
}

fn open_element(e: &BytesStart<'_>, position: u64, depth: usize, seen_root: bool) -> Result<XmlEvent> {
    if depth == 0 && seen_root {
        return Err(Error::malformed(position, "more than one root element"));
    }

    let name = utf8(e.local_name().as_ref(), position)?;
    let mut attributes = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| Error::malformed(position, err))?;
        let key = attr.key.as_ref();
        if key == b"xmlns" || key.starts_with(b"xmlns:") {
            continue;
        }
        let key = utf8(attr.key.local_name().as_ref(), position)?;
        let value = attr
            .unescape_value()
            .map_err(|err| Error::malformed(position, err))?;
        attributes.push((key, value.into_owned()));
    }

    Ok(XmlEvent::Start { name, attributes })
}

fn utf8(bytes: &[u8], position: u64) -> Result<String> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|err| Error::malformed(position, err))
}

fn is_blank(text: &str) -> bool {
    text.chars().all(|c| c.is_whitespace() || c == '\u{feff}')
}
