use std::collections::HashMap;

use crate::options::FlattenOptions;
use crate::row::Row;

struct Frame {
    path: String,
    text: String,
    children: HashMap<String, usize>,
}

/// Builds one row from the element events of a single record.
///
/// Both parsing modes drive this with the same enter/text/exit sequence,
/// so they agree on keys and key order.
pub(crate) struct RecordBuilder {
    separator: String,
    max_field_len: usize,
    max_nesting: usize,
    prefix: Option<String>,
    frames: Vec<Frame>,
    ignored: usize,
    row: Row,
}

impl RecordBuilder {
    pub(crate) fn new(options: &FlattenOptions, prefix: Option<&str>) -> Self {
        Self {
            separator: options.path_separator.clone(),
            max_field_len: options.max_field_len,
            max_nesting: options.max_nesting.max(1),
            prefix: prefix.map(str::to_string),
            frames: Vec::new(),
            ignored: 0,
            row: Row::new(),
        }
    }

    pub(crate) fn enter(&mut self, name: &str, attributes: &[(String, String)]) {
        if self.ignored > 0 || self.frames.len() >= self.max_nesting {
            self.ignored += 1;
            return;
        }

        let path = match self.frames.last_mut() {
            Some(parent) => {
                let seen = parent.children.entry(name.to_string()).or_insert(0);
                *seen += 1;
                if *seen > 1 {
                    format!("{}{}{name}[{seen}]", parent.path, self.separator)
                } else {
                    format!("{}{}{name}", parent.path, self.separator)
                }
            }
            None => match self.prefix {
                Some(ref root) => format!("{root}{}{name}", self.separator),
                None => name.to_string(),
            },
        };

        for (key, value) in attributes {
            self.insert(format!("{path}@{key}"), value);
        }

        self.frames.push(Frame {
            path,
            text: String::new(),
            children: HashMap::new(),
        });
    }

    pub(crate) fn text(&mut self, text: &str) {
        if self.ignored > 0 {
            return;
        }
        if let Some(frame) = self.frames.last_mut() {
            frame.text.push_str(text);
        }
    }

    /// Close the current element. Returns `true` once the record element
    /// itself has closed.
    pub(crate) fn exit(&mut self) -> bool {
        if self.ignored > 0 {
            self.ignored -= 1;
            return false;
        }

        if let Some(frame) = self.frames.pop() {
            let text = frame.text.trim();
            if !text.is_empty() {
                self.insert(frame.path.clone(), text);
            }
        }
        self.frames.is_empty()
    }

    /// The finished row, or `None` when the record carried no data.
    pub(crate) fn finish(self) -> Option<Row> {
        (!self.row.is_empty()).then_some(self.row)
    }

    fn insert(&mut self, key: String, value: &str) {
        let value = truncate(value, self.max_field_len);
        self.row.insert_if_absent(key, value);
    }
}

/// Cut `value` to at most `max` characters. `0` keeps everything.
pub fn truncate(value: &str, max: usize) -> String {
    if max == 0 {
        return value.to_string();
    }
    match value.char_indices().nth(max) {
        Some((end, _)) => value[..end].to_string(),
        None => value.to_string(),
    }
}
