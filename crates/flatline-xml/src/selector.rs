use std::collections::HashMap;
use std::fmt;
use std::io::BufRead;

use crate::error::Result;
use crate::events::{EventReader, XmlEvent};

/// Which elements become rows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordSelector {
    /// Outermost elements with this local name, anywhere in the document.
    Tag(String),
    /// Every child of the root element.
    RootChildren,
    /// The whole document as a single record.
    Document,
}

impl fmt::Display for RecordSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tag(tag) => f.write_str(tag),
            Self::RootChildren => f.write_str("(root children)"),
            Self::Document => f.write_str("(document)"),
        }
    }
}

impl RecordSelector {
    /// An explicit tag wins; otherwise the most frequent repeating root
    /// child, then the sole root-child name, then each root child, then
    /// the document.
    pub fn resolve(explicit: Option<&str>, survey: &Survey) -> Self {
        if let Some(tag) = explicit {
            return Self::Tag(tag.to_string());
        }
        if let Some(tag) = survey.repeating_child() {
            return Self::Tag(tag.to_string());
        }
        match survey.child_counts.as_slice() {
            [] => Self::Document,
            [(tag, _)] if *tag != survey.root => Self::Tag(tag.clone()),
            _ => Self::RootChildren,
        }
    }

    /// Whether an element opening at `depth` (root = 0) starts a record.
    pub(crate) fn starts_record(&self, name: &str, depth: usize) -> bool {
        match self {
            Self::Tag(tag) => tag == name,
            Self::RootChildren => depth == 1,
            Self::Document => depth == 0,
        }
    }
}

/// Shape of a document: its root name and root-child tag frequencies.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Survey {
    pub root: String,
    /// Root-child tags in first-seen order with their counts.
    pub child_counts: Vec<(String, usize)>,
    pub elements: u64,
}

impl Survey {
    /// Full pass over `reader`; fails on the first well-formedness error.
    pub fn scan<R: BufRead>(reader: R) -> Result<Self> {
        let mut events = EventReader::new(reader);
        let mut survey = SurveyBuilder::default();

        loop {
            let depth = events.depth();
            match events.next_event()? {
                XmlEvent::Start { name, .. } => survey.element(&name, depth),
                XmlEvent::Eof => return Ok(survey.finish()),
                XmlEvent::Text(_) | XmlEvent::End => {}
            }
        }
    }

    /// Most frequent root child occurring more than once. Ties go to the
    /// tag seen first.
    pub fn repeating_child(&self) -> Option<&str> {
        let mut best: Option<&(String, usize)> = None;
        for candidate in &self.child_counts {
            if candidate.1 > 1 && best.is_none_or(|b| candidate.1 > b.1) {
                best = Some(candidate);
            }
        }
        best.map(|(tag, _)| tag.as_str())
    }
}

#[derive(Default)]
pub(crate) struct SurveyBuilder {
    survey: Survey,
    index: HashMap<String, usize>,
}

impl SurveyBuilder {
    pub(crate) fn element(&mut self, name: &str, depth: usize) {
        self.survey.elements += 1;
        match depth {
            0 => self.survey.root = name.to_string(),
            1 => match self.index.get(name) {
                Some(&i) => self.survey.child_counts[i].1 += 1,
                None => {
                    self.index.insert(name.to_string(), self.survey.child_counts.len());
                    self.survey.child_counts.push((name.to_string(), 1));
                }
            },
            _ => {}
        }
    }

    pub(crate) fn finish(self) -> Survey {
        self.survey
    }
}
