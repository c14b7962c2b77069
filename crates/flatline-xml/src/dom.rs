use crate::error::Result;
use crate::events::{EventReader, XmlEvent};
use crate::flatten::RecordBuilder;
use crate::options::FlattenOptions;
use crate::row::{HeaderSet, Row};
use crate::selector::{RecordSelector, Survey, SurveyBuilder};

struct Node {
    name: String,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<usize>,
}

/// Arena-backed element tree. Node `0` is the root.
pub(crate) struct Document {
    nodes: Vec<Node>,
    survey: Survey,
}

enum Step {
    Enter(usize),
    Exit,
}

impl Document {
    pub(crate) fn parse(bytes: &[u8]) -> Result<Self> {
        let mut events = EventReader::new(bytes);
        let mut survey = SurveyBuilder::default();
        let mut nodes: Vec<Node> = Vec::new();
        let mut open: Vec<usize> = Vec::new();

        loop {
            match events.next_event()? {
                XmlEvent::Start { name, attributes } => {
                    survey.element(&name, open.len());
                    let id = nodes.len();
                    if let Some(&parent) = open.last() {
                        nodes[parent].children.push(id);
                    }
                    nodes.push(Node {
                        name,
                        attributes,
                        text: String::new(),
                        children: Vec::new(),
                    });
                    open.push(id);
                }
                XmlEvent::Text(text) => {
                    if let Some(&current) = open.last() {
                        nodes[current].text.push_str(&text);
                    }
                }
                XmlEvent::End => {
                    open.pop();
                }
                XmlEvent::Eof => break,
            }
        }

        Ok(Self {
            nodes,
            survey: survey.finish(),
        })
    }

    pub(crate) fn survey(&self) -> &Survey {
        &self.survey
    }

    /// Record roots for `selector`, in document order.
    fn records(&self, selector: &RecordSelector) -> Vec<usize> {
        match selector {
            RecordSelector::Document => vec![0],
            RecordSelector::RootChildren => self.nodes[0].children.clone(),
            RecordSelector::Tag(tag) => {
                let mut found = Vec::new();
                let mut stack = vec![0];
                while let Some(id) = stack.pop() {
                    let node = &self.nodes[id];
                    if node.name == *tag {
                        found.push(id);
                    } else {
                        stack.extend(node.children.iter().rev());
                    }
                }
                found
            }
        }
    }

    /// Flatten every selected record with an explicit-stack walk.
    pub(crate) fn flatten(
        &self,
        selector: &RecordSelector,
        options: &FlattenOptions,
    ) -> (Vec<Row>, HeaderSet) {
        let root = self.nodes[0].name.as_str();
        let mut rows = Vec::new();
        let mut headers = HeaderSet::new();

        for record in self.records(selector) {
            let prefix = (options.include_root && record != 0).then_some(root);
            let mut builder = RecordBuilder::new(options, prefix);
            let mut steps = vec![Step::Enter(record)];

            while let Some(step) = steps.pop() {
                match step {
                    Step::Enter(id) => {
                        let node = &self.nodes[id];
                        builder.enter(&node.name, &node.attributes);
                        builder.text(&node.text);
                        steps.push(Step::Exit);
                        steps.extend(node.children.iter().rev().map(|&c| Step::Enter(c)));
                    }
                    Step::Exit => {
                        builder.exit();
                    }
                }
            }

            if let Some(row) = builder.finish() {
                headers.observe(&row);
                rows.push(row);
            }
        }

        (rows, headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outermost_tag_matches_only() {
        let doc = Document::parse(b"<r><x><x>inner</x></x><y><x/></y></r>").unwrap();
        let records = doc.records(&RecordSelector::Tag("x".into()));
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn deep_documents_do_not_recurse() {
        let depth = 20_000;
        let mut xml = String::with_capacity(depth * 8);
        for _ in 0..depth {
            xml.push_str("<n>");
        }
        xml.push_str("leaf");
        for _ in 0..depth {
            xml.push_str("</n>");
        }

        let doc = Document::parse(xml.as_bytes()).unwrap();
        let options = FlattenOptions::default();
        let (rows, _) = doc.flatten(&RecordSelector::Document, &options);
        assert!(rows.is_empty());
    }
}
