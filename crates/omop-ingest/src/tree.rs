//! Parsed document tree.
//!
//! The whole document is read once into an arena of elements; path
//! evaluation then walks indices. CCDA files are small (single patient),
//! so holding the tree in memory is never a concern.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::debug;

use omop_core::{DocumentQuery, NodeId};

use crate::error::Result;
use crate::path::{PathExpr, Predicate, Step, local_name};

#[derive(Debug)]
struct Element {
    parent: Option<usize>,
    children: Vec<usize>,
    /// Local name, namespace prefix stripped.
    name: String,
    /// Attribute names are stored as written (minus any prefix).
    attributes: Vec<(String, String)>,
    /// Direct text content of this element, trimmed.
    text: String,
}

#[derive(Debug)]
pub struct XmlDocument {
    /// Index 0 is a synthetic root above the document element, so `roots`
    /// paths can address the document element itself.
    elements: Vec<Element>,
}

impl XmlDocument {
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        let mut elements = vec![Element {
            parent: None,
            children: Vec::new(),
            name: String::new(),
            attributes: Vec::new(),
            text: String::new(),
        }];
        let mut stack = vec![0_usize];
        loop {
            match reader.read_event()? {
                Event::Start(start) => {
                    let index = push_element(&mut elements, &stack, &start)?;
                    stack.push(index);
                }
                Event::Empty(start) => {
                    push_element(&mut elements, &stack, &start)?;
                }
                Event::End(_) => {
                    if stack.len() > 1 {
                        stack.pop();
                    }
                }
                Event::Text(text) => {
                    let content = text
                        .decode()
                        .map_err(|e| crate::error::IngestError::Encoding(e.to_string()))?;
                    let trimmed = content.trim();
                    if !trimmed.is_empty() {
                        if let Some(&current) = stack.last() {
                            let slot = &mut elements[current].text;
                            if !slot.is_empty() {
                                slot.push(' ');
                            }
                            slot.push_str(trimmed);
                        }
                    }
                }
                Event::CData(data) => {
                    let content = String::from_utf8(data.into_inner().to_vec())
                        .map_err(|e| crate::error::IngestError::Encoding(e.to_string()))?;
                    if let Some(&current) = stack.last() {
                        elements[current].text.push_str(content.trim());
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(Self { elements })
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let xml = std::fs::read_to_string(path)?;
        Self::parse(&xml)
    }

    /// The document element, when the document has one.
    pub fn document_element(&self) -> Option<NodeId> {
        self.elements[0].children.first().map(|&index| NodeId(index))
    }

    fn evaluate(&self, start: usize, expr: &PathExpr) -> Vec<usize> {
        let mut current = vec![start];
        for step in &expr.steps {
            let mut next = Vec::new();
            for &index in &current {
                match step {
                    Step::Current => next.push(index),
                    Step::Parent => {
                        // the synthetic root is not addressable
                        if let Some(parent) = self.elements[index].parent {
                            if parent != 0 {
                                next.push(parent);
                            }
                        }
                    }
                    Step::Child { name, predicates } => {
                        for &child in &self.elements[index].children {
                            let element = &self.elements[child];
                            if name.matches(&element.name)
                                && predicates.iter().all(|p| self.predicate_holds(child, p))
                            {
                                next.push(child);
                            }
                        }
                    }
                }
            }
            next.dedup();
            current = next;
            if current.is_empty() {
                break;
            }
        }
        current
    }

    fn predicate_holds(&self, index: usize, predicate: &Predicate) -> bool {
        match predicate {
            Predicate::AttrEquals { name, value } => self
                .attribute_value(index, name)
                .is_some_and(|actual| actual == value),
            Predicate::Not(inner) => !self.predicate_holds(index, inner),
            Predicate::AnyOf(terms) => terms.iter().any(|term| self.predicate_holds(index, term)),
        }
    }

    fn attribute_value(&self, index: usize, name: &str) -> Option<&str> {
        self.elements[index]
            .attributes
            .iter()
            .find(|(attr, _)| attr == name)
            .map(|(_, value)| value.as_str())
    }

    fn select_with_path(&self, start: usize, path: &str) -> Vec<NodeId> {
        match PathExpr::parse(path) {
            Ok(expr) => self.evaluate(start, &expr).into_iter().map(NodeId).collect(),
            Err(error) => {
                debug!(%error, "path evaluates to nothing");
                Vec::new()
            }
        }
    }

    fn collect_text(&self, index: usize, out: &mut String) {
        let element = &self.elements[index];
        if !element.text.is_empty() {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(&element.text);
        }
        for &child in &element.children {
            self.collect_text(child, out);
        }
    }
}

fn push_element(elements: &mut Vec<Element>, stack: &[usize], start: &BytesStart<'_>) -> Result<usize> {
    let name = String::from_utf8_lossy(start.name().as_ref()).to_string();
    let mut attributes = Vec::new();
    for attribute in start.attributes() {
        let attribute = attribute?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).to_string();
        let value = attribute.unescape_value()?.to_string();
        attributes.push((local_name(&key).to_string(), value));
    }
    let parent = stack.last().copied();
    let index = elements.len();
    elements.push(Element {
        parent,
        children: Vec::new(),
        name: local_name(&name).to_string(),
        attributes,
        text: String::new(),
    });
    if let Some(parent) = parent {
        elements[parent].children.push(index);
    }
    Ok(index)
}

impl DocumentQuery for XmlDocument {
    fn roots(&self, path: &str) -> Vec<NodeId> {
        // Config root paths are written `./...` relative to the document
        // element.
        match self.document_element() {
            Some(NodeId(document)) => self.select_with_path(document, path),
            None => Vec::new(),
        }
    }

    fn select(&self, scope: NodeId, path: &str) -> Vec<NodeId> {
        if scope.0 >= self.elements.len() {
            return Vec::new();
        }
        self.select_with_path(scope.0, path)
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        if node.0 >= self.elements.len() {
            return None;
        }
        self.attribute_value(node.0, local_name(name)).map(str::to_string)
    }

    fn text(&self, node: NodeId) -> Option<String> {
        if node.0 >= self.elements.len() {
            return None;
        }
        let mut out = String::new();
        self.collect_text(node.0, &mut out);
        if out.is_empty() { None } else { Some(out) }
    }
}
