//! A minimal element tree for table markup.
//!
//! Observation pages are HTML, so the reader is lenient: end tags need not
//! match, void elements such as `<br>` need no closing tag, and entities
//! that cannot be resolved are kept verbatim.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::ObservationError;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "wbr",
];

#[derive(Debug, Clone, PartialEq)]
pub enum MarkupChild {
    Element(MarkupNode),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MarkupNode {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<MarkupChild>,
}

impl MarkupNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    /// Direct element children.
    pub fn elements(&self) -> impl Iterator<Item = &MarkupNode> {
        self.children.iter().filter_map(|child| match child {
            MarkupChild::Element(node) => Some(node),
            MarkupChild::Text(_) => None,
        })
    }

    /// Concatenated text of this node and its descendants.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                MarkupChild::Text(text) => out.push_str(text),
                MarkupChild::Element(node) => node.collect_text(out),
            }
        }
    }

    /// First descendant (depth first, document order) matching `predicate`.
    pub fn find<P>(&self, predicate: P) -> Option<&MarkupNode>
    where
        P: Fn(&MarkupNode) -> bool + Copy,
    {
        for node in self.elements() {
            if predicate(node) {
                return Some(node);
            }
            if let Some(found) = node.find(predicate) {
                return Some(found);
            }
        }
        None
    }

    /// All descendants named `name`, in document order. Matches are not
    /// searched for nested matches.
    pub fn find_all<'a>(&'a self, name: &str) -> Vec<&'a MarkupNode> {
        let mut out = Vec::new();
        self.collect_named(name, &mut out);
        out
    }

    fn collect_named<'a>(&'a self, name: &str, out: &mut Vec<&'a MarkupNode>) {
        for node in self.elements() {
            if node.name == name {
                out.push(node);
            } else {
                node.collect_named(name, out);
            }
        }
    }
}

fn element_from(start: &BytesStart<'_>) -> MarkupNode {
    let name = String::from_utf8_lossy(start.name().as_ref()).to_lowercase();
    let attributes = start
        .attributes()
        .with_checks(false)
        .filter_map(|attr| attr.ok())
        .map(|attr| {
            let key = String::from_utf8_lossy(attr.key.as_ref()).to_lowercase();
            let value = attr
                .unescape_value()
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned());
            (key, value)
        })
        .collect();
    MarkupNode {
        name,
        attributes,
        children: Vec::new(),
    }
}

fn attach(stack: &mut [MarkupNode], child: MarkupChild) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(child);
    }
}

/// Parses a markup fragment into a tree under a synthetic `#document` root.
pub fn parse_markup(markup: &str) -> Result<MarkupNode, ObservationError> {
    let mut reader = Reader::from_str(markup);
    let config = reader.config_mut();
    config.trim_text(true);
    config.check_end_names = false;
    config.allow_unmatched_ends = true;

    let mut stack = vec![MarkupNode::new("#document")];

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                let node = element_from(&start);
                if VOID_ELEMENTS.contains(&node.name.as_str()) {
                    attach(&mut stack, MarkupChild::Element(node));
                } else {
                    stack.push(node);
                }
            }
            Ok(Event::Empty(start)) => {
                attach(&mut stack, MarkupChild::Element(element_from(&start)));
            }
            Ok(Event::End(end)) => {
                let name = String::from_utf8_lossy(end.name().as_ref()).to_lowercase();
                // Close up to the nearest open element with this name; stray
                // end tags are dropped.
                if let Some(depth) = stack.iter().rposition(|node| node.name == name) {
                    if depth == 0 {
                        continue;
                    }
                    while stack.len() > depth {
                        if let Some(node) = stack.pop() {
                            attach(&mut stack, MarkupChild::Element(node));
                        }
                    }
                }
            }
            Ok(Event::Text(text)) => {
                let value = text
                    .unescape()
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| String::from_utf8_lossy(&text).into_owned());
                if !value.is_empty() {
                    attach(&mut stack, MarkupChild::Text(value));
                }
            }
            Ok(Event::CData(data)) => {
                let value = String::from_utf8_lossy(&data).into_owned();
                attach(&mut stack, MarkupChild::Text(value));
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(ObservationError::Markup(format!(
                    "at position {}: {}",
                    reader.error_position(),
                    e
                )))
            }
        }
    }

    // Unclosed elements are closed at end of input.
    while stack.len() > 1 {
        if let Some(node) = stack.pop() {
            attach(&mut stack, MarkupChild::Element(node));
        }
    }
    Ok(stack.pop().unwrap_or_else(|| MarkupNode::new("#document")))
}
