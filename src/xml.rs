//! Tolerant XML element tree.
//!
//! Gateways emit XML that strict deserializers reject: unknown namespace
//! prefixes, mismatched end tags, bare `&` in text, garbage after the root.
//! This reader builds a plain element tree from quick-xml events and accepts
//! all of those. Element names are kept as written; lookups take a
//! [`TagMatch`] rule.

use crate::quirks::TagMatch;
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::Reader;

/// An XML element with its concatenated text and child elements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Element {
    pub name: String,
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    fn from_start(start: &BytesStart<'_>) -> Self {
        Element {
            name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
            ..Default::default()
        }
    }

    /// First direct child with the given name.
    pub fn child(&self, name: &str, rule: TagMatch) -> Option<&Element> {
        self.children.iter().find(|c| rule.matches(&c.name, name))
    }

    /// All direct children with the given name, in document order.
    pub fn children_named<'a>(
        &'a self,
        name: &'a str,
        rule: TagMatch,
    ) -> impl Iterator<Item = &'a Element> + 'a {
        self.children
            .iter()
            .filter(move |c| rule.matches(&c.name, name))
    }

    /// Trimmed text of the first direct child with the given name.
    pub fn child_text(&self, name: &str, rule: TagMatch) -> Option<&str> {
        self.child(name, rule).map(|c| c.text.trim())
    }

    /// Depth-first search for the first descendant with the given name.
    pub fn find(&self, name: &str, rule: TagMatch) -> Option<&Element> {
        for child in &self.children {
            if rule.matches(&child.name, name) {
                return Some(child);
            }
            if let Some(found) = child.find(name, rule) {
                return Some(found);
            }
        }
        None
    }

    /// Local part of the element name.
    pub fn local_name(&self) -> &str {
        self.name
            .rsplit_once(':')
            .map_or(self.name.as_str(), |(_, local)| local)
    }
}

/// Qualified name of the document's root element.
pub(crate) fn root_name(xml: &str) -> Result<String, String> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) | Ok(Event::Empty(start)) => {
                return Ok(String::from_utf8_lossy(start.name().as_ref()).into_owned())
            }
            Ok(Event::Eof) => return Err("document has no root element".to_string()),
            Ok(_) => {}
            Err(e) => {
                return Err(format!(
                    "malformed XML at byte {}: {e}",
                    reader.buffer_position()
                ))
            }
        }
    }
}

/// Parse a document into its root element.
///
/// Parsing stops at the end of the root element, so trailing content is
/// ignored. Unclosed elements at end of input are closed implicitly.
pub(crate) fn parse(xml: &str) -> Result<Element, String> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    reader.check_end_names(false);

    let mut stack: Vec<Element> = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => stack.push(Element::from_start(&start)),
            Ok(Event::Empty(start)) => {
                let element = Element::from_start(&start);
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => return Ok(element),
                }
            }
            Ok(Event::End(_)) => {
                let Some(element) = stack.pop() else {
                    continue;
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => return Ok(element),
                }
            }
            Ok(Event::Text(text)) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&unescape_lossy(&text));
                }
            }
            Ok(Event::CData(data)) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(format!(
                    "malformed XML at byte {}: {e}",
                    reader.buffer_position()
                ))
            }
        }
    }

    let mut root = None;
    while let Some(element) = stack.pop() {
        match stack.last_mut() {
            Some(parent) => parent.children.push(element),
            None => root = Some(element),
        }
    }
    root.ok_or_else(|| "document has no root element".to_string())
}

// Invalid escapes such as a bare `&` are kept verbatim.
fn unescape_lossy(text: &BytesText<'_>) -> String {
    match text.unescape() {
        Ok(unescaped) => unescaped.into_owned(),
        Err(_) => String::from_utf8_lossy(text).into_owned(),
    }
}
