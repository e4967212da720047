//! Element tree over `xml-rs` pull events.
//!
//! The registry mixes text and markup inside declarators
//! (`const <ptype>GLuint</ptype> *<name>buffers</name>`), so text nodes
//! keep their whitespace verbatim.

use std::io::Read;

use xml::reader::{EventReader, XmlEvent};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    fn new(name: String, attributes: Vec<(String, String)>) -> Self {
        Self { name, attributes, children: Vec::new() }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Child elements in document order, text skipped.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    pub fn elements_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.elements().filter(move |e| e.name == name)
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.elements().find(|e| e.name == name)
    }

    /// Concatenated text of this element and all descendants.
    pub fn text(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }
}

fn collect_text(element: &Element, out: &mut String) {
    for node in &element.children {
        match node {
            Node::Text(t) => out.push_str(t),
            Node::Element(e) => collect_text(e, out),
        }
    }
}

/// Parses a whole document; `Ok(None)` when it has no root element.
pub fn parse<R: Read>(source: R) -> Result<Option<Element>, xml::reader::Error> {
    let mut stack: Vec<Element> = Vec::new();
    let mut root = None;

    for event in EventReader::new(source) {
        match event? {
            XmlEvent::StartElement { name, attributes, .. } => {
                let attributes = attributes
                    .into_iter()
                    .map(|a| (a.name.local_name, a.value))
                    .collect();
                stack.push(Element::new(name.local_name, attributes));
            }
            XmlEvent::EndElement { .. } => {
                if let Some(done) = stack.pop() {
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(Node::Element(done)),
                        None => root = Some(done),
                    }
                }
            }
            XmlEvent::Characters(text) | XmlEvent::Whitespace(text) | XmlEvent::CData(text) => {
                if let Some(current) = stack.last_mut() {
                    current.children.push(Node::Text(text));
                }
            }
            _ => {}
        }
    }

    Ok(root)
}
