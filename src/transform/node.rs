// src/transform/node.rs

//! Parsed document tree.
//!
//! XML is read whole and folded into a [`Node`] tree with three
//! variants: a `Map` of child-name to child-node (insertion-ordered),
//! a `Seq` of repeated siblings sharing one name, and a `Scalar` leaf
//! whose text may be absent. Attributes become `@`-prefixed map keys
//! and mixed text lands under a `#text` key, so the downstream schema
//! scan sees a uniform tree regardless of how the source spelled it.

use crate::error::{Error, Result};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

/// Synthetic name for the document wrapper above the top-level element.
pub const ROOT_NAME: &str = "root";

/// One node of the parsed document.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Element with children and/or attributes, in document order.
    Map(Vec<(String, Node)>),
    /// Repeated siblings collapsed under the parent's name.
    Seq(Vec<Node>),
    /// Leaf value; `None` when the element was empty.
    Scalar(Option<String>),
}

impl Node {
    /// Look up a direct child of a `Map` node by key.
    pub fn get(&self, key: &str) -> Option<&Node> {
        match self {
            Node::Map(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Direct children of a `Map` node, empty for other variants.
    pub fn entries(&self) -> &[(String, Node)] {
        match self {
            Node::Map(entries) => entries,
            _ => &[],
        }
    }
}

/// Partially built element, alive while its end tag is pending.
struct OpenElement {
    name: String,
    entries: Vec<(String, Node)>,
    text: Option<String>,
}

impl OpenElement {
    fn finish(mut self) -> (String, Node) {
        let node = if self.entries.is_empty() {
            Node::Scalar(self.text)
        } else {
            if let Some(text) = self.text.take() {
                self.entries.push(("#text".to_string(), Node::Scalar(Some(text))));
            }
            Node::Map(self.entries)
        };
        (self.name, node)
    }

    /// Attach a finished child, collapsing repeated names into a `Seq`.
    fn attach(&mut self, name: String, node: Node) {
        if let Some((_, existing)) = self.entries.iter_mut().find(|(k, _)| *k == name) {
            match existing {
                Node::Seq(items) => items.push(node),
                _ => {
                    let first = std::mem::replace(existing, Node::Seq(Vec::new()));
                    if let Node::Seq(items) = existing {
                        items.push(first);
                        items.push(node);
                    }
                }
            }
        } else {
            self.entries.push((name, node));
        }
    }
}

/// Strip the feed's XML namespace from an element tag name.
///
/// Handles both the Clark form `{ns}Tag` and embedded prefix forms;
/// attribute keys are never passed through here.
fn clean_tag(raw: &str, namespace: &str) -> String {
    if namespace.is_empty() {
        return raw.to_string();
    }
    let stripped = match raw.strip_prefix(&format!("{{{namespace}}}")) {
        Some(rest) => rest.to_string(),
        None => raw.replace(namespace, ""),
    };
    stripped.trim_start_matches(':').to_string()
}

fn open_element(e: &BytesStart<'_>, namespace: &str) -> Result<OpenElement> {
    let raw = String::from_utf8_lossy(e.name().as_ref()).to_string();
    let mut entries = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| Error::ParseError(format!("bad attribute: {err}")))?;
        let key = format!("@{}", String::from_utf8_lossy(attr.key.as_ref()));
        let value = attr
            .unescape_value()
            .map_err(|err| Error::ParseError(format!("bad attribute value: {err}")))?
            .to_string();
        entries.push((key, Node::Scalar(Some(value))));
    }
    Ok(OpenElement {
        name: clean_tag(&raw, namespace),
        entries,
        text: None,
    })
}

/// Parse an XML document into a `Node` tree.
///
/// The returned node is a one-entry `Map` from the top-level element's
/// name to its subtree; walkers treat that wrapper as the synthetic
/// root named [`ROOT_NAME`].
pub fn parse_document(xml: &str, namespace: &str) -> Result<Node> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut stack: Vec<OpenElement> = Vec::new();
    let mut document: Vec<(String, Node)> = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                stack.push(open_element(&e, namespace)?);
            }
            Ok(Event::Empty(e)) => {
                let (name, node) = open_element(&e, namespace)?.finish();
                match stack.last_mut() {
                    Some(parent) => parent.attach(name, node),
                    None => document.push((name, node)),
                }
            }
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|err| Error::ParseError(format!("bad text node: {err}")))?;
                if let Some(open) = stack.last_mut() {
                    match &mut open.text {
                        Some(existing) => existing.push_str(&text),
                        None => open.text = Some(text.to_string()),
                    }
                }
            }
            Ok(Event::CData(e)) => {
                let text = String::from_utf8_lossy(&e.into_inner()).to_string();
                if let Some(open) = stack.last_mut() {
                    match &mut open.text {
                        Some(existing) => existing.push_str(&text),
                        None => open.text = Some(text),
                    }
                }
            }
            Ok(Event::End(_)) => {
                let open = stack
                    .pop()
                    .ok_or_else(|| Error::ParseError("unbalanced end tag".to_string()))?;
                let (name, node) = open.finish();
                match stack.last_mut() {
                    Some(parent) => parent.attach(name, node),
                    None => document.push((name, node)),
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(Error::ParseError(format!("XML parse failed: {e}"))),
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(Error::ParseError("unexpected end of document".to_string()));
    }
    if document.len() != 1 {
        return Err(Error::ParseError(format!(
            "expected a single top-level element, found {}",
            document.len()
        )));
    }
    Ok(Node::Map(document))
}
