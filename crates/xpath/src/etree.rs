//! Owned element trees: the native documents node trees are built from.
//!
//! Text follows the element-tree convention: `text` is the content before the
//! first child, `tail` the content after an element (or comment/PI) up to the
//! next sibling.

use crate::consts::XML_URI;
use crate::error::{Error, ErrorCode};
use crate::xdm::QName;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::borrow::Cow;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: QName,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub text: String,
    pub tail: Option<String>,
}

impl Comment {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), tail: None }
    }

    #[must_use]
    pub fn with_tail(mut self, tail: impl Into<String>) -> Self {
        self.tail = Some(tail.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingInstruction {
    pub target: String,
    pub data: String,
    pub tail: Option<String>,
}

impl ProcessingInstruction {
    pub fn new(target: impl Into<String>, data: impl Into<String>) -> Self {
        Self { target: target.into(), data: data.into(), tail: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Element(Element),
    Comment(Comment),
    ProcessingInstruction(ProcessingInstruction),
}

impl Content {
    pub fn tail(&self) -> Option<&str> {
        match self {
            Content::Element(e) => e.tail.as_deref(),
            Content::Comment(c) => c.tail.as_deref(),
            Content::ProcessingInstruction(p) => p.tail.as_deref(),
        }
    }

    fn tail_mut(&mut self) -> &mut Option<String> {
        match self {
            Content::Element(e) => &mut e.tail,
            Content::Comment(c) => &mut c.tail,
            Content::ProcessingInstruction(p) => &mut p.tail,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: QName,
    pub attributes: Vec<Attribute>,
    /// Namespace declarations made on this element, `""` for the default namespace.
    pub namespaces: Vec<(String, String)>,
    pub text: Option<String>,
    pub tail: Option<String>,
    pub children: Vec<Content>,
}

impl Element {
    /// An element in no namespace.
    pub fn new(local: impl Into<String>) -> Self {
        Self::with_name(QName { prefix: None, local: local.into(), ns_uri: None })
    }

    pub fn qualified(prefix: Option<&str>, local: impl Into<String>, ns_uri: impl Into<String>) -> Self {
        Self::with_name(QName {
            prefix: prefix.map(str::to_string),
            local: local.into(),
            ns_uri: Some(ns_uri.into()),
        })
    }

    fn with_name(name: QName) -> Self {
        Self {
            name,
            attributes: Vec::new(),
            namespaces: Vec::new(),
            text: None,
            tail: None,
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_attribute(mut self, local: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push(Attribute {
            name: QName { prefix: None, local: local.into(), ns_uri: None },
            value: value.into(),
        });
        self
    }

    #[must_use]
    pub fn with_namespace(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.namespaces.push((prefix.into(), uri.into()));
        self
    }

    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    #[must_use]
    pub fn with_tail(mut self, tail: impl Into<String>) -> Self {
        self.tail = Some(tail.into());
        self
    }

    #[must_use]
    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Content::Element(child));
        self
    }

    #[must_use]
    pub fn with_content(mut self, content: Content) -> Self {
        self.children.push(content);
        self
    }

    pub fn attribute(&self, local: &str) -> Option<&str> {
        self.attributes.iter().find(|a| a.name.local == local).map(|a| a.value.as_str())
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|c| match c {
            Content::Element(e) => Some(e),
            _ => None,
        })
    }
}

/// A parsed document: the root element plus the comments and processing
/// instructions around it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    pub root: Option<Element>,
    pub prolog: Vec<Content>,
    pub epilog: Vec<Content>,
    pub uri: Option<String>,
}

impl Document {
    pub fn new(root: Element) -> Self {
        Self { root: Some(root), ..Self::default() }
    }

    #[must_use]
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }
}

fn xml_error(message: impl Into<String>) -> Error {
    Error::from_code(ErrorCode::FODC0002, message)
}

fn utf8(bytes: &[u8]) -> Result<&str, Error> {
    std::str::from_utf8(bytes).map_err(|e| {
        xml_error("document is not valid UTF-8")
            .with_source(Some(Arc::new(e) as Arc<dyn std::error::Error + Send + Sync>))
    })
}

fn resolve_reference(name: &str) -> Result<Cow<'static, str>, Error> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix('x') {
            Some(hex) => u32::from_str_radix(hex, 16),
            None => num.parse::<u32>(),
        }
        .map_err(|_| xml_error(format!("invalid character reference &{name};")))?;
        let ch = char::from_u32(code)
            .ok_or_else(|| xml_error(format!("invalid character reference &{name};")))?;
        return Ok(Cow::Owned(ch.to_string()));
    }
    quick_xml::escape::resolve_predefined_entity(name)
        .map(Cow::Borrowed)
        .ok_or_else(|| xml_error(format!("undefined entity &{name};")))
}

/// In-scope prefix bindings while reading.
struct Scopes {
    frames: Vec<Vec<(String, String)>>,
}

impl Scopes {
    fn resolve(&self, prefix: &str) -> Option<&str> {
        if prefix == "xml" {
            return Some(XML_URI);
        }
        self.frames
            .iter()
            .rev()
            .flat_map(|f| f.iter().rev())
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.as_str())
            .filter(|uri| !uri.is_empty())
    }
}

fn split_qname(raw: &str) -> (Option<&str>, &str) {
    match raw.split_once(':') {
        Some((p, l)) => (Some(p), l),
        None => (None, raw),
    }
}

fn start_element(start: &BytesStart<'_>, scopes: &mut Scopes) -> Result<Element, Error> {
    let mut declared = Vec::new();
    let mut raw_attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| {
            xml_error("malformed attribute")
                .with_source(Some(Arc::new(e) as Arc<dyn std::error::Error + Send + Sync>))
        })?;
        let key = utf8(attr.key.as_ref())?.to_string();
        let value = quick_xml::escape::unescape(utf8(&attr.value)?)
            .map_err(|e| {
                xml_error("invalid escape in attribute value")
                    .with_source(Some(Arc::new(e) as Arc<dyn std::error::Error + Send + Sync>))
            })?
            .into_owned();
        if key == "xmlns" {
            declared.push((String::new(), value));
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            declared.push((prefix.to_string(), value));
        } else {
            raw_attributes.push((key, value));
        }
    }
    scopes.frames.push(declared.clone());

    let raw_name = utf8(start.name().as_ref())?.to_string();
    let (prefix, local) = split_qname(&raw_name);
    let ns_uri = scopes.resolve(prefix.unwrap_or("")).map(str::to_string);
    if let Some(p) = prefix
        && ns_uri.is_none()
    {
        return Err(xml_error(format!("unbound namespace prefix {p:?}")));
    }
    let mut element = Element::with_name(QName {
        prefix: prefix.map(str::to_string),
        local: local.to_string(),
        ns_uri,
    });
    element.namespaces = declared;
    for (key, value) in raw_attributes {
        let (prefix, local) = split_qname(&key);
        let ns_uri = match prefix {
            Some(p) => Some(
                scopes
                    .resolve(p)
                    .ok_or_else(|| xml_error(format!("unbound namespace prefix {p:?}")))?
                    .to_string(),
            ),
            None => None,
        };
        element.attributes.push(Attribute {
            name: QName { prefix: prefix.map(str::to_string), local: local.to_string(), ns_uri },
            value,
        });
    }
    Ok(element)
}

fn append_text(stack: &mut [Element], text: &str) {
    let Some(current) = stack.last_mut() else {
        return;
    };
    let slot = match current.children.last_mut() {
        Some(child) => child.tail_mut(),
        None => &mut current.text,
    };
    slot.get_or_insert_with(String::new).push_str(text);
}

fn push_misc(stack: &mut [Element], doc: &mut Document, content: Content) {
    if let Some(current) = stack.last_mut() {
        current.children.push(content);
    } else if doc.root.is_none() {
        doc.prolog.push(content);
    } else {
        doc.epilog.push(content);
    }
}

fn finish_element(stack: &mut Vec<Element>, doc: &mut Document, element: Element) -> Result<(), Error> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Content::Element(element)),
        None if doc.root.is_none() => doc.root = Some(element),
        None => return Err(xml_error("document has more than one root element")),
    }
    Ok(())
}

/// Parses XML text into a [`Document`].
pub fn parse(xml: &str) -> Result<Document, Error> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut doc = Document::default();
    let mut stack: Vec<Element> = Vec::new();
    let mut scopes = Scopes { frames: Vec::new() };

    loop {
        let event = reader.read_event().map_err(|e| {
            xml_error(format!("malformed XML at byte {}", reader.buffer_position()))
                .with_source(Some(Arc::new(e) as Arc<dyn std::error::Error + Send + Sync>))
        })?;
        match event {
            Event::Start(start) => {
                let element = start_element(&start, &mut scopes)?;
                stack.push(element);
            }
            Event::Empty(start) => {
                let element = start_element(&start, &mut scopes)?;
                scopes.frames.pop();
                finish_element(&mut stack, &mut doc, element)?;
            }
            Event::End(_) => {
                let element = stack.pop().ok_or_else(|| xml_error("unexpected end tag"))?;
                scopes.frames.pop();
                finish_element(&mut stack, &mut doc, element)?;
            }
            Event::Text(text) => append_text(&mut stack, utf8(&text)?),
            Event::CData(data) => append_text(&mut stack, utf8(&data)?),
            Event::GeneralRef(reference) => {
                let resolved = resolve_reference(utf8(&reference)?)?;
                append_text(&mut stack, &resolved);
            }
            Event::Comment(text) => {
                push_misc(&mut stack, &mut doc, Content::Comment(Comment::new(utf8(&text)?)));
            }
            Event::PI(pi) => {
                let target = utf8(pi.target())?.to_string();
                let data = utf8(pi.content())?.trim_start().to_string();
                push_misc(
                    &mut stack,
                    &mut doc,
                    Content::ProcessingInstruction(ProcessingInstruction::new(target, data)),
                );
            }
            Event::Eof => break,
            Event::Decl(_) | Event::DocType(_) => {}
        }
    }
    if !stack.is_empty() {
        return Err(xml_error("unexpected end of document"));
    }
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_and_tail_follow_element_tree_convention() {
        let doc = parse("<a>x<b/>y<!--c-->z</a>").expect("parse");
        let root = doc.root.expect("root");
        assert_eq!(root.text.as_deref(), Some("x"));
        assert_eq!(root.children[0].tail(), Some("y"));
        assert_eq!(root.children[1].tail(), Some("z"));
    }

    #[test]
    fn prolog_epilog_and_namespaces() {
        let doc = parse("<?pi data?><!--c--><p:a xmlns:p='urn:p' p:x='1'/><!--after-->")
            .expect("parse");
        assert_eq!(doc.prolog.len(), 2);
        assert_eq!(doc.epilog.len(), 1);
        let root = doc.root.expect("root");
        assert_eq!(root.name.ns_uri.as_deref(), Some("urn:p"));
        assert_eq!(root.attributes[0].name.ns_uri.as_deref(), Some("urn:p"));
        assert_eq!(root.namespaces, vec![("p".to_string(), "urn:p".to_string())]);
    }

    #[test]
    fn references_are_resolved() {
        let doc = parse("<a>1 &lt; 2 &#x41;</a>").expect("parse");
        assert_eq!(doc.root.expect("root").text.as_deref(), Some("1 < 2 A"));
    }

    #[test]
    fn rejects_unbound_prefix() {
        assert!(parse("<p:a/>").is_err());
    }
}
