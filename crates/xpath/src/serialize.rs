//! `fn:serialize` and the pluggable serializer behind it.

use crate::consts::XML_URI;
use crate::error::{Error, ErrorCode};
use crate::tree::{NodeKind, NodeRef};
use crate::xdm::XdmItem;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesPI, BytesStart, BytesText, Event};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SerializationMethod {
    #[default]
    Xml,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializationParams {
    pub method: SerializationMethod,
    pub indent: bool,
    pub omit_xml_declaration: bool,
}

impl Default for SerializationParams {
    fn default() -> Self {
        Self { method: SerializationMethod::Xml, indent: false, omit_xml_declaration: true }
    }
}

pub trait Serializer: Send + Sync {
    fn serialize(&self, items: &[XdmItem<'_>], params: &SerializationParams) -> Result<String, Error>;
}

fn serialization_error(e: impl std::error::Error + Send + Sync + 'static) -> Error {
    Error::from_code(ErrorCode::SENR0001, "serialization failed")
        .with_source(Some(Arc::new(e) as Arc<dyn std::error::Error + Send + Sync>))
}

/// XML output method built on quick-xml.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlSerializer;

impl Serializer for XmlSerializer {
    fn serialize(&self, items: &[XdmItem<'_>], params: &SerializationParams) -> Result<String, Error> {
        if params.method == SerializationMethod::Text {
            return text_output(items);
        }
        let mut writer =
            if params.indent { Writer::new_with_indent(Vec::new(), b' ', 2) } else { Writer::new(Vec::new()) };
        if !params.omit_xml_declaration {
            writer
                .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
                .map_err(serialization_error)?;
        }
        let mut previous_atomic = false;
        for item in items {
            match item {
                XdmItem::Node(node) => {
                    write_node(&mut writer, *node, true)?;
                    previous_atomic = false;
                }
                XdmItem::Atomic(a) => {
                    let text = if previous_atomic { format!(" {a}") } else { a.to_string() };
                    writer.write_event(Event::Text(BytesText::new(&text))).map_err(serialization_error)?;
                    previous_atomic = true;
                }
                XdmItem::Map(_) | XdmItem::Array(_) => {
                    return Err(Error::from_code(
                        ErrorCode::SENR0001,
                        "maps and arrays cannot be serialized with the xml method",
                    ));
                }
            }
        }
        String::from_utf8(writer.into_inner()).map_err(serialization_error)
    }
}

fn text_output(items: &[XdmItem<'_>]) -> Result<String, Error> {
    let mut parts = Vec::with_capacity(items.len());
    for item in items {
        match item {
            XdmItem::Node(n) => parts.push(n.string_value()),
            XdmItem::Atomic(a) => parts.push(a.to_string()),
            XdmItem::Map(_) | XdmItem::Array(_) => {
                return Err(Error::from_code(ErrorCode::SENR0001, "maps and arrays cannot be serialized as text"));
            }
        }
    }
    Ok(parts.join(" "))
}

/// Namespace declarations `node` adds over its parent (all of them at the top).
fn declarations<'a>(node: NodeRef<'a>, top: bool) -> Vec<(&'a str, &'a str)> {
    let inherited = match node.parent() {
        Some(parent) if !top => parent.in_scope_namespaces(),
        _ => Vec::new(),
    };
    node.in_scope_namespaces()
        .into_iter()
        .filter(|(prefix, uri)| *prefix != "xml" && *uri != XML_URI && !inherited.contains(&(*prefix, *uri)))
        .collect()
}

fn write_node(writer: &mut Writer<Vec<u8>>, node: NodeRef<'_>, top: bool) -> Result<(), Error> {
    match node.kind() {
        NodeKind::Document => {
            for child in node.children() {
                write_node(writer, child, true)?;
            }
        }
        NodeKind::Element => {
            let name = node.name().map(ToString::to_string).unwrap_or_default();
            let mut start = BytesStart::new(name.as_str());
            for (prefix, uri) in declarations(node, top) {
                let attr = if prefix.is_empty() { "xmlns".to_string() } else { format!("xmlns:{prefix}") };
                start.push_attribute((attr.as_str(), uri));
            }
            for attr in node.attributes() {
                let attr_name = attr.name().map(ToString::to_string).unwrap_or_default();
                start.push_attribute((attr_name.as_str(), attr.value()));
            }
            if node.has_children() {
                writer.write_event(Event::Start(start)).map_err(serialization_error)?;
                for child in node.children() {
                    write_node(writer, child, false)?;
                }
                writer.write_event(Event::End(BytesEnd::new(name.as_str()))).map_err(serialization_error)?;
            } else {
                writer.write_event(Event::Empty(start)).map_err(serialization_error)?;
            }
        }
        NodeKind::Text => {
            writer.write_event(Event::Text(BytesText::new(node.value()))).map_err(serialization_error)?;
        }
        NodeKind::Comment => {
            writer
                .write_event(Event::Comment(BytesText::from_escaped(node.value())))
                .map_err(serialization_error)?;
        }
        NodeKind::ProcessingInstruction => {
            let content = if node.value().is_empty() {
                node.local_name().to_string()
            } else {
                format!("{} {}", node.local_name(), node.value())
            };
            writer.write_event(Event::PI(BytesPI::new(content.as_str()))).map_err(serialization_error)?;
        }
        NodeKind::Attribute | NodeKind::Namespace => {
            return Err(Error::from_code(
                ErrorCode::SENR0001,
                format!("a standalone {} node cannot be serialized", node.kind().as_str()),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::etree::Element;
    use crate::tree::{BuildOptions, build_node_tree};
    use crate::xdm::XdmAtomicValue;

    #[test]
    fn elements_are_written_with_escaped_content() {
        let root = Element::new("a").with_attribute("k", "1 < 2").with_child(Element::new("b").with_text("x & y"));
        let tree = build_node_tree(&root, BuildOptions::new()).expect("tree");
        let out = XmlSerializer
            .serialize(&[XdmItem::Node(tree.root())], &SerializationParams::default())
            .expect("serialize");
        assert_eq!(out, r#"<a k="1 &lt; 2"><b>x &amp; y</b></a>"#);
    }

    #[test]
    fn adjacent_atomics_are_space_separated() {
        let items = [
            XdmItem::Atomic(XdmAtomicValue::Integer(1)),
            XdmItem::Atomic(XdmAtomicValue::String("two".into())),
        ];
        let out = XmlSerializer.serialize(&items, &SerializationParams::default()).expect("serialize");
        assert_eq!(out, "1 two");
    }

    #[test]
    fn attributes_alone_are_rejected() {
        let root = Element::new("a").with_attribute("k", "v");
        let tree = build_node_tree(&root, BuildOptions::new()).expect("tree");
        let attr = tree.iter().find(|n| n.kind() == NodeKind::Attribute).expect("attribute");
        let err = XmlSerializer.serialize(&[XdmItem::Node(attr)], &SerializationParams::default()).err();
        assert_eq!(err.map(|e| e.code_enum()), Some(ErrorCode::SENR0001));
    }
}
