//! The uniform node graph every expression is evaluated against.
//!
//! A [`NodeTree`] is an arena: nodes live in one vector, links between them are
//! [`NodeId`] indices and each node carries a `position` that encodes document
//! order. Trees borrow the native documents they were built from and are
//! read-only once built, so any number of contexts may share one.

pub mod axes;
pub mod builder;

pub use axes::{Axis, AxisIter};
pub use builder::{BuildOptions, TreeSource, build_node_tree};

use crate::consts::XML_URI;
use crate::etree::{self, Element};
use crate::schema::{self, ResolvedType, Schema};
use crate::xdm::{ExpandedName, XdmAtomicValue};
use core::fmt;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use string_cache::DefaultAtom as Atom;

static TREE_SEQUENCE: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Document,
    Element,
    Attribute,
    Namespace,
    Text,
    Comment,
    ProcessingInstruction,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Document => "document-node",
            NodeKind::Element => "element",
            NodeKind::Attribute => "attribute",
            NodeKind::Namespace => "namespace",
            NodeKind::Text => "text",
            NodeKind::Comment => "comment",
            NodeKind::ProcessingInstruction => "processing-instruction",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Interned node name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeName {
    pub prefix: Option<Atom>,
    pub local: Atom,
    pub ns_uri: Option<Atom>,
}

impl NodeName {
    pub fn new(prefix: Option<&str>, local: &str, ns_uri: Option<&str>) -> Self {
        Self {
            prefix: prefix.filter(|p| !p.is_empty()).map(Atom::from),
            local: Atom::from(local),
            ns_uri: ns_uri.filter(|u| !u.is_empty()).map(Atom::from),
        }
    }

    pub fn expanded(&self) -> ExpandedName {
        ExpandedName::new(self.ns_uri.as_ref().map(ToString::to_string), &*self.local)
    }

    pub fn matches(&self, name: &ExpandedName) -> bool {
        *self.local == *name.local && self.ns_uri.as_deref() == name.ns_uri.as_deref()
    }
}

impl fmt::Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prefix {
            Some(p) => write!(f, "{p}:{}", self.local),
            None => f.write_str(&self.local),
        }
    }
}

/// The native object a node wraps.
#[derive(Debug, Clone, Copy)]
pub enum Native<'a> {
    None,
    Document(&'a etree::Document),
    Element(&'a Element),
    Attribute(&'a etree::Attribute),
    Comment(&'a etree::Comment),
    ProcessingInstruction(&'a etree::ProcessingInstruction),
    Text(&'a str),
    Schema(&'a Schema),
    ElementDecl(&'a schema::ElementDecl),
    AttributeDecl(&'a schema::AttributeDecl),
}

impl Native<'_> {
    /// Address of the wrapped object, the key of the native index.
    pub(crate) fn addr(&self) -> Option<usize> {
        let addr = match self {
            Native::None | Native::Text(_) => return None,
            Native::Document(d) => std::ptr::from_ref(*d).addr(),
            Native::Element(e) => std::ptr::from_ref(*e).addr(),
            Native::Attribute(a) => std::ptr::from_ref(*a).addr(),
            Native::Comment(c) => std::ptr::from_ref(*c).addr(),
            Native::ProcessingInstruction(p) => std::ptr::from_ref(*p).addr(),
            Native::Schema(s) => std::ptr::from_ref(*s).addr(),
            Native::ElementDecl(d) => std::ptr::from_ref(*d).addr(),
            Native::AttributeDecl(d) => std::ptr::from_ref(*d).addr(),
        };
        Some(addr)
    }
}

/// Declared type of a schema node.
#[derive(Debug, Clone, Copy)]
pub enum SchemaType<'a> {
    Atomic(crate::xdm::AtomicType),
    Any,
    Complex(&'a schema::ComplexType),
}

impl<'a> From<ResolvedType<'a>> for SchemaType<'a> {
    fn from(t: ResolvedType<'a>) -> Self {
        match t {
            ResolvedType::Atomic(a) => SchemaType::Atomic(a),
            ResolvedType::Any => SchemaType::Any,
            ResolvedType::Complex(ct) => SchemaType::Complex(ct),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct NodeData<'a> {
    pub kind: NodeKind,
    pub name: Option<NodeName>,
    pub value: Cow<'a, str>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub attributes: Vec<NodeId>,
    pub namespaces: Vec<NodeId>,
    pub position: u64,
    /// Last arena index of this node's subtree.
    pub subtree_end: usize,
    pub native: Native<'a>,
    /// Schema reference nodes share the children and attributes of their target.
    pub content: Option<NodeId>,
    pub schema_type: Option<SchemaType<'a>>,
}

impl<'a> NodeData<'a> {
    pub(crate) fn new(kind: NodeKind, native: Native<'a>) -> Self {
        Self {
            kind,
            name: None,
            value: Cow::Borrowed(""),
            parent: None,
            children: Vec::new(),
            attributes: Vec::new(),
            namespaces: Vec::new(),
            position: 0,
            subtree_end: 0,
            native,
            content: None,
            schema_type: None,
        }
    }
}

pub struct NodeTree<'a> {
    pub(crate) nodes: Vec<NodeData<'a>>,
    pub(crate) native_index: HashMap<usize, NodeId>,
    pub(crate) root: NodeId,
    pub(crate) roots: Vec<NodeId>,
    pub(crate) uri: Option<String>,
    pub(crate) schema: Option<&'a Schema>,
    pub(crate) fragment: bool,
    sequence: u64,
}

impl fmt::Debug for NodeTree<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeTree")
            .field("nodes", &self.nodes.len())
            .field("uri", &self.uri)
            .field("schema", &self.schema.is_some())
            .finish_non_exhaustive()
    }
}

impl<'a> NodeTree<'a> {
    pub(crate) fn empty(uri: Option<String>, schema: Option<&'a Schema>, fragment: bool) -> Self {
        Self {
            nodes: Vec::new(),
            native_index: HashMap::new(),
            root: NodeId(0),
            roots: Vec::new(),
            uri,
            schema,
            fragment,
            sequence: TREE_SEQUENCE.fetch_add(1, AtomicOrdering::Relaxed),
        }
    }

    pub fn root(&self) -> NodeRef<'_> {
        NodeRef { tree: self, id: self.root }
    }

    /// Additional roots created while resolving schema references.
    pub fn roots(&self) -> impl Iterator<Item = NodeRef<'_>> {
        self.roots.iter().map(move |id| NodeRef { tree: self, id: *id })
    }

    pub fn get(&self, id: NodeId) -> Option<NodeRef<'_>> {
        (id.0 < self.nodes.len()).then_some(NodeRef { tree: self, id })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes in arena order.
    pub fn iter(&self) -> impl Iterator<Item = NodeRef<'_>> {
        (0..self.nodes.len()).map(move |i| NodeRef { tree: self, id: NodeId(i) })
    }

    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    pub fn schema(&self) -> Option<&'a Schema> {
        self.schema
    }

    pub fn is_fragment(&self) -> bool {
        self.fragment
    }

    /// The node wrapping `native`, found through the native index.
    pub fn node_for<T>(&self, native: &T) -> Option<NodeRef<'_>> {
        let addr = std::ptr::from_ref(native).addr();
        self.native_index.get(&addr).map(|id| NodeRef { tree: self, id: *id })
    }

    pub(crate) fn data(&self, id: NodeId) -> &NodeData<'a> {
        &self.nodes[id.0]
    }
}

/// A node of a [`NodeTree`]: identity is the tree plus the arena index.
#[derive(Clone, Copy)]
pub struct NodeRef<'a> {
    tree: &'a NodeTree<'a>,
    id: NodeId,
}

impl PartialEq for NodeRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.tree, other.tree) && self.id == other.id
    }
}

impl Eq for NodeRef<'_> {}

impl std::hash::Hash for NodeRef<'_> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.tree.sequence.hash(state);
        self.id.hash(state);
    }
}

impl PartialOrd for NodeRef<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Document order; nodes of different trees order by tree creation.
impl Ord for NodeRef<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.tree
            .sequence
            .cmp(&other.tree.sequence)
            .then_with(|| self.position().cmp(&other.position()))
    }
}

impl<'a> NodeRef<'a> {
    fn data(&self) -> &'a NodeData<'a> {
        &self.tree.nodes[self.id.0]
    }

    fn at(&self, id: NodeId) -> NodeRef<'a> {
        NodeRef { tree: self.tree, id }
    }

    /// The node whose children and attributes this node exposes.
    fn content_node(&self) -> &'a NodeData<'a> {
        match self.data().content {
            Some(target) => self.tree.data(target),
            None => self.data(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn tree(&self) -> &'a NodeTree<'a> {
        self.tree
    }

    pub fn kind(&self) -> NodeKind {
        self.data().kind
    }

    pub fn position(&self) -> u64 {
        self.data().position
    }

    pub fn name(&self) -> Option<&'a NodeName> {
        self.data().name.as_ref()
    }

    pub fn local_name(&self) -> &'a str {
        self.name().map_or("", |n| &*n.local)
    }

    pub fn namespace_uri(&self) -> Option<&'a str> {
        self.name().and_then(|n| n.ns_uri.as_deref())
    }

    pub fn native(&self) -> Native<'a> {
        self.data().native
    }

    pub fn parent(&self) -> Option<NodeRef<'a>> {
        self.data().parent.map(|p| self.at(p))
    }

    pub fn children(&self) -> impl DoubleEndedIterator<Item = NodeRef<'a>> + ExactSizeIterator + 'a {
        let tree = self.tree;
        self.content_node().children.iter().map(move |id| NodeRef { tree, id: *id })
    }

    pub fn attributes(&self) -> impl DoubleEndedIterator<Item = NodeRef<'a>> + ExactSizeIterator + 'a {
        let tree = self.tree;
        self.content_node().attributes.iter().map(move |id| NodeRef { tree, id: *id })
    }

    pub fn namespaces(&self) -> impl DoubleEndedIterator<Item = NodeRef<'a>> + ExactSizeIterator + 'a {
        let tree = self.tree;
        self.data().namespaces.iter().map(move |id| NodeRef { tree, id: *id })
    }

    pub fn has_children(&self) -> bool {
        !self.content_node().children.is_empty()
    }

    pub fn axis(&self, axis: Axis) -> AxisIter<'a> {
        AxisIter::new(*self, axis)
    }

    /// The topmost ancestor.
    pub fn root(&self) -> NodeRef<'a> {
        let mut current = *self;
        while let Some(p) = current.parent() {
            current = p;
        }
        current
    }

    pub fn attribute(&self, local: &str) -> Option<&'a str> {
        self.attributes()
            .find(|a| a.local_name() == local && a.namespace_uri().is_none())
            .map(|a| a.data().value.as_ref())
    }

    /// Raw value of attribute, namespace, text, comment and PI nodes.
    pub fn value(&self) -> &'a str {
        self.data().value.as_ref()
    }

    pub fn string_value(&self) -> String {
        match self.kind() {
            NodeKind::Document | NodeKind::Element => {
                let mut out = String::new();
                for node in self.axis(Axis::Descendant) {
                    if node.kind() == NodeKind::Text {
                        out.push_str(node.value());
                    }
                }
                out
            }
            _ => self.value().to_string(),
        }
    }

    pub fn schema_type(&self) -> Option<SchemaType<'a>> {
        self.data().schema_type
    }

    /// Atomized value of the node. Nodes of schema trees yield a sample of
    /// their declared type.
    pub fn typed_value(&self) -> XdmAtomicValue {
        match self.kind() {
            NodeKind::Comment | NodeKind::ProcessingInstruction | NodeKind::Namespace => {
                return XdmAtomicValue::String(self.value().to_string());
            }
            _ => {}
        }
        if self.tree.schema.is_some() {
            return match self.schema_type() {
                Some(SchemaType::Atomic(t)) => t.sample_value(),
                Some(SchemaType::Complex(ct)) => match ct.simple_content {
                    Some(t) => t.sample_value(),
                    None => XdmAtomicValue::UntypedAtomic(String::new()),
                },
                Some(SchemaType::Any) | None => XdmAtomicValue::UntypedAtomic(String::new()),
            };
        }
        XdmAtomicValue::UntypedAtomic(self.string_value())
    }

    /// `xml:base` aware base URI, resolved against the tree's URI.
    pub fn base_uri(&self) -> Option<String> {
        let mut bases = Vec::new();
        let mut current = Some(*self);
        while let Some(node) = current {
            if node.kind() == NodeKind::Element
                && let Some(base) = node
                    .attributes()
                    .find(|a| a.local_name() == "base" && a.namespace_uri() == Some(XML_URI))
            {
                bases.push(base.value());
            }
            current = node.parent();
        }
        let mut resolved = self.tree.uri.as_deref().and_then(|u| url::Url::parse(u).ok());
        for base in bases.into_iter().rev() {
            resolved = match &resolved {
                Some(current) => current.join(base).ok(),
                None => url::Url::parse(base).ok(),
            };
        }
        resolved.map(String::from).or_else(|| self.tree.uri.clone())
    }

    /// Prefix → URI bindings of the node's namespace nodes.
    pub fn in_scope_namespaces(&self) -> Vec<(&'a str, &'a str)> {
        self.namespaces().map(|ns| (ns.local_name(), ns.value())).collect()
    }

    pub fn is_ancestor_of(&self, other: &NodeRef<'a>) -> bool {
        let mut current = other.parent();
        while let Some(p) = current {
            if p == *self {
                return true;
            }
            current = p.parent();
        }
        false
    }

    pub(crate) fn subtree_end(&self) -> usize {
        self.data().subtree_end
    }

    pub(crate) fn content_target(&self) -> Option<NodeId> {
        self.data().content
    }
}

impl fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}@{}", self.kind().as_str(), self.id.0, self.position())?;
        if let Some(name) = self.name() {
            write!(f, "({name})")?;
        }
        Ok(())
    }
}

impl fmt::Display for NodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            NodeKind::Document => f.write_str("document-node()"),
            NodeKind::Element => write!(f, "<{}>", self.name().map(ToString::to_string).unwrap_or_default()),
            NodeKind::Attribute => write!(
                f,
                "{}=\"{}\"",
                self.name().map(ToString::to_string).unwrap_or_default(),
                self.value()
            ),
            NodeKind::Namespace => match self.local_name() {
                "" => write!(f, "xmlns=\"{}\"", self.value()),
                prefix => write!(f, "xmlns:{prefix}=\"{}\"", self.value()),
            },
            NodeKind::Text => f.write_str(self.value()),
            NodeKind::Comment => write!(f, "<!--{}-->", self.value()),
            NodeKind::ProcessingInstruction => write!(f, "<?{} {}?>", self.local_name(), self.value()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_names_are_interned_and_compare_by_expanded_name() {
        let a = NodeName::new(Some("p"), "item", Some("urn:x"));
        assert!(a.matches(&ExpandedName::new(Some("urn:x".into()), "item")));
        assert!(!a.matches(&ExpandedName::local("item")));
        assert_eq!(a.to_string(), "p:item");
        assert_eq!(NodeName::new(Some(""), "x", Some("")).prefix, None);
    }
}
