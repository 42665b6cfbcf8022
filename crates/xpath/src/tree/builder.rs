use super::{Native, NodeData, NodeId, NodeKind, NodeName, NodeTree, SchemaType};
use crate::consts::XML_URI;
use crate::error::Error;
use crate::etree::{Comment, Content, Document, Element, ProcessingInstruction};
use crate::schema::{ElementDecl, Schema};
use std::borrow::Cow;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

/// The native shapes a node tree can be built from.
#[derive(Debug, Clone, Copy)]
pub enum TreeSource<'a> {
    /// A plain element: only the element and its subtree are modeled.
    Element(&'a Element),
    /// A parsed document: comments and processing instructions around the root
    /// element become document children.
    Document(&'a Document),
    /// All global element declarations of a schema.
    Schema(&'a Schema),
    /// One global element declaration of a schema.
    SchemaElement(&'a Schema, &'a ElementDecl),
}

impl<'a> From<&'a Element> for TreeSource<'a> {
    fn from(e: &'a Element) -> Self {
        TreeSource::Element(e)
    }
}

impl<'a> From<&'a Document> for TreeSource<'a> {
    fn from(d: &'a Document) -> Self {
        TreeSource::Document(d)
    }
}

impl<'a> From<&'a Schema> for TreeSource<'a> {
    fn from(s: &'a Schema) -> Self {
        TreeSource::Schema(s)
    }
}

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub namespaces: HashMap<String, String>,
    pub uri: Option<String>,
    pub fragment: bool,
}

impl BuildOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_namespace(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.namespaces.insert(prefix.into(), uri.into());
        self
    }

    #[must_use]
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Root the tree at the element instead of a synthetic document node.
    #[must_use]
    pub fn with_fragment(mut self, fragment: bool) -> Self {
        self.fragment = fragment;
        self
    }
}

type Scope<'a> = Rc<Vec<(Cow<'a, str>, Cow<'a, str>)>>;

struct ElementFrame<'a> {
    id: NodeId,
    children: std::slice::Iter<'a, Content>,
    tail: Option<&'a str>,
    scope: Scope<'a>,
}

struct DeclFrame<'a> {
    id: NodeId,
    children: std::slice::Iter<'a, Arc<ElementDecl>>,
}

struct Builder<'a> {
    tree: NodeTree<'a>,
    position: u64,
    /// Take namespace declarations from each element, not only from the hint.
    element_scopes: bool,
    pending_refs: Vec<NodeId>,
}

impl<'a> Builder<'a> {
    fn push(&mut self, mut data: NodeData<'a>, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.tree.nodes.len());
        data.position = self.position;
        data.parent = parent;
        data.subtree_end = id.0;
        self.position += 1;
        if let Some(addr) = data.native.addr() {
            self.tree.native_index.entry(addr).or_insert(id);
        }
        self.tree.nodes.push(data);
        id
    }

    fn add_child(&mut self, parent: NodeId, child: NodeId) {
        self.tree.nodes[parent.0].children.push(child);
    }

    fn close(&mut self, id: NodeId) {
        self.tree.nodes[id.0].subtree_end = self.tree.nodes.len() - 1;
    }

    fn text(&mut self, text: &'a str, parent: NodeId) {
        if text.is_empty() {
            return;
        }
        let mut data = NodeData::new(NodeKind::Text, Native::Text(text));
        data.value = Cow::Borrowed(text);
        let id = self.push(data, Some(parent));
        self.add_child(parent, id);
    }

    fn comment(&mut self, comment: &'a Comment, parent: NodeId) {
        let mut data = NodeData::new(NodeKind::Comment, Native::Comment(comment));
        data.value = Cow::Borrowed(&comment.text);
        let id = self.push(data, Some(parent));
        self.add_child(parent, id);
    }

    fn processing_instruction(&mut self, pi: &'a ProcessingInstruction, parent: NodeId) {
        let mut data = NodeData::new(NodeKind::ProcessingInstruction, Native::ProcessingInstruction(pi));
        data.name = Some(NodeName::new(None, &pi.target, None));
        data.value = Cow::Borrowed(&pi.data);
        let id = self.push(data, Some(parent));
        self.add_child(parent, id);
    }

    fn scope_for(&self, element: &'a Element, outer: &Scope<'a>) -> Scope<'a> {
        if !self.element_scopes || element.namespaces.is_empty() {
            return Rc::clone(outer);
        }
        let mut scope: Vec<_> = outer
            .iter()
            .filter(|(prefix, _)| !element.namespaces.iter().any(|(p, _)| p == prefix))
            .cloned()
            .collect();
        scope.extend(
            element
                .namespaces
                .iter()
                .map(|(p, uri)| (Cow::Borrowed(p.as_str()), Cow::Borrowed(uri.as_str()))),
        );
        Rc::new(scope)
    }

    /// Creates the element node, then its namespace, attribute and leading text nodes.
    fn open_element(&mut self, element: &'a Element, parent: Option<NodeId>, scope: &Scope<'a>) -> NodeId {
        let mut data = NodeData::new(NodeKind::Element, Native::Element(element));
        data.name = Some(NodeName::new(
            element.name.prefix.as_deref(),
            &element.name.local,
            element.name.ns_uri.as_deref(),
        ));
        let id = self.push(data, parent);

        let bindings = std::iter::once((Cow::Borrowed("xml"), Cow::Borrowed(XML_URI)))
            .chain(scope.iter().filter(|(p, uri)| p != "xml" && !uri.is_empty()).cloned());
        for (prefix, uri) in bindings {
            let mut ns = NodeData::new(NodeKind::Namespace, Native::None);
            ns.name = Some(NodeName::new(None, &prefix, None));
            ns.value = uri;
            let ns_id = self.push(ns, Some(id));
            self.tree.nodes[id.0].namespaces.push(ns_id);
        }
        for attribute in &element.attributes {
            let mut attr = NodeData::new(NodeKind::Attribute, Native::Attribute(attribute));
            attr.name = Some(NodeName::new(
                attribute.name.prefix.as_deref(),
                &attribute.name.local,
                attribute.name.ns_uri.as_deref(),
            ));
            attr.value = Cow::Borrowed(&attribute.value);
            let attr_id = self.push(attr, Some(id));
            self.tree.nodes[id.0].attributes.push(attr_id);
        }
        if let Some(text) = element.text.as_deref() {
            self.text(text, id);
        }
        id
    }

    /// Iterative depth-first build of an element subtree. The root's tail is not modeled.
    fn element_subtree(&mut self, root: &'a Element, parent: Option<NodeId>, outer: &Scope<'a>) -> NodeId {
        let scope = self.scope_for(root, outer);
        let root_id = self.open_element(root, parent, &scope);
        let mut stack = vec![ElementFrame { id: root_id, children: root.children.iter(), tail: None, scope }];
        while let Some(frame) = stack.last_mut() {
            let parent_id = frame.id;
            match frame.children.next() {
                Some(Content::Element(child)) => {
                    let scope = self.scope_for(child, &frame.scope);
                    let id = self.open_element(child, Some(parent_id), &scope);
                    self.add_child(parent_id, id);
                    stack.push(ElementFrame {
                        id,
                        children: child.children.iter(),
                        tail: child.tail.as_deref(),
                        scope,
                    });
                }
                Some(Content::Comment(comment)) => {
                    self.comment(comment, parent_id);
                    if let Some(tail) = comment.tail.as_deref() {
                        self.text(tail, parent_id);
                    }
                }
                Some(Content::ProcessingInstruction(pi)) => {
                    self.processing_instruction(pi, parent_id);
                    if let Some(tail) = pi.tail.as_deref() {
                        self.text(tail, parent_id);
                    }
                }
                None => {
                    if let Some(done) = stack.pop() {
                        self.close(done.id);
                        if let (Some(tail), Some(outer)) = (done.tail, stack.last()) {
                            self.text(tail, outer.id);
                        }
                    }
                }
            }
        }
        root_id
    }

    fn document_children(&mut self, items: &'a [Content], doc: NodeId) {
        for item in items {
            match item {
                Content::Comment(comment) => self.comment(comment, doc),
                Content::ProcessingInstruction(pi) => self.processing_instruction(pi, doc),
                Content::Element(_) => {}
            }
        }
    }

    fn schema_name(schema: &Schema, decl: &ElementDecl) -> NodeName {
        let prefix = decl.name.ns_uri.as_deref().and_then(|uri| {
            schema.namespaces.iter().find(|(_, u)| u == uri).map(|(p, _)| p.as_str())
        });
        NodeName::new(prefix, &decl.name.local, decl.name.ns_uri.as_deref())
    }

    /// Creates the node for one element declaration. Returns the declarations
    /// of its content model when they still have to be built.
    fn open_decl(
        &mut self,
        schema: &'a Schema,
        decl: &'a ElementDecl,
        parent: Option<NodeId>,
    ) -> (NodeId, Option<std::slice::Iter<'a, Arc<ElementDecl>>>) {
        let first = self.tree.native_index.get(&std::ptr::from_ref(decl).addr()).copied();
        let mut data = NodeData::new(NodeKind::Element, Native::ElementDecl(decl));
        data.name = Some(Self::schema_name(schema, decl));
        data.schema_type = schema.element_type(decl).map(SchemaType::from);
        let id = self.push(data, parent);
        // namespace slots are reserved, no namespace nodes are created
        self.position += schema.namespaces.len() as u64;

        if decl.is_ref() {
            self.pending_refs.push(id);
            return (id, None);
        }
        if let Some(first) = first {
            self.tree.nodes[id.0].content = Some(first);
            return (id, None);
        }
        let Some(SchemaType::Complex(ct)) = self.tree.nodes[id.0].schema_type else {
            return (id, None);
        };
        for attribute in &ct.attributes {
            let mut attr = NodeData::new(NodeKind::Attribute, Native::AttributeDecl(attribute));
            attr.name = Some(NodeName::new(None, &attribute.name.local, attribute.name.ns_uri.as_deref()));
            attr.schema_type = Some(SchemaType::Atomic(attribute.type_));
            let attr_id = self.push(attr, Some(id));
            self.tree.nodes[id.0].attributes.push(attr_id);
        }
        (id, Some(ct.elements.iter()))
    }

    fn decl_subtree(&mut self, schema: &'a Schema, decl: &'a ElementDecl, parent: Option<NodeId>) -> NodeId {
        let (root_id, children) = self.open_decl(schema, decl, parent);
        let mut stack = Vec::new();
        match children {
            Some(children) => stack.push(DeclFrame { id: root_id, children }),
            None => self.close(root_id),
        }
        while let Some(frame) = stack.last_mut() {
            let parent_id = frame.id;
            match frame.children.next() {
                Some(child) => {
                    let (id, children) = self.open_decl(schema, child, Some(parent_id));
                    self.add_child(parent_id, id);
                    match children {
                        Some(children) => stack.push(DeclFrame { id, children }),
                        None => self.close(id),
                    }
                }
                None => {
                    if let Some(done) = stack.pop() {
                        self.close(done.id);
                    }
                }
            }
        }
        root_id
    }

    /// Links every reference node to the node of its global declaration,
    /// building global subtrees that are not part of the tree yet.
    fn resolve_refs(&mut self, schema: &'a Schema) {
        let mut next = 0;
        while next < self.pending_refs.len() {
            let id = self.pending_refs[next];
            next += 1;
            let Native::ElementDecl(decl) = self.tree.nodes[id.0].native else {
                continue;
            };
            let Some(global) = schema.global_element(&decl.name) else {
                tracing::debug!(name = %decl.name, "unresolved element reference");
                continue;
            };
            let global: &'a ElementDecl = global;
            let target = match self.tree.native_index.get(&std::ptr::from_ref(global).addr()) {
                Some(target) => *target,
                None => {
                    let target = self.decl_subtree(schema, global, None);
                    self.tree.roots.push(target);
                    target
                }
            };
            self.tree.nodes[id.0].content = Some(target);
        }
    }
}

/// Builds the node tree of `source`.
///
/// Every node receives a position that increases in document order. Elements
/// take their namespace and attribute positions before their children.
pub fn build_node_tree<'a>(
    source: impl Into<TreeSource<'a>>,
    options: BuildOptions,
) -> Result<NodeTree<'a>, Error> {
    let source = source.into();
    let schema = match source {
        TreeSource::Schema(s) | TreeSource::SchemaElement(s, _) => Some(s),
        _ => None,
    };
    if let TreeSource::SchemaElement(s, decl) = source
        && !s.is_global(decl)
    {
        return Err(Error::type_error(format!(
            "{} is not a global element declaration of the schema",
            decl.name
        )));
    }
    if let TreeSource::Document(doc) = source
        && options.fragment
        && doc.root.is_none()
    {
        return Err(Error::type_error("a document without root element cannot be built as a fragment"));
    }

    let uri = options.uri.clone().or_else(|| match source {
        TreeSource::Document(doc) => doc.uri.clone(),
        _ => None,
    });
    let mut hint: Vec<(Cow<'a, str>, Cow<'a, str>)> = options
        .namespaces
        .into_iter()
        .map(|(p, u)| (Cow::Owned(p), Cow::Owned(u)))
        .collect();
    hint.sort();
    let hint: Scope<'a> = Rc::new(hint);

    let mut builder = Builder {
        tree: NodeTree::empty(uri, schema, options.fragment),
        position: 1,
        element_scopes: matches!(source, TreeSource::Document(_)),
        pending_refs: Vec::new(),
    };

    let root = match source {
        TreeSource::Element(element) => {
            if options.fragment {
                builder.element_subtree(element, None, &hint)
            } else {
                let doc = builder.push(NodeData::new(NodeKind::Document, Native::None), None);
                let root = builder.element_subtree(element, Some(doc), &hint);
                builder.add_child(doc, root);
                builder.close(doc);
                doc
            }
        }
        TreeSource::Document(document) => match (&document.root, options.fragment) {
            (Some(element), true) => builder.element_subtree(element, None, &hint),
            (root, _) => {
                let doc = builder.push(NodeData::new(NodeKind::Document, Native::Document(document)), None);
                builder.document_children(&document.prolog, doc);
                if let Some(element) = root {
                    let id = builder.element_subtree(element, Some(doc), &hint);
                    builder.add_child(doc, id);
                }
                builder.document_children(&document.epilog, doc);
                builder.close(doc);
                doc
            }
        },
        TreeSource::Schema(schema) => {
            let doc = builder.push(NodeData::new(NodeKind::Document, Native::Schema(schema)), None);
            for decl in &schema.maps.elements {
                let id = builder.decl_subtree(schema, decl, Some(doc));
                builder.add_child(doc, id);
            }
            builder.close(doc);
            builder.resolve_refs(schema);
            doc
        }
        TreeSource::SchemaElement(schema, decl) => {
            let root = builder.decl_subtree(schema, decl, None);
            builder.resolve_refs(schema);
            root
        }
    };

    let mut tree = builder.tree;
    tree.root = root;
    tracing::debug!(
        nodes = tree.nodes.len(),
        roots = tree.roots.len() + 1,
        schema = schema.is_some(),
        fragment = tree.fragment,
        "node tree built"
    );
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::etree::parse;
    use crate::tree::Axis;

    #[test]
    fn text_and_tail_become_positioned_text_nodes() {
        let doc = parse("<a>x<b>y</b>z</a>").expect("xml");
        let tree = build_node_tree(&doc, BuildOptions::new()).expect("tree");
        let texts: Vec<_> = tree
            .root()
            .axis(Axis::Descendant)
            .filter(|n| n.kind() == NodeKind::Text)
            .map(|n| n.value())
            .collect();
        assert_eq!(texts, ["x", "y", "z"]);
        let positions: Vec<_> = tree.iter().map(|n| n.position()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn native_index_resolves_elements() {
        let doc = parse("<a><b/></a>").expect("xml");
        let root = doc.root.as_ref().expect("root");
        let tree = build_node_tree(&doc, BuildOptions::new()).expect("tree");
        let b = root.child_elements().next().expect("b");
        let node = tree.node_for(b).expect("indexed");
        assert_eq!(node.local_name(), "b");
    }

    #[test]
    fn empty_document_has_no_children() {
        let doc = Document::default();
        let tree = build_node_tree(&doc, BuildOptions::new()).expect("tree");
        assert_eq!(tree.root().kind(), NodeKind::Document);
        assert_eq!(tree.root().children().len(), 0);
        assert!(build_node_tree(&doc, BuildOptions::new().with_fragment(true)).is_err());
    }
}
