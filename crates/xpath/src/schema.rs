//! XSD schema graphs: element, attribute and type declarations that node trees
//! can be built from for static evaluation.
//!
//! References between declarations are by name (`ElementKind::Ref`,
//! `TypeRef::Named`), so recursive content models do not form `Arc` cycles.

use crate::consts::XS;
use crate::error::{Error, ErrorCode};
use crate::etree::{self, Element};
use crate::xdm::{AtomicType, ExpandedName};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDecl {
    pub name: ExpandedName,
    pub type_: AtomicType,
}

impl AttributeDecl {
    pub fn new(name: ExpandedName, type_: AtomicType) -> Self {
        Self { name, type_ }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    Builtin(AtomicType),
    AnyType,
    Named(ExpandedName),
    Anonymous(Arc<ComplexType>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementKind {
    Typed(TypeRef),
    /// `<xs:element ref="..."/>`: stands for the global declaration of the same name.
    Ref,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementDecl {
    pub name: ExpandedName,
    pub kind: ElementKind,
}

impl ElementDecl {
    pub fn typed(name: ExpandedName, type_: TypeRef) -> Arc<Self> {
        Arc::new(Self { name, kind: ElementKind::Typed(type_) })
    }

    pub fn reference(name: ExpandedName) -> Arc<Self> {
        Arc::new(Self { name, kind: ElementKind::Ref })
    }

    pub fn is_ref(&self) -> bool {
        matches!(self.kind, ElementKind::Ref)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComplexType {
    pub name: Option<ExpandedName>,
    pub mixed: bool,
    pub elements: Vec<Arc<ElementDecl>>,
    pub attributes: Vec<Arc<AttributeDecl>>,
    pub simple_content: Option<AtomicType>,
}

impl ComplexType {
    pub fn named(name: ExpandedName) -> Self {
        Self { name: Some(name), ..Self::default() }
    }

    #[must_use]
    pub fn with_element(mut self, decl: Arc<ElementDecl>) -> Self {
        self.elements.push(decl);
        self
    }

    #[must_use]
    pub fn with_attribute(mut self, decl: AttributeDecl) -> Self {
        self.attributes.push(Arc::new(decl));
        self
    }

    #[must_use]
    pub fn with_simple_content(mut self, type_: AtomicType) -> Self {
        self.simple_content = Some(type_);
        self
    }
}

/// A type as seen from a declaration, after resolving names.
#[derive(Debug, Clone, Copy)]
pub enum ResolvedType<'s> {
    Atomic(AtomicType),
    Any,
    Complex(&'s ComplexType),
}

impl ResolvedType<'_> {
    pub fn name(&self) -> Option<ExpandedName> {
        match self {
            ResolvedType::Atomic(t) => Some(t.name()),
            ResolvedType::Any => Some(ExpandedName::xs("anyType")),
            ResolvedType::Complex(ct) => ct.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SchemaMaps {
    pub elements: Vec<Arc<ElementDecl>>,
    pub types: HashMap<ExpandedName, Arc<ComplexType>>,
    pub simple_types: HashMap<ExpandedName, AtomicType>,
    pub attributes: Vec<Arc<AttributeDecl>>,
}

#[derive(Debug, Clone)]
pub struct Schema {
    pub target_namespace: Option<String>,
    pub xsd_version: String,
    pub maps: SchemaMaps,
    pub namespaces: Vec<(String, String)>,
}

impl Schema {
    pub fn new(target_namespace: Option<&str>) -> Self {
        Self {
            target_namespace: target_namespace.map(str::to_string),
            xsd_version: "1.0".to_string(),
            maps: SchemaMaps::default(),
            namespaces: vec![("xs".to_string(), XS.to_string())],
        }
    }

    #[must_use]
    pub fn with_element(mut self, decl: Arc<ElementDecl>) -> Self {
        self.maps.elements.push(decl);
        self
    }

    #[must_use]
    pub fn with_type(mut self, ct: ComplexType) -> Self {
        if let Some(name) = ct.name.clone() {
            self.maps.types.insert(name, Arc::new(ct));
        }
        self
    }

    #[must_use]
    pub fn with_attribute(mut self, decl: AttributeDecl) -> Self {
        self.maps.attributes.push(Arc::new(decl));
        self
    }

    /// A name in the target namespace.
    pub fn qualified(&self, local: &str) -> ExpandedName {
        ExpandedName::new(self.target_namespace.clone(), local)
    }

    pub fn global_element(&self, name: &ExpandedName) -> Option<&Arc<ElementDecl>> {
        self.maps.elements.iter().find(|d| &d.name == name)
    }

    pub fn global_attribute(&self, name: &ExpandedName) -> Option<&Arc<AttributeDecl>> {
        self.maps.attributes.iter().find(|d| &d.name == name)
    }

    /// True when `decl` is one of this schema's global declarations (by identity).
    pub fn is_global(&self, decl: &ElementDecl) -> bool {
        self.maps.elements.iter().any(|d| std::ptr::eq(Arc::as_ptr(d), decl))
    }

    pub fn resolve<'s>(&'s self, type_: &'s TypeRef) -> Option<ResolvedType<'s>> {
        match type_ {
            TypeRef::Builtin(t) => Some(ResolvedType::Atomic(*t)),
            TypeRef::AnyType => Some(ResolvedType::Any),
            TypeRef::Anonymous(ct) => Some(ResolvedType::Complex(ct)),
            TypeRef::Named(name) => {
                if let Some(ct) = self.maps.types.get(name) {
                    return Some(ResolvedType::Complex(ct));
                }
                if let Some(t) = self.maps.simple_types.get(name) {
                    return Some(ResolvedType::Atomic(*t));
                }
                if name.ns_uri.as_deref() == Some(XS) {
                    return builtin_type(&name.local);
                }
                None
            }
        }
    }

    /// The type of an element declaration; references use their global target.
    pub fn element_type<'s>(&'s self, decl: &'s ElementDecl) -> Option<ResolvedType<'s>> {
        match &decl.kind {
            ElementKind::Typed(t) => self.resolve(t),
            ElementKind::Ref => {
                let target = self.global_element(&decl.name)?;
                match &target.kind {
                    ElementKind::Typed(t) => self.resolve(t),
                    ElementKind::Ref => None,
                }
            }
        }
    }

    /// Reads the structural subset of an XSD document: global and local element
    /// declarations, references, named and anonymous complex types (sequence,
    /// choice and all groups, simple content, attributes) and simple types
    /// restricted from built-ins.
    pub fn parse(xsd: &str) -> Result<Schema, Error> {
        let doc = etree::parse(xsd)?;
        let root = doc.root.ok_or_else(|| schema_error("schema document has no root element"))?;
        if !is_xs(&root, "schema") {
            return Err(schema_error("root element is not xs:schema"));
        }
        let mut reader = XsdReader {
            schema: Schema::new(root.attribute("targetNamespace")),
            scopes: Vec::new(),
            qualified_locals: root.attribute("elementFormDefault") == Some("qualified"),
        };
        if let Some(version) = root.attribute("version") {
            reader.schema.xsd_version = version.to_string();
        }
        reader.scopes.push(root.namespaces.clone());
        for (prefix, uri) in &root.namespaces {
            if !reader.schema.namespaces.iter().any(|(p, _)| p == prefix) {
                reader.schema.namespaces.push((prefix.clone(), uri.clone()));
            }
        }
        for child in root.child_elements() {
            reader.with_scope(child, |r, child| r.top_level(child))?;
        }
        tracing::debug!(
            target_namespace = reader.schema.target_namespace.as_deref().unwrap_or(""),
            elements = reader.schema.maps.elements.len(),
            types = reader.schema.maps.types.len(),
            "schema loaded"
        );
        Ok(reader.schema)
    }
}

fn schema_error(msg: impl Into<String>) -> Error {
    Error::from_code(ErrorCode::FODC0002, msg)
}

/// Maps XSD built-in type names onto the engine's atomic types.
pub fn builtin_type(local: &str) -> Option<ResolvedType<'static>> {
    if local == "anyType" {
        return Some(ResolvedType::Any);
    }
    if let Some(t) = AtomicType::from_local(local) {
        return Some(ResolvedType::Atomic(t));
    }
    let t = match local {
        "anySimpleType" => AtomicType::UntypedAtomic,
        "int" | "long" | "short" | "byte" | "nonNegativeInteger" | "positiveInteger"
        | "nonPositiveInteger" | "negativeInteger" | "unsignedLong" | "unsignedInt"
        | "unsignedShort" | "unsignedByte" => AtomicType::Integer,
        "normalizedString" | "token" | "language" | "Name" | "NCName" | "NMTOKEN" | "ID"
        | "IDREF" | "ENTITY" | "NMTOKENS" | "IDREFS" | "ENTITIES" => AtomicType::String,
        "gYear" | "gYearMonth" | "gMonth" | "gMonthDay" | "gDay" | "NOTATION" => {
            AtomicType::String
        }
        _ => return None,
    };
    Some(ResolvedType::Atomic(t))
}

fn is_xs(e: &Element, local: &str) -> bool {
    e.name.ns_uri.as_deref() == Some(XS) && e.name.local == local
}

struct XsdReader {
    schema: Schema,
    scopes: Vec<Vec<(String, String)>>,
    qualified_locals: bool,
}

impl XsdReader {
    fn with_scope<T>(
        &mut self,
        e: &Element,
        f: impl FnOnce(&mut Self, &Element) -> Result<T, Error>,
    ) -> Result<T, Error> {
        self.scopes.push(e.namespaces.clone());
        let result = f(self, e);
        self.scopes.pop();
        result
    }

    fn resolve_qname(&self, raw: &str) -> Result<ExpandedName, Error> {
        let (prefix, local) = match raw.split_once(':') {
            Some((p, l)) => (p, l),
            None => ("", raw),
        };
        let uri = self
            .scopes
            .iter()
            .rev()
            .flat_map(|s| s.iter().rev())
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.clone());
        match (prefix, uri) {
            ("", uri) => Ok(ExpandedName::new(uri.filter(|u| !u.is_empty()), local)),
            (_, Some(uri)) => Ok(ExpandedName::new(Some(uri), local)),
            (p, None) => Err(Error::from_code(
                ErrorCode::XPST0081,
                format!("unbound prefix {p:?} in schema reference {raw:?}"),
            )),
        }
    }

    fn type_ref(&self, raw: &str) -> Result<TypeRef, Error> {
        let name = self.resolve_qname(raw)?;
        if name.ns_uri.as_deref() == Some(XS) {
            return match builtin_type(&name.local) {
                Some(ResolvedType::Atomic(t)) => Ok(TypeRef::Builtin(t)),
                Some(ResolvedType::Any) => Ok(TypeRef::AnyType),
                _ => Err(Error::from_code(
                    ErrorCode::XPST0051,
                    format!("unknown built-in type xs:{}", name.local),
                )),
            };
        }
        Ok(TypeRef::Named(name))
    }

    fn top_level(&mut self, e: &Element) -> Result<(), Error> {
        match e.name.local.as_str() {
            "element" if is_xs(e, "element") => {
                let decl = self.element(e, true)?;
                self.schema.maps.elements.push(decl);
            }
            "complexType" if is_xs(e, "complexType") => {
                let name = e
                    .attribute("name")
                    .ok_or_else(|| schema_error("global complexType without name"))?;
                let mut ct = self.complex_type(e)?;
                ct.name = Some(self.schema.qualified(name));
                let key = self.schema.qualified(name);
                self.schema.maps.types.insert(key, Arc::new(ct));
            }
            "simpleType" if is_xs(e, "simpleType") => {
                let name = e
                    .attribute("name")
                    .ok_or_else(|| schema_error("global simpleType without name"))?;
                let base = self.simple_type(e)?;
                self.schema.maps.simple_types.insert(self.schema.qualified(name), base);
            }
            "attribute" if is_xs(e, "attribute") => {
                let decl = self.attribute(e, true)?;
                self.schema.maps.attributes.push(decl);
            }
            _ => {}
        }
        Ok(())
    }

    fn element(&mut self, e: &Element, global: bool) -> Result<Arc<ElementDecl>, Error> {
        if let Some(target) = e.attribute("ref") {
            return Ok(ElementDecl::reference(self.resolve_qname(target)?));
        }
        let local = e.attribute("name").ok_or_else(|| schema_error("element without name"))?;
        let qualified = global || self.qualified_locals || e.attribute("form") == Some("qualified");
        let name = if qualified { self.schema.qualified(local) } else { ExpandedName::local(local) };
        let type_ = if let Some(raw) = e.attribute("type") {
            self.type_ref(raw)?
        } else if let Some(ct) = e.child_elements().find(|c| is_xs(c, "complexType")) {
            let ct = self.with_scope(ct, |r, ct| r.complex_type(ct))?;
            TypeRef::Anonymous(Arc::new(ct))
        } else if let Some(st) = e.child_elements().find(|c| is_xs(c, "simpleType")) {
            TypeRef::Builtin(self.with_scope(st, |r, st| r.simple_type(st))?)
        } else {
            TypeRef::AnyType
        };
        Ok(ElementDecl::typed(name, type_))
    }

    fn attribute(&mut self, e: &Element, global: bool) -> Result<Arc<AttributeDecl>, Error> {
        if let Some(target) = e.attribute("ref") {
            let name = self.resolve_qname(target)?;
            let type_ = self.schema.global_attribute(&name).map_or(AtomicType::UntypedAtomic, |a| a.type_);
            return Ok(Arc::new(AttributeDecl::new(name, type_)));
        }
        let local = e.attribute("name").ok_or_else(|| schema_error("attribute without name"))?;
        let name = if global || e.attribute("form") == Some("qualified") {
            self.schema.qualified(local)
        } else {
            ExpandedName::local(local)
        };
        let type_ = match e.attribute("type") {
            Some(raw) => match self.type_ref(raw)? {
                TypeRef::Builtin(t) => t,
                TypeRef::Named(n) => {
                    self.schema.maps.simple_types.get(&n).copied().unwrap_or(AtomicType::UntypedAtomic)
                }
                _ => AtomicType::UntypedAtomic,
            },
            None => match e.child_elements().find(|c| is_xs(c, "simpleType")) {
                Some(st) => self.with_scope(st, |r, st| r.simple_type(st))?,
                None => AtomicType::UntypedAtomic,
            },
        };
        Ok(Arc::new(AttributeDecl::new(name, type_)))
    }

    fn simple_type(&mut self, e: &Element) -> Result<AtomicType, Error> {
        let Some(restriction) = e.child_elements().find(|c| is_xs(c, "restriction")) else {
            // lists and unions
            return Ok(AtomicType::String);
        };
        match restriction.attribute("base") {
            Some(base) => match self.type_ref(base)? {
                TypeRef::Builtin(t) => Ok(t),
                TypeRef::Named(n) => {
                    Ok(self.schema.maps.simple_types.get(&n).copied().unwrap_or(AtomicType::String))
                }
                _ => Ok(AtomicType::UntypedAtomic),
            },
            None => Ok(AtomicType::String),
        }
    }

    fn complex_type(&mut self, e: &Element) -> Result<ComplexType, Error> {
        let mut ct = ComplexType { mixed: e.attribute("mixed") == Some("true"), ..ComplexType::default() };
        let mut pending: Vec<&Element> = e.child_elements().collect();
        pending.reverse();
        while let Some(child) = pending.pop() {
            if child.name.ns_uri.as_deref() != Some(XS) {
                continue;
            }
            match child.name.local.as_str() {
                "sequence" | "choice" | "all" | "complexContent" | "restriction" => {
                    pending.extend(child.child_elements().collect::<Vec<_>>().into_iter().rev());
                }
                "extension" => {
                    if let Some(base) = child.attribute("base")
                        && let TypeRef::Builtin(t) = self.type_ref(base)?
                    {
                        ct.simple_content = Some(t);
                    }
                    pending.extend(child.child_elements().collect::<Vec<_>>().into_iter().rev());
                }
                "simpleContent" => {
                    ct.simple_content.get_or_insert(AtomicType::String);
                    pending.extend(child.child_elements().collect::<Vec<_>>().into_iter().rev());
                }
                "element" => {
                    let decl = self.with_scope(child, |r, c| r.element(c, false))?;
                    ct.elements.push(decl);
                }
                "attribute" => {
                    let decl = self.with_scope(child, |r, c| r.attribute(c, false))?;
                    ct.attributes.push(decl);
                }
                _ => {}
            }
        }
        Ok(ct)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const XSD: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
        xmlns:t="urn:test" targetNamespace="urn:test">
      <xs:element name="root">
        <xs:complexType>
          <xs:sequence>
            <xs:element name="item" type="t:itemType" maxOccurs="unbounded"/>
            <xs:element ref="t:note"/>
          </xs:sequence>
          <xs:attribute name="version" type="xs:decimal"/>
        </xs:complexType>
      </xs:element>
      <xs:element name="note" type="xs:string"/>
      <xs:complexType name="itemType">
        <xs:sequence>
          <xs:element name="item" type="t:itemType" minOccurs="0"/>
        </xs:sequence>
        <xs:attribute name="id" type="xs:int"/>
      </xs:complexType>
    </xs:schema>"#;

    #[test]
    fn reads_declarations_and_references() {
        let schema = Schema::parse(XSD).expect("schema");
        assert_eq!(schema.target_namespace.as_deref(), Some("urn:test"));
        assert_eq!(schema.maps.elements.len(), 2);
        let root = schema.global_element(&schema.qualified("root")).expect("root");
        let Some(ResolvedType::Complex(ct)) = schema.element_type(root) else {
            panic!("root has complex type");
        };
        assert_eq!(ct.elements.len(), 2);
        assert!(ct.elements[1].is_ref());
        assert_eq!(ct.attributes[0].type_, AtomicType::Decimal);
        assert!(matches!(
            schema.element_type(&ct.elements[1]),
            Some(ResolvedType::Atomic(AtomicType::String))
        ));
        let item_type = schema.maps.types.get(&schema.qualified("itemType")).expect("itemType");
        assert_eq!(item_type.attributes[0].type_, AtomicType::Integer);
    }

    #[test]
    fn anonymous_types_borrow_from_their_declaration() {
        let schema = Schema::new(Some("urn:test"));
        let inner = ComplexType::default().with_simple_content(AtomicType::Boolean);
        let local = ElementDecl::typed(schema.qualified("flag"), TypeRef::Anonymous(Arc::new(inner)));
        let Some(ResolvedType::Complex(ct)) = schema.element_type(&local) else {
            panic!("anonymous complex type");
        };
        assert_eq!(ct.simple_content, Some(AtomicType::Boolean));
        assert!(ct.name.is_none());
    }

    #[test]
    fn global_declarations_are_identified_by_identity() {
        let schema = Schema::parse(XSD).expect("schema");
        let root = schema.global_element(&schema.qualified("root")).expect("root");
        assert!(schema.is_global(root));
        let copy = ElementDecl::clone(root);
        assert!(!schema.is_global(&copy));
    }
}
