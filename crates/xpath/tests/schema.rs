use rstest::{fixture, rstest};
use std::sync::Arc;
use thicket_xpath::schema::{ComplexType, ElementDecl, TypeRef};
use thicket_xpath::tree::SchemaType;
use thicket_xpath::xdm::AtomicType;
use thicket_xpath::{
    BuildOptions, ErrorCode, ExpandedName, NodeKind, Schema, TreeSource, XPathContext, XPathParser, XdmAtomicValue,
    XdmItem, build_node_tree,
};

const CATALOG_XSD: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
    xmlns:t="urn:catalog" targetNamespace="urn:catalog">
  <xs:element name="catalog">
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
      <xs:element name="created" type="xs:date"/>
    </xs:sequence>
    <xs:attribute name="id" type="xs:int"/>
  </xs:complexType>
</xs:schema>"#;

#[fixture]
fn catalog_schema() -> Schema {
    Schema::parse(CATALOG_XSD).expect("schema parses")
}

fn schema_eval(schema: &Schema, expr: &str) -> Vec<String> {
    let tree = build_node_tree(schema, BuildOptions::new()).expect("schema tree");
    let ctx = XPathContext::schema(tree.root());
    let token = XPathParser::default().with_namespace("t", "urn:catalog").parse(expr).expect(expr);
    token
        .evaluate(&ctx)
        .unwrap_or_else(|e| panic!("{expr}: {e}"))
        .iter()
        .map(|item| match item {
            XdmItem::Node(n) => n.local_name().to_string(),
            other => other.to_string(),
        })
        .collect()
}

#[rstest]
fn recursive_types_share_their_content(catalog_schema: Schema) {
    let tree = build_node_tree(&catalog_schema, BuildOptions::new()).expect("schema tree");
    assert_eq!(tree.root().kind(), NodeKind::Document);
    assert!(tree.len() < 32, "recursion must not unfold: {} nodes", tree.len());
    assert_eq!(schema_eval(&catalog_schema, "count(t:catalog/item/item/item/item/item)"), ["1"]);
    assert_eq!(schema_eval(&catalog_schema, "t:catalog/item/item/created/local-name()"), ["created"]);
}

#[rstest]
fn element_references_link_to_global_declarations(catalog_schema: Schema) {
    assert_eq!(schema_eval(&catalog_schema, "t:catalog/t:note"), ["note"]);
    assert_eq!(schema_eval(&catalog_schema, "t:catalog/t:note instance of element()"), ["true"]);
    assert_eq!(schema_eval(&catalog_schema, "data(t:catalog/t:note) instance of xs:string"), ["true"]);
}

#[rstest]
fn atomized_schema_nodes_are_samples_of_their_type(catalog_schema: Schema) {
    assert_eq!(schema_eval(&catalog_schema, "t:catalog/item/@id + 1"), ["2"]);
    assert_eq!(schema_eval(&catalog_schema, "t:catalog/@version instance of xs:decimal"), ["true"]);
    assert_eq!(schema_eval(&catalog_schema, "t:catalog/item/created instance of element()"), ["true"]);
    assert_eq!(schema_eval(&catalog_schema, "data(t:catalog/item/created) instance of xs:date"), ["true"]);
}

#[rstest]
fn schema_mode_neutralizes_io_and_type_errors(catalog_schema: Schema) {
    assert_eq!(schema_eval(&catalog_schema, "t:catalog/item/@id = 'abc'"), ["false"]);
    assert_eq!(schema_eval(&catalog_schema, "('abc', t:catalog/item/@id) = 1"), ["true"]);
    assert!(schema_eval(&catalog_schema, "doc('urn:anything')").is_empty());
    assert_eq!(schema_eval(&catalog_schema, "doc-available('urn:anything')"), ["false"]);
    assert!(schema_eval(&catalog_schema, "environment-variable('PATH')").is_empty());
    assert!(schema_eval(&catalog_schema, "$unbound").is_empty());
}

#[rstest]
fn parser_with_schema_reports_static_type_errors(catalog_schema: Schema) {
    let parser = XPathParser::default().with_namespace("t", "urn:catalog").with_schema(Arc::new(catalog_schema));
    let token = parser.parse("t:catalog/item/@id + 1").expect("well typed");
    let id_test = token.iter().find(|t| t.symbol == "id").expect("id name test");
    assert_eq!(id_test.xsd_type(), Some(&AtomicType::Integer.name()));
    let err = parser.parse("t:catalog/item/@id + 'x'").expect_err("string operand");
    assert_eq!(err.code_enum(), ErrorCode::XPTY0004);
    let err = parser.parse("t:catalog/item/created + 1").expect_err("date plus integer");
    assert_eq!(err.code_enum(), ErrorCode::XPTY0004);
}

#[rstest]
fn schema_types_are_visible_on_nodes(catalog_schema: Schema) {
    let tree = build_node_tree(&catalog_schema, BuildOptions::new()).expect("schema tree");
    let catalog = tree.root().children().next().expect("catalog declaration");
    assert!(matches!(catalog.schema_type(), Some(SchemaType::Complex(_))));
    let version = catalog.attributes().next().expect("version attribute");
    assert!(matches!(version.schema_type(), Some(SchemaType::Atomic(AtomicType::Decimal))));
    assert_eq!(version.typed_value(), XdmAtomicValue::Decimal(1.into()));
    assert_eq!(catalog.namespaces().len(), 0);
}

fn mutual_schema() -> Schema {
    let group = |child: &str| {
        TypeRef::Anonymous(Arc::new(
            ComplexType::default().with_element(ElementDecl::reference(ExpandedName::local(child))),
        ))
    };
    Schema::new(None)
        .with_element(ElementDecl::typed(ExpandedName::local("a"), group("b")))
        .with_element(ElementDecl::typed(ExpandedName::local("b"), group("a")))
}

#[test]
fn mutually_recursive_references_terminate() {
    let schema = mutual_schema();
    let a = schema.global_element(&ExpandedName::local("a")).expect("a");
    let tree = build_node_tree(TreeSource::SchemaElement(&schema, a), BuildOptions::new()).expect("tree of a");
    assert_eq!(tree.root().local_name(), "a");
    assert_eq!(tree.roots().count(), 1);
    let ctx = XPathContext::schema(tree.root());
    let token = XPathParser::default().parse("count(b/a/b/a/b)").expect("parses");
    assert_eq!(token.evaluate(&ctx).expect("evaluates"), vec![XdmItem::Atomic(XdmAtomicValue::Integer(1))]);
}

#[test]
fn only_global_declarations_can_root_a_tree() {
    let schema = mutual_schema();
    let a = schema.global_element(&ExpandedName::local("a")).expect("a");
    let copy = ElementDecl::clone(a);
    let err = build_node_tree(TreeSource::SchemaElement(&schema, &copy), BuildOptions::new()).expect_err("copy");
    assert_eq!(err.code_enum(), ErrorCode::XPTY0004);
}

#[test]
fn unresolved_references_stay_empty() {
    let schema = Schema::new(None).with_element(ElementDecl::typed(
        ExpandedName::local("root"),
        TypeRef::Anonymous(Arc::new(
            ComplexType::default().with_element(ElementDecl::reference(ExpandedName::local("missing"))),
        )),
    ));
    let tree = build_node_tree(&schema, BuildOptions::new()).expect("tree");
    let ctx = XPathContext::schema(tree.root());
    let token = XPathParser::default().parse("count(root/missing/node())").expect("parses");
    assert_eq!(token.evaluate(&ctx).expect("evaluates"), vec![XdmItem::Atomic(XdmAtomicValue::Integer(0))]);
}
