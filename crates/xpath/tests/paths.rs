use rstest::{fixture, rstest};
use thicket_xpath::etree::{self, Document, Element};
use thicket_xpath::{
    Axis, BuildOptions, ErrorCode, NodeKind, NodeRef, NodeTree, XPathContext, XPathParser, XPathVersion, XdmItem,
    XdmSequence, build_node_tree,
};

const CATALOG: &str = concat!(
    "<catalog>",
    "<section name=\"a\"><item id=\"1\">one</item><item id=\"2\">two</item></section>",
    "<section name=\"b\"><item id=\"3\">three</item><note>n</note></section>",
    "</catalog>",
);

#[fixture]
fn catalog() -> Document {
    etree::parse(CATALOG).expect("catalog parses")
}

fn eval_at<'a>(ctx: &XPathContext<'a>, version: XPathVersion, expr: &str) -> XdmSequence<'a> {
    let token = XPathParser::new(version).parse(expr).unwrap_or_else(|e| panic!("{expr}: {e}"));
    token.evaluate(ctx).unwrap_or_else(|e| panic!("{expr}: {e}"))
}

fn eval<'a>(tree: &'a NodeTree<'a>, expr: &str) -> XdmSequence<'a> {
    eval_at(&XPathContext::new(tree.root()), XPathVersion::V3_1, expr)
}

fn strings(items: &[XdmItem<'_>]) -> Vec<String> {
    items
        .iter()
        .map(|item| match item {
            XdmItem::Node(n) => n.string_value(),
            other => other.to_string(),
        })
        .collect()
}

fn nodes<'a>(items: &[XdmItem<'a>]) -> Vec<NodeRef<'a>> {
    items.iter().map(|i| i.as_node().expect("a node")).collect()
}

fn is_document_ordered(nodes: &[NodeRef<'_>]) -> bool {
    nodes.windows(2).all(|w| w[0].position() < w[1].position())
}

#[rstest]
#[case(XPathVersion::V1_0)]
#[case(XPathVersion::V2_0)]
#[case(XPathVersion::V3_1)]
fn counts_all_items(catalog: Document, #[case] version: XPathVersion) {
    let tree = build_node_tree(&catalog, BuildOptions::new()).expect("tree");
    let result = eval_at(&XPathContext::new(tree.root()), version, "count(//item)");
    assert_eq!(strings(&result), ["3"]);
}

#[rstest]
fn positional_predicate_applies_per_parent(catalog: Document) {
    let tree = build_node_tree(&catalog, BuildOptions::new()).expect("tree");
    assert_eq!(strings(&eval(&tree, "//item[2]")), ["two"]);
    assert_eq!(strings(&eval(&tree, "(//item)[3]")), ["three"]);
    assert!(eval(&tree, "//item[0]").is_empty());
}

#[rstest]
fn union_of_children_is_ordered(catalog: Document) {
    let tree = build_node_tree(&catalog, BuildOptions::new()).expect("tree");
    let result = eval(&tree, "catalog/section[2]/note | catalog/section/item");
    assert_eq!(strings(&result), ["one", "two", "three", "n"]);
    assert!(is_document_ordered(&nodes(&result)));
}

#[rstest]
fn union_of_sorted_operands_is_sorted_and_distinct(catalog: Document) {
    let tree = build_node_tree(&catalog, BuildOptions::new()).expect("tree");
    let result = eval(&tree, "//item[@id = '1'] | //note | //item | //note");
    assert_eq!(strings(&result), ["one", "two", "three", "n"]);
    assert!(is_document_ordered(&nodes(&result)));
}

#[rstest]
#[case("//node()")]
#[case("//item/..")]
#[case("//item/ancestor::*")]
#[case("//@*")]
#[case("//item/following::node()")]
fn path_results_are_sorted_without_duplicates(catalog: Document, #[case] expr: &str) {
    let tree = build_node_tree(&catalog, BuildOptions::new()).expect("tree");
    let result = nodes(&eval(&tree, expr));
    assert!(!result.is_empty(), "{expr}");
    assert!(is_document_ordered(&result), "{expr}");
}

#[rstest]
fn positions_follow_document_order(catalog: Document) {
    let tree = build_node_tree(&catalog, BuildOptions::new()).expect("tree");
    for node in tree.iter() {
        assert!(node.axis(Axis::Following).all(|f| f.position() > node.position()));
        assert!(node.axis(Axis::Preceding).all(|p| p.position() < node.position()));
        assert!(node.axis(Axis::Descendant).all(|d| d.position() > node.position()));
        if let Some(parent) = node.parent() {
            assert!(parent.position() < node.position());
        }
    }
    let mut positions: Vec<u64> = tree.iter().map(|n| n.position()).collect();
    positions.sort_unstable();
    positions.dedup();
    assert_eq!(positions.len(), tree.len());
}

#[rstest]
fn numeric_predicate_equals_position_filter(catalog: Document) {
    let tree = build_node_tree(&catalog, BuildOptions::new()).expect("tree");
    for n in 1..=4 {
        let by_literal = eval(&tree, &format!("(//item)[{n}]"));
        let by_position = eval(&tree, &format!("(//item)[position() = {n}]"));
        assert_eq!(by_literal, by_position, "position {n}");
    }
    assert_eq!(strings(&eval(&tree, "(//item)[last()]")), ["three"]);
}

#[rstest]
fn child_and_sibling_walk_reaches_every_tree_node(catalog: Document) {
    let tree = build_node_tree(&catalog, BuildOptions::new()).expect("tree");
    let mut walked = Vec::new();
    let mut stack = vec![tree.root()];
    while let Some(node) = stack.pop() {
        walked.push(node);
        walked.extend(node.attributes());
        walked.extend(node.namespaces());
        if let Some(first) = node.children().next() {
            let siblings: Vec<_> = std::iter::once(first).chain(first.axis(Axis::FollowingSibling)).collect();
            assert_eq!(siblings, node.children().collect::<Vec<_>>());
            stack.extend(siblings.into_iter().rev());
        }
    }
    walked.sort();
    let mut all: Vec<_> = tree.iter().collect();
    all.sort();
    assert_eq!(walked, all);
    let rebuilt = build_node_tree(&catalog, BuildOptions::new()).expect("second build");
    assert_eq!(shape(&rebuilt), shape(&tree));
}

fn shape(tree: &NodeTree<'_>) -> Vec<(NodeKind, u64, String)> {
    tree.iter().map(|n| (n.kind(), n.position(), n.string_value())).collect()
}

#[rstest]
fn reverse_axes_count_from_the_nearest_node(catalog: Document) {
    let tree = build_node_tree(&catalog, BuildOptions::new()).expect("tree");
    let third = eval(&tree, "//item[@id = '3']");
    let ctx = XPathContext::new(tree.root()).with_item(third[0].clone());
    let run = |expr: &str| strings(&eval_at(&ctx, XPathVersion::V3_1, expr));
    assert_eq!(run("preceding::item"), ["two", "one"]);
    assert_eq!(run("preceding::item[1]"), ["two"]);
    assert_eq!(run("(preceding::item)"), ["one", "two"]);
    assert_eq!(run("(preceding::item)[1]"), ["one"]);
    assert_eq!(run("ancestor::*[1]/@name"), ["b"]);
    assert_eq!(run("count(ancestor-or-self::node())"), ["4"]);
}

#[rstest]
fn path_steps_may_produce_atomic_values(catalog: Document) {
    let tree = build_node_tree(&catalog, BuildOptions::new()).expect("tree");
    assert_eq!(strings(&eval(&tree, "//item/string(@id)")), ["1", "2", "3"]);
    let mixed = XPathParser::default().parse("/catalog/(section, 1)").expect("parses");
    let err = mixed.evaluate(&XPathContext::new(tree.root())).expect_err("mixed result");
    assert_eq!(err.code_enum(), ErrorCode::XPTY0018);
    let atomic_left = XPathParser::default().parse("(1, 2)/a").expect("parses");
    let err = atomic_left.evaluate(&XPathContext::new(tree.root())).expect_err("atomic left side");
    assert_eq!(err.code_enum(), ErrorCode::XPTY0019);
}

#[rstest]
fn intersect_and_except(catalog: Document) {
    let tree = build_node_tree(&catalog, BuildOptions::new()).expect("tree");
    assert_eq!(strings(&eval(&tree, "//item except //item[@id = '2']")), ["one", "three"]);
    assert_eq!(strings(&eval(&tree, "//item intersect //section[1]/*")), ["one", "two"]);
    let err = XPathParser::default()
        .parse("//item | 1")
        .expect("parses")
        .evaluate(&XPathContext::new(tree.root()))
        .expect_err("atomic union operand");
    assert_eq!(err.code_enum(), ErrorCode::XPTY0004);
}

#[rstest]
fn select_stops_early_on_literal_positions(catalog: Document) {
    let tree = build_node_tree(&catalog, BuildOptions::new()).expect("tree");
    let root_element = eval(&tree, "/catalog");
    let ctx = XPathContext::new(tree.root()).with_item(root_element[0].clone());
    let token = XPathParser::default().parse("descendant::item[1]").expect("parses");
    let mut selection = token.select(&ctx);
    let first = selection.next().expect("one item").expect("no error");
    assert_eq!(first.as_node().map(|n| n.string_value()).as_deref(), Some("one"));
    assert!(selection.next().is_none());
}

#[test]
fn fragment_roots_act_as_document_children() {
    let root = Element::new("root").with_child(Element::new("a").with_text("x")).with_child(Element::new("b"));
    let tree = build_node_tree(&root, BuildOptions::new().with_fragment(true)).expect("fragment");
    assert_eq!(tree.root().kind(), NodeKind::Element);
    let ctx = XPathContext::new(tree.root());
    assert_eq!(strings(&eval_at(&ctx, XPathVersion::V3_1, "/root/a")), ["x"]);
    assert_eq!(eval_at(&ctx, XPathVersion::V3_1, "//b").len(), 1);
    assert_eq!(strings(&eval_at(&ctx, XPathVersion::V3_1, "count(//*)")), ["3"]);
}

#[test]
fn namespaced_names_need_a_bound_prefix() {
    let doc = etree::parse("<r xmlns:p=\"urn:p\"><p:a>1</p:a><a>2</a></r>").expect("xml");
    let tree = build_node_tree(&doc, BuildOptions::new()).expect("tree");
    let items = thicket_xpath::select(tree.root(), "//p:a", [("p", "urn:p")]).expect("bound prefix");
    assert_eq!(strings(&items), ["1"]);
    let items = thicket_xpath::select(tree.root(), "//*:a", [("p", "urn:p")]).expect("any namespace");
    assert_eq!(strings(&items), ["1", "2"]);
    let err = XPathParser::default().parse("//q:a").expect_err("unknown prefix");
    assert_eq!(err.code_enum(), ErrorCode::XPST0081);
}

#[rstest]
fn axis_steps_need_a_node_focus(catalog: Document) {
    let tree = build_node_tree(&catalog, BuildOptions::new()).expect("tree");
    let token = XPathParser::default().parse("child::item").expect("parses");
    let atomic = XPathContext::new(tree.root()).with_item(XdmItem::Atomic(thicket_xpath::XdmAtomicValue::Integer(1)));
    assert_eq!(token.evaluate(&atomic).expect_err("atomic focus").code_enum(), ErrorCode::XPTY0020);
    let empty = XPathContext::builder().build();
    assert_eq!(token.evaluate(&empty).expect_err("no focus").code_enum(), ErrorCode::XPDY0002);
    let rooted = XPathParser::default().parse("/catalog").expect("parses");
    assert_eq!(rooted.evaluate(&empty).expect_err("no root").code_enum(), ErrorCode::XPDY0002);
}

#[rstest]
fn reverse_axes_mirror_their_forward_axes(catalog: Document) {
    let tree = build_node_tree(&catalog, BuildOptions::new()).expect("tree");
    let content: Vec<NodeRef<'_>> =
        tree.iter().filter(|n| !matches!(n.kind(), NodeKind::Attribute | NodeKind::Namespace)).collect();
    for (reverse, forward) in [(Axis::Preceding, Axis::Following), (Axis::Ancestor, Axis::Descendant)] {
        for node in &content {
            let yielded: Vec<NodeRef<'_>> = node.axis(reverse).collect();
            let mut mirrored: Vec<NodeRef<'_>> =
                content.iter().copied().filter(|m| m.axis(forward).any(|f| f == *node)).collect();
            mirrored.reverse();
            assert_eq!(yielded, mirrored, "{reverse:?} of {node}");
        }
    }
}

#[test]
fn union_of_sibling_paths_keeps_document_order() {
    let doc = etree::parse("<a><b/><c/></a>").expect("xml");
    let tree = build_node_tree(&doc, BuildOptions::new()).expect("tree");
    for expr in ["a/b | a/c", "a/c | a/b", "a/* | a/c | a/b"] {
        let result = eval(&tree, expr);
        let names: Vec<&str> = nodes(&result).iter().map(|n| n.local_name()).collect();
        assert_eq!(names, ["b", "c"], "{expr}");
    }
}

#[rstest]
#[case("(1 to 9223372036854775807)[1]", "1")]
#[case("(1 to 9223372036854775807)[3]", "3")]
#[case("(-9223372036854775807 - 1 to 0)[2]", "-9223372036854775807")]
#[case("(5 to 1)[1]", "")]
fn huge_ranges_are_consumed_lazily(#[case] expr: &str, #[case] expected: &str) {
    let ctx = XPathContext::builder().build();
    let result = eval_at(&ctx, XPathVersion::V3_1, expr);
    assert_eq!(strings(&result).join(""), expected);
}

#[test]
fn huge_ranges_refuse_to_materialize() {
    let ctx = XPathContext::builder().build();
    let token = XPathParser::default().parse("count(1 to 9223372036854775807)").expect("parses");
    assert_eq!(token.evaluate(&ctx).expect_err("too long").code_enum(), ErrorCode::XPDY0130);
}
