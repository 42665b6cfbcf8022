use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use thicket_xpath::etree::Element;
use thicket_xpath::{BuildOptions, Schema, Token, XPathContext, XPathParser, XPathVersion, build_node_tree};

fn sample_queries() -> Vec<&'static str> {
    vec![
        "1 + 2 * 3",
        "string-length('Lorem ipsum dolor sit amet, consectetur adipiscing elit.')",
        "/root/section/item[@type='a'][position() < 5]/@id",
        "for $n in 1 to 100 return $n * $n",
        "if (exists(/root/section/item[@featured='true'])) then 'featured' else 'none'",
        "count(//item[contains(., '7')])",
        "(//item)[last()]/preceding-sibling::item[1]/string(@id)",
    ]
}

fn build_sample_document() -> Element {
    (0..20).fold(Element::new("root"), |root, s| {
        let section = (0..50).fold(Element::new("section").with_attribute("name", format!("s{s}")), |section, i| {
            let mut item = Element::new("item")
                .with_attribute("id", format!("item-{s}-{i}"))
                .with_attribute("type", if i % 2 == 0 { "a" } else { "b" })
                .with_text(format!("Item {i} of section {s}"));
            if i % 10 == 0 {
                item = item.with_attribute("featured", "true");
            }
            section.with_child(item)
        });
        root.with_child(section)
    })
}

fn benchmark_parser(c: &mut Criterion) {
    let queries = sample_queries();
    let mut group = c.benchmark_group("parser/parse");
    for version in [XPathVersion::V2_0, XPathVersion::V3_1] {
        let parser = XPathParser::new(version);
        group.bench_with_input(BenchmarkId::from_parameter(format!("{version:?}")), &parser, |b, parser| {
            b.iter(|| {
                for q in &queries {
                    let token = parser.parse(black_box(q)).expect("parse failure");
                    black_box(token);
                }
            });
        });
    }
    group.finish();
}

fn benchmark_tree_build(c: &mut Criterion) {
    let document = build_sample_document();
    c.bench_function("tree/build_node_tree", |b| {
        b.iter(|| {
            let tree = build_node_tree(black_box(&document), BuildOptions::new()).expect("build failure");
            black_box(tree.len());
        });
    });
}

fn benchmark_evaluator(c: &mut Criterion) {
    let document = build_sample_document();
    let tree = build_node_tree(&document, BuildOptions::new().with_fragment(true)).expect("build failure");
    let ctx = XPathContext::new(tree.root());
    let parser = XPathParser::default();
    let compiled: Vec<(&str, Token)> =
        sample_queries().into_iter().map(|q| (q, parser.parse(q).expect("parse failure"))).collect();

    let mut group = c.benchmark_group("evaluator/evaluate");
    for (name, token) in &compiled {
        group.bench_with_input(BenchmarkId::from_parameter(name), token, |b, token| {
            b.iter(|| {
                let result = token.evaluate(black_box(&ctx)).expect("eval failure");
                black_box(result.len());
            });
        });
    }
    group.finish();
}

fn benchmark_select_first(c: &mut Criterion) {
    let document = build_sample_document();
    let tree = build_node_tree(&document, BuildOptions::new().with_fragment(true)).expect("build failure");
    let ctx = XPathContext::new(tree.root());
    let token = XPathParser::default().parse("descendant::item[@featured][1]").expect("parse failure");
    c.bench_function("evaluator/select_first", |b| {
        b.iter(|| {
            let first = token.select(black_box(&ctx)).next();
            black_box(first.is_some());
        });
    });
}

const SCHEMA: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="root">
    <xs:complexType>
      <xs:sequence><xs:element name="node" type="nodeType" maxOccurs="unbounded"/></xs:sequence>
    </xs:complexType>
  </xs:element>
  <xs:complexType name="nodeType">
    <xs:sequence><xs:element name="node" type="nodeType" minOccurs="0"/></xs:sequence>
    <xs:attribute name="weight" type="xs:double"/>
  </xs:complexType>
</xs:schema>"#;

fn benchmark_schema_check(c: &mut Criterion) {
    let schema = std::sync::Arc::new(Schema::parse(SCHEMA).expect("schema failure"));
    let parser = XPathParser::default().with_schema(schema);
    c.bench_function("schema/parse_checked", |b| {
        b.iter(|| {
            let token = parser.parse(black_box("sum(root/node/node/@weight) * 2")).expect("type failure");
            black_box(token);
        });
    });
}

criterion_group!(
    benches,
    benchmark_parser,
    benchmark_tree_build,
    benchmark_evaluator,
    benchmark_select_first,
    benchmark_schema_check
);
criterion_main!(benches);
