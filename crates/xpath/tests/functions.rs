use chrono::{FixedOffset, TimeZone};
use rstest::{fixture, rstest};
use thicket_xpath::etree::{self, Document};
use thicket_xpath::{
    BuildOptions, ErrorCode, ExpandedName, XPathContext, XPathParser, XPathVersion, XdmAtomicValue, XdmItem,
    build_node_tree,
};

const LIBRARY: &str = concat!(
    "<library xml:lang=\"en\">",
    "<book id=\"b1\" year=\"1999\"><title>Alpha</title><price>10</price></book>",
    "<book id=\"b2\" year=\"2005\"><title>Beta</title><price>25.5</price></book>",
    "<!-- archive --><book id=\"b3\" year=\"2010\"><title>Gamma</title><price>4.5</price></book>",
    "</library>",
);

#[fixture]
fn library() -> Document {
    etree::parse(LIBRARY).expect("library parses")
}

fn run_version(doc: &Document, version: XPathVersion, expr: &str) -> Result<String, thicket_xpath::Error> {
    let tree = build_node_tree(doc, BuildOptions::new().with_uri("urn:library"))?;
    let utc = FixedOffset::east_opt(0).expect("utc");
    let ctx = XPathContext::builder()
        .with_root(tree.root())
        .with_implicit_timezone(utc)
        .with_current_datetime(utc.with_ymd_and_hms(2024, 5, 17, 12, 30, 0).single().expect("instant"))
        .with_variable(ExpandedName::local("n"), vec![XdmItem::Atomic(XdmAtomicValue::Integer(3))])
        .with_env_var("THICKET_MODE", "test")
        .build();
    let token = XPathParser::new(version).parse(expr)?;
    let items = token.evaluate(&ctx)?;
    Ok(items
        .iter()
        .map(|item| match item {
            XdmItem::Node(n) => n.string_value(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join("|"))
}

fn run(doc: &Document, expr: &str) -> Result<String, thicket_xpath::Error> {
    run_version(doc, XPathVersion::V3_1, expr)
}

#[rstest]
#[case("concat('a', 'b', 'c')", "abc")]
#[case("substring('12345', 1.5, 2.6)", "234")]
#[case("substring('12345', 0, 3)", "12")]
#[case("substring-before('1999/04/01', '/')", "1999")]
#[case("substring-after('1999/04/01', '/')", "04/01")]
#[case("translate('bar', 'abc', 'ABC')", "BAr")]
#[case("normalize-space('  a   b  ')", "a b")]
#[case("string-length('héllo')", "5")]
#[case("string-join(('a', 'b', 'c'), '-')", "a-b-c")]
#[case("upper-case('abc')", "ABC")]
#[case("lower-case('ÄB')", "äb")]
#[case("starts-with('thicket', 'thi')", "true")]
#[case("ends-with('thicket', 'et')", "true")]
#[case("contains('thicket', '')", "true")]
#[case("compare('a', 'b')", "-1")]
#[case("codepoints-to-string((72, 105))", "Hi")]
#[case("string-to-codepoints('AB')", "65|66")]
#[case("tokenize('a,b,,c', ',')", "a|b||c")]
#[case("tokenize('', ',')", "")]
#[case("replace('abracadabra', 'a', 'X')", "XbrXcXdXbrX")]
#[case("replace('2024-05', '(\\d+)-(\\d+)', '$2/$1')", "05/2024")]
#[case("matches('abc', '^a.c$')", "true")]
#[case("matches('ABC', 'abc', 'i')", "true")]
#[case("'a' || 'b' || 'c'", "abc")]
#[case("'abc' => upper-case()", "ABC")]
fn string_functions(library: Document, #[case] expr: &str, #[case] expected: &str) {
    assert_eq!(run(&library, expr).expect(expr), expected, "{expr}");
}

#[rstest]
#[case("1 + 2 * 3", "7")]
#[case("10 div 4", "2.5")]
#[case("10 idiv 3", "3")]
#[case("10 mod 3", "1")]
#[case("-7 mod 3", "-1")]
#[case("1 div 0e0", "INF")]
#[case("1.5 + 1", "2.5")]
#[case("abs(-3)", "3")]
#[case("floor(-1.5)", "-2")]
#[case("ceiling(1.2)", "2")]
#[case("round(2.5)", "3")]
#[case("round(-2.5)", "-2")]
#[case("round(3.14159, 2)", "3.14")]
#[case("sum((1, 2, 3))", "6")]
#[case("sum(())", "0")]
#[case("avg((1, 2, 3, 4))", "2.5")]
#[case("max((1, 5, 3))", "5")]
#[case("min(('b', 'a'))", "a")]
#[case("math:sqrt(16)", "4")]
#[case("math:pi() > 3", "true")]
#[case("number('12')", "12")]
#[case("number('abc')", "NaN")]
#[case("$n * 2", "6")]
#[case("(-9223372036854775807 - 1) mod -1", "0")]
fn numeric_functions(library: Document, #[case] expr: &str, #[case] expected: &str) {
    assert_eq!(run(&library, expr).expect(expr), expected, "{expr}");
}

#[rstest]
#[case("0.1 + 0.2 eq 0.3", "true")]
#[case("0.1 + 0.2", "0.3")]
#[case("9223372036854775808", "9223372036854775808")]
#[case("9223372036854775807 + 1.0", "9223372036854775808")]
#[case("xs:decimal('12345678901234567890123456789')", "12345678901234567890123456789")]
#[case("1 div 3 * 3 = 1", "false")]
#[case("round(2.345, 2)", "2.35")]
#[case("round(-2.345, 2)", "-2.34")]
#[case("floor(-0.5)", "-1")]
#[case("sum((0.1, 0.2, 0.3))", "0.6")]
#[case("avg((0.1, 0.2))", "0.15")]
#[case("xs:integer(9007199254740993.9)", "9007199254740993")]
fn decimals_are_exact(library: Document, #[case] expr: &str, #[case] expected: &str) {
    assert_eq!(run(&library, expr).expect(expr), expected, "{expr}");
}

#[rstest]
#[case("xs:decimal('123456789012345678901234567890')", ErrorCode::FOCA0001)]
#[case("79228162514264337593543950335 + 1", ErrorCode::FOAR0002)]
#[case("1.5 idiv 0", ErrorCode::FOAR0001)]
fn decimal_limits_are_reported(library: Document, #[case] expr: &str, #[case] code: ErrorCode) {
    assert_eq!(run(&library, expr).expect_err(expr).code_enum(), code, "{expr}");
}

#[rstest]
#[case("count((1, 2, 3))", "3")]
#[case("empty(())", "true")]
#[case("exists(())", "false")]
#[case("count(distinct-values((1, 2, 1, 2.0, 'a')))", "3")]
#[case("reverse((1, 2, 3))", "3|2|1")]
#[case("subsequence((1, 2, 3, 4, 5), 2, 3)", "2|3|4")]
#[case("index-of((10, 20, 10), 10)", "1|3")]
#[case("insert-before((1, 2), 2, 9)", "1|9|2")]
#[case("remove((1, 2, 3), 2)", "1|3")]
#[case("head((4, 5))", "4")]
#[case("tail((4, 5, 6))", "5|6")]
#[case("deep-equal((1, 2), (1, 2))", "true")]
#[case("deep-equal((1, 2), (2, 1))", "false")]
#[case("1 to 4", "1|2|3|4")]
#[case("for $x in (1, 2, 3) return $x * $x", "1|4|9")]
#[case("let $a := 2, $b := $a + 1 return $a * $b", "6")]
#[case("some $x in (1, 2) satisfies $x = 2", "true")]
#[case("every $x in (1, 2) satisfies $x = 2", "false")]
#[case("if (1 = 1) then 'y' else 'n'", "y")]
#[case("(1, 2, 3) ! (. * 2)", "2|4|6")]
#[case("boolean('')", "false")]
#[case("not(())", "true")]
fn sequence_functions(library: Document, #[case] expr: &str, #[case] expected: &str) {
    assert_eq!(run(&library, expr).expect(expr), expected, "{expr}");
}

#[rstest]
#[case("count(//book)", "3")]
#[case("//book[price > 5]/title", "Alpha|Beta")]
#[case("//book[@year >= 2005]/@id", "b2|b3")]
#[case("sum(//price)", "40")]
#[case("name((//book)[1])", "book")]
#[case("local-name(/*)", "library")]
#[case("string(//book[@id = 'b2']/title)", "Beta")]
#[case("data(//book[2]/title)", "Beta")]
#[case("root((//title)[1]) is root(/library)", "true")]
#[case("//book[1] << //book[3]", "true")]
#[case("//book[3] >> //book[1]", "true")]
#[case("has-children((//title)[1])", "true")]
#[case("count(//comment())", "1")]
#[case("lang('en')", "false")]
#[case("//book[1]/lang('EN')", "true")]
#[case("id('b2')/title", "Beta")]
#[case("document-uri(/)", "urn:library")]
#[case("node-name(/*)", "library")]
#[case("in-scope-prefixes(/*)", "xml")]
#[case("(//book/title)[last()]", "Gamma")]
#[case("//book[position() = 2]/@year", "2005")]
#[case("string-join(//book/@id, ',')", "b1,b2,b3")]
fn node_functions(library: Document, #[case] expr: &str, #[case] expected: &str) {
    assert_eq!(run(&library, expr).expect(expr), expected, "{expr}");
}

#[rstest]
#[case("xs:integer('42') instance of xs:integer", "true")]
#[case("42 instance of xs:decimal", "true")]
#[case("(1, 2) instance of xs:integer+", "true")]
#[case("() instance of xs:integer?", "true")]
#[case("'5' castable as xs:integer", "true")]
#[case("'x' castable as xs:integer", "false")]
#[case("'12' cast as xs:integer + 1", "13")]
#[case("xs:byte('12')", "12")]
#[case("xs:token('  a   b ')", "a b")]
#[case("xs:hexBinary('0aff')", "0AFF")]
#[case("xs:boolean('1')", "true")]
#[case("xs:date('2024-01-31') + xs:yearMonthDuration('P1M')", "2024-02-29")]
#[case("xs:dateTime('2024-01-01T00:00:00Z') - xs:dateTime('2023-12-31T00:00:00Z')", "P1D")]
#[case("xs:dayTimeDuration('PT1H') * 2", "PT2H")]
#[case("xs:date('2024-01-01') lt xs:date('2024-01-02')", "true")]
#[case("current-date()", "2024-05-17Z")]
#[case("implicit-timezone()", "PT0S")]
#[case("environment-variable('THICKET_MODE')", "test")]
#[case("normalize-unicode('abc', 'NFD')", "abc")]
fn types_and_temporal_values(library: Document, #[case] expr: &str, #[case] expected: &str) {
    assert_eq!(run(&library, expr).expect(expr), expected, "{expr}");
}

#[rstest]
#[case("map{'a': 1, 'b': 2}?b", "2")]
#[case("map:size(map{'a': 1})", "1")]
#[case("map:keys(map{1: 'x'})", "1")]
#[case("map:contains(map{'a': 1}, 'b')", "false")]
#[case("map:get(map{'a': 1}, 'a')", "1")]
#[case("map{'a': [10, 20]}?a?2", "20")]
#[case("[1, (2, 3)]?2", "2|3")]
#[case("array{1, 2, 3}?3", "3")]
#[case("array:size([1, 2, 3])", "3")]
#[case("array:get([5, 6], 2)", "6")]
#[case("array:size(array:append([], 1))", "1")]
#[case("[1, 2, 3]?*", "1|2|3")]
#[case("map{'k': 'v'} instance of map(*)", "true")]
fn maps_and_arrays(library: Document, #[case] expr: &str, #[case] expected: &str) {
    assert_eq!(run(&library, expr).expect(expr), expected, "{expr}");
}

#[rstest]
#[case("1 div 0", ErrorCode::FOAR0001)]
#[case("1 idiv 0", ErrorCode::FOAR0001)]
#[case("9223372036854775807 + 1", ErrorCode::FOAR0002)]
#[case("xs:integer('x')", ErrorCode::FORG0001)]
#[case("'a' + 1", ErrorCode::XPTY0004)]
#[case("1 eq 'a'", ErrorCode::XPTY0004)]
#[case("(1, 2) eq 1", ErrorCode::XPTY0004)]
#[case("xs:date('2020-01-01') < 1", ErrorCode::XPTY0004)]
#[case("$undefined", ErrorCode::XPST0008)]
#[case("unknown-function()", ErrorCode::XPST0017)]
#[case("count(1, 2)", ErrorCode::XPST0017)]
#[case("xs:unknown('1')", ErrorCode::XPST0017)]
#[case("'1' cast as xs:nope", ErrorCode::XPST0051)]
#[case("zero-or-one((1, 2))", ErrorCode::FORG0003)]
#[case("one-or-more(())", ErrorCode::FORG0004)]
#[case("exactly-one(())", ErrorCode::FORG0005)]
#[case("error()", ErrorCode::FOER0000)]
#[case("(1, 2) treat as xs:integer", ErrorCode::XPDY0050)]
#[case("[1]?3", ErrorCode::FOAY0001)]
#[case("map{'a': 1, 'a': 2}", ErrorCode::XQDY0137)]
#[case("codepoints-to-string(0)", ErrorCode::FOCH0001)]
#[case("normalize-unicode('a', 'XYZ')", ErrorCode::FOCH0003)]
#[case("matches('a', '(')", ErrorCode::FORX0002)]
#[case("doc('urn:missing')", ErrorCode::FODC0002)]
#[case("boolean((1, 2))", ErrorCode::FORG0006)]
fn errors_carry_their_codes(library: Document, #[case] expr: &str, #[case] code: ErrorCode) {
    let err = run(&library, expr).expect_err(expr);
    assert_eq!(err.code_enum(), code, "{expr}: {err}");
}

#[rstest]
#[case("1 + 1", "2")]
#[case("10 div 4", "2.5")]
#[case("1 div 0", "INF")]
#[case("string(1 div 0)", "Infinity")]
#[case("'3' + 1", "4")]
#[case("//book[price > '5']/title", "Alpha|Beta")]
#[case("sum(//price)", "40")]
#[case("round(2.5)", "3")]
#[case("boolean(//book)", "true")]
#[case("string(//book/@id)", "b1")]
fn xpath1_semantics(library: Document, #[case] expr: &str, #[case] expected: &str) {
    assert_eq!(run_version(&library, XPathVersion::V1_0, expr).expect(expr), expected, "{expr}");
}

#[rstest]
fn documents_come_from_the_context(library: Document) {
    let other = etree::parse("<other><x>1</x></other>").expect("other");
    let main = build_node_tree(&library, BuildOptions::new()).expect("main");
    let extra = build_node_tree(&other, BuildOptions::new()).expect("extra");
    let ctx = XPathContext::builder().with_root(main.root()).with_document("urn:other", extra.root()).build();
    let eval = |expr: &str| XPathParser::default().parse(expr).expect(expr).evaluate(&ctx).expect(expr);
    assert_eq!(eval("doc('urn:other')//x").len(), 1);
    assert_eq!(eval("doc-available('urn:other')"), vec![XdmItem::Atomic(XdmAtomicValue::Boolean(true))]);
    assert_eq!(eval("doc-available('urn:nothing')"), vec![XdmItem::Atomic(XdmAtomicValue::Boolean(false))]);
}

#[rstest]
fn serialize_writes_markup(library: Document) {
    let out = run(&library, "serialize(//book[1]/title)").expect("serialize");
    assert_eq!(out, "<title>Alpha</title>");
    let text = run(&library, "serialize(//book[1]/title, map{'method': 'text'})").expect("text");
    assert_eq!(text, "Alpha");
}
