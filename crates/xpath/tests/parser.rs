use rstest::rstest;
use thicket_xpath::{ErrorCode, XPathParser, XPathVersion};

#[rstest]
#[case("1", XPathVersion::V1_0)]
#[case("2.0", XPathVersion::V2_0)]
#[case("3", XPathVersion::V3_0)]
#[case(" 3.1 ", XPathVersion::V3_1)]
fn versions_parse_from_strings(#[case] text: &str, #[case] expected: XPathVersion) {
    assert_eq!(text.parse::<XPathVersion>().expect("known version"), expected);
}

#[test]
fn unknown_versions_are_rejected() {
    assert!("4.0".parse::<XPathVersion>().is_err());
    assert_eq!(XPathVersion::default(), XPathVersion::V3_1);
    assert!(XPathVersion::V1_0 < XPathVersion::V3_0);
}

#[rstest]
#[case("let $x := 1 return $x", XPathVersion::V3_0)]
#[case("'a' || 'b'", XPathVersion::V3_0)]
#[case("(1, 2) ! (. * 2)", XPathVersion::V3_0)]
#[case("map { 'a': 1 }", XPathVersion::V3_1)]
#[case("[1, 2]?1", XPathVersion::V3_1)]
#[case("'abc' => upper-case()", XPathVersion::V3_1)]
#[case("for $i in 1 to 3 return $i", XPathVersion::V2_0)]
#[case("1 instance of xs:integer", XPathVersion::V2_0)]
fn syntax_appears_with_its_version(#[case] source: &str, #[case] introduced: XPathVersion) {
    for version in [XPathVersion::V1_0, XPathVersion::V2_0, XPathVersion::V3_0, XPathVersion::V3_1] {
        let parsed = XPathParser::new(version).parse(source);
        assert_eq!(parsed.is_ok(), version >= introduced, "{source} with {version}");
    }
}

#[test]
fn syntax_errors_point_at_the_offending_token() {
    let err = XPathParser::default().parse("1 +\n  ]").expect_err("stray bracket");
    assert_eq!(err.code_enum(), ErrorCode::XPST0003);
    let location = err.location.as_ref().expect("located");
    assert_eq!((location.span.line, location.span.column), (2, 3));
    assert!(err.to_string().ends_with("at line 2, column 3"), "{err}");
}

#[rstest]
#[case("1 + ")]
#[case("(1, 2")]
#[case("//")]
#[case("a[")]
fn incomplete_expressions_fail(#[case] source: &str) {
    let err = XPathParser::default().parse(source).expect_err(source);
    assert_eq!(err.code_enum(), ErrorCode::XPST0003, "{source}");
}

#[test]
fn unknown_functions_fail_at_parse_time() {
    let err = XPathParser::default().parse("no-such-function(1)").expect_err("unknown function");
    assert_eq!(err.code_enum(), ErrorCode::XPST0017);
    let err = XPathParser::default().parse("count(1, 2)").expect_err("wrong arity");
    assert_eq!(err.code_enum(), ErrorCode::XPST0017);
}

#[test]
fn token_trees_print_as_s_expressions() {
    let token = XPathParser::default().parse("1 + 2 * 3").expect("parses");
    assert_eq!(token.to_string(), "(+ 1 (* 2 3))");
    assert_eq!(token.iter().count(), 5);
}
