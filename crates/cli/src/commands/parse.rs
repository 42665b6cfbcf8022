use crate::util::{CliResult, parse_bindings, read_source};
use crate::{OutputFormat, VersionArg};
use anyhow::Context;
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use thicket_xpath::{Schema, Token, XPathParser, XPathVersion};

#[derive(Args, Debug, Clone)]
pub struct ParseArgs {
    #[arg(value_name = "XPATH")]
    pub expression: String,
    #[arg(long = "xpath-version", value_enum, default_value_t = VersionArg::V31)]
    pub version: VersionArg,
    #[arg(long = "namespace", value_name = "PREFIX=URI")]
    pub namespaces: Vec<String>,
    /// Type-check the expression against an XSD and report the schema types it touches.
    #[arg(long, value_name = "XSD")]
    pub schema: Option<PathBuf>,
    #[arg(long = "format", value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Serialize, Debug)]
struct ParseSummary<'t> {
    version: &'static str,
    tree: String,
    tokens: Vec<TokenSummary<'t>>,
}

#[derive(Serialize, Debug)]
struct TokenSummary<'t> {
    symbol: &'t str,
    line: usize,
    column: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    xsd_type: Option<String>,
}

pub fn run(args: &ParseArgs) -> CliResult<String> {
    let version = XPathVersion::from(args.version);
    let mut parser = XPathParser::new(version).with_namespaces(parse_bindings(&args.namespaces, "namespace")?);
    if let Some(path) = &args.schema {
        let schema = Schema::parse(&read_source(path)?)
            .with_context(|| format!("{} is not a usable schema", path.display()))?;
        parser = parser.with_schema(Arc::new(schema));
    }
    let token = parser.parse(&args.expression).context("invalid expression")?;
    match args.format {
        OutputFormat::Text => Ok(token.to_string()),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&summarize(&token, version))?),
    }
}

fn summarize(token: &Token, version: XPathVersion) -> ParseSummary<'_> {
    let tokens = token
        .iter()
        .map(|t| TokenSummary {
            symbol: t.symbol.as_str(),
            line: t.span.line,
            column: t.span.column,
            xsd_type: t.xsd_type().map(ToString::to_string),
        })
        .collect();
    ParseSummary { version: version.as_str(), tree: token.to_string(), tokens }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn args(expression: &str) -> ParseArgs {
        ParseArgs {
            expression: expression.into(),
            version: VersionArg::V31,
            namespaces: vec![],
            schema: None,
            format: OutputFormat::Text,
        }
    }

    #[rstest]
    #[case("1 + 2 * 3", "(+ 1 (* 2 3))")]
    #[case("a/b", "(/ a b)")]
    fn parse_prints_the_token_tree(#[case] expression: &str, #[case] expected: &str) {
        assert_eq!(run(&args(expression)).expect("parse"), expected);
    }

    #[test]
    fn parse_json_lists_tokens_in_preorder() {
        let mut parse = args("1 +\n2");
        parse.format = OutputFormat::Json;
        let output = run(&parse).expect("parse");
        let json: serde_json::Value = serde_json::from_str(&output).expect("json");
        assert_eq!(json["version"], "3.1");
        assert_eq!(json["tokens"][0]["symbol"], "+");
        assert_eq!(json["tokens"][2]["line"], 2);
    }

    #[test]
    fn parse_respects_the_requested_version() {
        let mut parse = args("let $x := 1 return $x");
        parse.version = VersionArg::V2;
        let err = run(&parse).expect_err("no let in 2.0");
        assert!(format!("{err:#}").contains("XPST0003"), "{err:#}");
    }
}
