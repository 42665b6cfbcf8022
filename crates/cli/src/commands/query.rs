use crate::util::{CliResult, parse_bindings, read_source};
use crate::{OutputFormat, VersionArg};
use anyhow::Context;
use clap::Args;
use serde::Serialize;
use std::fmt::Write;
use std::path::PathBuf;
use std::sync::Arc;
use thicket_xpath::serialize::{SerializationParams, Serializer, XmlSerializer};
use thicket_xpath::{
    BuildOptions, ExpandedName, NodeKind, Schema, XPathContext, XPathParser, XdmAtomicValue, XdmItem, build_node_tree,
    etree,
};

#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
    #[arg(value_name = "XPATH")]
    pub expression: String,
    /// XML document to query, `-` for standard input. Without one the expression has no context item.
    #[arg(value_name = "FILE")]
    pub file: Option<PathBuf>,
    #[arg(long = "xpath-version", value_enum, default_value_t = VersionArg::V31)]
    pub version: VersionArg,
    /// Namespace binding for the expression, as PREFIX=URI.
    #[arg(long = "namespace", value_name = "PREFIX=URI")]
    pub namespaces: Vec<String>,
    /// External variable, bound as xs:untypedAtomic.
    #[arg(long = "var", value_name = "NAME=VALUE")]
    pub variables: Vec<String>,
    /// Use the root element as the context item instead of a document node.
    #[arg(long)]
    pub fragment: bool,
    /// Type-check the expression against an XSD before evaluating it.
    #[arg(long, value_name = "XSD")]
    pub schema: Option<PathBuf>,
    /// Expose the process environment to fn:environment-variable.
    #[arg(long)]
    pub inherit_env: bool,
    #[arg(long = "format", value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum QueryItemSummary {
    Node {
        kind: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        value: String,
    },
    Atomic {
        xsd_type: String,
        value: String,
    },
    Map {
        entries: usize,
    },
    Array {
        members: usize,
    },
}

pub fn run(args: &QueryArgs) -> CliResult<String> {
    let namespaces = parse_bindings(&args.namespaces, "namespace")?;
    let variables = parse_bindings(&args.variables, "variable")?;

    let mut parser = XPathParser::new(args.version.into()).with_namespaces(namespaces.iter().cloned());
    if let Some(path) = &args.schema {
        let schema = Schema::parse(&read_source(path)?)
            .with_context(|| format!("{} is not a usable schema", path.display()))?;
        parser = parser.with_schema(Arc::new(schema));
    }
    let token = parser.parse(&args.expression).context("invalid expression")?;

    let document = match &args.file {
        Some(path) => {
            let text = read_source(path)?;
            let document =
                etree::parse(&text).with_context(|| format!("{} is not well-formed XML", path.display()))?;
            Some((document, path.display().to_string()))
        }
        None => None,
    };
    let tree = match &document {
        Some((document, uri)) => {
            let options = BuildOptions::new().with_uri(uri.clone()).with_fragment(args.fragment);
            Some(build_node_tree(document, options).context("cannot build the document tree")?)
        }
        None => None,
    };

    let mut builder = XPathContext::builder();
    if let (Some(tree), Some((_, uri))) = (&tree, &document) {
        builder = builder.with_root(tree.root()).with_document(uri.clone(), tree.root()).with_base_uri(uri.clone());
    }
    for (prefix, uri) in namespaces {
        builder = builder.with_namespace(prefix, uri);
    }
    for (name, value) in variables {
        let value = vec![XdmItem::Atomic(XdmAtomicValue::UntypedAtomic(value))];
        builder = builder.with_variable(ExpandedName::local(name), value);
    }
    if args.inherit_env {
        builder = builder.with_env_vars(std::env::vars());
    }
    let ctx = builder.build();

    let items = token.evaluate(&ctx).context("evaluation failed")?;
    tracing::info!(items = items.len(), expression = %args.expression, "query evaluated");

    match args.format {
        OutputFormat::Text => render_query_text(&items),
        OutputFormat::Json => render_query_json(&summarize_query_results(&items)),
    }
}

pub(crate) fn summarize_query_results(items: &[XdmItem<'_>]) -> Vec<QueryItemSummary> {
    items
        .iter()
        .map(|item| match item {
            XdmItem::Node(node) => QueryItemSummary::Node {
                kind: node.kind().as_str(),
                name: node.name().map(|_| qualified_name(node.namespace_uri(), node.local_name())),
                value: node.string_value(),
            },
            XdmItem::Atomic(value) => QueryItemSummary::Atomic {
                xsd_type: format!("xs:{}", value.atomic_type().local_name()),
                value: value.to_string(),
            },
            XdmItem::Map(map) => QueryItemSummary::Map { entries: map.len() },
            XdmItem::Array(array) => QueryItemSummary::Array { members: array.len() },
        })
        .collect()
}

fn qualified_name(namespace: Option<&str>, local: &str) -> String {
    match namespace {
        Some(ns) if !ns.is_empty() => format!("Q{{{ns}}}{local}"),
        _ => local.to_string(),
    }
}

pub(crate) fn render_query_text(items: &[XdmItem<'_>]) -> CliResult<String> {
    let mut output = String::new();
    for item in items {
        let line = match item {
            XdmItem::Node(node) if matches!(node.kind(), NodeKind::Element | NodeKind::Document) => {
                XmlSerializer.serialize(std::slice::from_ref(item), &SerializationParams::default())?
            }
            other => other.to_string(),
        };
        let _ = writeln!(&mut output, "{line}");
    }
    Ok(output.trim_end().to_owned())
}

pub(crate) fn render_query_json(items: &[QueryItemSummary]) -> CliResult<String> {
    Ok(serde_json::to_string_pretty(items)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    #[fixture]
    fn catalog() -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"<catalog><item id="1">one</item><item id="2">two</item><c:note xmlns:c="urn:c">n</c:note></catalog>"#
        )
        .expect("write");
        file
    }

    fn args(expression: &str, file: Option<PathBuf>) -> QueryArgs {
        QueryArgs {
            expression: expression.into(),
            file,
            version: VersionArg::V31,
            namespaces: vec![],
            variables: vec![],
            fragment: false,
            schema: None,
            inherit_env: false,
            format: OutputFormat::Text,
        }
    }

    #[rstest]
    fn query_text_serializes_elements(catalog: NamedTempFile) {
        let output = run(&args("//item[2]", Some(catalog.path().into()))).expect("query");
        assert_eq!(output, r#"<item id="2">two</item>"#);
    }

    #[rstest]
    fn query_text_prints_attributes_and_atomics(catalog: NamedTempFile) {
        let output = run(&args("//item/@id, count(//item)", Some(catalog.path().into()))).expect("query");
        assert_eq!(output, "id=\"1\"\nid=\"2\"\n2");
    }

    #[rstest]
    fn query_uses_namespace_bindings(catalog: NamedTempFile) {
        let mut query = args("string(//c:note)", Some(catalog.path().into()));
        query.namespaces = vec!["c=urn:c".into()];
        assert_eq!(run(&query).expect("query"), "n");
    }

    #[rstest]
    fn query_fragment_makes_the_root_element_the_context(catalog: NamedTempFile) {
        let mut query = args("name(.)", Some(catalog.path().into()));
        query.fragment = true;
        assert_eq!(run(&query).expect("query"), "catalog");
    }

    #[rstest]
    fn query_json_produces_valid_payload(catalog: NamedTempFile) {
        let mut query = args("(//item)[1], 'x', map { 'a': 1 }", Some(catalog.path().into()));
        query.format = OutputFormat::Json;
        let output = run(&query).expect("query");
        let json: serde_json::Value = serde_json::from_str(&output).expect("json");
        assert_eq!(json[0]["type"], "node");
        assert_eq!(json[0]["kind"], "element");
        assert_eq!(json[0]["value"], "one");
        assert_eq!(json[1]["type"], "atomic");
        assert_eq!(json[1]["xsd_type"], "xs:string");
        assert_eq!(json[2]["entries"], 1);
    }

    #[test]
    fn query_without_input_has_no_context_item() {
        let mut query = args("$a || '-' || 1 + 2", None);
        query.variables = vec!["a=x".into()];
        assert_eq!(run(&query).expect("query"), "x-3");
        let err = run(&args("/catalog", None)).expect_err("no context");
        assert!(format!("{err:#}").contains("XPDY0002"), "{err:#}");
    }

    #[test]
    fn query_reports_syntax_errors() {
        let err = run(&args("1 +", None)).expect_err("syntax error");
        assert!(format!("{err:#}").contains("XPST0003"), "{err:#}");
    }

    #[rstest]
    fn query_rejects_malformed_documents() {
        let mut file = NamedTempFile::new().expect("temp file");
        write!(file, "<open>").expect("write");
        let err = run(&args("1", Some(file.path().into()))).expect_err("malformed");
        assert!(err.to_string().contains("not well-formed"), "{err}");
    }

    #[rstest]
    fn query_schema_check_rejects_type_errors() {
        let mut xsd = NamedTempFile::new().expect("temp file");
        write!(
            xsd,
            "{}{}{}",
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">"#,
            r#"<xs:element name="n" type="xs:integer"/>"#,
            "</xs:schema>"
        )
        .expect("write");
        let mut query = args("n + 'x'", None);
        query.schema = Some(xsd.path().into());
        let err = run(&query).expect_err("type error");
        assert!(format!("{err:#}").contains("XPTY0004"), "{err:#}");
    }
}
