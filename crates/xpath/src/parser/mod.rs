//! Expression parsing: a pest lexer feeding a Pratt parser driven by the
//! per-version symbol tables of [`grammar`].

pub mod grammar;
pub mod lexer;
pub mod symbols;

use crate::consts::{ARRAY_NS, ERR_NS, FNS, MAP_NS, MATH_NS, XML_URI, XS};
use crate::context::XPathContext;
use crate::error::{Error, ErrorCode};
use crate::schema::{self, ResolvedType, Schema};
use crate::token::{ItemType, KindTest, NameTest, Occurrence, SequenceType, SingleType, Token, TokenKind};
use crate::tree::{BuildOptions, build_node_tree};
use crate::xdm::{AtomicType, ExpandedName};
use core::fmt;
use lexer::{Lexeme, LexemeKind};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use symbols::{Label, SymbolDef, SymbolTable};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum XPathVersion {
    V1_0,
    V2_0,
    V3_0,
    #[default]
    V3_1,
}

impl XPathVersion {
    pub fn as_str(self) -> &'static str {
        match self {
            XPathVersion::V1_0 => "1.0",
            XPathVersion::V2_0 => "2.0",
            XPathVersion::V3_0 => "3.0",
            XPathVersion::V3_1 => "3.1",
        }
    }
}

impl fmt::Display for XPathVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for XPathVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1" | "1.0" => Ok(XPathVersion::V1_0),
            "2" | "2.0" => Ok(XPathVersion::V2_0),
            "3" | "3.0" => Ok(XPathVersion::V3_0),
            "3.1" => Ok(XPathVersion::V3_1),
            other => Err(Error::from_code(ErrorCode::XPST0003, format!("unsupported XPath version {other:?}"))),
        }
    }
}

/// Static configuration of a parse.
#[derive(Debug, Clone)]
pub struct XPathParser {
    version: XPathVersion,
    namespaces: HashMap<String, String>,
    default_element_namespace: Option<String>,
    default_function_namespace: String,
    base_uri: Option<String>,
    schema: Option<Arc<Schema>>,
}

impl Default for XPathParser {
    fn default() -> Self {
        Self::new(XPathVersion::default())
    }
}

impl XPathParser {
    pub fn new(version: XPathVersion) -> Self {
        let namespaces = [
            ("xml", XML_URI),
            ("xs", XS),
            ("fn", FNS),
            ("err", ERR_NS),
            ("map", MAP_NS),
            ("array", ARRAY_NS),
            ("math", MATH_NS),
        ]
        .into_iter()
        .map(|(p, u)| (p.to_string(), u.to_string()))
        .collect();
        Self {
            version,
            namespaces,
            default_element_namespace: None,
            default_function_namespace: FNS.to_string(),
            base_uri: None,
            schema: None,
        }
    }

    pub fn with_namespace(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.namespaces.insert(prefix.into(), uri.into());
        self
    }

    pub fn with_namespaces<I, P, U>(mut self, namespaces: I) -> Self
    where
        I: IntoIterator<Item = (P, U)>,
        P: Into<String>,
        U: Into<String>,
    {
        self.namespaces.extend(namespaces.into_iter().map(|(p, u)| (p.into(), u.into())));
        self
    }

    pub fn with_default_element_namespace(mut self, uri: impl Into<String>) -> Self {
        let uri = uri.into();
        self.default_element_namespace = (!uri.is_empty()).then_some(uri);
        self
    }

    pub fn with_default_function_namespace(mut self, uri: impl Into<String>) -> Self {
        self.default_function_namespace = uri.into();
        self
    }

    pub fn with_base_uri(mut self, uri: impl Into<String>) -> Self {
        self.base_uri = Some(uri.into());
        self
    }

    /// Checks parsed expressions against `schema` (see [`XPathParser::parse`]).
    pub fn with_schema(mut self, schema: Arc<Schema>) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn version(&self) -> XPathVersion {
        self.version
    }

    pub fn namespaces(&self) -> &HashMap<String, String> {
        &self.namespaces
    }

    pub fn base_uri(&self) -> Option<&str> {
        self.base_uri.as_deref()
    }

    /// Parses `source` into a token tree.
    ///
    /// With a schema configured, the tree is also evaluated once against the
    /// schema's node tree; type errors found that way are reported here.
    pub fn parse(&self, source: &str) -> Result<Token, Error> {
        let table = grammar::table(self.version)?;
        let lexemes = lexer::tokenize(source)?;
        let mut parser = Parser { table, config: self, lexemes, pos: 0, attribute_axis: false };
        let root = parser.expression(0)?;
        let next = parser.peek();
        if next.kind != LexemeKind::End {
            return Err(parser.error_at(next, format!("unexpected token {}", next.describe())));
        }
        tracing::debug!(version = %self.version, expression = source, "expression parsed");
        if let Some(schema) = &self.schema {
            self.check_schema(&root, schema)?;
        }
        Ok(root)
    }

    fn check_schema(&self, token: &Token, schema: &Schema) -> Result<(), Error> {
        let tree = build_node_tree(schema, BuildOptions::new())?;
        let ctx = XPathContext::schema(tree.root()).with_namespaces(self.namespaces.clone());
        match token.evaluate(&ctx) {
            Ok(_) => Ok(()),
            Err(e) if e.code_enum() == ErrorCode::XPTY0004 || e.code_enum().is_static() => {
                tracing::debug!(error = %e, "expression rejected by schema check");
                Err(e)
            }
            Err(e) => {
                tracing::trace!(error = %e, "dynamic error ignored by schema check");
                Ok(())
            }
        }
    }
}

const END: Lexeme<'static> = Lexeme {
    kind: LexemeKind::End,
    text: "",
    span: crate::token::Span { offset: 0, line: 1, column: 1 },
};

/// Parsing state handed to every nud and led function.
pub struct Parser<'p, 's> {
    table: &'p SymbolTable,
    config: &'p XPathParser,
    lexemes: Vec<Lexeme<'s>>,
    pos: usize,
    /// Set while the operand of an attribute axis is parsed.
    attribute_axis: bool,
}

impl<'p, 's> Parser<'p, 's> {
    pub fn version(&self) -> XPathVersion {
        self.table.version()
    }

    pub fn table(&self) -> &'p SymbolTable {
        self.table
    }

    pub fn peek(&self) -> Lexeme<'s> {
        self.peek_nth(0)
    }

    pub fn peek_nth(&self, n: usize) -> Lexeme<'s> {
        self.lexemes.get(self.pos + n).or_else(|| self.lexemes.last()).copied().unwrap_or(END)
    }

    pub fn advance(&mut self) -> Lexeme<'s> {
        let lex = self.peek();
        if self.pos + 1 < self.lexemes.len() {
            self.pos += 1;
        }
        lex
    }

    /// Whether the next lexeme is the operator or name `text`.
    pub fn at(&self, text: &str) -> bool {
        self.peek().is(text)
    }

    /// Symbol-table key of a lexeme.
    pub fn symbol(&self, lex: Lexeme<'s>) -> &'s str {
        match lex.class_symbol() {
            Some(s) => s,
            None if lex.kind == LexemeKind::Name && !self.table.contains(lex.text) => "(name)",
            None => lex.text,
        }
    }

    pub fn def(&self, lex: Lexeme<'s>) -> Option<&'p SymbolDef> {
        self.table.get(self.symbol(lex))
    }

    /// Parses an expression whose operators bind tighter than `rbp`.
    pub fn expression(&mut self, rbp: u32) -> Result<Token, Error> {
        let lex = self.advance();
        let mut left = self.nud(lex)?;
        loop {
            let next = self.peek();
            let Some(def) = self.def(next) else { break };
            let Some(led) = def.led else { break };
            if rbp >= def.lbp {
                break;
            }
            self.advance();
            left = led(self, left, next)?;
        }
        Ok(left)
    }

    fn nud(&mut self, lex: Lexeme<'s>) -> Result<Token, Error> {
        if let Some(def) = self.def(lex)
            && let Some(nud) = def.nud
        {
            return nud(self, lex);
        }
        match lex.kind {
            LexemeKind::End => Err(self.error_at(lex, "unexpected end of expression")),
            // operator words such as `div` or `and` name elements here
            LexemeKind::Name => self.name_test(lex),
            LexemeKind::Invalid => Err(self.error_at(lex, format!("invalid character {}", lex.describe()))),
            _ => Err(self.error_at(lex, format!("unexpected token {}", lex.describe()))),
        }
    }

    pub fn error_at(&self, lex: Lexeme<'s>, msg: impl Into<String>) -> Error {
        let symbol = if lex.kind == LexemeKind::End { "(end)" } else { lex.text };
        Error::syntax(msg).at_span(symbol, lex.span)
    }

    pub fn expect(&mut self, text: &str) -> Result<Lexeme<'s>, Error> {
        let next = self.peek();
        if next.is(text) {
            Ok(self.advance())
        } else {
            Err(self.error_at(next, format!("expected '{text}' but found {}", next.describe())))
        }
    }

    /// A token for `lex` labelled as its symbol definition says.
    pub fn token(&self, lex: Lexeme<'s>, kind: TokenKind) -> Token {
        let (label, lbp, rbp) = self.def(lex).map_or((Label::Punctuation, 0, 0), |d| (d.label, d.lbp, d.rbp));
        self.token_with(lex, label, kind).with_binding_power(lbp, rbp)
    }

    pub fn token_with(&self, lex: Lexeme<'s>, label: Label, kind: TokenKind) -> Token {
        let symbol = if lex.is_name() { lex.text } else { self.symbol(lex) };
        Token::new(symbol, label, kind, lex.span, self.version())
    }

    pub fn missing_operand(&self, lex: Lexeme<'s>) -> Option<Error> {
        let next = self.peek();
        (next.kind == LexemeKind::End)
            .then(|| self.error_at(next, format!("missing right operand for '{}'", lex.text)))
    }

    // names

    pub fn resolve_prefix(&self, prefix: &str, lex: Lexeme<'s>) -> Result<String, Error> {
        if prefix == "xml" {
            return Ok(XML_URI.to_string());
        }
        self.config.namespaces.get(prefix).cloned().ok_or_else(|| {
            Error::from_code(ErrorCode::XPST0081, format!("unknown namespace prefix '{prefix}'"))
                .at_span(lex.text, lex.span)
        })
    }

    fn qname(&self, lex: Lexeme<'s>, default_ns: Option<&str>) -> Result<ExpandedName, Error> {
        let text = lex.text;
        if let Some(rest) = text.strip_prefix("Q{") {
            let (uri, local) = rest
                .split_once('}')
                .ok_or_else(|| self.error_at(lex, format!("malformed braced name {}", lex.describe())))?;
            let uri = (!uri.trim().is_empty()).then(|| uri.trim().to_string());
            return Ok(ExpandedName::new(uri, local));
        }
        match text.split_once(':') {
            Some((prefix, local)) => Ok(ExpandedName::new(Some(self.resolve_prefix(prefix, lex)?), local)),
            None => Ok(ExpandedName::new(default_ns.map(str::to_string), text)),
        }
    }

    /// Element names take the default element namespace, except as the
    /// operand of the attribute axis.
    pub fn element_name(&self, lex: Lexeme<'s>) -> Result<ExpandedName, Error> {
        let default = if self.attribute_axis { None } else { self.config.default_element_namespace.as_deref() };
        self.qname(lex, default)
    }

    pub fn plain_name(&self, lex: Lexeme<'s>) -> Result<ExpandedName, Error> {
        self.qname(lex, None)
    }

    pub fn function_name(&self, lex: Lexeme<'s>) -> Result<ExpandedName, Error> {
        let default = self.config.default_function_namespace.as_str();
        self.qname(lex, (!default.is_empty()).then_some(default))
    }

    pub fn type_name(&self, lex: Lexeme<'s>) -> Result<ExpandedName, Error> {
        self.qname(lex, Some(XS))
    }

    pub fn set_attribute_axis(&mut self, on: bool) -> bool {
        std::mem::replace(&mut self.attribute_axis, on)
    }

    // node tests

    pub fn name_test(&self, lex: Lexeme<'s>) -> Result<Token, Error> {
        let text = lex.text;
        let test = if text == "*" {
            NameTest::Wildcard
        } else if let Some(local) = text.strip_prefix("*:") {
            NameTest::AnyNamespace(local.to_string())
        } else if lex.kind == LexemeKind::BracedName && text.ends_with("}*") {
            NameTest::AnyLocal(self.plain_name(Lexeme { text: text.trim_end_matches('*'), ..lex })?.ns_uri)
        } else if let Some(prefix) = text.strip_suffix(":*") {
            NameTest::AnyLocal(Some(self.resolve_prefix(prefix, lex)?))
        } else if lex.is_name() {
            NameTest::Name(self.element_name(lex)?)
        } else {
            return Err(self.error_at(lex, format!("invalid node test {}", lex.describe())));
        };
        Ok(self.token_with(lex, Label::NameTest, TokenKind::NameTest(test)))
    }

    /// The operand of an axis: a name test or a kind test.
    pub fn node_test(&mut self) -> Result<Token, Error> {
        let lex = self.advance();
        match lex.kind {
            LexemeKind::Operator if lex.text == "*" => self.name_test(lex),
            LexemeKind::Name | LexemeKind::BracedName => {
                if self.at("(") && self.def(lex).is_some_and(|d| d.label == Label::KindTest) {
                    let test = self.kind_test(lex)?;
                    Ok(self.token(lex, TokenKind::KindTest(test)))
                } else {
                    self.name_test(lex)
                }
            }
            _ => Err(self.error_at(lex, format!("invalid node test {}", lex.describe()))),
        }
    }

    /// Parses the parenthesized part of a kind test named by `lex`.
    pub fn kind_test(&mut self, lex: Lexeme<'s>) -> Result<KindTest, Error> {
        self.expect("(")?;
        let test = match lex.text {
            "node" => KindTest::AnyKind,
            "text" => KindTest::Text,
            "comment" => KindTest::Comment,
            "namespace-node" => KindTest::NamespaceNode,
            "processing-instruction" => {
                let next = self.peek();
                match next.kind {
                    LexemeKind::Name => {
                        self.advance();
                        KindTest::ProcessingInstruction(Some(next.text.to_string()))
                    }
                    LexemeKind::String => {
                        self.advance();
                        KindTest::ProcessingInstruction(Some(lexer::unescape_string(next.text).trim().to_string()))
                    }
                    _ => KindTest::ProcessingInstruction(None),
                }
            }
            "document-node" => {
                if self.at(")") {
                    KindTest::Document(None)
                } else {
                    let inner = self.advance();
                    if !(inner.is("element") || inner.is("schema-element")) {
                        return Err(self.error_at(inner, "document-node() accepts an element test only"));
                    }
                    KindTest::Document(Some(Box::new(self.kind_test(inner)?)))
                }
            }
            "element" | "attribute" => {
                let element = lex.text == "element";
                let name = if self.at(")") {
                    None
                } else {
                    let n = self.advance();
                    if n.is("*") {
                        None
                    } else if n.is_name() {
                        let default = if element { self.config.default_element_namespace.as_deref() } else { None };
                        Some(self.qname(n, default)?)
                    } else {
                        return Err(self.error_at(n, format!("invalid name in {}()", lex.text)));
                    }
                };
                let type_name = if self.at(",") {
                    self.advance();
                    let t = self.advance();
                    if !t.is_name() {
                        return Err(self.error_at(t, "expected a type name"));
                    }
                    let type_name = self.type_name(t)?;
                    if self.at("?") {
                        self.advance();
                    }
                    Some(type_name)
                } else {
                    None
                };
                if element {
                    KindTest::Element { name, type_name }
                } else {
                    KindTest::Attribute { name, type_name }
                }
            }
            "schema-element" | "schema-attribute" => {
                let n = self.advance();
                if !n.is_name() {
                    return Err(self.error_at(n, format!("{}() requires a name", lex.text)));
                }
                let element = lex.text == "schema-element";
                let default = if element { self.config.default_element_namespace.as_deref() } else { None };
                let name = self.qname(n, default)?;
                if let Some(schema) = &self.config.schema {
                    let declared = if element {
                        schema.global_element(&name).is_some()
                    } else {
                        schema.global_attribute(&name).is_some()
                    };
                    if !declared {
                        return Err(Error::from_code(
                            ErrorCode::XPST0008,
                            format!("{name} is not declared in the schema"),
                        )
                        .at_span(n.text, n.span));
                    }
                }
                if element { KindTest::SchemaElement(name) } else { KindTest::SchemaAttribute(name) }
            }
            other => return Err(self.error_at(lex, format!("unknown kind test '{other}'"))),
        };
        self.expect(")")?;
        Ok(test)
    }

    // types

    pub fn atomic_type(&self, lex: Lexeme<'s>) -> Result<AtomicType, Error> {
        let name = self.type_name(lex)?;
        let builtin = AtomicType::from_name(&name).or_else(|| {
            if name.ns_uri.as_deref() != Some(XS) {
                return None;
            }
            match schema::builtin_type(&name.local) {
                Some(ResolvedType::Atomic(t)) => Some(t),
                _ => None,
            }
        });
        builtin.ok_or_else(|| {
            Error::from_code(ErrorCode::XPST0051, format!("unknown atomic type {name}")).at_span(lex.text, lex.span)
        })
    }

    pub fn single_type(&mut self) -> Result<SingleType, Error> {
        let lex = self.advance();
        if !lex.is_name() {
            return Err(self.error_at(lex, format!("expected an atomic type but found {}", lex.describe())));
        }
        let atomic = self.atomic_type(lex)?;
        if atomic.is_abstract() {
            return Err(Error::from_code(ErrorCode::XPST0080, format!("cannot cast to abstract type {atomic}"))
                .at_span(lex.text, lex.span));
        }
        let optional = self.at("?");
        if optional {
            self.advance();
        }
        Ok(SingleType { atomic, optional })
    }

    pub fn sequence_type(&mut self) -> Result<SequenceType, Error> {
        let lex = self.advance();
        if lex.is("empty-sequence") && self.at("(") {
            self.expect("(")?;
            self.expect(")")?;
            return Ok(SequenceType::Empty);
        }
        let item = if lex.is("item") && self.at("(") {
            self.expect("(")?;
            self.expect(")")?;
            ItemType::AnyItem
        } else if (lex.is("map") || lex.is("array")) && self.at("(") && self.version() >= XPathVersion::V3_1 {
            self.expect("(")?;
            self.expect("*")?;
            self.expect(")")?;
            if lex.is("map") { ItemType::AnyMap } else { ItemType::AnyArray }
        } else if lex.kind == LexemeKind::Name
            && self.at("(")
            && self.def(lex).is_some_and(|d| d.label == Label::KindTest)
        {
            ItemType::Kind(self.kind_test(lex)?)
        } else if lex.is_name() {
            ItemType::Atomic(self.atomic_type(lex)?)
        } else {
            return Err(self.error_at(lex, format!("expected a sequence type but found {}", lex.describe())));
        };
        let occurrence = match self.peek().text {
            "?" => Occurrence::Optional,
            "*" => Occurrence::ZeroOrMore,
            "+" => Occurrence::OneOrMore,
            _ => Occurrence::One,
        };
        if occurrence != Occurrence::One {
            self.advance();
        }
        Ok(SequenceType::Items(item, occurrence))
    }

    // calls

    /// `( arg, ... )`
    pub fn arguments(&mut self) -> Result<Vec<Token>, Error> {
        self.expect("(")?;
        let mut args = Vec::new();
        if !self.at(")") {
            loop {
                args.push(self.expression(5)?);
                if self.at(",") {
                    self.advance();
                    continue;
                }
                break;
            }
        }
        self.expect(")")?;
        Ok(args)
    }

    pub fn function_call(&self, lex: Lexeme<'s>, args: Vec<Token>) -> Result<Token, Error> {
        let name = self.function_name(lex)?;
        let function = self
            .table
            .functions()
            .resolve(&name, args.len())
            .map_err(|e| e.at_span(lex.text, lex.span))?
            .clone();
        let label = if name.ns_uri.as_deref() == Some(XS) { Label::ConstructorFunction } else { Label::Function };
        Ok(self.token_with(lex, label, TokenKind::FunctionCall(function)).with_children(args))
    }
}
