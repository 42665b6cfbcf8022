//! Parsed expressions. A [`Token`] is both a syntax tree node and the unit of
//! evaluation (see `eval`).

use crate::functions::Function;
use crate::parser::XPathVersion;
use crate::parser::symbols::Label;
use crate::tree::Axis;
use crate::xdm::{AtomicType, ExpandedName, XdmAtomicValue};
use compact_str::CompactString;
use core::fmt;
use std::sync::OnceLock;

/// Source location of a token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Span {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameTest {
    /// `*`
    Wildcard,
    Name(ExpandedName),
    /// `prefix:*` or `Q{uri}*`
    AnyLocal(Option<String>),
    /// `*:local`
    AnyNamespace(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KindTest {
    AnyKind,
    Text,
    Comment,
    NamespaceNode,
    ProcessingInstruction(Option<String>),
    Document(Option<Box<KindTest>>),
    Element { name: Option<ExpandedName>, type_name: Option<ExpandedName> },
    Attribute { name: Option<ExpandedName>, type_name: Option<ExpandedName> },
    SchemaElement(ExpandedName),
    SchemaAttribute(ExpandedName),
}

impl fmt::Display for KindTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn named(
            f: &mut fmt::Formatter<'_>,
            kw: &str,
            name: Option<&ExpandedName>,
            ty: Option<&ExpandedName>,
        ) -> fmt::Result {
            match (name, ty) {
                (None, None) => write!(f, "{kw}()"),
                (Some(n), None) => write!(f, "{kw}({n})"),
                (n, Some(t)) => write!(f, "{kw}({}, {t})", n.map_or("*".to_string(), ToString::to_string)),
            }
        }
        match self {
            KindTest::AnyKind => f.write_str("node()"),
            KindTest::Text => f.write_str("text()"),
            KindTest::Comment => f.write_str("comment()"),
            KindTest::NamespaceNode => f.write_str("namespace-node()"),
            KindTest::ProcessingInstruction(None) => f.write_str("processing-instruction()"),
            KindTest::ProcessingInstruction(Some(t)) => write!(f, "processing-instruction({t})"),
            KindTest::Document(None) => f.write_str("document-node()"),
            KindTest::Document(Some(inner)) => write!(f, "document-node({inner})"),
            KindTest::Element { name, type_name } => named(f, "element", name.as_ref(), type_name.as_ref()),
            KindTest::Attribute { name, type_name } => named(f, "attribute", name.as_ref(), type_name.as_ref()),
            KindTest::SchemaElement(n) => write!(f, "schema-element({n})"),
            KindTest::SchemaAttribute(n) => write!(f, "schema-attribute({n})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemType {
    AnyItem,
    Atomic(AtomicType),
    Kind(KindTest),
    AnyMap,
    AnyArray,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occurrence {
    One,
    Optional,
    ZeroOrMore,
    OneOrMore,
}

impl Occurrence {
    pub fn allows(self, count: usize) -> bool {
        match self {
            Occurrence::One => count == 1,
            Occurrence::Optional => count <= 1,
            Occurrence::ZeroOrMore => true,
            Occurrence::OneOrMore => count >= 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceType {
    Empty,
    Items(ItemType, Occurrence),
}

impl fmt::Display for SequenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (item, occ) = match self {
            SequenceType::Empty => return f.write_str("empty-sequence()"),
            SequenceType::Items(item, occ) => (item, occ),
        };
        match item {
            ItemType::AnyItem => f.write_str("item()")?,
            ItemType::Atomic(t) => write!(f, "{t}")?,
            ItemType::Kind(k) => write!(f, "{k}")?,
            ItemType::AnyMap => f.write_str("map(*)")?,
            ItemType::AnyArray => f.write_str("array(*)")?,
        }
        match occ {
            Occurrence::One => Ok(()),
            Occurrence::Optional => f.write_str("?"),
            Occurrence::ZeroOrMore => f.write_str("*"),
            Occurrence::OneOrMore => f.write_str("+"),
        }
    }
}

/// Target of `cast as` / `castable as`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SingleType {
    pub atomic: AtomicType,
    pub optional: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    IDiv,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompOp {
    pub fn holds(self, ord: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::{Equal, Greater, Less};
        match self {
            CompOp::Eq => ord == Equal,
            CompOp::Ne => ord != Equal,
            CompOp::Lt => ord == Less,
            CompOp::Le => ord != Greater,
            CompOp::Gt => ord == Greater,
            CompOp::Ge => ord != Less,
        }
    }

    /// Operand order swapped: `a op b` iff `b op.swapped() a`.
    pub fn swapped(self) -> Self {
        match self {
            CompOp::Lt => CompOp::Gt,
            CompOp::Le => CompOp::Ge,
            CompOp::Gt => CompOp::Lt,
            CompOp::Ge => CompOp::Le,
            other => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeCompOp {
    Is,
    Precedes,
    Follows,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupKey {
    Name(String),
    Integer(i64),
    Wildcard,
    /// `?(expr)`: the key expression is the last child.
    Expr,
}

/// The closed set of token variants. Child slots are documented per variant.
#[derive(Debug, Clone)]
pub enum TokenKind {
    /// Value in [`Token::value`].
    Literal,
    VarRef(ExpandedName),
    ContextItem,
    /// `/`, optionally followed by a step: `[step?]`.
    Root,
    /// `//step`: `[step]`.
    DescendantRoot,
    /// `left/right`
    Path,
    /// `left//right`
    DescendantPath,
    /// `axis::test`: `[test]`
    Axis(Axis),
    NameTest(NameTest),
    KindTest(KindTest),
    /// Arguments are the children.
    FunctionCall(Function),
    Arithmetic(ArithOp),
    /// `-x` / `+x`: `[operand]`
    Unary { negate: bool },
    GeneralComparison(CompOp),
    ValueComparison(CompOp),
    NodeComparison(NodeCompOp),
    And,
    Or,
    Union,
    Intersect,
    Except,
    /// `base[predicate]`
    Predicate,
    Sequence,
    EmptySequence,
    /// `(expr)`
    Parenthesized,
    /// `[condition, then, else]`
    If,
    /// Binding sequences in order, then the return expression.
    For(Vec<ExpandedName>),
    Let(Vec<ExpandedName>),
    Quantified { every: bool, vars: Vec<ExpandedName> },
    Range,
    Concat,
    SimpleMap,
    InstanceOf(SequenceType),
    Treat(SequenceType),
    Castable(SingleType),
    Cast(SingleType),
    /// Alternating keys and values.
    MapConstructor,
    ArrayConstructor { curly: bool },
    /// `base?key` (`unary` is false) or `?key` on the context item.
    Lookup { key: LookupKey, unary: bool },
}

/// A parsed expression node.
#[derive(Debug, Clone)]
pub struct Token {
    pub symbol: CompactString,
    pub label: Label,
    pub kind: TokenKind,
    pub children: Vec<Token>,
    pub lbp: u32,
    pub rbp: u32,
    pub span: Span,
    pub version: XPathVersion,
    pub value: Option<XdmAtomicValue>,
    /// Schema type learned for a name test while evaluating against a schema.
    pub(crate) xsd_type: OnceLock<ExpandedName>,
}

impl Token {
    pub(crate) fn new(symbol: &str, label: Label, kind: TokenKind, span: Span, version: XPathVersion) -> Self {
        Self {
            symbol: CompactString::from(symbol),
            label,
            kind,
            children: Vec::new(),
            lbp: 0,
            rbp: 0,
            span,
            version,
            value: None,
            xsd_type: OnceLock::new(),
        }
    }

    #[must_use]
    pub(crate) fn with_children(mut self, children: Vec<Token>) -> Self {
        self.children = children;
        self
    }

    #[must_use]
    pub(crate) fn with_value(mut self, value: XdmAtomicValue) -> Self {
        self.value = Some(value);
        self
    }

    #[must_use]
    pub(crate) fn with_binding_power(mut self, lbp: u32, rbp: u32) -> Self {
        self.lbp = lbp;
        self.rbp = rbp;
        self
    }

    pub fn child(&self, index: usize) -> Option<&Token> {
        self.children.get(index)
    }

    /// The schema type matched by this token during a schema-context evaluation.
    pub fn xsd_type(&self) -> Option<&ExpandedName> {
        self.xsd_type.get()
    }

    /// Pre-order traversal of the token tree.
    pub fn iter(&self) -> impl Iterator<Item = &Token> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let token = stack.pop()?;
            stack.extend(token.children.iter().rev());
            Some(token)
        })
    }

    /// A step: a node test, an axis step, or either filtered by predicates.
    pub fn is_step(&self) -> bool {
        match &self.kind {
            TokenKind::Axis(_) | TokenKind::NameTest(_) | TokenKind::KindTest(_) => true,
            TokenKind::Predicate => self.children.first().is_some_and(Token::is_step),
            _ => false,
        }
    }

    fn write_tree(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let head = match &self.kind {
            TokenKind::Literal => match &self.value {
                Some(XdmAtomicValue::String(s)) => return write!(f, "'{}'", s.replace('\'', "''")),
                Some(v) => return write!(f, "{v}"),
                None => return f.write_str("()"),
            },
            TokenKind::VarRef(name) => return write!(f, "${name}"),
            TokenKind::NameTest(NameTest::Wildcard) => return f.write_str("*"),
            TokenKind::NameTest(NameTest::Name(n)) => return write!(f, "{n}"),
            TokenKind::NameTest(NameTest::AnyLocal(Some(ns))) => return write!(f, "Q{{{ns}}}*"),
            TokenKind::NameTest(NameTest::AnyLocal(None)) => return f.write_str("Q{}*"),
            TokenKind::NameTest(NameTest::AnyNamespace(l)) => return write!(f, "*:{l}"),
            TokenKind::KindTest(k) => return write!(f, "{k}"),
            TokenKind::ContextItem if self.children.is_empty() => return f.write_str("."),
            TokenKind::FunctionCall(func) => func.name.to_string(),
            TokenKind::InstanceOf(t) => format!("instance-of {t}"),
            TokenKind::Treat(t) => format!("treat-as {t}"),
            TokenKind::Castable(t) => format!("castable-as {}{}", t.atomic, if t.optional { "?" } else { "" }),
            TokenKind::Cast(t) => format!("cast-as {}{}", t.atomic, if t.optional { "?" } else { "" }),
            TokenKind::For(vars) | TokenKind::Let(vars) | TokenKind::Quantified { vars, .. } => {
                let names: Vec<String> = vars.iter().map(|v| format!("${v}")).collect();
                format!("{} {}", self.symbol, names.join(" "))
            }
            TokenKind::Lookup { key: LookupKey::Name(n), .. } => format!("?{n}"),
            TokenKind::Lookup { key: LookupKey::Integer(i), .. } => format!("?{i}"),
            TokenKind::Lookup { key: LookupKey::Wildcard, .. } => "?*".to_string(),
            _ => self.symbol.to_string(),
        };
        if self.children.is_empty() {
            return f.write_str(&head);
        }
        write!(f, "({head}")?;
        for child in &self.children {
            f.write_str(" ")?;
            child.write_tree(f)?;
        }
        f.write_str(")")
    }
}

/// S-expression form of the token tree, e.g. `(/ (child a) (child b))`.
impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_tree(f)
    }
}
