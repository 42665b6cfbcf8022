//! Grammar versions. Each version starts from a copy of the previous
//! version's symbol table and registers, replaces or removes symbols.

mod xpath1;
mod xpath2;
mod xpath30;
mod xpath31;

use super::lexer::Lexeme;
use super::symbols::{Label, SymbolTable};
use super::{Parser, XPathVersion};
use crate::error::{Error, GrammarError};
use crate::token::{ArithOp, CompOp, NodeCompOp, Token, TokenKind};
use std::sync::{Arc, LazyLock};

type Built = Result<SymbolTable, GrammarError>;

static XPATH1: LazyLock<Built> = LazyLock::new(|| traced(xpath1::build()));
static XPATH2: LazyLock<Built> = LazyLock::new(|| traced(derived(&XPATH1, xpath2::build)));
static XPATH30: LazyLock<Built> = LazyLock::new(|| traced(derived(&XPATH2, xpath30::build)));
static XPATH31: LazyLock<Built> = LazyLock::new(|| traced(derived(&XPATH30, xpath31::build)));

fn derived(base: &Built, build: fn(&SymbolTable) -> Built) -> Built {
    build(base.as_ref().map_err(Clone::clone)?)
}

fn traced(table: Built) -> Built {
    match &table {
        Ok(t) => tracing::debug!(version = %t.version(), symbols = t.symbols().count(), "grammar initialized"),
        Err(e) => tracing::error!(error = %e, "grammar definition failed"),
    }
    table
}

/// The symbol table of `version`.
pub fn table(version: XPathVersion) -> Result<&'static SymbolTable, Error> {
    let built = match version {
        XPathVersion::V1_0 => &*XPATH1,
        XPathVersion::V2_0 => &*XPATH2,
        XPathVersion::V3_0 => &*XPATH30,
        XPathVersion::V3_1 => &*XPATH31,
    };
    built.as_ref().map_err(|e| {
        Error::syntax(format!("grammar {version} is not available: {e}"))
            .with_source(Some(Arc::new(e.clone()) as Arc<dyn std::error::Error + Send + Sync>))
    })
}

/// Unregistered names and function names: a call when followed by `(`,
/// otherwise a name test.
pub fn nud_name<'s>(p: &mut Parser<'_, 's>, lex: Lexeme<'s>) -> Result<Token, Error> {
    if p.at("(") {
        let args = p.arguments()?;
        return p.function_call(lex, args);
    }
    p.name_test(lex)
}

/// Shared led of the binary operators.
pub fn led_binary<'s>(p: &mut Parser<'_, 's>, left: Token, lex: Lexeme<'s>) -> Result<Token, Error> {
    if let Some(err) = p.missing_operand(lex) {
        return Err(err);
    }
    let Some(kind) = binary_kind(lex.text) else {
        return Err(p.error_at(lex, format!("{} is not a binary operator", lex.describe())));
    };
    let rbp = p.def(lex).map_or(0, |d| d.rbp);
    let right = p.expression(rbp)?;
    Ok(p.token(lex, kind).with_children(vec![left, right]))
}

fn binary_kind(symbol: &str) -> Option<TokenKind> {
    let kind = match symbol {
        "or" => TokenKind::Or,
        "and" => TokenKind::And,
        "=" => TokenKind::GeneralComparison(CompOp::Eq),
        "!=" => TokenKind::GeneralComparison(CompOp::Ne),
        "<" => TokenKind::GeneralComparison(CompOp::Lt),
        "<=" => TokenKind::GeneralComparison(CompOp::Le),
        ">" => TokenKind::GeneralComparison(CompOp::Gt),
        ">=" => TokenKind::GeneralComparison(CompOp::Ge),
        "eq" => TokenKind::ValueComparison(CompOp::Eq),
        "ne" => TokenKind::ValueComparison(CompOp::Ne),
        "lt" => TokenKind::ValueComparison(CompOp::Lt),
        "le" => TokenKind::ValueComparison(CompOp::Le),
        "gt" => TokenKind::ValueComparison(CompOp::Gt),
        "ge" => TokenKind::ValueComparison(CompOp::Ge),
        "is" => TokenKind::NodeComparison(NodeCompOp::Is),
        "<<" => TokenKind::NodeComparison(NodeCompOp::Precedes),
        ">>" => TokenKind::NodeComparison(NodeCompOp::Follows),
        "+" => TokenKind::Arithmetic(ArithOp::Add),
        "-" => TokenKind::Arithmetic(ArithOp::Sub),
        "*" => TokenKind::Arithmetic(ArithOp::Mul),
        "div" => TokenKind::Arithmetic(ArithOp::Div),
        "idiv" => TokenKind::Arithmetic(ArithOp::IDiv),
        "mod" => TokenKind::Arithmetic(ArithOp::Mod),
        "|" | "union" => TokenKind::Union,
        "intersect" => TokenKind::Intersect,
        "except" => TokenKind::Except,
        "to" => TokenKind::Range,
        "||" => TokenKind::Concat,
        "!" => TokenKind::SimpleMap,
        _ => return None,
    };
    Some(kind)
}

/// Re-reads a keyword as a name test when its follow-up token is missing.
pub(crate) fn keyword_or_name<'s>(
    p: &mut Parser<'_, 's>,
    lex: Lexeme<'s>,
    follow: &str,
) -> Option<Result<Token, Error>> {
    (!p.at(follow)).then(|| nud_name(p, lex))
}

/// `$name`
pub(crate) fn variable_name<'s>(p: &mut Parser<'_, 's>) -> Result<crate::xdm::ExpandedName, Error> {
    p.expect("$")?;
    let name = p.advance();
    if !name.is_name() {
        return Err(p.error_at(name, format!("expected a variable name but found {}", name.describe())));
    }
    p.plain_name(name)
}

pub(crate) fn literal_token<'s>(p: &Parser<'_, 's>, lex: Lexeme<'s>, value: crate::xdm::XdmAtomicValue) -> Token {
    p.token_with(lex, Label::Literal, TokenKind::Literal).with_value(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::XPathParser;
    use rstest::rstest;

    fn tree(version: XPathVersion, source: &str) -> String {
        XPathParser::new(version).parse(source).expect("parses").to_string()
    }

    #[rstest]
    #[case("1 + 2 * 3", "(+ 1 (* 2 3))")]
    #[case("a/b//c", "(// (/ a b) c)")]
    #[case("/a[1]", "(/ ([ a 1))")]
    #[case("a or b and c", "(or a (and b c))")]
    #[case("-1 - -2", "(- (- 1) (- 2))")]
    #[case("child::a/@b", "(/ (child a) (@ b))")]
    #[case("div div div", "(div div div)")]
    fn precedence_follows_binding_powers(#[case] source: &str, #[case] expected: &str) {
        assert_eq!(tree(XPathVersion::V3_1, source), expected);
    }

    #[test]
    fn keywords_without_follow_up_are_names() {
        assert_eq!(tree(XPathVersion::V3_1, "if/for/child"), "(/ (/ if for) child)");
        assert_eq!(tree(XPathVersion::V3_1, "text"), "text");
    }

    #[test]
    fn xpath1_has_no_sequences() {
        assert!(XPathParser::new(XPathVersion::V1_0).parse("(1, 2)").is_err());
        assert!(XPathParser::new(XPathVersion::V2_0).parse("(1, 2)").is_ok());
    }

    #[test]
    fn missing_operand_is_reported() {
        let err = XPathParser::new(XPathVersion::V1_0).parse("1 + ").expect_err("syntax error");
        assert!(err.message.contains("missing right operand"), "{err}");
    }
}
