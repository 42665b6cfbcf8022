//! XPath 1.0: paths, axes, predicates, the boolean/comparison/arithmetic
//! operators, unions and the core function library.

use super::{led_binary, literal_token, nud_name};
use crate::error::{Error, GrammarError};
use crate::eval::casting::parse_decimal;
use crate::functions::{core, nodes, numeric, sequences, strings};
use crate::parser::lexer::{self, Lexeme, LexemeKind};
use crate::parser::symbols::{Label, SymbolTable};
use crate::parser::{Parser, XPathVersion};
use crate::token::{KindTest, Token, TokenKind};
use crate::tree::Axis;
use crate::xdm::XdmAtomicValue;

pub(super) fn build() -> Result<SymbolTable, GrammarError> {
    let mut t = SymbolTable::new(XPathVersion::V1_0);

    t.register("(end)", Label::Punctuation, 0, 0, None, None);
    t.register("(name)", Label::NameTest, 0, 0, Some(nud_name), None);
    t.literal("(integer)", nud_number);
    t.literal("(decimal)", nud_number);
    t.literal("(string)", nud_string);
    for p in [")", "]", ",", "::"] {
        t.register(p, Label::Punctuation, 0, 0, None, None);
    }

    t.prefix("$", Label::Variable, 0, nud_variable);
    t.prefix(".", Label::Operator, 0, nud_context_item);
    t.prefix("..", Label::Axis, 0, nud_parent);
    t.prefix("@", Label::Axis, 90, nud_attribute);
    t.register("(", Label::Punctuation, 0, 0, Some(nud_parenthesized), None);
    t.register("/", Label::Operator, 75, 75, Some(nud_root), Some(led_path));
    t.register("//", Label::Operator, 75, 75, Some(nud_descendant_root), Some(led_path));
    t.postfix("[", 80, led_predicate);

    t.infix("or", 20, led_binary);
    t.infix("and", 25, led_binary);
    for op in ["=", "!=", "<", "<=", ">", ">="] {
        t.infix(op, 30, led_binary);
    }
    t.infix("+", 40, led_binary);
    t.register("-", Label::Operator, 40, 40, Some(nud_unary), Some(led_binary));
    t.register("*", Label::Operator, 45, 45, Some(nud_wildcard), Some(led_binary));
    t.infix("div", 45, led_binary);
    t.infix("mod", 45, led_binary);
    t.infix("|", 50, led_binary);

    for axis in Axis::ALL {
        t.axis(axis.name(), nud_axis);
    }
    for kind in ["node", "text", "comment", "processing-instruction"] {
        t.kind_test(kind, nud_kind_test);
    }

    // node set functions
    t.function("last", 0, Some(0), nud_name, core::last)?;
    t.function("position", 0, Some(0), nud_name, core::position)?;
    t.function("count", 1, Some(1), nud_name, sequences::count)?;
    t.function("id", 1, Some(1), nud_name, nodes::id)?;
    t.function("local-name", 0, Some(1), nud_name, nodes::local_name)?;
    t.function("namespace-uri", 0, Some(1), nud_name, nodes::namespace_uri)?;
    t.function("name", 0, Some(1), nud_name, nodes::name)?;

    // string functions
    t.function("string", 0, Some(1), nud_name, strings::string)?;
    t.function("concat", 2, None, nud_name, strings::concat)?;
    t.function("starts-with", 2, Some(2), nud_name, strings::starts_with)?;
    t.function("contains", 2, Some(2), nud_name, strings::contains)?;
    t.function("substring-before", 2, Some(2), nud_name, strings::substring_before)?;
    t.function("substring-after", 2, Some(2), nud_name, strings::substring_after)?;
    t.function("substring", 2, Some(3), nud_name, strings::substring)?;
    t.function("string-length", 0, Some(1), nud_name, strings::string_length)?;
    t.function("normalize-space", 0, Some(1), nud_name, strings::normalize_space)?;
    t.function("translate", 3, Some(3), nud_name, strings::translate)?;

    // boolean functions
    t.function("boolean", 1, Some(1), nud_name, core::boolean)?;
    t.function("not", 1, Some(1), nud_name, core::not)?;
    t.function("true", 0, Some(0), nud_name, core::true_)?;
    t.function("false", 0, Some(0), nud_name, core::false_)?;
    t.function("lang", 1, Some(1), nud_name, nodes::lang)?;

    // number functions
    t.function("number", 0, Some(1), nud_name, numeric::number)?;
    t.function("sum", 1, Some(1), nud_name, numeric::sum)?;
    t.function("floor", 1, Some(1), nud_name, numeric::floor)?;
    t.function("ceiling", 1, Some(1), nud_name, numeric::ceiling)?;
    t.function("round", 1, Some(1), nud_name, numeric::round)?;

    Ok(t)
}

fn nud_number<'s>(p: &mut Parser<'_, 's>, lex: Lexeme<'s>) -> Result<Token, Error> {
    let invalid = || p.error_at(lex, format!("invalid numeric literal {}", lex.describe()));
    let value = if p.version() == XPathVersion::V1_0 {
        XdmAtomicValue::Double(lex.text.parse().map_err(|_| invalid())?)
    } else if let (LexemeKind::Integer, Ok(i)) = (lex.kind, lex.text.parse::<i64>()) {
        XdmAtomicValue::Integer(i)
    } else {
        // integers beyond i64 stay exact as decimals
        XdmAtomicValue::Decimal(parse_decimal(lex.text).map_err(|e| e.at_span(lex.text, lex.span))?)
    };
    Ok(literal_token(p, lex, value))
}

fn nud_string<'s>(p: &mut Parser<'_, 's>, lex: Lexeme<'s>) -> Result<Token, Error> {
    Ok(literal_token(p, lex, XdmAtomicValue::String(lexer::unescape_string(lex.text))))
}

fn nud_variable<'s>(p: &mut Parser<'_, 's>, lex: Lexeme<'s>) -> Result<Token, Error> {
    let name = p.advance();
    if !name.is_name() {
        return Err(p.error_at(name, format!("expected a variable name but found {}", name.describe())));
    }
    let name = p.plain_name(name)?;
    Ok(p.token(lex, TokenKind::VarRef(name)))
}

fn nud_context_item<'s>(p: &mut Parser<'_, 's>, lex: Lexeme<'s>) -> Result<Token, Error> {
    Ok(p.token(lex, TokenKind::ContextItem))
}

fn nud_parent<'s>(p: &mut Parser<'_, 's>, lex: Lexeme<'s>) -> Result<Token, Error> {
    let test = p.token_with(lex, Label::KindTest, TokenKind::KindTest(KindTest::AnyKind));
    Ok(p.token(lex, TokenKind::Axis(Axis::Parent)).with_children(vec![test]))
}

fn nud_attribute<'s>(p: &mut Parser<'_, 's>, lex: Lexeme<'s>) -> Result<Token, Error> {
    let saved = p.set_attribute_axis(true);
    let test = p.node_test();
    p.set_attribute_axis(saved);
    Ok(p.token(lex, TokenKind::Axis(Axis::Attribute)).with_children(vec![test?]))
}

fn nud_axis<'s>(p: &mut Parser<'_, 's>, lex: Lexeme<'s>) -> Result<Token, Error> {
    if !p.at("::") {
        return nud_name(p, lex);
    }
    let Some(axis) = Axis::from_name(lex.text) else {
        return Err(p.error_at(lex, format!("unknown axis {}", lex.describe())));
    };
    p.advance();
    let saved = p.set_attribute_axis(axis == Axis::Attribute);
    let test = p.node_test();
    p.set_attribute_axis(saved);
    Ok(p.token(lex, TokenKind::Axis(axis)).with_children(vec![test?]))
}

pub(super) fn nud_kind_test<'s>(p: &mut Parser<'_, 's>, lex: Lexeme<'s>) -> Result<Token, Error> {
    if !p.at("(") {
        return p.name_test(lex);
    }
    let test = p.kind_test(lex)?;
    Ok(p.token(lex, TokenKind::KindTest(test)))
}

fn nud_wildcard<'s>(p: &mut Parser<'_, 's>, lex: Lexeme<'s>) -> Result<Token, Error> {
    p.name_test(lex)
}

fn nud_unary<'s>(p: &mut Parser<'_, 's>, lex: Lexeme<'s>) -> Result<Token, Error> {
    if let Some(err) = p.missing_operand(lex) {
        return Err(err);
    }
    let operand = p.expression(70)?;
    Ok(p.token(lex, TokenKind::Unary { negate: lex.text == "-" }).with_children(vec![operand]))
}

fn nud_parenthesized<'s>(p: &mut Parser<'_, 's>, lex: Lexeme<'s>) -> Result<Token, Error> {
    if p.at(")") {
        if p.version() == XPathVersion::V1_0 {
            return Err(p.error_at(p.peek(), "empty parentheses"));
        }
        p.advance();
        return Ok(p.token(lex, TokenKind::EmptySequence));
    }
    let inner = p.expression(0)?;
    p.expect(")")?;
    Ok(p.token(lex, TokenKind::Parenthesized).with_children(vec![inner]))
}

fn starts_step(p: &Parser<'_, '_>) -> bool {
    let next = p.peek();
    match next.kind {
        LexemeKind::Name | LexemeKind::BracedName => true,
        LexemeKind::Operator => {
            matches!(next.text, "*" | "@" | "." | "..")
                || (p.version() > XPathVersion::V1_0 && matches!(next.text, "(" | "$"))
        }
        _ => false,
    }
}

/// XPath 1.0 only accepts steps to the right of `/` and `//`.
fn check_step(p: &Parser<'_, '_>, lex: Lexeme<'_>, step: &Token) -> Result<(), Error> {
    let valid = step.is_step() || matches!(step.kind, TokenKind::ContextItem);
    if p.version() == XPathVersion::V1_0 && !valid {
        return Err(Error::syntax(format!("invalid step after '{}'", lex.text)).or_at(step));
    }
    Ok(())
}

fn nud_root<'s>(p: &mut Parser<'_, 's>, lex: Lexeme<'s>) -> Result<Token, Error> {
    let root = p.token(lex, TokenKind::Root);
    if !starts_step(p) {
        return Ok(root);
    }
    let step = p.expression(75)?;
    check_step(p, lex, &step)?;
    Ok(root.with_children(vec![step]))
}

fn nud_descendant_root<'s>(p: &mut Parser<'_, 's>, lex: Lexeme<'s>) -> Result<Token, Error> {
    if let Some(err) = p.missing_operand(lex) {
        return Err(err);
    }
    let step = p.expression(75)?;
    check_step(p, lex, &step)?;
    Ok(p.token(lex, TokenKind::DescendantRoot).with_children(vec![step]))
}

fn led_path<'s>(p: &mut Parser<'_, 's>, left: Token, lex: Lexeme<'s>) -> Result<Token, Error> {
    if let Some(err) = p.missing_operand(lex) {
        return Err(err);
    }
    let right = p.expression(75)?;
    check_step(p, lex, &right)?;
    let kind = if lex.text == "//" { TokenKind::DescendantPath } else { TokenKind::Path };
    Ok(p.token(lex, kind).with_children(vec![left, right]))
}

fn led_predicate<'s>(p: &mut Parser<'_, 's>, left: Token, lex: Lexeme<'s>) -> Result<Token, Error> {
    let predicate = p.expression(0)?;
    p.expect("]")?;
    Ok(p.token(lex, TokenKind::Predicate).with_children(vec![left, predicate]))
}
