//! XPath 2.0 on top of 1.0: sequences, `for`/`some`/`every`/`if`, value and
//! node comparisons, `intersect`/`except`, sequence type expressions, the
//! extended kind tests and the 2.0 function library.

use super::{keyword_or_name, led_binary, literal_token, nud_name, variable_name};
use crate::consts::XS;
use crate::error::{Error, GrammarError};
use crate::functions::{FunctionImpl, constructors, core, nodes, numeric, sequences, strings, temporal};
use crate::parser::lexer::Lexeme;
use crate::parser::symbols::{Label, SymbolTable};
use crate::parser::{Parser, XPathVersion};
use crate::token::{Token, TokenKind};
use crate::xdm::{AtomicType, XdmAtomicValue};

pub(super) fn build(base: &SymbolTable) -> Result<SymbolTable, GrammarError> {
    let mut t = base.derive(XPathVersion::V2_0);

    t.literal("(double)", nud_double);
    t.infix(",", 5, led_sequence);
    t.with_nud("+", nud_unary_plus)?;
    t.duplicate("|", "union")?;

    t.keyword("for", nud_for);
    t.keyword("some", nud_quantified);
    t.keyword("every", nud_quantified);
    t.keyword("if", nud_if);

    for op in ["eq", "ne", "lt", "le", "gt", "ge", "is", "<<", ">>"] {
        t.infix(op, 30, led_binary);
    }
    t.infix("to", 35, led_binary);
    t.infix("idiv", 45, led_binary);
    t.infix("intersect", 55, led_binary);
    t.infix("except", 55, led_binary);
    t.register("instance", Label::Operator, 60, 60, None, Some(led_instance_of));
    t.register("treat", Label::Operator, 61, 61, None, Some(led_treat));
    t.register("castable", Label::Operator, 62, 62, None, Some(led_castable));
    t.register("cast", Label::Operator, 63, 63, None, Some(led_cast));

    for kind in ["element", "attribute", "document-node", "schema-element", "schema-attribute"] {
        t.kind_test(kind, super::xpath1::nud_kind_test);
    }

    // `id` gains the optional node argument
    t.unregister("id")?;
    t.function("id", 1, Some(2), nud_name, nodes::id)?;

    // collation-aware overloads
    t.function("contains", 2, Some(3), nud_name, strings::contains)?;
    t.function("starts-with", 2, Some(3), nud_name, strings::starts_with)?;
    t.function("substring-before", 2, Some(3), nud_name, strings::substring_before)?;
    t.function("substring-after", 2, Some(3), nud_name, strings::substring_after)?;
    t.function("sum", 1, Some(2), nud_name, numeric::sum)?;

    let functions: &[(&str, usize, Option<usize>, FunctionImpl)] = &[
        ("empty", 1, Some(1), sequences::empty),
        ("exists", 1, Some(1), sequences::exists),
        ("data", 0, Some(1), nodes::data),
        ("root", 0, Some(1), nodes::root),
        ("distinct-values", 1, Some(2), sequences::distinct_values),
        ("reverse", 1, Some(1), sequences::reverse),
        ("subsequence", 2, Some(3), sequences::subsequence),
        ("index-of", 2, Some(3), sequences::index_of),
        ("insert-before", 3, Some(3), sequences::insert_before),
        ("remove", 2, Some(2), sequences::remove),
        ("zero-or-one", 1, Some(1), sequences::zero_or_one),
        ("one-or-more", 1, Some(1), sequences::one_or_more),
        ("exactly-one", 1, Some(1), sequences::exactly_one),
        ("deep-equal", 2, Some(3), sequences::deep_equal),
        ("string-join", 1, Some(2), strings::string_join),
        ("upper-case", 1, Some(1), strings::upper_case),
        ("lower-case", 1, Some(1), strings::lower_case),
        ("ends-with", 2, Some(3), strings::ends_with),
        ("compare", 2, Some(3), strings::compare),
        ("codepoints-to-string", 1, Some(1), strings::codepoints_to_string),
        ("string-to-codepoints", 1, Some(1), strings::string_to_codepoints),
        ("matches", 2, Some(3), strings::matches),
        ("replace", 3, Some(4), strings::replace),
        ("tokenize", 2, Some(3), strings::tokenize),
        ("normalize-unicode", 1, Some(2), strings::normalize_unicode),
        ("resolve-uri", 1, Some(2), strings::resolve_uri),
        ("abs", 1, Some(1), numeric::abs),
        ("avg", 1, Some(1), numeric::avg),
        ("min", 1, Some(2), numeric::min),
        ("max", 1, Some(2), numeric::max),
        ("doc", 1, Some(1), nodes::doc),
        ("doc-available", 1, Some(1), nodes::doc_available),
        ("base-uri", 0, Some(1), nodes::base_uri),
        ("document-uri", 1, Some(1), nodes::document_uri),
        ("node-name", 1, Some(1), nodes::node_name),
        ("in-scope-prefixes", 1, Some(1), nodes::in_scope_prefixes),
        ("error", 0, Some(3), core::error),
        ("trace", 2, Some(2), core::trace),
        ("current-dateTime", 0, Some(0), temporal::current_date_time),
        ("current-date", 0, Some(0), temporal::current_date),
        ("current-time", 0, Some(0), temporal::current_time),
        ("implicit-timezone", 0, Some(0), temporal::implicit_timezone),
    ];
    for (name, min, max, imp) in functions {
        t.function(name, *min, *max, nud_name, *imp)?;
    }

    for atomic in AtomicType::ALL {
        if !atomic.is_abstract() {
            t.function_ns(XS, atomic.local_name(), 1, Some(1), constructors::construct);
        }
    }
    for derived in constructors::DERIVED_TYPES {
        t.function_ns(XS, derived, 1, Some(1), constructors::construct);
    }

    Ok(t)
}

fn nud_double<'s>(p: &mut Parser<'_, 's>, lex: Lexeme<'s>) -> Result<Token, Error> {
    let value: f64 =
        lex.text.parse().map_err(|_| p.error_at(lex, format!("invalid numeric literal {}", lex.describe())))?;
    Ok(literal_token(p, lex, XdmAtomicValue::Double(value)))
}

fn nud_unary_plus<'s>(p: &mut Parser<'_, 's>, lex: Lexeme<'s>) -> Result<Token, Error> {
    if let Some(err) = p.missing_operand(lex) {
        return Err(err);
    }
    let operand = p.expression(70)?;
    Ok(p.token(lex, TokenKind::Unary { negate: false }).with_children(vec![operand]))
}

fn led_sequence<'s>(p: &mut Parser<'_, 's>, left: Token, lex: Lexeme<'s>) -> Result<Token, Error> {
    if let Some(err) = p.missing_operand(lex) {
        return Err(err);
    }
    let right = p.expression(5)?;
    if matches!(left.kind, TokenKind::Sequence) {
        let mut left = left;
        left.children.push(right);
        return Ok(left);
    }
    Ok(p.token(lex, TokenKind::Sequence).with_children(vec![left, right]))
}

/// Parses `$a in E, $b in E ...`, returning names and binding sequences.
pub(super) fn bindings<'s>(
    p: &mut Parser<'_, 's>,
    separator: &str,
) -> Result<(Vec<crate::xdm::ExpandedName>, Vec<Token>), Error> {
    let mut names = Vec::new();
    let mut sequences = Vec::new();
    loop {
        names.push(variable_name(p)?);
        p.expect(separator)?;
        sequences.push(p.expression(5)?);
        if p.at(",") {
            p.advance();
            continue;
        }
        return Ok((names, sequences));
    }
}

fn nud_for<'s>(p: &mut Parser<'_, 's>, lex: Lexeme<'s>) -> Result<Token, Error> {
    if let Some(name) = keyword_or_name(p, lex, "$") {
        return name;
    }
    let (names, mut children) = bindings(p, "in")?;
    p.expect("return")?;
    children.push(p.expression(5)?);
    Ok(p.token(lex, TokenKind::For(names)).with_children(children))
}

fn nud_quantified<'s>(p: &mut Parser<'_, 's>, lex: Lexeme<'s>) -> Result<Token, Error> {
    if let Some(name) = keyword_or_name(p, lex, "$") {
        return name;
    }
    let (vars, mut children) = bindings(p, "in")?;
    p.expect("satisfies")?;
    children.push(p.expression(5)?);
    let every = lex.text == "every";
    Ok(p.token(lex, TokenKind::Quantified { every, vars }).with_children(children))
}

fn nud_if<'s>(p: &mut Parser<'_, 's>, lex: Lexeme<'s>) -> Result<Token, Error> {
    if let Some(name) = keyword_or_name(p, lex, "(") {
        return name;
    }
    p.expect("(")?;
    let condition = p.expression(0)?;
    p.expect(")")?;
    p.expect("then")?;
    let then = p.expression(5)?;
    p.expect("else")?;
    let otherwise = p.expression(5)?;
    Ok(p.token(lex, TokenKind::If).with_children(vec![condition, then, otherwise]))
}

fn led_instance_of<'s>(p: &mut Parser<'_, 's>, left: Token, lex: Lexeme<'s>) -> Result<Token, Error> {
    p.expect("of")?;
    let ty = p.sequence_type()?;
    Ok(p.token(lex, TokenKind::InstanceOf(ty)).with_children(vec![left]))
}

fn led_treat<'s>(p: &mut Parser<'_, 's>, left: Token, lex: Lexeme<'s>) -> Result<Token, Error> {
    p.expect("as")?;
    let ty = p.sequence_type()?;
    Ok(p.token(lex, TokenKind::Treat(ty)).with_children(vec![left]))
}

fn led_castable<'s>(p: &mut Parser<'_, 's>, left: Token, lex: Lexeme<'s>) -> Result<Token, Error> {
    p.expect("as")?;
    let ty = p.single_type()?;
    Ok(p.token(lex, TokenKind::Castable(ty)).with_children(vec![left]))
}

fn led_cast<'s>(p: &mut Parser<'_, 's>, left: Token, lex: Lexeme<'s>) -> Result<Token, Error> {
    p.expect("as")?;
    let ty = p.single_type()?;
    Ok(p.token(lex, TokenKind::Cast(ty)).with_children(vec![left]))
}
