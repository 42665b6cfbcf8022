//! XPath 3.1 on top of 3.0: maps, arrays, the lookup operator and `=>`.

use super::keyword_or_name;
use crate::consts::{ARRAY_NS, MAP_NS};
use crate::error::{Error, GrammarError};
use crate::functions::maps;
use crate::parser::lexer::{Lexeme, LexemeKind};
use crate::parser::symbols::{Label, SymbolTable};
use crate::parser::{Parser, XPathVersion};
use crate::token::{LookupKey, Token, TokenKind};

pub(super) fn build(base: &SymbolTable) -> Result<SymbolTable, GrammarError> {
    let mut t = base.derive(XPathVersion::V3_1);

    for p in ["{", "}", ":"] {
        t.register(p, Label::Punctuation, 0, 0, None, None);
    }
    t.register("map", Label::Constructor, 0, 0, Some(nud_map), None);
    t.register("array", Label::Constructor, 0, 0, Some(nud_array), None);
    t.with_nud("[", nud_square_array)?;
    t.register("?", Label::Operator, 85, 85, Some(nud_unary_lookup), Some(led_lookup));
    t.register("=>", Label::Operator, 67, 67, None, Some(led_arrow));

    t.function_ns(MAP_NS, "size", 1, Some(1), maps::map_size);
    t.function_ns(MAP_NS, "keys", 1, Some(1), maps::map_keys);
    t.function_ns(MAP_NS, "get", 2, Some(2), maps::map_get);
    t.function_ns(MAP_NS, "contains", 2, Some(2), maps::map_contains);
    t.function_ns(MAP_NS, "entry", 2, Some(2), maps::map_entry);
    t.function_ns(ARRAY_NS, "size", 1, Some(1), maps::array_size);
    t.function_ns(ARRAY_NS, "get", 2, Some(2), maps::array_get);
    t.function_ns(ARRAY_NS, "append", 2, Some(2), maps::array_append);

    Ok(t)
}

fn nud_map<'s>(p: &mut Parser<'_, 's>, lex: Lexeme<'s>) -> Result<Token, Error> {
    if let Some(name) = keyword_or_name(p, lex, "{") {
        return name;
    }
    p.expect("{")?;
    let mut children = Vec::new();
    if !p.at("}") {
        loop {
            children.push(p.expression(5)?);
            p.expect(":")?;
            children.push(p.expression(5)?);
            if p.at(",") {
                p.advance();
                continue;
            }
            break;
        }
    }
    p.expect("}")?;
    Ok(p.token(lex, TokenKind::MapConstructor).with_children(children))
}

fn nud_array<'s>(p: &mut Parser<'_, 's>, lex: Lexeme<'s>) -> Result<Token, Error> {
    if let Some(name) = keyword_or_name(p, lex, "{") {
        return name;
    }
    p.expect("{")?;
    let children = if p.at("}") { Vec::new() } else { vec![p.expression(0)?] };
    p.expect("}")?;
    Ok(p.token(lex, TokenKind::ArrayConstructor { curly: true }).with_children(children))
}

fn nud_square_array<'s>(p: &mut Parser<'_, 's>, lex: Lexeme<'s>) -> Result<Token, Error> {
    let mut members = Vec::new();
    if !p.at("]") {
        loop {
            members.push(p.expression(5)?);
            if p.at(",") {
                p.advance();
                continue;
            }
            break;
        }
    }
    p.expect("]")?;
    Ok(p.token_with(lex, Label::Constructor, TokenKind::ArrayConstructor { curly: false }).with_children(members))
}

fn lookup_key<'s>(p: &mut Parser<'_, 's>) -> Result<(LookupKey, Option<Token>), Error> {
    let next = p.advance();
    match next.kind {
        LexemeKind::Name if !next.text.contains(':') => Ok((LookupKey::Name(next.text.to_string()), None)),
        LexemeKind::Integer => {
            let index = next
                .text
                .parse()
                .map_err(|_| p.error_at(next, format!("invalid lookup index {}", next.describe())))?;
            Ok((LookupKey::Integer(index), None))
        }
        LexemeKind::Operator if next.text == "*" => Ok((LookupKey::Wildcard, None)),
        LexemeKind::Operator if next.text == "(" => {
            let key = p.expression(0)?;
            p.expect(")")?;
            Ok((LookupKey::Expr, Some(key)))
        }
        _ => Err(p.error_at(next, format!("invalid lookup key {}", next.describe()))),
    }
}

fn nud_unary_lookup<'s>(p: &mut Parser<'_, 's>, lex: Lexeme<'s>) -> Result<Token, Error> {
    let (key, expr) = lookup_key(p)?;
    let children = expr.into_iter().collect();
    Ok(p.token(lex, TokenKind::Lookup { key, unary: true }).with_children(children))
}

fn led_lookup<'s>(p: &mut Parser<'_, 's>, left: Token, lex: Lexeme<'s>) -> Result<Token, Error> {
    let (key, expr) = lookup_key(p)?;
    let children = std::iter::once(left).chain(expr).collect();
    Ok(p.token(lex, TokenKind::Lookup { key, unary: false }).with_children(children))
}

fn led_arrow<'s>(p: &mut Parser<'_, 's>, left: Token, lex: Lexeme<'s>) -> Result<Token, Error> {
    if let Some(err) = p.missing_operand(lex) {
        return Err(err);
    }
    let name = p.advance();
    if !name.is_name() || !p.at("(") {
        return Err(p.error_at(name, format!("expected a function call after '=>' but found {}", name.describe())));
    }
    let mut args = p.arguments()?;
    args.insert(0, left);
    p.function_call(name, args)
}
