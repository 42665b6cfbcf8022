//! XPath 3.0 on top of 2.0: `||`, `!`, `let`, `Q{uri}local` names,
//! `namespace-node()` and the 3.0 functions.

use super::xpath2::bindings;
use super::{keyword_or_name, led_binary, nud_name};
use crate::consts::MATH_NS;
use crate::error::{Error, GrammarError};
use crate::functions::{core, nodes, numeric, sequences, strings};
use crate::parser::lexer::Lexeme;
use crate::parser::symbols::SymbolTable;
use crate::parser::{Parser, XPathVersion};
use crate::token::{Token, TokenKind};

pub(super) fn build(base: &SymbolTable) -> Result<SymbolTable, GrammarError> {
    let mut t = base.derive(XPathVersion::V3_0);

    t.infix("||", 32, led_binary);
    t.infix("!", 72, led_binary);
    t.register(":=", crate::parser::symbols::Label::Punctuation, 0, 0, None, None);
    t.keyword("let", nud_let);
    t.duplicate("(name)", "(braced_name)")?;
    t.kind_test("namespace-node", super::xpath1::nud_kind_test);

    // `round` gains the precision argument
    t.unregister("round")?;
    t.function("round", 1, Some(2), nud_name, numeric::round)?;

    t.function("environment-variable", 1, Some(1), nud_name, core::environment_variable)?;
    t.function("available-environment-variables", 0, Some(0), nud_name, core::available_environment_variables)?;
    t.function("head", 1, Some(1), nud_name, sequences::head)?;
    t.function("tail", 1, Some(1), nud_name, sequences::tail)?;
    t.function("has-children", 0, Some(1), nud_name, nodes::has_children)?;
    t.function("serialize", 1, Some(2), nud_name, strings::serialize)?;

    t.function_ns(MATH_NS, "pi", 0, Some(0), numeric::math_pi);
    t.function_ns(MATH_NS, "sqrt", 1, Some(1), numeric::math_sqrt);
    t.function_ns(MATH_NS, "pow", 2, Some(2), numeric::math_pow);
    t.function_ns(MATH_NS, "exp", 1, Some(1), numeric::math_exp);
    t.function_ns(MATH_NS, "log", 1, Some(1), numeric::math_log);
    t.function_ns(MATH_NS, "log10", 1, Some(1), numeric::math_log10);

    Ok(t)
}

fn nud_let<'s>(p: &mut Parser<'_, 's>, lex: Lexeme<'s>) -> Result<Token, Error> {
    if let Some(name) = keyword_or_name(p, lex, "$") {
        return name;
    }
    let (names, mut children) = bindings(p, ":=")?;
    p.expect("return")?;
    children.push(p.expression(5)?);
    Ok(p.token(lex, TokenKind::Let(names)).with_children(children))
}
