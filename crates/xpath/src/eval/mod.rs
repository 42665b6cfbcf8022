//! Evaluation of token trees against a dynamic context.
//!
//! Every token evaluates to a sequence. Axis steps, node tests and literal
//! positional predicates can also be consumed lazily through
//! [`Token::select`]; everything else is materialized.

pub mod arith;
pub mod casting;
pub mod compare;
mod lookup;
mod paths;
pub mod types;

use crate::context::{EvalMode, XPathContext};
use crate::error::{Error, ErrorCode};
use crate::functions::CallCtx;
use crate::parser::XPathVersion;
use crate::token::{Token, TokenKind};
use crate::xdm::{
    AtomicType, ExpandedName, XdmAtomicValue, XdmItem, XdmSequence, effective_boolean_value, format_number_v1,
};

pub(crate) use paths::kind_matches;

/// Lazily produced items.
pub type ItemIter<'t, 'a> = Box<dyn Iterator<Item = Result<XdmItem<'a>, Error>> + 't>;

impl Token {
    /// Evaluates the expression to a sequence.
    pub fn evaluate<'a>(&self, ctx: &XPathContext<'a>) -> Result<XdmSequence<'a>, Error> {
        evaluate(self, ctx).map_err(|e| e.or_at(self))
    }

    /// Evaluates the expression item by item.
    pub fn select<'t, 'a: 't>(&'t self, ctx: &XPathContext<'a>) -> ItemIter<'t, 'a> {
        match paths::select(self, ctx) {
            Ok(iter) => Box::new(iter.map(move |r| r.map_err(|e| e.or_at(self)))),
            Err(e) => Box::new(std::iter::once(Err(e.or_at(self)))),
        }
    }
}

fn evaluate<'a>(t: &Token, ctx: &XPathContext<'a>) -> Result<XdmSequence<'a>, Error> {
    match &t.kind {
        TokenKind::Literal => Ok(t.value.clone().map(XdmItem::Atomic).into_iter().collect()),
        TokenKind::VarRef(name) => variable(name, ctx),
        TokenKind::ContextItem => ctx.item.clone().map(|i| vec![i]).ok_or_else(Error::missing_context),
        TokenKind::Root
        | TokenKind::DescendantRoot
        | TokenKind::Path
        | TokenKind::DescendantPath
        | TokenKind::Axis(_)
        | TokenKind::NameTest(_)
        | TokenKind::KindTest(_)
        | TokenKind::Predicate => paths::select(t, ctx)?.collect(),
        TokenKind::Parenthesized => paths::parenthesized(t, ctx),
        TokenKind::Union | TokenKind::Intersect | TokenKind::Except => paths::set_operation(t, ctx),
        TokenKind::FunctionCall(function) => {
            let args = t.children.iter().map(|c| c.evaluate(ctx)).collect::<Result<Vec<_>, _>>()?;
            tracing::trace!(function = %function.name, arity = args.len(), "calling function");
            (function.imp)(&CallCtx { context: ctx, token: t }, &args)
        }
        TokenKind::Arithmetic(op) => arith::binary(t, *op, ctx),
        TokenKind::Unary { negate } => arith::unary(t, *negate, ctx),
        TokenKind::GeneralComparison(op) => compare::general(t, *op, ctx),
        TokenKind::ValueComparison(op) => compare::value(t, *op, ctx),
        TokenKind::NodeComparison(op) => compare::node(t, *op, ctx),
        TokenKind::And => {
            let result = ebv(&operand(t, 0)?.evaluate(ctx)?)? && ebv(&operand(t, 1)?.evaluate(ctx)?)?;
            Ok(boolean(result))
        }
        TokenKind::Or => {
            let result = ebv(&operand(t, 0)?.evaluate(ctx)?)? || ebv(&operand(t, 1)?.evaluate(ctx)?)?;
            Ok(boolean(result))
        }
        TokenKind::Sequence => {
            let mut out = Vec::new();
            for child in &t.children {
                out.extend(child.evaluate(ctx)?);
            }
            Ok(out)
        }
        TokenKind::EmptySequence => Ok(Vec::new()),
        TokenKind::If => {
            let branch = if ebv(&operand(t, 0)?.evaluate(ctx)?)? { 1 } else { 2 };
            operand(t, branch)?.evaluate(ctx)
        }
        TokenKind::For(names) => {
            let mut out = Vec::new();
            let mut local = ctx.clone();
            for_each_binding(t, names, 0, &mut local, &mut |ret, c| {
                out.extend(ret.evaluate(c)?);
                Ok(true)
            })?;
            Ok(out)
        }
        TokenKind::Let(names) => {
            let mut local = ctx.clone();
            for (name, binding) in names.iter().zip(&t.children) {
                let value = binding.evaluate(&local)?;
                local.bind(name.clone(), value);
            }
            operand(t, names.len())?.evaluate(&local)
        }
        TokenKind::Quantified { every, vars } => {
            let every = *every;
            let mut found = false;
            let mut local = ctx.clone();
            for_each_binding(t, vars, 0, &mut local, &mut |ret, c| {
                let satisfied = ebv(&ret.evaluate(c)?)?;
                if satisfied != every {
                    found = true;
                    return Ok(false);
                }
                Ok(true)
            })?;
            Ok(boolean(if every { !found } else { found }))
        }
        TokenKind::Range => range(t, ctx),
        TokenKind::Concat => {
            let mut out = String::new();
            for child in &t.children {
                let value = child.evaluate(ctx)?;
                if let Some(a) = single_atomic(&value)? {
                    out.push_str(&atomic_string(&a, t.version));
                }
            }
            Ok(vec![XdmItem::Atomic(XdmAtomicValue::String(out))])
        }
        TokenKind::SimpleMap => {
            let left = operand(t, 0)?.evaluate(ctx)?;
            let right = operand(t, 1)?;
            let size = left.len();
            let mut out = Vec::new();
            let mut local = ctx.clone();
            for (i, item) in left.into_iter().enumerate() {
                local.set_focus(item, i + 1, size);
                out.extend(right.evaluate(&local)?);
            }
            Ok(out)
        }
        TokenKind::InstanceOf(ty) => {
            let value = operand(t, 0)?.evaluate(ctx)?;
            Ok(boolean(types::matches_sequence_type(&value, ty)))
        }
        TokenKind::Treat(ty) => {
            let value = operand(t, 0)?.evaluate(ctx)?;
            if types::matches_sequence_type(&value, ty) {
                Ok(value)
            } else {
                Err(Error::from_code(ErrorCode::XPDY0050, format!("the value does not match the type {ty}")))
            }
        }
        TokenKind::Castable(ty) => {
            let value = operand(t, 0)?.evaluate(ctx)?;
            Ok(boolean(types::castable(&value, *ty, ctx)))
        }
        TokenKind::Cast(ty) => {
            let value = operand(t, 0)?.evaluate(ctx)?;
            types::cast_sequence(&value, *ty, ctx)
        }
        TokenKind::MapConstructor => lookup::map_constructor(t, ctx),
        TokenKind::ArrayConstructor { curly } => lookup::array_constructor(t, *curly, ctx),
        TokenKind::Lookup { key, unary } => lookup::lookup(t, key, *unary, ctx),
    }
}

pub(crate) fn operand(t: &Token, index: usize) -> Result<&Token, Error> {
    t.child(index)
        .ok_or_else(|| Error::syntax(format!("'{}' is missing operand {}", t.symbol, index + 1)).or_at(t))
}

fn variable<'a>(name: &ExpandedName, ctx: &XPathContext<'a>) -> Result<XdmSequence<'a>, Error> {
    match ctx.variable(name) {
        Some(value) => Ok(value.clone()),
        None if ctx.mode == EvalMode::Schema => Ok(Vec::new()),
        None => Err(Error::from_code(ErrorCode::XPST0008, format!("variable ${name} is not bound"))),
    }
}

/// Binds each variable to each item of its binding sequence in turn and
/// calls `visit` with the return expression; `visit` returning false stops.
fn for_each_binding<'a>(
    t: &Token,
    names: &[ExpandedName],
    depth: usize,
    ctx: &mut XPathContext<'a>,
    visit: &mut dyn FnMut(&Token, &XPathContext<'a>) -> Result<bool, Error>,
) -> Result<bool, Error> {
    let Some(name) = names.get(depth) else {
        return visit(operand(t, names.len())?, ctx);
    };
    let items = operand(t, depth)?.evaluate(ctx)?;
    for item in items {
        ctx.bind(name.clone(), vec![item]);
        if !for_each_binding(t, names, depth + 1, ctx, visit)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Longest range that is built as a sequence; longer ones can only be consumed
/// lazily, e.g. through a literal positional predicate.
pub const MAX_RANGE_LEN: u64 = 1 << 24;

/// Inclusive bounds of `start to end`, or `None` when the range is empty.
pub(super) fn range_bounds(t: &Token, ctx: &XPathContext<'_>) -> Result<Option<(i64, i64)>, Error> {
    let bound = |index| -> Result<Option<i64>, Error> {
        let value = operand(t, index)?.evaluate(ctx)?;
        match single_atomic(&value)? {
            None => Ok(None),
            Some(XdmAtomicValue::Integer(i)) => Ok(Some(i)),
            Some(a @ XdmAtomicValue::UntypedAtomic(_)) => match casting::cast(&a, AtomicType::Integer)? {
                XdmAtomicValue::Integer(i) => Ok(Some(i)),
                _ => Err(Error::type_error("range bounds must be integers")),
            },
            Some(other) => {
                Err(Error::type_error(format!("range bounds must be integers, got {}", other.atomic_type())))
            }
        }
    };
    match (bound(0)?, bound(1)?) {
        (Some(start), Some(end)) if start <= end => Ok(Some((start, end))),
        _ => Ok(None),
    }
}

fn range<'a>(t: &Token, ctx: &XPathContext<'a>) -> Result<XdmSequence<'a>, Error> {
    let Some((start, end)) = range_bounds(t, ctx)? else {
        return Ok(Vec::new());
    };
    if end.abs_diff(start) >= MAX_RANGE_LEN {
        return Err(Error::from_code(
            ErrorCode::XPDY0130,
            format!("the range {start} to {end} holds more than {MAX_RANGE_LEN} integers"),
        ));
    }
    Ok((start..=end).map(|i| XdmItem::Atomic(XdmAtomicValue::Integer(i))).collect())
}

pub(crate) fn boolean<'a>(b: bool) -> XdmSequence<'a> {
    vec![XdmItem::Atomic(XdmAtomicValue::Boolean(b))]
}

pub(crate) fn ebv(seq: &[XdmItem<'_>]) -> Result<bool, Error> {
    effective_boolean_value(seq)
}

/// Atomizes a sequence: nodes yield their typed value, arrays their members.
pub fn atomize(seq: &[XdmItem<'_>]) -> Result<Vec<XdmAtomicValue>, Error> {
    let mut out = Vec::with_capacity(seq.len());
    for item in seq {
        match item {
            XdmItem::Atomic(a) => out.push(a.clone()),
            XdmItem::Node(n) => out.push(n.typed_value()),
            XdmItem::Array(array) => {
                for member in array.members() {
                    out.extend(atomize(member)?);
                }
            }
            XdmItem::Map(_) => return Err(Error::from_code(ErrorCode::FOTY0013, "a map cannot be atomized")),
        }
    }
    Ok(out)
}

/// Atomizes a sequence expected to hold at most one value.
pub(crate) fn single_atomic(seq: &[XdmItem<'_>]) -> Result<Option<XdmAtomicValue>, Error> {
    let mut atoms = atomize(seq)?;
    match atoms.len() {
        0 => Ok(None),
        1 => Ok(atoms.pop()),
        n => Err(Error::type_error(format!("expected at most one atomic value but got {n}"))),
    }
}

/// String conversion of an atomic value; XPath 1.0 formats numbers its own way.
pub(crate) fn atomic_string(a: &XdmAtomicValue, version: XPathVersion) -> String {
    match (version, a) {
        (XPathVersion::V1_0, a) if a.is_numeric() => format_number_v1(a.as_f64().unwrap_or(f64::NAN)),
        _ => a.to_string(),
    }
}

/// The string value of an item.
pub(crate) fn item_string(item: &XdmItem<'_>, version: XPathVersion) -> Result<String, Error> {
    match item {
        XdmItem::Node(n) => Ok(n.string_value()),
        XdmItem::Atomic(a) => Ok(atomic_string(a, version)),
        XdmItem::Map(_) | XdmItem::Array(_) => {
            Err(Error::from_code(ErrorCode::FOTY0013, "maps and arrays have no string value"))
        }
    }
}

/// XPath 1.0 `number()` of a string: optional sign, digits and a point.
/// Later versions also accept the `xs:double` lexical forms.
pub(crate) fn string_to_number(s: &str, version: XPathVersion) -> f64 {
    let s = s.trim();
    if version > XPathVersion::V1_0 {
        return casting::parse_double(s).unwrap_or(f64::NAN);
    }
    let body = s.strip_prefix('-').unwrap_or(s);
    let valid = !body.is_empty()
        && body.chars().all(|c| c.is_ascii_digit() || c == '.')
        && body.chars().filter(|c| *c == '.').count() <= 1
        && body != ".";
    if valid { s.parse().unwrap_or(f64::NAN) } else { f64::NAN }
}

/// Numeric value of an atomic for `fn:number` and XPath 1.0 arithmetic.
pub(crate) fn atomic_number(a: &XdmAtomicValue, version: XPathVersion) -> f64 {
    match a {
        XdmAtomicValue::Boolean(b) => f64::from(u8::from(*b)),
        a if a.is_numeric() => a.as_f64().unwrap_or(f64::NAN),
        XdmAtomicValue::String(s) | XdmAtomicValue::UntypedAtomic(s) | XdmAtomicValue::AnyUri(s) => {
            string_to_number(s, version)
        }
        _ => f64::NAN,
    }
}

/// Numeric value of the first item of a sequence; NaN when empty.
pub(crate) fn sequence_number(seq: &[XdmItem<'_>], version: XPathVersion) -> Result<f64, Error> {
    match seq.first() {
        None => Ok(f64::NAN),
        Some(XdmItem::Node(n)) => Ok(string_to_number(&n.string_value(), version)),
        Some(XdmItem::Atomic(a)) => Ok(atomic_number(a, version)),
        Some(_) => Err(Error::type_error("maps and arrays cannot be converted to numbers")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xpath1_number_syntax_is_strict() {
        assert_eq!(string_to_number(" 12.5 ", XPathVersion::V1_0), 12.5);
        assert_eq!(string_to_number("-3", XPathVersion::V1_0), -3.0);
        assert!(string_to_number("1e3", XPathVersion::V1_0).is_nan());
        assert!(string_to_number("+1", XPathVersion::V1_0).is_nan());
        assert_eq!(string_to_number("1e3", XPathVersion::V2_0), 1000.0);
        assert!(string_to_number("abc", XPathVersion::V3_1).is_nan());
    }

    #[test]
    fn atomic_strings_depend_on_the_version() {
        let d = XdmAtomicValue::Double(f64::INFINITY);
        assert_eq!(atomic_string(&d, XPathVersion::V1_0), "Infinity");
        assert_eq!(atomic_string(&d, XPathVersion::V2_0), "INF");
    }
}
