//! General, value and node comparisons.

use super::{atomize, boolean, operand, single_atomic, string_to_number};
use crate::collation::CollationManager;
use crate::context::{EvalMode, XPathContext};
use crate::error::{Error, ErrorCode};
use crate::eval::casting::cast;
use crate::parser::XPathVersion;
use crate::token::{CompOp, NodeCompOp, Token};
use crate::tree::NodeRef;
use crate::xdm::{AtomicType, XdmAtomicValue, XdmItem, XdmSequence};
use chrono::{FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use std::cmp::Ordering;

/// How two atomic values relate.
enum Relation {
    /// `None` for unordered values such as NaN.
    Ordered(Option<Ordering>),
    /// Types with equality but no order.
    Equality(bool),
}

const REFERENCE_DATE: NaiveDate = match NaiveDate::from_ymd_opt(1972, 12, 31) {
    Some(d) => d,
    None => NaiveDate::MIN,
};

/// Instant on the UTC timeline; values without timezone take `implicit`.
pub(crate) fn timeline(value: &XdmAtomicValue, implicit: FixedOffset) -> Option<NaiveDateTime> {
    let (local, tz) = match value {
        XdmAtomicValue::DateTime { value, tz } => (*value, *tz),
        XdmAtomicValue::Date { date, tz } => (date.and_time(NaiveTime::MIN), *tz),
        XdmAtomicValue::Time { time, tz } => (REFERENCE_DATE.and_time(*time), *tz),
        _ => return None,
    };
    let offset = tz.unwrap_or(implicit).local_minus_utc();
    local.checked_sub_signed(TimeDelta::seconds(i64::from(offset)))
}

fn relation(
    a: &XdmAtomicValue,
    b: &XdmAtomicValue,
    collation: &CollationManager,
    implicit_tz: FixedOffset,
) -> Result<Relation, Error> {
    use XdmAtomicValue as V;
    let relation = match (a, b) {
        (V::Integer(x), V::Integer(y)) => Relation::Ordered(Some(x.cmp(y))),
        (V::Integer(_) | V::Decimal(_), V::Integer(_) | V::Decimal(_)) => {
            Relation::Ordered(a.as_decimal().zip(b.as_decimal()).map(|(x, y)| x.cmp(&y)))
        }
        (x, y) if x.is_numeric() && y.is_numeric() => {
            Relation::Ordered(x.as_f64().zip(y.as_f64()).and_then(|(x, y)| x.partial_cmp(&y)))
        }
        (x, y) if x.is_string_like() && y.is_string_like() => {
            let (Some(x), Some(y)) = (x.as_str(), y.as_str()) else {
                return Err(Error::type_error("string comparison of non-strings"));
            };
            Relation::Ordered(Some(collation.compare(x, y)))
        }
        (V::Boolean(x), V::Boolean(y)) => Relation::Ordered(Some(x.cmp(y))),
        (V::DateTime { .. }, V::DateTime { .. })
        | (V::Date { .. }, V::Date { .. })
        | (V::Time { .. }, V::Time { .. }) => {
            Relation::Ordered(timeline(a, implicit_tz).zip(timeline(b, implicit_tz)).map(|(x, y)| x.cmp(&y)))
        }
        (V::DayTimeDuration(x), V::DayTimeDuration(y)) => Relation::Ordered(Some(x.cmp(y))),
        (V::YearMonthDuration(x), V::YearMonthDuration(y)) => Relation::Ordered(Some(x.cmp(y))),
        (
            V::Duration { .. } | V::DayTimeDuration(_) | V::YearMonthDuration(_),
            V::Duration { .. } | V::DayTimeDuration(_) | V::YearMonthDuration(_),
        ) => Relation::Equality(duration_parts(a) == duration_parts(b)),
        (V::QName { ns_uri: n1, local: l1, .. }, V::QName { ns_uri: n2, local: l2, .. }) => {
            Relation::Equality(n1 == n2 && l1 == l2)
        }
        (V::Base64Binary(x), V::Base64Binary(y)) | (V::HexBinary(x), V::HexBinary(y)) => {
            Relation::Ordered(Some(x.cmp(y)))
        }
        _ => {
            return Err(Error::type_error(format!(
                "{} and {} cannot be compared",
                a.atomic_type(),
                b.atomic_type()
            )));
        }
    };
    Ok(relation)
}

fn duration_parts(d: &XdmAtomicValue) -> (i32, i64) {
    match d {
        XdmAtomicValue::Duration { months, millis } => (*months, *millis),
        XdmAtomicValue::DayTimeDuration(ms) => (0, *ms),
        XdmAtomicValue::YearMonthDuration(m) => (*m, 0),
        _ => (0, 0),
    }
}

/// `a op b` for two atomic values of comparable types.
pub fn compare_atomic(
    a: &XdmAtomicValue,
    b: &XdmAtomicValue,
    op: CompOp,
    collation: &CollationManager,
    implicit_tz: FixedOffset,
) -> Result<bool, Error> {
    match relation(a, b, collation, implicit_tz)? {
        Relation::Ordered(Some(ord)) => Ok(op.holds(ord)),
        Relation::Ordered(None) => Ok(op == CompOp::Ne),
        Relation::Equality(eq) => match op {
            CompOp::Eq => Ok(eq),
            CompOp::Ne => Ok(!eq),
            _ => Err(Error::type_error(format!("{} values have no order", a.atomic_type()))),
        },
    }
}

/// Ordering for `min`, `max` and sorting; errors on incomparable types.
pub(crate) fn order_atomic(
    a: &XdmAtomicValue,
    b: &XdmAtomicValue,
    collation: &CollationManager,
    implicit_tz: FixedOffset,
) -> Result<Option<Ordering>, Error> {
    match relation(a, b, collation, implicit_tz)? {
        Relation::Ordered(ord) => Ok(ord),
        Relation::Equality(_) => Err(Error::type_error(format!("{} values have no order", a.atomic_type()))),
    }
}

/// Equality used by `distinct-values`, `index-of` and `deep-equal`:
/// incomparable values are unequal and NaN equals NaN.
pub(crate) fn atomic_equal(
    a: &XdmAtomicValue,
    b: &XdmAtomicValue,
    collation: &CollationManager,
    implicit_tz: FixedOffset,
) -> bool {
    let nan = |v: &XdmAtomicValue| v.is_numeric() && v.as_f64().is_some_and(f64::is_nan);
    if nan(a) && nan(b) {
        return true;
    }
    let untyped_as_string = |v: &XdmAtomicValue| match v {
        XdmAtomicValue::UntypedAtomic(s) => XdmAtomicValue::String(s.clone()),
        other => other.clone(),
    };
    compare_atomic(&untyped_as_string(a), &untyped_as_string(b), CompOp::Eq, collation, implicit_tz)
        .unwrap_or(false)
}

/// Type errors in a schema evaluation make the comparison false.
fn tolerated(e: &Error, ctx: &XPathContext<'_>) -> bool {
    ctx.mode == EvalMode::Schema && matches!(e.code_enum(), ErrorCode::XPTY0004 | ErrorCode::FORG0001)
}

/// Converts untyped operands of a general comparison.
fn general_pair(a: &XdmAtomicValue, b: &XdmAtomicValue) -> Result<(XdmAtomicValue, XdmAtomicValue), Error> {
    use XdmAtomicValue as V;
    let convert = |untyped: &str, other: &XdmAtomicValue| -> Result<XdmAtomicValue, Error> {
        match other {
            V::UntypedAtomic(_) | V::String(_) | V::AnyUri(_) => Ok(V::String(untyped.to_string())),
            o if o.is_numeric() => cast(&V::UntypedAtomic(untyped.to_string()), AtomicType::Double),
            o => cast(&V::UntypedAtomic(untyped.to_string()), o.atomic_type()),
        }
    };
    match (a, b) {
        (V::UntypedAtomic(x), V::UntypedAtomic(y)) => Ok((V::String(x.clone()), V::String(y.clone()))),
        (V::UntypedAtomic(x), other) => Ok((convert(x, other)?, other.clone())),
        (other, V::UntypedAtomic(y)) => Ok((other.clone(), convert(y, other)?)),
        _ => Ok((a.clone(), b.clone())),
    }
}

pub(super) fn general<'a>(t: &Token, op: CompOp, ctx: &XPathContext<'a>) -> Result<XdmSequence<'a>, Error> {
    let left = operand(t, 0)?.evaluate(ctx)?;
    let right = operand(t, 1)?.evaluate(ctx)?;
    if t.version == XPathVersion::V1_0 {
        return Ok(boolean(general_v1(&left, &right, op)));
    }
    let left = atomize(&left)?;
    let right = atomize(&right)?;
    if left.is_empty() || right.is_empty() {
        return Ok(boolean(false));
    }
    let collation = ctx.collation(None)?;
    let tz = ctx.env.implicit_timezone;
    for a in &left {
        for b in &right {
            let outcome = general_pair(a, b).and_then(|(x, y)| compare_atomic(&x, &y, op, &collation, tz));
            match outcome {
                Ok(true) => return Ok(boolean(true)),
                Ok(false) => {}
                // a pair that cannot be compared against a schema counts as false
                Err(e) if tolerated(&e, ctx) => {}
                Err(e) => return Err(e),
            }
        }
    }
    Ok(boolean(false))
}

/// XPath 1.0 operand: a node-set or a single value.
enum Operand1<'a> {
    Nodes(Vec<NodeRef<'a>>),
    Value(XdmAtomicValue),
}

fn operand_v1<'a>(seq: &[XdmItem<'a>]) -> Operand1<'a> {
    match seq {
        [XdmItem::Atomic(a)] => Operand1::Value(a.clone()),
        items => Operand1::Nodes(items.iter().filter_map(XdmItem::as_node).collect()),
    }
}

fn numbers(op: CompOp, x: f64, y: f64) -> bool {
    match x.partial_cmp(&y) {
        Some(ord) => op.holds(ord),
        None => op == CompOp::Ne,
    }
}

fn strings(op: CompOp, x: &str, y: &str) -> bool {
    match op {
        CompOp::Eq => x == y,
        CompOp::Ne => x != y,
        _ => numbers(op, string_to_number(x, XPathVersion::V1_0), string_to_number(y, XPathVersion::V1_0)),
    }
}

fn number_v1(v: &XdmAtomicValue) -> f64 {
    super::atomic_number(v, XPathVersion::V1_0)
}

fn boolean_v1(v: &XdmAtomicValue) -> bool {
    match v {
        XdmAtomicValue::Boolean(b) => *b,
        XdmAtomicValue::String(s) | XdmAtomicValue::UntypedAtomic(s) => !s.is_empty(),
        other => other.as_f64().is_some_and(|d| d != 0.0 && !d.is_nan()),
    }
}

fn values_v1(op: CompOp, a: &XdmAtomicValue, b: &XdmAtomicValue) -> bool {
    let is_bool = |v: &XdmAtomicValue| matches!(v, XdmAtomicValue::Boolean(_));
    match op {
        CompOp::Eq | CompOp::Ne if is_bool(a) || is_bool(b) => {
            let equal = boolean_v1(a) == boolean_v1(b);
            if op == CompOp::Eq { equal } else { !equal }
        }
        CompOp::Eq | CompOp::Ne if a.is_numeric() || b.is_numeric() => numbers(op, number_v1(a), number_v1(b)),
        CompOp::Eq | CompOp::Ne => {
            let text = |v: &XdmAtomicValue| super::atomic_string(v, XPathVersion::V1_0);
            strings(op, &text(a), &text(b))
        }
        _ => numbers(op, number_v1(a), number_v1(b)),
    }
}

fn nodes_against_value(op: CompOp, nodes: &[NodeRef<'_>], value: &XdmAtomicValue) -> bool {
    match value {
        XdmAtomicValue::Boolean(b) => {
            let set = XdmAtomicValue::Boolean(!nodes.is_empty());
            values_v1(op, &set, &XdmAtomicValue::Boolean(*b))
        }
        v if v.is_numeric() => {
            let y = number_v1(v);
            nodes.iter().any(|n| numbers(op, string_to_number(&n.string_value(), XPathVersion::V1_0), y))
        }
        v => {
            let y = super::atomic_string(v, XPathVersion::V1_0);
            nodes.iter().any(|n| strings(op, &n.string_value(), &y))
        }
    }
}

fn general_v1(left: &[XdmItem<'_>], right: &[XdmItem<'_>], op: CompOp) -> bool {
    match (operand_v1(left), operand_v1(right)) {
        (Operand1::Nodes(a), Operand1::Nodes(b)) => {
            let b: Vec<String> = b.iter().map(NodeRef::string_value).collect();
            a.iter().any(|x| {
                let x = x.string_value();
                b.iter().any(|y| strings(op, &x, y))
            })
        }
        (Operand1::Nodes(a), Operand1::Value(v)) => nodes_against_value(op, &a, &v),
        (Operand1::Value(v), Operand1::Nodes(b)) => nodes_against_value(op.swapped(), &b, &v),
        (Operand1::Value(a), Operand1::Value(b)) => values_v1(op, &a, &b),
    }
}

pub(super) fn value<'a>(t: &Token, op: CompOp, ctx: &XPathContext<'a>) -> Result<XdmSequence<'a>, Error> {
    let left = single_atomic(&operand(t, 0)?.evaluate(ctx)?)?;
    let right = single_atomic(&operand(t, 1)?.evaluate(ctx)?)?;
    let (Some(a), Some(b)) = (left, right) else {
        return Ok(Vec::new());
    };
    let as_string = |v: XdmAtomicValue| match v {
        XdmAtomicValue::UntypedAtomic(s) => XdmAtomicValue::String(s),
        other => other,
    };
    let collation = ctx.collation(None)?;
    match compare_atomic(&as_string(a), &as_string(b), op, &collation, ctx.env.implicit_timezone) {
        Ok(result) => Ok(boolean(result)),
        Err(e) if tolerated(&e, ctx) => Ok(boolean(false)),
        Err(e) => Err(e),
    }
}

fn single_node<'a>(seq: &[XdmItem<'a>], op: NodeCompOp) -> Result<Option<NodeRef<'a>>, Error> {
    match seq {
        [] => Ok(None),
        [XdmItem::Node(n)] => Ok(Some(*n)),
        _ => Err(Error::type_error(format!("the operands of a {op:?} comparison must be single nodes"))),
    }
}

pub(super) fn node<'a>(t: &Token, op: NodeCompOp, ctx: &XPathContext<'a>) -> Result<XdmSequence<'a>, Error> {
    let left = single_node(&operand(t, 0)?.evaluate(ctx)?, op)?;
    let right = single_node(&operand(t, 1)?.evaluate(ctx)?, op)?;
    let (Some(a), Some(b)) = (left, right) else {
        return Ok(Vec::new());
    };
    let result = match op {
        NodeCompOp::Is => a == b,
        NodeCompOp::Precedes => a < b,
        NodeCompOp::Follows => a > b,
    };
    Ok(boolean(result))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).expect("utc")
    }

    #[test]
    fn mixed_numeric_types_compare_by_value() {
        let c = CollationManager::codepoint();
        let one = XdmAtomicValue::Integer(1);
        let half = XdmAtomicValue::Decimal(rust_decimal::Decimal::new(5, 1));
        assert!(compare_atomic(&one, &half, CompOp::Gt, &c, utc()).expect("compare"));
        let nan = XdmAtomicValue::Double(f64::NAN);
        assert!(!compare_atomic(&nan, &nan, CompOp::Eq, &c, utc()).expect("compare"));
        assert!(compare_atomic(&nan, &nan, CompOp::Ne, &c, utc()).expect("compare"));
    }

    #[test]
    fn timezones_are_normalized() {
        let c = CollationManager::codepoint();
        let a = cast(&XdmAtomicValue::String("2024-01-01T12:00:00+02:00".into()), AtomicType::DateTime).expect("a");
        let b = cast(&XdmAtomicValue::String("2024-01-01T10:00:00Z".into()), AtomicType::DateTime).expect("b");
        assert!(compare_atomic(&a, &b, CompOp::Eq, &c, utc()).expect("compare"));
    }

    #[test]
    fn durations_only_support_equality() {
        let c = CollationManager::codepoint();
        let a = XdmAtomicValue::Duration { months: 12, millis: 0 };
        let b = XdmAtomicValue::YearMonthDuration(12);
        assert!(compare_atomic(&a, &b, CompOp::Eq, &c, utc()).expect("compare"));
        let err = compare_atomic(&a, &b, CompOp::Lt, &c, utc()).err().expect("error");
        assert_eq!(err.code_enum(), ErrorCode::XPTY0004);
    }

    #[test]
    fn xpath1_value_rules() {
        let t = XdmAtomicValue::Boolean(true);
        let s = XdmAtomicValue::String("x".into());
        assert!(values_v1(CompOp::Eq, &t, &s));
        let n = XdmAtomicValue::Double(2.0);
        assert!(values_v1(CompOp::Eq, &n, &XdmAtomicValue::String("2".into())));
        assert!(values_v1(CompOp::Lt, &XdmAtomicValue::String("1".into()), &n));
    }
}
