//! Numeric functions, aggregates and the `math` namespace.

use super::{CallCtx, arg_or_context, atomic_seq, double_seq, optional_atomic};
use crate::error::Error;
use crate::eval::{self, arith, casting, compare};
use crate::parser::XPathVersion;
use crate::token::ArithOp;
use crate::xdm::{AtomicType, XdmAtomicValue, XdmItem, XdmSequence};
use rust_decimal::{Decimal, RoundingStrategy};
use std::cmp::Ordering;

fn untyped_to_double(a: XdmAtomicValue) -> Result<XdmAtomicValue, Error> {
    match a {
        XdmAtomicValue::UntypedAtomic(_) => casting::cast(&a, AtomicType::Double),
        other => Ok(other),
    }
}

/// Optional numeric argument; untyped values become doubles.
fn numeric_arg(ctx: &CallCtx<'_, '_>, seq: &[XdmItem<'_>]) -> Result<Option<XdmAtomicValue>, Error> {
    let Some(value) = optional_atomic(ctx, seq)? else {
        return Ok(None);
    };
    let value = untyped_to_double(value)?;
    if !value.is_numeric() {
        return Err(Error::type_error(format!("expected a number but got {}", value.atomic_type())));
    }
    Ok(Some(value))
}

pub fn number<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    let seq = arg_or_context(ctx, args, 0)?;
    let n = match (ctx.version(), seq.as_slice()) {
        (XPathVersion::V1_0, _) | (_, [] | [XdmItem::Node(_)]) => eval::sequence_number(&seq, ctx.version())?,
        (_, [XdmItem::Atomic(a)]) => casting::cast(a, AtomicType::Double)
            .ok()
            .and_then(|d| d.as_f64())
            .unwrap_or(f64::NAN),
        _ => return Err(Error::type_error("fn:number takes at most one item")),
    };
    Ok(double_seq(n))
}

pub fn sum<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    if ctx.version() == XPathVersion::V1_0 {
        let total = args[0]
            .iter()
            .map(|item| eval::sequence_number(std::slice::from_ref(item), XPathVersion::V1_0))
            .sum::<Result<f64, Error>>()?;
        return Ok(double_seq(total));
    }
    let values = eval::atomize(&args[0])?;
    if values.is_empty() {
        return match args.get(1) {
            Some(zero) => Ok(eval::atomize(zero)?.into_iter().map(XdmItem::Atomic).collect()),
            None => Ok(vec![XdmItem::Atomic(XdmAtomicValue::Integer(0))]),
        };
    }
    Ok(vec![XdmItem::Atomic(total(ctx, values)?)])
}

fn total(ctx: &CallCtx<'_, '_>, values: Vec<XdmAtomicValue>) -> Result<XdmAtomicValue, Error> {
    let tz = ctx.context.env.implicit_timezone;
    let mut iter = values.into_iter();
    let mut acc = match iter.next() {
        Some(first) => untyped_to_double(first)?,
        None => XdmAtomicValue::Integer(0),
    };
    for value in iter {
        acc = arith::apply(ArithOp::Add, &acc, &value, tz)?;
    }
    Ok(acc)
}

pub fn avg<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    let values = eval::atomize(&args[0])?;
    if values.is_empty() {
        return Ok(Vec::new());
    }
    let count = XdmAtomicValue::Integer(i64::try_from(values.len()).unwrap_or(i64::MAX));
    let sum = total(ctx, values)?;
    Ok(vec![XdmItem::Atomic(arith::apply(ArithOp::Div, &sum, &count, ctx.context.env.implicit_timezone)?)])
}

/// Applies `op` (or `exact` for decimals) to a numeric value, keeping its type.
fn rounding<'a>(
    ctx: &CallCtx<'_, 'a>,
    args: &[XdmSequence<'a>],
    op: fn(f64) -> f64,
    exact: fn(&Decimal) -> Decimal,
) -> Result<XdmSequence<'a>, Error> {
    if ctx.version() == XPathVersion::V1_0 {
        return Ok(double_seq(op(eval::sequence_number(&args[0], ctx.version())?)));
    }
    let result = numeric_arg(ctx, &args[0])?.map(|value| match value {
        XdmAtomicValue::Decimal(d) => XdmAtomicValue::Decimal(exact(&d)),
        XdmAtomicValue::Double(d) => XdmAtomicValue::Double(op(d)),
        #[allow(clippy::cast_possible_truncation)]
        XdmAtomicValue::Float(f) => XdmAtomicValue::Float(op(f64::from(f)) as f32),
        other => other,
    });
    Ok(atomic_seq(result))
}

pub fn floor<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    rounding(ctx, args, f64::floor, Decimal::floor)
}

pub fn ceiling<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    rounding(ctx, args, f64::ceil, Decimal::ceil)
}

/// Rounds half towards positive infinity; negative zero is preserved.
fn round_half_up(x: f64) -> f64 {
    if x.is_nan() || x.is_infinite() || x == 0.0 {
        return x;
    }
    let r = (x + 0.5).floor();
    if r == 0.0 && x < 0.0 { -0.0 } else { r }
}

/// Decimal rounding half towards positive infinity at `precision` fractional digits.
fn round_decimal(d: Decimal, precision: i64) -> Decimal {
    let strategy = if d.is_sign_negative() {
        RoundingStrategy::MidpointTowardZero
    } else {
        RoundingStrategy::MidpointAwayFromZero
    };
    if precision >= 0 {
        return d.round_dp_with_strategy(u32::try_from(precision).unwrap_or(u32::MAX), strategy);
    }
    let Some(digits) = u32::try_from(-precision).ok().filter(|p| *p <= 28) else {
        return Decimal::ZERO;
    };
    let unit = Decimal::from_i128_with_scale(10_i128.pow(digits), 0);
    (d / unit).round_dp_with_strategy(0, strategy).checked_mul(unit).unwrap_or(d)
}

fn round_integer(i: i64, precision: i64) -> Result<i64, Error> {
    if precision >= 0 {
        return Ok(i);
    }
    let Some(m) = u32::try_from(-precision).ok().and_then(|p| 10_i64.checked_pow(p)) else {
        return Ok(0);
    };
    let base = i.div_euclid(m) * m;
    let rounded = if i.rem_euclid(m) * 2 >= m { base.checked_add(m) } else { Some(base) };
    rounded.ok_or_else(|| Error::from_code(crate::error::ErrorCode::FOAR0002, "integer overflow in fn:round"))
}

pub fn round<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    let precision = match args.get(1) {
        Some(p) => super::integer_arg(ctx, p)?,
        None => 0,
    };
    if precision == 0 || ctx.version() == XPathVersion::V1_0 {
        return rounding(ctx, args, round_half_up, |d| round_decimal(*d, 0));
    }
    let Some(value) = numeric_arg(ctx, &args[0])? else {
        return Ok(Vec::new());
    };
    #[allow(clippy::cast_possible_truncation)]
    let scale = 10_f64.powi(precision.clamp(-300, 300) as i32);
    let scaled = |d: f64| round_half_up(d * scale) / scale;
    let result = match value {
        XdmAtomicValue::Integer(i) => XdmAtomicValue::Integer(round_integer(i, precision)?),
        XdmAtomicValue::Decimal(d) => XdmAtomicValue::Decimal(round_decimal(d, precision).normalize()),
        XdmAtomicValue::Double(d) => XdmAtomicValue::Double(scaled(d)),
        #[allow(clippy::cast_possible_truncation)]
        XdmAtomicValue::Float(f) => XdmAtomicValue::Float(scaled(f64::from(f)) as f32),
        other => other,
    };
    Ok(vec![XdmItem::Atomic(result)])
}

pub fn abs<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    let result = numeric_arg(ctx, &args[0])?
        .map(|value| match value {
            XdmAtomicValue::Integer(i) => i
                .checked_abs()
                .map(XdmAtomicValue::Integer)
                .ok_or_else(|| Error::from_code(crate::error::ErrorCode::FOAR0002, "integer overflow in fn:abs")),
            XdmAtomicValue::Decimal(d) => Ok(XdmAtomicValue::Decimal(d.abs())),
            XdmAtomicValue::Double(d) => Ok(XdmAtomicValue::Double(d.abs())),
            XdmAtomicValue::Float(f) => Ok(XdmAtomicValue::Float(f.abs())),
            other => Ok(other),
        })
        .transpose()?;
    Ok(atomic_seq(result))
}

fn numeric_type(values: &[XdmAtomicValue]) -> Option<AtomicType> {
    if !values.iter().all(XdmAtomicValue::is_numeric) {
        return None;
    }
    [AtomicType::Double, AtomicType::Float, AtomicType::Decimal, AtomicType::Integer]
        .into_iter()
        .find(|t| values.iter().any(|v| v.atomic_type() == *t))
}

/// Shared body of `fn:min` and `fn:max`: keeps the value for which
/// `wanted` holds against every other.
fn extreme<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>], wanted: Ordering) -> Result<XdmSequence<'a>, Error> {
    let values = eval::atomize(&args[0])?
        .into_iter()
        .map(|v| match v {
            XdmAtomicValue::AnyUri(s) => Ok(XdmAtomicValue::String(s)),
            other => untyped_to_double(other),
        })
        .collect::<Result<Vec<_>, _>>()?;
    let Some(first) = values.first() else {
        return Ok(Vec::new());
    };
    let collation = ctx.collation(args.get(1))?;
    let tz = ctx.context.env.implicit_timezone;
    let mut best = first.clone();
    for value in &values[1..] {
        match compare::order_atomic(value, &best, &collation, tz)? {
            Some(ord) if ord == wanted => best = value.clone(),
            Some(_) => {}
            None => {
                if value.as_f64().is_some_and(f64::is_nan) {
                    best = value.clone();
                }
            }
        }
    }
    if best.as_f64().is_some_and(f64::is_nan) || values.iter().any(|v| v.as_f64().is_some_and(f64::is_nan)) {
        best = XdmAtomicValue::Double(f64::NAN);
    }
    if let Some(target) = numeric_type(&values) {
        best = casting::cast(&best, target)?;
    }
    Ok(vec![XdmItem::Atomic(best)])
}

pub fn min<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    extreme(ctx, args, Ordering::Less)
}

pub fn max<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    extreme(ctx, args, Ordering::Greater)
}

/// Applies `f` to an optional double argument.
fn math<'a>(ctx: &CallCtx<'_, 'a>, arg: &[XdmItem<'a>], f: impl Fn(f64) -> f64) -> Result<XdmSequence<'a>, Error> {
    Ok(match numeric_arg(ctx, arg)? {
        Some(v) => double_seq(f(v.as_f64().unwrap_or(f64::NAN))),
        None => Vec::new(),
    })
}

pub fn math_pi<'a>(_ctx: &CallCtx<'_, 'a>, _args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    Ok(double_seq(std::f64::consts::PI))
}

pub fn math_sqrt<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    math(ctx, &args[0], f64::sqrt)
}

pub fn math_exp<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    math(ctx, &args[0], f64::exp)
}

pub fn math_log<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    math(ctx, &args[0], f64::ln)
}

pub fn math_log10<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    math(ctx, &args[0], f64::log10)
}

pub fn math_pow<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    let Some(exponent) = numeric_arg(ctx, &args[1])? else {
        return Err(Error::type_error("math:pow requires an exponent"));
    };
    let y = exponent.as_f64().unwrap_or(f64::NAN);
    math(ctx, &args[0], |x| x.powf(y))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_half_towards_positive_infinity() {
        assert_eq!(round_half_up(2.5), 3.0);
        assert_eq!(round_half_up(-2.5), -2.0);
        assert!(round_half_up(-0.2).is_sign_negative());
        assert!(round_half_up(f64::NAN).is_nan());
    }

    #[test]
    fn integers_round_to_negative_precision() {
        assert_eq!(round_integer(1250, -2).expect("round"), 1300);
        assert_eq!(round_integer(1249, -2).expect("round"), 1200);
        assert_eq!(round_integer(-1250, -2).expect("round"), -1200);
        assert_eq!(round_integer(7, 2).expect("round"), 7);
    }
}
