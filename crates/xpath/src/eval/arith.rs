//! Arithmetic on numbers, dates, times and durations.

use super::compare::timeline;
use super::{operand, sequence_number, single_atomic};
use crate::context::XPathContext;
use crate::error::{Error, ErrorCode};
use crate::eval::casting::cast;
use crate::parser::XPathVersion;
use crate::token::{ArithOp, Token};
use crate::xdm::{AtomicType, XdmAtomicValue, XdmItem, XdmSequence};
use chrono::{FixedOffset, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

pub(super) fn binary<'a>(t: &Token, op: ArithOp, ctx: &XPathContext<'a>) -> Result<XdmSequence<'a>, Error> {
    let left = operand(t, 0)?.evaluate(ctx)?;
    let right = operand(t, 1)?.evaluate(ctx)?;
    if t.version == XPathVersion::V1_0 {
        let x = sequence_number(&left, t.version)?;
        let y = sequence_number(&right, t.version)?;
        return Ok(vec![XdmItem::Atomic(XdmAtomicValue::Double(float_op(op, x, y)))]);
    }
    let (Some(a), Some(b)) = (single_atomic(&left)?, single_atomic(&right)?) else {
        return Ok(Vec::new());
    };
    Ok(vec![XdmItem::Atomic(apply(op, &a, &b, ctx.env.implicit_timezone)?)])
}

pub(super) fn unary<'a>(t: &Token, negate: bool, ctx: &XPathContext<'a>) -> Result<XdmSequence<'a>, Error> {
    let value = operand(t, 0)?.evaluate(ctx)?;
    if t.version == XPathVersion::V1_0 {
        let x = sequence_number(&value, t.version)?;
        let x = if negate { -x } else { x };
        return Ok(vec![XdmItem::Atomic(XdmAtomicValue::Double(x))]);
    }
    let Some(a) = single_atomic(&value)? else {
        return Ok(Vec::new());
    };
    let a = untyped_to_double(a)?;
    if !a.is_numeric() {
        return Err(Error::type_error(format!("unary operator applied to {}", a.atomic_type())));
    }
    if !negate {
        return Ok(vec![XdmItem::Atomic(a)]);
    }
    let negated = match a {
        XdmAtomicValue::Integer(i) => XdmAtomicValue::Integer(i.checked_neg().ok_or_else(overflow)?),
        XdmAtomicValue::Decimal(d) => XdmAtomicValue::Decimal(-d),
        XdmAtomicValue::Float(f) => XdmAtomicValue::Float(-f),
        XdmAtomicValue::Double(d) => XdmAtomicValue::Double(-d),
        other => other,
    };
    Ok(vec![XdmItem::Atomic(negated)])
}

fn overflow() -> Error {
    Error::from_code(ErrorCode::FOAR0002, "integer overflow")
}

fn division_by_zero() -> Error {
    Error::from_code(ErrorCode::FOAR0001, "division by zero")
}

fn untyped_to_double(a: XdmAtomicValue) -> Result<XdmAtomicValue, Error> {
    match a {
        XdmAtomicValue::UntypedAtomic(_) => cast(&a, AtomicType::Double),
        other => Ok(other),
    }
}

/// `a op b` for two atomic operands; untyped operands are treated as doubles.
pub(crate) fn apply(
    op: ArithOp,
    a: &XdmAtomicValue,
    b: &XdmAtomicValue,
    implicit_tz: FixedOffset,
) -> Result<XdmAtomicValue, Error> {
    use XdmAtomicValue as V;
    let a = untyped_to_double(a.clone())?;
    let b = untyped_to_double(b.clone())?;
    match (&a, &b) {
        (x, y) if x.is_numeric() && y.is_numeric() => numeric(op, x, y),
        (V::YearMonthDuration(x), V::YearMonthDuration(y)) => match op {
            ArithOp::Add => x.checked_add(*y).map(V::YearMonthDuration).ok_or_else(duration_overflow),
            ArithOp::Sub => x.checked_sub(*y).map(V::YearMonthDuration).ok_or_else(duration_overflow),
            ArithOp::Div => ratio(i64::from(*x), i64::from(*y)),
            _ => Err(unsupported(op, &a, &b)),
        },
        (V::DayTimeDuration(x), V::DayTimeDuration(y)) => match op {
            ArithOp::Add => x.checked_add(*y).map(V::DayTimeDuration).ok_or_else(duration_overflow),
            ArithOp::Sub => x.checked_sub(*y).map(V::DayTimeDuration).ok_or_else(duration_overflow),
            ArithOp::Div => ratio(*x, *y),
            _ => Err(unsupported(op, &a, &b)),
        },
        (V::YearMonthDuration(_) | V::DayTimeDuration(_), n) if n.is_numeric() => {
            scale_duration(op, &a, n.as_f64().unwrap_or(f64::NAN))
        }
        (n, V::YearMonthDuration(_) | V::DayTimeDuration(_)) if n.is_numeric() && op == ArithOp::Mul => {
            scale_duration(op, &b, n.as_f64().unwrap_or(f64::NAN))
        }
        (V::DateTime { .. }, V::DateTime { .. }) | (V::Date { .. }, V::Date { .. }) | (V::Time { .. }, V::Time { .. })
            if op == ArithOp::Sub =>
        {
            let (Some(x), Some(y)) = (timeline(&a, implicit_tz), timeline(&b, implicit_tz)) else {
                return Err(Error::from_code(ErrorCode::FODT0001, "date/time out of range"));
            };
            Ok(V::DayTimeDuration((x - y).num_milliseconds()))
        }
        (V::DateTime { .. } | V::Date { .. } | V::Time { .. }, V::YearMonthDuration(_) | V::DayTimeDuration(_)) => {
            match op {
                ArithOp::Add => shift(&a, &b, false),
                ArithOp::Sub => shift(&a, &b, true),
                _ => Err(unsupported(op, &a, &b)),
            }
        }
        (V::YearMonthDuration(_) | V::DayTimeDuration(_), V::DateTime { .. } | V::Date { .. } | V::Time { .. })
            if op == ArithOp::Add =>
        {
            shift(&b, &a, false)
        }
        _ => Err(unsupported(op, &a, &b)),
    }
}

fn unsupported(op: ArithOp, a: &XdmAtomicValue, b: &XdmAtomicValue) -> Error {
    Error::type_error(format!("{op:?} is not defined for {} and {}", a.atomic_type(), b.atomic_type()))
}

fn duration_overflow() -> Error {
    Error::from_code(ErrorCode::FODT0002, "duration overflow")
}

fn ratio(x: i64, y: i64) -> Result<XdmAtomicValue, Error> {
    decimal_op(ArithOp::Div, Decimal::from(x), Decimal::from(y))
}

fn rank(v: &XdmAtomicValue) -> u8 {
    match v {
        XdmAtomicValue::Integer(_) => 0,
        XdmAtomicValue::Decimal(_) => 1,
        XdmAtomicValue::Float(_) => 2,
        _ => 3,
    }
}

fn float_op(op: ArithOp, x: f64, y: f64) -> f64 {
    match op {
        ArithOp::Add => x + y,
        ArithOp::Sub => x - y,
        ArithOp::Mul => x * y,
        ArithOp::Div => x / y,
        ArithOp::IDiv => (x / y).trunc(),
        ArithOp::Mod => x % y,
    }
}

fn integer_op(op: ArithOp, x: i64, y: i64) -> Result<XdmAtomicValue, Error> {
    let value = match op {
        ArithOp::Add => x.checked_add(y).ok_or_else(overflow)?,
        ArithOp::Sub => x.checked_sub(y).ok_or_else(overflow)?,
        ArithOp::Mul => x.checked_mul(y).ok_or_else(overflow)?,
        ArithOp::Div => {
            if y == 0 {
                return Err(division_by_zero());
            }
            return decimal_op(ArithOp::Div, Decimal::from(x), Decimal::from(y));
        }
        ArithOp::IDiv => {
            if y == 0 {
                return Err(division_by_zero());
            }
            x.checked_div(y).ok_or_else(overflow)?
        }
        ArithOp::Mod => {
            if y == 0 {
                return Err(division_by_zero());
            }
            // i64::MIN mod -1 has no overflow in XPath
            if y == -1 { 0 } else { x.checked_rem(y).ok_or_else(overflow)? }
        }
    };
    Ok(XdmAtomicValue::Integer(value))
}

/// Exact xs:decimal arithmetic; results beyond 28 significant digits overflow.
fn decimal_op(op: ArithOp, x: Decimal, y: Decimal) -> Result<XdmAtomicValue, Error> {
    let decimal_overflow = || Error::from_code(ErrorCode::FOAR0002, "decimal overflow");
    if y.is_zero() && matches!(op, ArithOp::Div | ArithOp::IDiv | ArithOp::Mod) {
        return Err(division_by_zero());
    }
    let value = match op {
        ArithOp::Add => x.checked_add(y),
        ArithOp::Sub => x.checked_sub(y),
        ArithOp::Mul => x.checked_mul(y),
        ArithOp::Div => x.checked_div(y),
        ArithOp::Mod => x.checked_rem(y),
        ArithOp::IDiv => {
            let quotient = x.checked_div(y).ok_or_else(decimal_overflow)?.trunc();
            return quotient.to_i64().map(XdmAtomicValue::Integer).ok_or_else(overflow);
        }
    };
    value.map(|d| XdmAtomicValue::Decimal(d.normalize())).ok_or_else(decimal_overflow)
}

#[allow(clippy::cast_possible_truncation)]
fn numeric(op: ArithOp, a: &XdmAtomicValue, b: &XdmAtomicValue) -> Result<XdmAtomicValue, Error> {
    if let (XdmAtomicValue::Integer(x), XdmAtomicValue::Integer(y)) = (a, b) {
        return integer_op(op, *x, *y);
    }
    let rank = rank(a).max(rank(b));
    if rank == 1
        && let (Some(x), Some(y)) = (a.as_decimal(), b.as_decimal())
    {
        return decimal_op(op, x, y);
    }
    let (x, y) = (a.as_f64().unwrap_or(f64::NAN), b.as_f64().unwrap_or(f64::NAN));
    if op == ArithOp::IDiv {
        let q = (x / y).trunc();
        if !q.is_finite() {
            return Err(Error::from_code(ErrorCode::FOAR0002, "integer division of NaN or infinity"));
        }
        if q < -9.223_372_036_854_776e18 || q >= 9.223_372_036_854_776e18 {
            return Err(overflow());
        }
        return Ok(XdmAtomicValue::Integer(q as i64));
    }
    let r = float_op(op, x, y);
    Ok(match rank {
        2 => XdmAtomicValue::Float(r as f32),
        _ => XdmAtomicValue::Double(r),
    })
}

/// Multiplies or divides a duration by a number.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn scale_duration(op: ArithOp, duration: &XdmAtomicValue, n: f64) -> Result<XdmAtomicValue, Error> {
    if n.is_nan() {
        return Err(Error::from_code(ErrorCode::FOCA0005, "NaN supplied as a duration operand"));
    }
    let factor = match op {
        ArithOp::Mul => n,
        ArithOp::Div if n == 0.0 => return Err(duration_overflow()),
        ArithOp::Div => 1.0 / n,
        _ => return Err(Error::type_error(format!("{op:?} is not defined for durations and numbers"))),
    };
    match duration {
        XdmAtomicValue::YearMonthDuration(m) => {
            let scaled = (f64::from(*m) * factor).round();
            if !scaled.is_finite() || scaled.abs() > f64::from(i32::MAX) {
                return Err(duration_overflow());
            }
            Ok(XdmAtomicValue::YearMonthDuration(scaled as i32))
        }
        XdmAtomicValue::DayTimeDuration(ms) => {
            let scaled = (*ms as f64 * factor).round();
            if !scaled.is_finite() || scaled.abs() >= 9.2e18 {
                return Err(duration_overflow());
            }
            Ok(XdmAtomicValue::DayTimeDuration(scaled as i64))
        }
        other => Err(Error::type_error(format!("{} cannot be scaled", other.atomic_type()))),
    }
}

fn add_months_to_date(date: NaiveDate, months: i32) -> Option<NaiveDate> {
    if months >= 0 {
        date.checked_add_months(Months::new(months.unsigned_abs()))
    } else {
        date.checked_sub_months(Months::new(months.unsigned_abs()))
    }
}

fn add_months(value: NaiveDateTime, months: i32) -> Option<NaiveDateTime> {
    if months >= 0 {
        value.checked_add_months(Months::new(months.unsigned_abs()))
    } else {
        value.checked_sub_months(Months::new(months.unsigned_abs()))
    }
}

/// Adds (or subtracts) a duration to a date, time or dateTime.
fn shift(temporal: &XdmAtomicValue, duration: &XdmAtomicValue, subtract: bool) -> Result<XdmAtomicValue, Error> {
    use XdmAtomicValue as V;
    let out_of_range = || Error::from_code(ErrorCode::FODT0001, "date/time arithmetic out of range");
    let sign = |v: i64| if subtract { v.checked_neg() } else { Some(v) };
    match (temporal, duration) {
        (V::DateTime { value, tz }, V::YearMonthDuration(m)) => {
            let m = i32::try_from(sign(i64::from(*m)).ok_or_else(out_of_range)?).map_err(|_| out_of_range())?;
            add_months(*value, m).map(|value| V::DateTime { value, tz: *tz }).ok_or_else(out_of_range)
        }
        (V::Date { date, tz }, V::YearMonthDuration(m)) => {
            let m = i32::try_from(sign(i64::from(*m)).ok_or_else(out_of_range)?).map_err(|_| out_of_range())?;
            add_months_to_date(*date, m).map(|date| V::Date { date, tz: *tz }).ok_or_else(out_of_range)
        }
        (V::DateTime { value, tz }, V::DayTimeDuration(ms)) => {
            let delta = TimeDelta::try_milliseconds(sign(*ms).ok_or_else(out_of_range)?).ok_or_else(out_of_range)?;
            value.checked_add_signed(delta).map(|value| V::DateTime { value, tz: *tz }).ok_or_else(out_of_range)
        }
        (V::Date { date, tz }, V::DayTimeDuration(ms)) => {
            let delta = TimeDelta::try_milliseconds(sign(*ms).ok_or_else(out_of_range)?).ok_or_else(out_of_range)?;
            date.and_time(NaiveTime::MIN)
                .checked_add_signed(delta)
                .map(|value| V::Date { date: value.date(), tz: *tz })
                .ok_or_else(out_of_range)
        }
        (V::Time { time, tz }, V::DayTimeDuration(ms)) => {
            let delta = TimeDelta::try_milliseconds(sign(*ms).ok_or_else(out_of_range)?).ok_or_else(out_of_range)?;
            Ok(V::Time { time: time.overflowing_add_signed(delta).0, tz: *tz })
        }
        _ => Err(Error::type_error(format!(
            "{} cannot be shifted by {}",
            temporal.atomic_type(),
            duration.atomic_type()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).expect("utc")
    }

    fn s(v: &str, t: AtomicType) -> XdmAtomicValue {
        cast(&XdmAtomicValue::String(v.into()), t).expect("cast")
    }

    fn dec(v: &str) -> XdmAtomicValue {
        XdmAtomicValue::Decimal(v.parse().expect("decimal"))
    }

    #[rstest]
    #[case(ArithOp::Add, XdmAtomicValue::Integer(2), XdmAtomicValue::Integer(3), XdmAtomicValue::Integer(5))]
    #[case(ArithOp::Div, XdmAtomicValue::Integer(1), XdmAtomicValue::Integer(4), dec("0.25"))]
    #[case(ArithOp::IDiv, XdmAtomicValue::Integer(-7), XdmAtomicValue::Integer(2), XdmAtomicValue::Integer(-3))]
    #[case(ArithOp::Mod, XdmAtomicValue::Integer(-7), XdmAtomicValue::Integer(2), XdmAtomicValue::Integer(-1))]
    #[case(ArithOp::Mul, XdmAtomicValue::Integer(2), XdmAtomicValue::Double(1.5), XdmAtomicValue::Double(3.0))]
    #[case(ArithOp::Add, dec("0.5"), XdmAtomicValue::Integer(1), dec("1.5"))]
    #[case(ArithOp::Add, dec("0.1"), dec("0.2"), dec("0.3"))]
    #[case(ArithOp::Mul, dec("1.10"), dec("3"), dec("3.3"))]
    #[case(ArithOp::IDiv, dec("7.5"), dec("2"), XdmAtomicValue::Integer(3))]
    #[case(ArithOp::Mod, dec("7.5"), dec("2"), dec("1.5"))]
    #[case(ArithOp::Mod, XdmAtomicValue::Integer(i64::MIN), XdmAtomicValue::Integer(-1), XdmAtomicValue::Integer(0))]
    fn numeric_promotion(
        #[case] op: ArithOp,
        #[case] a: XdmAtomicValue,
        #[case] b: XdmAtomicValue,
        #[case] expected: XdmAtomicValue,
    ) {
        assert_eq!(apply(op, &a, &b, utc()).expect("apply"), expected);
    }

    #[rstest]
    #[case(ArithOp::Div, ErrorCode::FOAR0001)]
    #[case(ArithOp::IDiv, ErrorCode::FOAR0001)]
    #[case(ArithOp::Mod, ErrorCode::FOAR0001)]
    fn integer_division_by_zero(#[case] op: ArithOp, #[case] code: ErrorCode) {
        let err = apply(op, &XdmAtomicValue::Integer(1), &XdmAtomicValue::Integer(0), utc()).err();
        assert_eq!(err.map(|e| e.code_enum()), Some(code));
    }

    #[rstest]
    #[case(ArithOp::Div)]
    #[case(ArithOp::IDiv)]
    #[case(ArithOp::Mod)]
    fn decimal_division_by_zero(#[case] op: ArithOp) {
        let err = apply(op, &dec("1.5"), &XdmAtomicValue::Integer(0), utc()).err();
        assert_eq!(err.map(|e| e.code_enum()), Some(ErrorCode::FOAR0001));
    }

    #[test]
    fn decimal_overflow_is_reported() {
        let err = apply(ArithOp::Mul, &XdmAtomicValue::Decimal(Decimal::MAX), &dec("2"), utc()).err();
        assert_eq!(err.map(|e| e.code_enum()), Some(ErrorCode::FOAR0002));
    }

    #[test]
    fn double_division_by_zero_is_infinite() {
        let r = apply(ArithOp::Div, &XdmAtomicValue::Double(1.0), &XdmAtomicValue::Integer(0), utc());
        assert_eq!(r.expect("div"), XdmAtomicValue::Double(f64::INFINITY));
    }

    #[test]
    fn integer_overflow_is_reported() {
        let err = apply(ArithOp::Add, &XdmAtomicValue::Integer(i64::MAX), &XdmAtomicValue::Integer(1), utc()).err();
        assert_eq!(err.map(|e| e.code_enum()), Some(ErrorCode::FOAR0002));
    }

    #[test]
    fn dates_and_durations() {
        let date = s("2024-01-31", AtomicType::Date);
        let month = s("P1M", AtomicType::YearMonthDuration);
        assert_eq!(apply(ArithOp::Add, &date, &month, utc()).expect("add"), s("2024-02-29", AtomicType::Date));
        let later = s("2024-03-01", AtomicType::Date);
        assert_eq!(
            apply(ArithOp::Sub, &later, &date, utc()).expect("sub"),
            s("P30D", AtomicType::DayTimeDuration)
        );
        let day = s("PT36H", AtomicType::DayTimeDuration);
        assert_eq!(
            apply(ArithOp::Mul, &day, &XdmAtomicValue::Integer(2), utc()).expect("mul"),
            s("P3D", AtomicType::DayTimeDuration)
        );
        assert_eq!(
            apply(ArithOp::Div, &day, &s("PT12H", AtomicType::DayTimeDuration), utc()).expect("div"),
            dec("3")
        );
    }

    #[test]
    fn untyped_operands_become_doubles() {
        let r = apply(ArithOp::Add, &XdmAtomicValue::UntypedAtomic("1".into()), &XdmAtomicValue::Integer(1), utc());
        assert_eq!(r.expect("add"), XdmAtomicValue::Double(2.0));
    }
}
