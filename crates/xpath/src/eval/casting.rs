//! Casting between atomic types.

use crate::consts::{FNS, XML_URI, XS};
use crate::error::{Error, ErrorCode};
use crate::xdm::temporal;
use crate::xdm::{AtomicType, XdmAtomicValue};
use base64::Engine as _;
use chrono::NaiveTime;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use std::collections::HashMap;

fn invalid(value: &str, target: AtomicType) -> Error {
    Error::from_code(ErrorCode::FORG0001, format!("cannot cast {value:?} to {target}"))
}

fn unsupported(from: AtomicType, target: AtomicType) -> Error {
    Error::type_error(format!("casting from {from} to {target} is not supported"))
}

/// `xs:double` lexical form: decimal or scientific notation, `INF`, `-INF`, `NaN`.
pub fn parse_double(s: &str) -> Option<f64> {
    let s = s.trim();
    match s {
        "INF" | "+INF" => return Some(f64::INFINITY),
        "-INF" => return Some(f64::NEG_INFINITY),
        "NaN" => return Some(f64::NAN),
        _ => {}
    }
    let (mantissa, exponent) = match s.find(['e', 'E']) {
        Some(i) => (&s[..i], Some(&s[i + 1..])),
        None => (s, None),
    };
    if !is_decimal_lexical(mantissa) {
        return None;
    }
    if let Some(exp) = exponent {
        let digits = exp.strip_prefix(['+', '-']).unwrap_or(exp);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
    }
    s.parse().ok()
}

fn is_decimal_lexical(s: &str) -> bool {
    let body = s.strip_prefix(['+', '-']).unwrap_or(s);
    let (int, frac) = body.split_once('.').unwrap_or((body, ""));
    (!int.is_empty() || !frac.is_empty())
        && int.bytes().all(|b| b.is_ascii_digit())
        && frac.bytes().all(|b| b.is_ascii_digit())
}

/// Exact `xs:decimal` value of a lexical form such as `-1.50`, `.5` or `3.`.
pub fn parse_decimal(s: &str) -> Result<Decimal, Error> {
    let t = s.trim();
    if !is_decimal_lexical(t) {
        return Err(invalid(s, AtomicType::Decimal));
    }
    let (sign, body) = match t.strip_prefix('-') {
        Some(body) => ("-", body),
        None => ("", t.strip_prefix('+').unwrap_or(t)),
    };
    let (int, frac) = body.split_once('.').unwrap_or((body, ""));
    let int = if int.is_empty() { "0" } else { int };
    let canonical = if frac.is_empty() { format!("{sign}{int}") } else { format!("{sign}{int}.{frac}") };
    canonical
        .parse::<Decimal>()
        .map(|d| d.normalize())
        .map_err(|_| Error::from_code(ErrorCode::FOCA0001, format!("{t} exceeds the xs:decimal range")))
}

fn parse_integer(s: &str) -> Result<i64, Error> {
    let t = s.trim();
    let body = t.strip_prefix(['+', '-']).unwrap_or(t);
    if body.is_empty() || !body.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid(s, AtomicType::Integer));
    }
    t.strip_prefix('+')
        .unwrap_or(t)
        .parse()
        .map_err(|_| Error::from_code(ErrorCode::FOAR0002, format!("integer {t} is out of range")))
}

fn parse_hex(s: &str) -> Option<Vec<u8>> {
    let s = s.trim();
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len()).step_by(2).map(|i| u8::from_str_radix(s.get(i..i + 2)?, 16).ok()).collect()
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn float_to_integer(d: f64) -> Result<i64, Error> {
    if d.is_nan() || d.is_infinite() {
        return Err(Error::from_code(ErrorCode::FOCA0002, format!("cannot convert {d} to xs:integer")));
    }
    let t = d.trunc();
    if t < i64::MIN as f64 || t >= i64::MAX as f64 {
        return Err(Error::from_code(ErrorCode::FOAR0002, format!("{d} is out of the xs:integer range")));
    }
    Ok(t as i64)
}

/// Prefixes resolvable when casting a string to `xs:QName`.
fn qname_namespace(prefix: &str, namespaces: Option<&HashMap<String, String>>) -> Option<String> {
    if let Some(uri) = namespaces.and_then(|ns| ns.get(prefix)) {
        return Some(uri.clone());
    }
    match prefix {
        "xs" => Some(XS.to_string()),
        "fn" => Some(FNS.to_string()),
        "xml" => Some(XML_URI.to_string()),
        _ => None,
    }
}

fn cast_string(
    s: &str,
    target: AtomicType,
    namespaces: Option<&HashMap<String, String>>,
) -> Result<XdmAtomicValue, Error> {
    let trimmed = s.trim();
    let value = match target {
        AtomicType::String => XdmAtomicValue::String(s.to_string()),
        AtomicType::UntypedAtomic => XdmAtomicValue::UntypedAtomic(s.to_string()),
        AtomicType::AnyUri => XdmAtomicValue::AnyUri(trimmed.to_string()),
        AtomicType::Boolean => match trimmed {
            "true" | "1" => XdmAtomicValue::Boolean(true),
            "false" | "0" => XdmAtomicValue::Boolean(false),
            _ => return Err(invalid(s, target)),
        },
        AtomicType::Integer => XdmAtomicValue::Integer(parse_integer(s)?),
        AtomicType::Decimal => XdmAtomicValue::Decimal(parse_decimal(s)?),
        AtomicType::Double => XdmAtomicValue::Double(parse_double(s).ok_or_else(|| invalid(s, target))?),
        #[allow(clippy::cast_possible_truncation)]
        AtomicType::Float => XdmAtomicValue::Float(parse_double(s).ok_or_else(|| invalid(s, target))? as f32),
        AtomicType::Date => {
            let (date, tz) = temporal::parse_date(s).ok_or_else(|| invalid(s, target))?;
            XdmAtomicValue::Date { date, tz }
        }
        AtomicType::DateTime => {
            let (value, tz) = temporal::parse_datetime(s).ok_or_else(|| invalid(s, target))?;
            XdmAtomicValue::DateTime { value, tz }
        }
        AtomicType::Time => {
            let (time, tz) = temporal::parse_time(s).ok_or_else(|| invalid(s, target))?;
            XdmAtomicValue::Time { time, tz }
        }
        AtomicType::Duration => {
            let (months, millis) = temporal::parse_duration(s).ok_or_else(|| invalid(s, target))?;
            XdmAtomicValue::Duration { months, millis }
        }
        AtomicType::DayTimeDuration => {
            XdmAtomicValue::DayTimeDuration(temporal::parse_day_time_duration(s).ok_or_else(|| invalid(s, target))?)
        }
        AtomicType::YearMonthDuration => XdmAtomicValue::YearMonthDuration(
            temporal::parse_year_month_duration(s).ok_or_else(|| invalid(s, target))?,
        ),
        AtomicType::Base64Binary => {
            let compact: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
            XdmAtomicValue::Base64Binary(
                base64::engine::general_purpose::STANDARD.decode(compact).map_err(|_| invalid(s, target))?,
            )
        }
        AtomicType::HexBinary => XdmAtomicValue::HexBinary(parse_hex(s).ok_or_else(|| invalid(s, target))?),
        AtomicType::QName => {
            let (prefix, local) = match trimmed.split_once(':') {
                Some((p, l)) => (Some(p), l),
                None => (None, trimmed),
            };
            if local.is_empty() || prefix.is_some_and(str::is_empty) {
                return Err(invalid(s, target));
            }
            let ns_uri = match prefix {
                Some(p) => Some(qname_namespace(p, namespaces).ok_or_else(|| {
                    Error::from_code(ErrorCode::FONS0004, format!("no namespace is bound to prefix {p}"))
                })?),
                None => None,
            };
            XdmAtomicValue::QName { ns_uri, prefix: prefix.map(str::to_string), local: local.to_string() }
        }
        AtomicType::AnyAtomicType => {
            return Err(Error::from_code(ErrorCode::XPST0080, "cannot cast to xs:anyAtomicType"));
        }
    };
    Ok(value)
}

/// Casts `value` to `target`.
pub fn cast(value: &XdmAtomicValue, target: AtomicType) -> Result<XdmAtomicValue, Error> {
    cast_with_namespaces(value, target, None)
}

/// Casts `value` to `target`, resolving QName prefixes against `namespaces`.
#[allow(clippy::too_many_lines, clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn cast_with_namespaces(
    value: &XdmAtomicValue,
    target: AtomicType,
    namespaces: Option<&HashMap<String, String>>,
) -> Result<XdmAtomicValue, Error> {
    use XdmAtomicValue as V;
    let source = value.atomic_type();
    if source == target {
        return Ok(value.clone());
    }
    match target {
        AtomicType::String => return Ok(V::String(value.to_string())),
        AtomicType::UntypedAtomic => return Ok(V::UntypedAtomic(value.to_string())),
        _ => {}
    }
    if let V::String(s) | V::UntypedAtomic(s) = value {
        return cast_string(s, target, namespaces);
    }
    let cast = match (value, target) {
        (V::Boolean(b), AtomicType::Integer) => V::Integer(i64::from(*b)),
        (V::Boolean(b), AtomicType::Decimal) => V::Decimal(Decimal::from(u8::from(*b))),
        (V::Boolean(b), AtomicType::Double) => V::Double(f64::from(u8::from(*b))),
        (V::Boolean(b), AtomicType::Float) => V::Float(f32::from(u8::from(*b))),
        (v, AtomicType::Boolean) if v.is_numeric() => {
            let d = v.as_f64().unwrap_or(f64::NAN);
            V::Boolean(d != 0.0 && !d.is_nan())
        }
        (V::Integer(i), AtomicType::Decimal) => V::Decimal(Decimal::from(*i)),
        (V::Decimal(d), AtomicType::Integer) => V::Integer(d.trunc().to_i64().ok_or_else(|| {
            Error::from_code(ErrorCode::FOAR0002, format!("{d} is out of the xs:integer range"))
        })?),
        (v, AtomicType::Integer) if v.is_numeric() => V::Integer(float_to_integer(v.as_f64().unwrap_or(f64::NAN))?),
        (v, AtomicType::Decimal) if v.is_numeric() => {
            let d = v.as_f64().unwrap_or(f64::NAN);
            if d.is_nan() || d.is_infinite() {
                return Err(Error::from_code(ErrorCode::FOCA0002, format!("cannot convert {v} to xs:decimal")));
            }
            V::Decimal(Decimal::from_f64(d).ok_or_else(|| {
                Error::from_code(ErrorCode::FOCA0001, format!("{v} exceeds the xs:decimal range"))
            })?)
        }
        (v, AtomicType::Double) if v.is_numeric() => V::Double(v.as_f64().unwrap_or(f64::NAN)),
        (v, AtomicType::Float) if v.is_numeric() => V::Float(v.as_f64().unwrap_or(f64::NAN) as f32),
        (V::Duration { millis, .. }, AtomicType::DayTimeDuration) => V::DayTimeDuration(*millis),
        (V::Duration { months, .. }, AtomicType::YearMonthDuration) => V::YearMonthDuration(*months),
        (V::DayTimeDuration(ms), AtomicType::Duration) => V::Duration { months: 0, millis: *ms },
        (V::YearMonthDuration(m), AtomicType::Duration) => V::Duration { months: *m, millis: 0 },
        (V::DayTimeDuration(_), AtomicType::YearMonthDuration) => V::YearMonthDuration(0),
        (V::YearMonthDuration(_), AtomicType::DayTimeDuration) => V::DayTimeDuration(0),
        (V::DateTime { value, tz }, AtomicType::Date) => V::Date { date: value.date(), tz: *tz },
        (V::DateTime { value, tz }, AtomicType::Time) => V::Time { time: value.time(), tz: *tz },
        (V::Date { date, tz }, AtomicType::DateTime) => V::DateTime { value: date.and_time(NaiveTime::MIN), tz: *tz },
        (V::Base64Binary(bytes), AtomicType::HexBinary) => V::HexBinary(bytes.clone()),
        (V::HexBinary(bytes), AtomicType::Base64Binary) => V::Base64Binary(bytes.clone()),
        (_, AtomicType::AnyAtomicType) => {
            return Err(Error::from_code(ErrorCode::XPST0080, "cannot cast to xs:anyAtomicType"));
        }
        _ => return Err(unsupported(source, target)),
    };
    Ok(cast)
}

pub fn castable(value: &XdmAtomicValue, target: AtomicType) -> bool {
    cast(value, target).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("12", AtomicType::Integer, XdmAtomicValue::Integer(12))]
    #[case(" +7 ", AtomicType::Integer, XdmAtomicValue::Integer(7))]
    #[case("1.50", AtomicType::Decimal, XdmAtomicValue::Decimal(Decimal::new(15, 1)))]
    #[case(" .5", AtomicType::Decimal, XdmAtomicValue::Decimal(Decimal::new(5, 1)))]
    #[case("-3.", AtomicType::Decimal, XdmAtomicValue::Decimal(Decimal::from(-3)))]
    #[case("1e2", AtomicType::Double, XdmAtomicValue::Double(100.0))]
    #[case("-INF", AtomicType::Double, XdmAtomicValue::Double(f64::NEG_INFINITY))]
    #[case("1", AtomicType::Boolean, XdmAtomicValue::Boolean(true))]
    #[case("P1Y2M", AtomicType::YearMonthDuration, XdmAtomicValue::YearMonthDuration(14))]
    #[case("0aFF", AtomicType::HexBinary, XdmAtomicValue::HexBinary(vec![0x0a, 0xff]))]
    fn strings_cast_to_typed_values(#[case] input: &str, #[case] target: AtomicType, #[case] expected: XdmAtomicValue) {
        let value = cast(&XdmAtomicValue::String(input.to_string()), target).expect("cast");
        assert_eq!(value, expected);
    }

    #[rstest]
    #[case("1e2", AtomicType::Decimal)]
    #[case("inf", AtomicType::Double)]
    #[case("yes", AtomicType::Boolean)]
    #[case("2024-13-01", AtomicType::Date)]
    #[case("abc", AtomicType::HexBinary)]
    fn invalid_lexical_forms_fail(#[case] input: &str, #[case] target: AtomicType) {
        let err = cast(&XdmAtomicValue::UntypedAtomic(input.to_string()), target).err().expect("error");
        assert_eq!(err.code_enum(), ErrorCode::FORG0001);
    }

    #[test]
    fn numeric_casts_truncate_and_check_range() {
        let truncated = cast(&XdmAtomicValue::Double(-2.7), AtomicType::Integer).expect("cast");
        assert_eq!(truncated, XdmAtomicValue::Integer(-2));
        let err = cast(&XdmAtomicValue::Double(f64::NAN), AtomicType::Integer).err().expect("error");
        assert_eq!(err.code_enum(), ErrorCode::FOCA0002);
        let err = cast(&XdmAtomicValue::Boolean(true), AtomicType::Date).err().expect("error");
        assert_eq!(err.code_enum(), ErrorCode::XPTY0004);
    }

    #[test]
    fn decimals_keep_every_digit() {
        let big = cast(&XdmAtomicValue::String("12345678901234567890.123456789".into()), AtomicType::Decimal);
        assert_eq!(big.expect("cast").to_string(), "12345678901234567890.123456789");
        let whole = XdmAtomicValue::Decimal("9007199254740993.9".parse().expect("decimal"));
        assert_eq!(cast(&whole, AtomicType::Integer).expect("cast"), XdmAtomicValue::Integer(9_007_199_254_740_993));
        let err = cast(&XdmAtomicValue::String("1".repeat(40)), AtomicType::Decimal).err().expect("error");
        assert_eq!(err.code_enum(), ErrorCode::FOCA0001);
    }

    #[test]
    fn qname_prefixes_must_be_bound() {
        let value = cast(&XdmAtomicValue::String("xs:int".into()), AtomicType::QName).expect("cast");
        assert!(matches!(value, XdmAtomicValue::QName { ns_uri: Some(ref ns), .. } if ns == XS));
        let err = cast(&XdmAtomicValue::String("zz:int".into()), AtomicType::QName).err().expect("error");
        assert_eq!(err.code_enum(), ErrorCode::FONS0004);
    }
}
