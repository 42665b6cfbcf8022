//! The XPath data model: names, atomic values, items and sequences.

pub mod temporal;

use crate::consts::XS;
use crate::error::{Error, ErrorCode};
use crate::tree::NodeRef;
use base64::Engine as _;
use chrono::{FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use core::fmt;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExpandedName {
    pub ns_uri: Option<String>,
    pub local: String,
}

impl ExpandedName {
    pub fn new(ns_uri: Option<String>, local: impl Into<String>) -> Self {
        Self { ns_uri, local: local.into() }
    }

    pub fn local(local: impl Into<String>) -> Self {
        Self::new(None, local)
    }

    pub fn xs(local: impl Into<String>) -> Self {
        Self::new(Some(XS.to_string()), local)
    }
}

impl fmt::Display for ExpandedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ns_uri {
            Some(ns) => write!(f, "Q{{{ns}}}{}", self.local),
            None => f.write_str(&self.local),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QName {
    pub prefix: Option<String>,
    pub local: String,
    pub ns_uri: Option<String>,
}

impl QName {
    pub fn expanded(&self) -> ExpandedName {
        ExpandedName::new(self.ns_uri.clone(), self.local.clone())
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prefix {
            Some(p) if !p.is_empty() => write!(f, "{p}:{}", self.local),
            _ => f.write_str(&self.local),
        }
    }
}

/// Built-in atomic types known to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtomicType {
    AnyAtomicType,
    UntypedAtomic,
    String,
    AnyUri,
    Boolean,
    Decimal,
    Integer,
    Double,
    Float,
    QName,
    Date,
    DateTime,
    Time,
    Duration,
    DayTimeDuration,
    YearMonthDuration,
    Base64Binary,
    HexBinary,
}

impl AtomicType {
    pub const ALL: [AtomicType; 18] = [
        AtomicType::AnyAtomicType,
        AtomicType::UntypedAtomic,
        AtomicType::String,
        AtomicType::AnyUri,
        AtomicType::Boolean,
        AtomicType::Decimal,
        AtomicType::Integer,
        AtomicType::Double,
        AtomicType::Float,
        AtomicType::QName,
        AtomicType::Date,
        AtomicType::DateTime,
        AtomicType::Time,
        AtomicType::Duration,
        AtomicType::DayTimeDuration,
        AtomicType::YearMonthDuration,
        AtomicType::Base64Binary,
        AtomicType::HexBinary,
    ];

    pub fn local_name(self) -> &'static str {
        match self {
            AtomicType::AnyAtomicType => "anyAtomicType",
            AtomicType::UntypedAtomic => "untypedAtomic",
            AtomicType::String => "string",
            AtomicType::AnyUri => "anyURI",
            AtomicType::Boolean => "boolean",
            AtomicType::Decimal => "decimal",
            AtomicType::Integer => "integer",
            AtomicType::Double => "double",
            AtomicType::Float => "float",
            AtomicType::QName => "QName",
            AtomicType::Date => "date",
            AtomicType::DateTime => "dateTime",
            AtomicType::Time => "time",
            AtomicType::Duration => "duration",
            AtomicType::DayTimeDuration => "dayTimeDuration",
            AtomicType::YearMonthDuration => "yearMonthDuration",
            AtomicType::Base64Binary => "base64Binary",
            AtomicType::HexBinary => "hexBinary",
        }
    }

    pub fn from_local(local: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.local_name() == local)
    }

    /// Resolves an expanded name in the XML Schema namespace.
    pub fn from_name(name: &ExpandedName) -> Option<Self> {
        if name.ns_uri.as_deref() == Some(XS) { Self::from_local(&name.local) } else { None }
    }

    pub fn name(self) -> ExpandedName {
        ExpandedName::xs(self.local_name())
    }

    pub fn parent(self) -> Option<Self> {
        match self {
            AtomicType::AnyAtomicType => None,
            AtomicType::Integer => Some(AtomicType::Decimal),
            AtomicType::DayTimeDuration | AtomicType::YearMonthDuration => Some(AtomicType::Duration),
            _ => Some(AtomicType::AnyAtomicType),
        }
    }

    pub fn derives_from(self, other: AtomicType) -> bool {
        let mut current = Some(self);
        while let Some(t) = current {
            if t == other {
                return true;
            }
            current = t.parent();
        }
        false
    }

    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            AtomicType::Decimal | AtomicType::Integer | AtomicType::Double | AtomicType::Float
        )
    }

    /// Abstract types cannot be the target of a cast.
    pub fn is_abstract(self) -> bool {
        matches!(self, AtomicType::AnyAtomicType)
    }

    /// A representative value used when evaluating against a schema instead of instance data.
    pub fn sample_value(self) -> XdmAtomicValue {
        match self {
            AtomicType::AnyAtomicType | AtomicType::UntypedAtomic => {
                XdmAtomicValue::UntypedAtomic(String::new())
            }
            AtomicType::String => XdmAtomicValue::String(String::new()),
            AtomicType::AnyUri => XdmAtomicValue::AnyUri(String::new()),
            AtomicType::Boolean => XdmAtomicValue::Boolean(true),
            AtomicType::Decimal => XdmAtomicValue::Decimal(Decimal::ONE),
            AtomicType::Integer => XdmAtomicValue::Integer(1),
            AtomicType::Double => XdmAtomicValue::Double(1.0),
            AtomicType::Float => XdmAtomicValue::Float(1.0),
            AtomicType::QName => XdmAtomicValue::QName {
                ns_uri: Some(XS.to_string()),
                prefix: Some("xs".to_string()),
                local: "anyType".to_string(),
            },
            AtomicType::Date => XdmAtomicValue::Date { date: SAMPLE_DATE, tz: None },
            AtomicType::DateTime => XdmAtomicValue::DateTime {
                value: SAMPLE_DATE.and_time(NaiveTime::MIN),
                tz: None,
            },
            AtomicType::Time => XdmAtomicValue::Time { time: NaiveTime::MIN, tz: None },
            AtomicType::Duration => XdmAtomicValue::Duration { months: 0, millis: 0 },
            AtomicType::DayTimeDuration => XdmAtomicValue::DayTimeDuration(0),
            AtomicType::YearMonthDuration => XdmAtomicValue::YearMonthDuration(0),
            AtomicType::Base64Binary => XdmAtomicValue::Base64Binary(Vec::new()),
            AtomicType::HexBinary => XdmAtomicValue::HexBinary(Vec::new()),
        }
    }
}

impl fmt::Display for AtomicType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "xs:{}", self.local_name())
    }
}

const SAMPLE_DATE: NaiveDate = match NaiveDate::from_ymd_opt(2000, 1, 1) {
    Some(d) => d,
    None => NaiveDate::MIN,
};

#[derive(Debug, Clone, PartialEq)]
pub enum XdmAtomicValue {
    UntypedAtomic(String),
    String(String),
    AnyUri(String),
    Boolean(bool),
    Integer(i64),
    Decimal(Decimal),
    Double(f64),
    Float(f32),
    QName {
        ns_uri: Option<String>,
        prefix: Option<String>,
        local: String,
    },
    Date {
        date: NaiveDate,
        tz: Option<FixedOffset>,
    },
    DateTime {
        value: NaiveDateTime,
        tz: Option<FixedOffset>,
    },
    Time {
        time: NaiveTime,
        tz: Option<FixedOffset>,
    },
    Duration {
        months: i32,
        millis: i64,
    },
    /// Milliseconds.
    DayTimeDuration(i64),
    /// Months.
    YearMonthDuration(i32),
    Base64Binary(Vec<u8>),
    HexBinary(Vec<u8>),
}

impl XdmAtomicValue {
    pub fn atomic_type(&self) -> AtomicType {
        match self {
            XdmAtomicValue::UntypedAtomic(_) => AtomicType::UntypedAtomic,
            XdmAtomicValue::String(_) => AtomicType::String,
            XdmAtomicValue::AnyUri(_) => AtomicType::AnyUri,
            XdmAtomicValue::Boolean(_) => AtomicType::Boolean,
            XdmAtomicValue::Integer(_) => AtomicType::Integer,
            XdmAtomicValue::Decimal(_) => AtomicType::Decimal,
            XdmAtomicValue::Double(_) => AtomicType::Double,
            XdmAtomicValue::Float(_) => AtomicType::Float,
            XdmAtomicValue::QName { .. } => AtomicType::QName,
            XdmAtomicValue::Date { .. } => AtomicType::Date,
            XdmAtomicValue::DateTime { .. } => AtomicType::DateTime,
            XdmAtomicValue::Time { .. } => AtomicType::Time,
            XdmAtomicValue::Duration { .. } => AtomicType::Duration,
            XdmAtomicValue::DayTimeDuration(_) => AtomicType::DayTimeDuration,
            XdmAtomicValue::YearMonthDuration(_) => AtomicType::YearMonthDuration,
            XdmAtomicValue::Base64Binary(_) => AtomicType::Base64Binary,
            XdmAtomicValue::HexBinary(_) => AtomicType::HexBinary,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.atomic_type().is_numeric()
    }

    /// String, untypedAtomic and anyURI compare as strings.
    pub fn is_string_like(&self) -> bool {
        matches!(
            self,
            XdmAtomicValue::String(_) | XdmAtomicValue::UntypedAtomic(_) | XdmAtomicValue::AnyUri(_)
        )
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            XdmAtomicValue::Integer(i) => Some(*i as f64),
            XdmAtomicValue::Decimal(d) => d.to_f64(),
            XdmAtomicValue::Double(d) => Some(*d),
            XdmAtomicValue::Float(f) => Some(f64::from(*f)),
            _ => None,
        }
    }

    /// Exact value of an xs:decimal or xs:integer.
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            XdmAtomicValue::Integer(i) => Some(Decimal::from(*i)),
            XdmAtomicValue::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            XdmAtomicValue::String(s) | XdmAtomicValue::UntypedAtomic(s) | XdmAtomicValue::AnyUri(s) => {
                Some(s)
            }
            _ => None,
        }
    }
}

/// Canonical lexical representation (the XPath 2.0+ string value).
impl fmt::Display for XdmAtomicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XdmAtomicValue::UntypedAtomic(s) | XdmAtomicValue::String(s) | XdmAtomicValue::AnyUri(s) => {
                f.write_str(s)
            }
            XdmAtomicValue::Boolean(b) => write!(f, "{b}"),
            XdmAtomicValue::Integer(i) => write!(f, "{i}"),
            XdmAtomicValue::Decimal(d) => write!(f, "{}", d.normalize()),
            XdmAtomicValue::Double(d) => f.write_str(&format_double(*d)),
            XdmAtomicValue::Float(v) => f.write_str(&format_double(f64::from(*v))),
            XdmAtomicValue::QName { prefix, local, .. } => match prefix {
                Some(p) if !p.is_empty() => write!(f, "{p}:{local}"),
                _ => f.write_str(local),
            },
            XdmAtomicValue::Date { date, tz } => f.write_str(&temporal::format_date(*date, *tz)),
            XdmAtomicValue::DateTime { value, tz } => {
                f.write_str(&temporal::format_datetime(*value, *tz))
            }
            XdmAtomicValue::Time { time, tz } => f.write_str(&temporal::format_time(*time, *tz)),
            XdmAtomicValue::Duration { months, millis } => {
                f.write_str(&temporal::format_duration(*months, *millis))
            }
            XdmAtomicValue::DayTimeDuration(ms) => f.write_str(&temporal::format_duration(0, *ms)),
            XdmAtomicValue::YearMonthDuration(m) => {
                f.write_str(&temporal::format_year_month_duration(*m))
            }
            XdmAtomicValue::Base64Binary(bytes) => {
                f.write_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
            }
            XdmAtomicValue::HexBinary(bytes) => {
                for b in bytes {
                    write!(f, "{b:02X}")?;
                }
                Ok(())
            }
        }
    }
}

/// Decimal notation of a double, without exponent and without trailing zeros.
pub fn format_decimal(d: f64) -> String {
    if d == 0.0 {
        return "0".to_string();
    }
    let s = format!("{d}");
    if s.contains('.') { s.trim_end_matches('0').trim_end_matches('.').to_string() } else { s }
}

/// Canonical `xs:double` lexical form.
pub fn format_double(d: f64) -> String {
    if d.is_nan() {
        return "NaN".to_string();
    }
    if d.is_infinite() {
        return if d > 0.0 { "INF".to_string() } else { "-INF".to_string() };
    }
    if d == 0.0 {
        return if d.is_sign_negative() { "-0".to_string() } else { "0".to_string() };
    }
    let abs = d.abs();
    if (1e-6..1e6).contains(&abs) {
        return format_decimal(d);
    }
    let s = format!("{d:E}");
    match s.split_once('E') {
        Some((mantissa, exp)) if !mantissa.contains('.') => format!("{mantissa}.0E{exp}"),
        _ => s,
    }
}

/// XPath 1.0 number-to-string conversion.
pub fn format_number_v1(d: f64) -> String {
    if d.is_nan() {
        "NaN".to_string()
    } else if d.is_infinite() {
        if d > 0.0 { "Infinity".to_string() } else { "-Infinity".to_string() }
    } else {
        format_decimal(d)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct XdmMap<'a> {
    entries: Arc<Vec<(XdmAtomicValue, XdmSequence<'a>)>>,
}

impl<'a> XdmMap<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a map; duplicate keys are rejected.
    pub fn from_entries(entries: Vec<(XdmAtomicValue, XdmSequence<'a>)>) -> Result<Self, Error> {
        for (i, (key, _)) in entries.iter().enumerate() {
            if entries[..i].iter().any(|(k, _)| same_key(k, key)) {
                return Err(Error::from_code(
                    ErrorCode::XQDY0137,
                    format!("duplicate key {key} in map constructor"),
                ));
            }
        }
        Ok(Self { entries: Arc::new(entries) })
    }

    pub fn get(&self, key: &XdmAtomicValue) -> Option<&XdmSequence<'a>> {
        self.entries.iter().find(|(k, _)| same_key(k, key)).map(|(_, v)| v)
    }

    pub fn contains(&self, key: &XdmAtomicValue) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &XdmAtomicValue> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn entries(&self) -> impl Iterator<Item = &(XdmAtomicValue, XdmSequence<'a>)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct XdmArray<'a> {
    members: Arc<Vec<XdmSequence<'a>>>,
}

impl<'a> XdmArray<'a> {
    pub fn new(members: Vec<XdmSequence<'a>>) -> Self {
        Self { members: Arc::new(members) }
    }

    /// 1-based member access.
    pub fn get(&self, index: i64) -> Result<&XdmSequence<'a>, Error> {
        usize::try_from(index)
            .ok()
            .and_then(|i| i.checked_sub(1))
            .and_then(|i| self.members.get(i))
            .ok_or_else(|| {
                Error::from_code(
                    ErrorCode::FOAY0001,
                    format!("array index {index} out of bounds (1..{})", self.members.len()),
                )
            })
    }

    pub fn members(&self) -> &[XdmSequence<'a>] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Map key equality: numbers by value (NaN equals NaN), strings by codepoints.
pub fn same_key(a: &XdmAtomicValue, b: &XdmAtomicValue) -> bool {
    if let (Some(x), Some(y)) = (a.as_decimal(), b.as_decimal()) {
        return x == y;
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y || (x.is_nan() && y.is_nan()),
        (None, None) => match (a.as_str(), b.as_str()) {
            (Some(x), Some(y)) => x == y,
            (None, None) => a == b,
            _ => false,
        },
        _ => false,
    }
}

pub type XdmSequence<'a> = Vec<XdmItem<'a>>;

#[derive(Debug, Clone, PartialEq)]
pub enum XdmItem<'a> {
    Node(NodeRef<'a>),
    Atomic(XdmAtomicValue),
    Map(XdmMap<'a>),
    Array(XdmArray<'a>),
}

impl<'a> XdmItem<'a> {
    pub fn as_node(&self) -> Option<NodeRef<'a>> {
        match self {
            XdmItem::Node(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_atomic(&self) -> Option<&XdmAtomicValue> {
        match self {
            XdmItem::Atomic(a) => Some(a),
            _ => None,
        }
    }
}

impl<'a> From<NodeRef<'a>> for XdmItem<'a> {
    fn from(n: NodeRef<'a>) -> Self {
        XdmItem::Node(n)
    }
}

impl From<XdmAtomicValue> for XdmItem<'_> {
    fn from(a: XdmAtomicValue) -> Self {
        XdmItem::Atomic(a)
    }
}

impl fmt::Display for XdmItem<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XdmItem::Node(n) => write!(f, "{n}"),
            XdmItem::Atomic(a) => write!(f, "{a}"),
            XdmItem::Map(m) => write!(f, "map{{{} entries}}", m.len()),
            XdmItem::Array(a) => write!(f, "array{{{} members}}", a.len()),
        }
    }
}

/// Effective boolean value of a sequence.
pub fn effective_boolean_value(seq: &[XdmItem<'_>]) -> Result<bool, Error> {
    let Some(first) = seq.first() else {
        return Ok(false);
    };
    match first {
        XdmItem::Node(_) => Ok(true),
        XdmItem::Atomic(a) if seq.len() == 1 => match a {
            XdmAtomicValue::Boolean(b) => Ok(*b),
            XdmAtomicValue::String(s) | XdmAtomicValue::UntypedAtomic(s) | XdmAtomicValue::AnyUri(s) => {
                Ok(!s.is_empty())
            }
            XdmAtomicValue::Integer(i) => Ok(*i != 0),
            XdmAtomicValue::Decimal(d) => Ok(!d.is_zero()),
            XdmAtomicValue::Double(d) => Ok(*d != 0.0 && !d.is_nan()),
            XdmAtomicValue::Float(v) => Ok(*v != 0.0 && !v.is_nan()),
            other => Err(Error::from_code(
                ErrorCode::FORG0006,
                format!("effective boolean value is not defined for {}", other.atomic_type()),
            )),
        },
        _ => Err(Error::from_code(
            ErrorCode::FORG0006,
            "effective boolean value is not defined for this sequence",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_canonical_form() {
        assert_eq!(format_double(3.0), "3");
        assert_eq!(format_double(0.5), "0.5");
        assert_eq!(format_double(1e6), "1.0E6");
        assert_eq!(format_double(1.5e-7), "1.5E-7");
        assert_eq!(format_double(f64::NEG_INFINITY), "-INF");
        assert_eq!(format_number_v1(f64::INFINITY), "Infinity");
        assert_eq!(format_decimal(2.50), "2.5");
    }

    #[test]
    fn decimals_print_exactly() {
        let d = |s: &str| XdmAtomicValue::Decimal(s.parse().expect("decimal"));
        assert_eq!(d("0.30").to_string(), "0.3");
        assert_eq!(d("-12.000").to_string(), "-12");
        assert_eq!(d("9223372036854775808").to_string(), "9223372036854775808");
    }

    #[test]
    fn integer_derives_from_decimal() {
        assert!(AtomicType::Integer.derives_from(AtomicType::Decimal));
        assert!(AtomicType::DayTimeDuration.derives_from(AtomicType::AnyAtomicType));
        assert!(!AtomicType::Double.derives_from(AtomicType::Decimal));
    }

    #[test]
    fn map_keys_compare_numerically() {
        let map = XdmMap::from_entries(vec![(XdmAtomicValue::Integer(1), vec![])]).expect("map");
        assert!(map.contains(&XdmAtomicValue::Double(1.0)));
        assert!(!map.contains(&XdmAtomicValue::String("1".into())));
        assert!(
            XdmMap::from_entries(vec![
                (XdmAtomicValue::Integer(1), vec![]),
                (XdmAtomicValue::Decimal(Decimal::ONE), vec![])
            ])
            .is_err()
        );
    }
}
