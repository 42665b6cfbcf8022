//! `xs:*` constructor functions.
//!
//! Primitive types cast directly. Derived types are validated against their
//! facets and the value keeps the primitive type it derives from.

use super::{CallCtx, optional_atomic};
use crate::error::{Error, ErrorCode};
use crate::eval::casting::cast_with_namespaces;
use crate::xdm::{AtomicType, XdmAtomicValue, XdmItem, XdmSequence};

pub const DERIVED_TYPES: &[&str] = &[
    "int",
    "long",
    "short",
    "byte",
    "nonNegativeInteger",
    "positiveInteger",
    "nonPositiveInteger",
    "negativeInteger",
    "unsignedLong",
    "unsignedInt",
    "unsignedShort",
    "unsignedByte",
    "normalizedString",
    "token",
    "language",
    "Name",
    "NCName",
    "NMTOKEN",
    "ID",
    "IDREF",
    "ENTITY",
];

pub fn construct<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    let Some(local) = ctx.function_name().map(|n| n.local.clone()) else {
        return Err(Error::type_error("constructor called outside a function call"));
    };
    let Some(value) = optional_atomic(ctx, &args[0])? else {
        return Ok(Vec::new());
    };
    let namespaces = Some(ctx.context.namespaces());
    let result = match AtomicType::from_local(&local) {
        Some(target) => cast_with_namespaces(&value, target, namespaces)?,
        None => derived(&local, &value, namespaces)?,
    };
    Ok(vec![XdmItem::Atomic(result)])
}

fn invalid(value: &XdmAtomicValue, ty: &str) -> Error {
    Error::from_code(ErrorCode::FORG0001, format!("{value} is not a valid xs:{ty}"))
}

fn integer_range(ty: &str) -> Option<(i64, i64)> {
    let range = match ty {
        "int" => (i64::from(i32::MIN), i64::from(i32::MAX)),
        "long" => (i64::MIN, i64::MAX),
        "short" => (i64::from(i16::MIN), i64::from(i16::MAX)),
        "byte" => (i64::from(i8::MIN), i64::from(i8::MAX)),
        "nonNegativeInteger" | "unsignedLong" => (0, i64::MAX),
        "positiveInteger" => (1, i64::MAX),
        "nonPositiveInteger" => (i64::MIN, 0),
        "negativeInteger" => (i64::MIN, -1),
        "unsignedInt" => (0, i64::from(u32::MAX)),
        "unsignedShort" => (0, i64::from(u16::MAX)),
        "unsignedByte" => (0, i64::from(u8::MAX)),
        _ => return None,
    };
    Some(range)
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == ':'
}

fn is_name_char(c: char) -> bool {
    is_name_start(c) || c.is_numeric() || matches!(c, '-' | '.' | '\u{B7}')
}

fn is_name(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next().is_some_and(is_name_start) && chars.all(is_name_char)
}

fn is_language(s: &str) -> bool {
    let mut parts = s.split('-');
    let primary = parts.next().unwrap_or_default();
    let valid_part = |p: &str, alpha_only: bool| {
        (1..=8).contains(&p.len())
            && p.chars().all(|c| if alpha_only { c.is_ascii_alphabetic() } else { c.is_ascii_alphanumeric() })
    };
    valid_part(primary, true) && parts.all(|p| valid_part(p, false))
}

fn derived(
    ty: &str,
    value: &XdmAtomicValue,
    namespaces: Option<&std::collections::HashMap<String, String>>,
) -> Result<XdmAtomicValue, Error> {
    if let Some((min, max)) = integer_range(ty) {
        let integer = cast_with_namespaces(value, AtomicType::Integer, namespaces)?;
        return match integer {
            XdmAtomicValue::Integer(i) if (min..=max).contains(&i) => Ok(integer),
            _ => Err(invalid(value, ty)),
        };
    }
    let XdmAtomicValue::String(s) = cast_with_namespaces(value, AtomicType::String, namespaces)? else {
        return Err(invalid(value, ty));
    };
    let normalized: String = s.chars().map(|c| if matches!(c, '\t' | '\n' | '\r') { ' ' } else { c }).collect();
    if ty == "normalizedString" {
        return Ok(XdmAtomicValue::String(normalized));
    }
    let token = normalized.split(' ').filter(|w| !w.is_empty()).collect::<Vec<_>>().join(" ");
    let valid = match ty {
        "token" => true,
        "language" => is_language(&token),
        "Name" => is_name(&token),
        "NCName" | "ID" | "IDREF" | "ENTITY" => is_name(&token) && !token.contains(':'),
        "NMTOKEN" => !token.is_empty() && token.chars().all(is_name_char),
        other => {
            return Err(Error::from_code(ErrorCode::XPST0051, format!("unknown type xs:{other}")));
        }
    };
    if valid { Ok(XdmAtomicValue::String(token)) } else { Err(invalid(value, ty)) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("byte", "127", true)]
    #[case("byte", "128", false)]
    #[case("unsignedInt", "-1", false)]
    #[case("positiveInteger", "0", false)]
    #[case("NCName", "a:b", false)]
    #[case("Name", "a:b", true)]
    #[case("language", "en-US", true)]
    #[case("language", "toolongprimary-x", false)]
    #[case("NMTOKEN", "1abc", true)]
    fn facets(#[case] ty: &str, #[case] input: &str, #[case] valid: bool) {
        let value = XdmAtomicValue::String(input.to_string());
        assert_eq!(derived(ty, &value, None).is_ok(), valid, "{ty}({input})");
    }

    #[test]
    fn token_collapses_whitespace() {
        let value = XdmAtomicValue::String("  a \t b\n".to_string());
        assert_eq!(derived("token", &value, None).expect("token"), XdmAtomicValue::String("a b".to_string()));
    }
}
