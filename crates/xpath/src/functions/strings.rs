//! String functions, regular expressions, URIs and serialization.

use super::{
    CallCtx, arg_or_context, bool_seq, count_seq, integer_seq, optional_item, optional_string_arg, string_arg,
    string_seq,
};
use crate::error::{Error, ErrorCode};
use crate::eval;
use crate::serialize::{SerializationMethod, SerializationParams};
use crate::xdm::{XdmAtomicValue, XdmItem, XdmSequence};
use std::cmp::Ordering;
use unicode_normalization::UnicodeNormalization;

pub fn string<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    let seq = arg_or_context(ctx, args, 0)?;
    Ok(string_seq(string_arg(ctx, &seq)?))
}

pub fn concat<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    let mut out = String::new();
    for arg in args {
        if let Some(s) = optional_string_arg(ctx, arg)? {
            out.push_str(&s);
        }
    }
    Ok(string_seq(out))
}

/// Applies a collation-aware predicate to the first two string arguments.
fn collated_test<'a>(
    ctx: &CallCtx<'_, 'a>,
    args: &[XdmSequence<'a>],
    test: impl Fn(&crate::collation::CollationManager, &str, &str) -> bool,
) -> Result<XdmSequence<'a>, Error> {
    let a = string_arg(ctx, &args[0])?;
    let b = string_arg(ctx, &args[1])?;
    if b.is_empty() {
        return Ok(bool_seq(true));
    }
    let collation = ctx.collation(args.get(2))?;
    Ok(bool_seq(test(&collation, &a, &b)))
}

pub fn starts_with<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    collated_test(ctx, args, |c, a, b| c.starts_with(a, b))
}

pub fn ends_with<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    collated_test(ctx, args, |c, a, b| c.ends_with(a, b))
}

pub fn contains<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    collated_test(ctx, args, |c, a, b| c.contains(a, b))
}

pub fn substring_before<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    let a = string_arg(ctx, &args[0])?;
    let b = string_arg(ctx, &args[1])?;
    let collation = ctx.collation(args.get(2))?;
    Ok(string_seq(collation.find(&a, &b).map_or("", |(start, _)| &a[..start])))
}

pub fn substring_after<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    let a = string_arg(ctx, &args[0])?;
    let b = string_arg(ctx, &args[1])?;
    let collation = ctx.collation(args.get(2))?;
    Ok(string_seq(collation.find(&a, &b).map_or("", |(_, end)| &a[end..])))
}

fn round_half_up(x: f64) -> f64 {
    (x + 0.5).floor()
}

/// Characters at positions `p` with `round(start) <= p < round(start) + round(length)`.
pub fn substring<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    let s = string_arg(ctx, &args[0])?;
    let start = round_half_up(eval::sequence_number(&args[1], ctx.version())?);
    let end = match args.get(2) {
        Some(len) => start + round_half_up(eval::sequence_number(len, ctx.version())?),
        None => f64::INFINITY,
    };
    #[allow(clippy::cast_precision_loss)]
    let out: String = s
        .chars()
        .enumerate()
        .filter(|(i, _)| {
            let p = (*i + 1) as f64;
            p >= start && p < end
        })
        .map(|(_, c)| c)
        .collect();
    Ok(string_seq(out))
}

pub fn string_length<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    let seq = arg_or_context(ctx, args, 0)?;
    Ok(count_seq(string_arg(ctx, &seq)?.chars().count()))
}

pub fn normalize_space<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    let seq = arg_or_context(ctx, args, 0)?;
    let s = string_arg(ctx, &seq)?;
    let words: Vec<&str> =
        s.split(|c| matches!(c, ' ' | '\t' | '\n' | '\r')).filter(|w| !w.is_empty()).collect();
    Ok(string_seq(words.join(" ")))
}

pub fn translate<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    let s = string_arg(ctx, &args[0])?;
    let from: Vec<char> = string_arg(ctx, &args[1])?.chars().collect();
    let to: Vec<char> = string_arg(ctx, &args[2])?.chars().collect();
    let out: String = s
        .chars()
        .filter_map(|c| match from.iter().position(|f| *f == c) {
            Some(i) => to.get(i).copied(),
            None => Some(c),
        })
        .collect();
    Ok(string_seq(out))
}

pub fn string_join<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    let separator = match args.get(1) {
        Some(sep) => string_arg(ctx, sep)?,
        None => String::new(),
    };
    let parts = args[0].iter().map(|i| eval::item_string(i, ctx.version())).collect::<Result<Vec<_>, _>>()?;
    Ok(string_seq(parts.join(&separator)))
}

pub fn upper_case<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    Ok(string_seq(string_arg(ctx, &args[0])?.to_uppercase()))
}

pub fn lower_case<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    Ok(string_seq(string_arg(ctx, &args[0])?.to_lowercase()))
}

pub fn compare<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    let (Some(a), Some(b)) = (optional_string_arg(ctx, &args[0])?, optional_string_arg(ctx, &args[1])?) else {
        return Ok(Vec::new());
    };
    let collation = ctx.collation(args.get(2))?;
    let result = match collation.compare(&a, &b) {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    };
    Ok(integer_seq(result))
}

pub fn codepoints_to_string<'a>(_ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    let mut out = String::new();
    for value in eval::atomize(&args[0])? {
        let XdmAtomicValue::Integer(cp) = value else {
            return Err(Error::type_error(format!("codepoints must be integers, got {}", value.atomic_type())));
        };
        let c = u32::try_from(cp)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| Error::from_code(ErrorCode::FOCH0001, format!("{cp} is not a valid codepoint")))?;
        out.push(c);
    }
    Ok(string_seq(out))
}

pub fn string_to_codepoints<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    let s = string_arg(ctx, &args[0])?;
    Ok(s.chars().map(|c| XdmItem::Atomic(XdmAtomicValue::Integer(i64::from(u32::from(c))))).collect())
}

fn flags<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>], index: usize) -> Result<String, Error> {
    match args.get(index) {
        Some(seq) => string_arg(ctx, seq),
        None => Ok(String::new()),
    }
}

pub fn matches<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    let input = string_arg(ctx, &args[0])?;
    let pattern = string_arg(ctx, &args[1])?;
    let flags = flags(ctx, args, 2)?;
    Ok(bool_seq(ctx.context.env.regex.matches(&pattern, &flags, &input)?))
}

pub fn replace<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    let input = string_arg(ctx, &args[0])?;
    let pattern = string_arg(ctx, &args[1])?;
    let replacement = string_arg(ctx, &args[2])?;
    let flags = flags(ctx, args, 3)?;
    Ok(string_seq(ctx.context.env.regex.replace(&pattern, &flags, &input, &replacement)?))
}

pub fn tokenize<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    let input = string_arg(ctx, &args[0])?;
    let pattern = string_arg(ctx, &args[1])?;
    let flags = flags(ctx, args, 2)?;
    let tokens = ctx.context.env.regex.tokenize(&pattern, &flags, &input)?;
    if input.is_empty() {
        return Ok(Vec::new());
    }
    Ok(tokens.into_iter().map(|t| XdmItem::Atomic(XdmAtomicValue::String(t))).collect())
}

pub fn normalize_unicode<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    let s = string_arg(ctx, &args[0])?;
    let form = match args.get(1) {
        Some(seq) => string_arg(ctx, seq)?.trim().to_uppercase(),
        None => "NFC".to_string(),
    };
    let out = match form.as_str() {
        "" => s,
        "NFC" => s.nfc().collect(),
        "NFD" => s.nfd().collect(),
        "NFKC" => s.nfkc().collect(),
        "NFKD" => s.nfkd().collect(),
        other => {
            return Err(Error::from_code(ErrorCode::FOCH0003, format!("unsupported normalization form {other}")));
        }
    };
    Ok(string_seq(out))
}

/// Resolves a relative URI against the given base or the static base URI.
pub fn resolve_uri<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    let Some(relative) = optional_string_arg(ctx, &args[0])? else {
        return Ok(Vec::new());
    };
    let any_uri = |s: String| vec![XdmItem::Atomic(XdmAtomicValue::AnyUri(s))];
    if url::Url::parse(&relative).is_ok() {
        return Ok(any_uri(relative));
    }
    let base = match args.get(1) {
        Some(seq) => Some(string_arg(ctx, seq)?),
        None => ctx.context.env.base_uri.clone(),
    };
    let Some(base) = base else {
        return Err(Error::from_code(ErrorCode::FORG0002, format!("no base URI to resolve {relative} against")));
    };
    let resolved = url::Url::parse(&base)
        .and_then(|b| b.join(&relative))
        .map_err(|e| Error::from_code(ErrorCode::FORG0002, format!("cannot resolve {relative} against {base}: {e}")))?;
    Ok(any_uri(resolved.into()))
}

fn parameter_value(name: &str, value: &str, params: &mut SerializationParams) -> Result<(), Error> {
    let flag = || match value.trim() {
        "yes" | "true" | "1" => Ok(true),
        "no" | "false" | "0" => Ok(false),
        other => Err(Error::from_code(ErrorCode::SENR0001, format!("invalid value {other:?} for {name}"))),
    };
    match name {
        "method" => {
            params.method = match value.trim() {
                "xml" => SerializationMethod::Xml,
                "text" => SerializationMethod::Text,
                other => {
                    return Err(Error::from_code(ErrorCode::SENR0001, format!("unsupported output method {other}")));
                }
            };
        }
        "indent" => params.indent = flag()?,
        "omit-xml-declaration" => params.omit_xml_declaration = flag()?,
        other => tracing::debug!(parameter = other, "ignoring serialization parameter"),
    }
    Ok(())
}

/// Reads parameters from a map or an `output:serialization-parameters`
/// element whose children carry a `value` attribute.
fn serialization_params<'a>(
    ctx: &CallCtx<'_, 'a>,
    arg: Option<&XdmSequence<'a>>,
) -> Result<SerializationParams, Error> {
    let mut params = SerializationParams::default();
    let Some(item) = arg.map(|seq| optional_item(ctx, seq)).transpose()?.flatten() else {
        return Ok(params);
    };
    match item {
        XdmItem::Map(map) => {
            for (key, value) in map.entries() {
                let value = value.iter().map(|i| eval::item_string(i, ctx.version())).collect::<Result<Vec<_>, _>>()?;
                parameter_value(&key.to_string(), &value.join(" "), &mut params)?;
            }
        }
        XdmItem::Node(node) => {
            for child in node.children().filter(|c| c.name().is_some()) {
                parameter_value(child.local_name(), child.attribute("value").unwrap_or_default(), &mut params)?;
            }
        }
        XdmItem::Atomic(_) | XdmItem::Array(_) => {
            return Err(Error::type_error("serialization parameters must be a map or an element"));
        }
    }
    Ok(params)
}

pub fn serialize<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    let params = serialization_params(ctx, args.get(1))?;
    Ok(string_seq(ctx.context.env.serializer.serialize(&args[0], &params)?))
}
