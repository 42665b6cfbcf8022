//! Context, boolean, error and environment functions.

use super::{CallCtx, bool_seq, count_seq, optional_atomic, string_arg, string_seq};
use crate::context::EvalMode;
use crate::error::{Error, ErrorCode};
use crate::eval::ebv;
use crate::xdm::{ExpandedName, XdmAtomicValue, XdmItem, XdmSequence};
use itertools::Itertools;

fn focus(ctx: &CallCtx<'_, '_>) -> Result<(), Error> {
    match ctx.context.item {
        Some(_) => Ok(()),
        None => Err(Error::missing_context()),
    }
}

pub fn last<'a>(ctx: &CallCtx<'_, 'a>, _args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    focus(ctx)?;
    Ok(count_seq(ctx.context.size))
}

pub fn position<'a>(ctx: &CallCtx<'_, 'a>, _args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    focus(ctx)?;
    Ok(count_seq(ctx.context.position))
}

pub fn boolean<'a>(_ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    Ok(bool_seq(ebv(&args[0])?))
}

pub fn not<'a>(_ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    Ok(bool_seq(!ebv(&args[0])?))
}

pub fn true_<'a>(_ctx: &CallCtx<'_, 'a>, _args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    Ok(bool_seq(true))
}

pub fn false_<'a>(_ctx: &CallCtx<'_, 'a>, _args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    Ok(bool_seq(false))
}

/// `fn:error($code?, $description?, $object?)` always fails.
pub fn error<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    let code = match args.first() {
        Some(seq) => match optional_atomic(ctx, seq)? {
            Some(XdmAtomicValue::QName { ns_uri, local, .. }) => ExpandedName::new(ns_uri, local),
            Some(other) => {
                return Err(Error::type_error(format!("error code must be an xs:QName, got {}", other.atomic_type())));
            }
            None => ErrorCode::FOER0000.qname(),
        },
        None => ErrorCode::FOER0000.qname(),
    };
    let message = match args.get(1) {
        Some(seq) => string_arg(ctx, seq)?,
        None => "error raised by fn:error".to_string(),
    };
    Err(Error::new_qname(code, message))
}

/// Logs the value and passes it through.
pub fn trace<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    let label = string_arg(ctx, &args[1])?;
    let value = args[0].iter().map(ToString::to_string).join(" ");
    tracing::debug!(%label, %value, "fn:trace");
    Ok(args[0].clone())
}

pub fn environment_variable<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    if ctx.context.mode == EvalMode::Schema {
        return Ok(Vec::new());
    }
    let name = string_arg(ctx, &args[0])?;
    Ok(match ctx.context.env.env_vars.get(&name) {
        Some(value) => string_seq(value.clone()),
        None => Vec::new(),
    })
}

pub fn available_environment_variables<'a>(
    ctx: &CallCtx<'_, 'a>,
    _args: &[XdmSequence<'a>],
) -> Result<XdmSequence<'a>, Error> {
    if ctx.context.mode == EvalMode::Schema {
        return Ok(Vec::new());
    }
    Ok(ctx
        .context
        .env
        .env_vars
        .keys()
        .sorted()
        .map(|k| XdmItem::Atomic(XdmAtomicValue::String(k.clone())))
        .collect())
}
