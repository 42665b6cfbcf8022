//! The `map:` and `array:` function namespaces.

use super::{CallCtx, bool_seq, count_seq, integer_arg};
use crate::error::Error;
use crate::eval::single_atomic;
use crate::xdm::{XdmArray, XdmAtomicValue, XdmItem, XdmMap, XdmSequence};

fn map_arg<'s, 'a>(seq: &'s [XdmItem<'a>]) -> Result<&'s XdmMap<'a>, Error> {
    match seq {
        [XdmItem::Map(m)] => Ok(m),
        _ => Err(Error::type_error("expected a single map")),
    }
}

fn array_arg<'s, 'a>(seq: &'s [XdmItem<'a>]) -> Result<&'s XdmArray<'a>, Error> {
    match seq {
        [XdmItem::Array(a)] => Ok(a),
        _ => Err(Error::type_error("expected a single array")),
    }
}

fn key_arg(seq: &[XdmItem<'_>]) -> Result<XdmAtomicValue, Error> {
    single_atomic(seq)?.ok_or_else(|| Error::type_error("a map key must be a single atomic value"))
}

pub fn map_size<'a>(_ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    Ok(count_seq(map_arg(&args[0])?.len()))
}

pub fn map_keys<'a>(_ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    Ok(map_arg(&args[0])?.keys().cloned().map(XdmItem::Atomic).collect())
}

pub fn map_get<'a>(_ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    let key = key_arg(&args[1])?;
    Ok(map_arg(&args[0])?.get(&key).cloned().unwrap_or_default())
}

pub fn map_contains<'a>(_ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    let key = key_arg(&args[1])?;
    Ok(bool_seq(map_arg(&args[0])?.contains(&key)))
}

pub fn map_entry<'a>(_ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    let key = key_arg(&args[0])?;
    Ok(vec![XdmItem::Map(XdmMap::from_entries(vec![(key, args[1].clone())])?)])
}

pub fn array_size<'a>(_ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    Ok(count_seq(array_arg(&args[0])?.len()))
}

pub fn array_get<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    let index = integer_arg(ctx, &args[1])?;
    Ok(array_arg(&args[0])?.get(index)?.clone())
}

pub fn array_append<'a>(_ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    let mut members = array_arg(&args[0])?.members().to_vec();
    members.push(args[1].clone());
    Ok(vec![XdmItem::Array(XdmArray::new(members))])
}
