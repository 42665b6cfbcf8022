//! Map and array constructors and the `?` lookup operator.

use super::{atomize, operand, single_atomic};
use crate::context::XPathContext;
use crate::error::Error;
use crate::token::{LookupKey, Token};
use crate::xdm::{XdmArray, XdmAtomicValue, XdmItem, XdmMap, XdmSequence};

pub(super) fn map_constructor<'a>(t: &Token, ctx: &XPathContext<'a>) -> Result<XdmSequence<'a>, Error> {
    let mut entries = Vec::with_capacity(t.children.len() / 2);
    for pair in t.children.chunks(2) {
        let [key, value] = pair else {
            return Err(Error::syntax("map entry without a value").or_at(t));
        };
        let Some(key) = single_atomic(&key.evaluate(ctx)?)? else {
            return Err(Error::type_error("map keys must be single atomic values"));
        };
        entries.push((key, value.evaluate(ctx)?));
    }
    Ok(vec![XdmItem::Map(XdmMap::from_entries(entries)?)])
}

/// `array { expr }` makes every item a member; `[a, b]` makes every
/// expression one.
pub(super) fn array_constructor<'a>(t: &Token, curly: bool, ctx: &XPathContext<'a>) -> Result<XdmSequence<'a>, Error> {
    let members = if curly {
        let mut members = Vec::new();
        for child in &t.children {
            members.extend(child.evaluate(ctx)?.into_iter().map(|item| vec![item]));
        }
        members
    } else {
        t.children.iter().map(|c| c.evaluate(ctx)).collect::<Result<Vec<_>, _>>()?
    };
    Ok(vec![XdmItem::Array(XdmArray::new(members))])
}

pub(super) fn lookup<'a>(
    t: &Token,
    key: &LookupKey,
    unary: bool,
    ctx: &XPathContext<'a>,
) -> Result<XdmSequence<'a>, Error> {
    let bases = if unary {
        vec![ctx.item.clone().ok_or_else(Error::missing_context)?]
    } else {
        operand(t, 0)?.evaluate(ctx)?
    };
    let keys = match key {
        LookupKey::Name(name) => Some(vec![XdmAtomicValue::String(name.clone())]),
        LookupKey::Integer(i) => Some(vec![XdmAtomicValue::Integer(*i)]),
        LookupKey::Wildcard => None,
        LookupKey::Expr => {
            let expr = operand(t, if unary { 0 } else { 1 })?;
            Some(atomize(&expr.evaluate(ctx)?)?)
        }
    };
    let mut out = Vec::new();
    for base in &bases {
        match base {
            XdmItem::Map(map) => match &keys {
                None => {
                    for (_, value) in map.entries() {
                        out.extend(value.iter().cloned());
                    }
                }
                Some(keys) => {
                    for k in keys {
                        if let Some(value) = map.get(k) {
                            out.extend(value.iter().cloned());
                        }
                    }
                }
            },
            XdmItem::Array(array) => match &keys {
                None => {
                    for member in array.members() {
                        out.extend(member.iter().cloned());
                    }
                }
                Some(keys) => {
                    for k in keys {
                        let XdmAtomicValue::Integer(index) = k else {
                            return Err(Error::type_error(format!("array lookup key {k} is not an integer")));
                        };
                        out.extend(array.get(*index)?.iter().cloned());
                    }
                }
            },
            other => {
                return Err(Error::type_error(format!("lookup operator applied to {other}, expected a map or array")));
            }
        }
    }
    Ok(out)
}
