//! Functions on sequences.

use super::{CallCtx, bool_seq, count_seq, integer_arg};
use crate::collation::CollationManager;
use crate::error::{Error, ErrorCode};
use crate::eval::{self, compare, single_atomic};
use crate::tree::{NodeKind, NodeRef};
use crate::xdm::{XdmAtomicValue, XdmItem, XdmSequence};
use chrono::FixedOffset;

pub fn count<'a>(_ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    Ok(count_seq(args[0].len()))
}

pub fn empty<'a>(_ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    Ok(bool_seq(args[0].is_empty()))
}

pub fn exists<'a>(_ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    Ok(bool_seq(!args[0].is_empty()))
}

pub fn distinct_values<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    let collation = ctx.collation(args.get(1))?;
    let tz = ctx.context.env.implicit_timezone;
    let mut kept: Vec<XdmAtomicValue> = Vec::new();
    for value in eval::atomize(&args[0])? {
        if !kept.iter().any(|k| compare::atomic_equal(k, &value, &collation, tz)) {
            kept.push(value);
        }
    }
    Ok(kept.into_iter().map(XdmItem::Atomic).collect())
}

pub fn reverse<'a>(_ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    Ok(args[0].iter().rev().cloned().collect())
}

fn round_half_up(x: f64) -> f64 {
    (x + 0.5).floor()
}

/// Items at positions `p` with `round(start) <= p < round(start) + round(length)`.
pub fn subsequence<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    let start = round_half_up(eval::sequence_number(&args[1], ctx.version())?);
    let end = match args.get(2) {
        Some(len) => start + round_half_up(eval::sequence_number(len, ctx.version())?),
        None => f64::INFINITY,
    };
    #[allow(clippy::cast_precision_loss)]
    let out = args[0]
        .iter()
        .enumerate()
        .filter(|(i, _)| {
            let p = (*i + 1) as f64;
            p >= start && p < end
        })
        .map(|(_, item)| item.clone())
        .collect();
    Ok(out)
}

pub fn index_of<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    let Some(search) = single_atomic(&args[1])? else {
        return Err(Error::type_error("fn:index-of needs a search value"));
    };
    let collation = ctx.collation(args.get(2))?;
    let tz = ctx.context.env.implicit_timezone;
    let positions = eval::atomize(&args[0])?
        .iter()
        .enumerate()
        .filter(|(_, v)| compare::atomic_equal(v, &search, &collation, tz))
        .map(|(i, _)| XdmItem::Atomic(XdmAtomicValue::Integer(i64::try_from(i + 1).unwrap_or(i64::MAX))))
        .collect();
    Ok(positions)
}

/// Zero-based index for a 1-based position clamped into `0..=len`.
fn clamp_position(position: i64, len: usize) -> usize {
    usize::try_from(position.saturating_sub(1)).unwrap_or(0).min(len)
}

pub fn insert_before<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    let at = clamp_position(integer_arg(ctx, &args[1])?, args[0].len());
    let mut out = Vec::with_capacity(args[0].len() + args[2].len());
    out.extend_from_slice(&args[0][..at]);
    out.extend_from_slice(&args[2]);
    out.extend_from_slice(&args[0][at..]);
    Ok(out)
}

pub fn remove<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    let position = integer_arg(ctx, &args[1])?;
    Ok(args[0]
        .iter()
        .enumerate()
        .filter(|(i, _)| i64::try_from(*i + 1).ok() != Some(position))
        .map(|(_, item)| item.clone())
        .collect())
}

pub fn zero_or_one<'a>(_ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    if args[0].len() > 1 {
        return Err(Error::from_code(ErrorCode::FORG0003, "fn:zero-or-one called with more than one item"));
    }
    Ok(args[0].clone())
}

pub fn one_or_more<'a>(_ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    if args[0].is_empty() {
        return Err(Error::from_code(ErrorCode::FORG0004, "fn:one-or-more called with an empty sequence"));
    }
    Ok(args[0].clone())
}

pub fn exactly_one<'a>(_ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    if args[0].len() != 1 {
        return Err(Error::from_code(
            ErrorCode::FORG0005,
            format!("fn:exactly-one called with {} items", args[0].len()),
        ));
    }
    Ok(args[0].clone())
}

pub fn head<'a>(_ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    Ok(args[0].first().cloned().into_iter().collect())
}

pub fn tail<'a>(_ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    Ok(args[0].iter().skip(1).cloned().collect())
}

pub fn deep_equal<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    let collation = ctx.collation(args.get(2))?;
    let tz = ctx.context.env.implicit_timezone;
    Ok(bool_seq(sequences_equal(&args[0], &args[1], &collation, tz)))
}

fn sequences_equal(a: &[XdmItem<'_>], b: &[XdmItem<'_>], collation: &CollationManager, tz: FixedOffset) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| items_equal(x, y, collation, tz))
}

fn items_equal(a: &XdmItem<'_>, b: &XdmItem<'_>, collation: &CollationManager, tz: FixedOffset) -> bool {
    match (a, b) {
        (XdmItem::Atomic(x), XdmItem::Atomic(y)) => compare::atomic_equal(x, y, collation, tz),
        (XdmItem::Node(x), XdmItem::Node(y)) => nodes_equal(*x, *y, collation),
        (XdmItem::Map(x), XdmItem::Map(y)) => {
            x.len() == y.len()
                && x.entries().all(|(k, v)| y.get(k).is_some_and(|w| sequences_equal(v, w, collation, tz)))
        }
        (XdmItem::Array(x), XdmItem::Array(y)) => {
            x.len() == y.len()
                && x.members().iter().zip(y.members()).all(|(v, w)| sequences_equal(v, w, collation, tz))
        }
        _ => false,
    }
}

/// Children that take part in deep equality: comments and processing
/// instructions are ignored.
fn significant_children<'a>(node: NodeRef<'a>) -> Vec<NodeRef<'a>> {
    node.children()
        .filter(|c| !matches!(c.kind(), NodeKind::Comment | NodeKind::ProcessingInstruction))
        .collect()
}

fn nodes_equal(a: NodeRef<'_>, b: NodeRef<'_>, collation: &CollationManager) -> bool {
    if a.kind() != b.kind() {
        return false;
    }
    let names_equal = match (a.name(), b.name()) {
        (Some(x), Some(y)) => x.expanded() == y.expanded(),
        (None, None) => true,
        _ => false,
    };
    if !names_equal {
        return false;
    }
    match a.kind() {
        NodeKind::Document | NodeKind::Element => {
            let attributes_equal = a.attributes().len() == b.attributes().len()
                && a.attributes().all(|x| {
                    b.attributes().any(|y| {
                        x.name().map(|n| n.expanded()) == y.name().map(|n| n.expanded())
                            && collation.eq(x.value(), y.value())
                    })
                });
            let (xs, ys) = (significant_children(a), significant_children(b));
            attributes_equal
                && xs.len() == ys.len()
                && xs.iter().zip(&ys).all(|(x, y)| nodes_equal(*x, *y, collation))
        }
        _ => collation.eq(&a.string_value(), &b.string_value()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_are_clamped() {
        assert_eq!(clamp_position(0, 3), 0);
        assert_eq!(clamp_position(-5, 3), 0);
        assert_eq!(clamp_position(2, 3), 1);
        assert_eq!(clamp_position(10, 3), 3);
    }
}
