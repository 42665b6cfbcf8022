//! Sequence type matching for `instance of`, `treat as`, `cast` and `castable`.

use super::{atomize, kind_matches};
use crate::context::XPathContext;
use crate::error::{Error, ErrorCode};
use crate::eval::casting::cast_with_namespaces;
use crate::token::{ItemType, SequenceType, SingleType};
use crate::xdm::{AtomicType, XdmAtomicValue, XdmItem, XdmSequence};

pub fn matches_item_type(item: &XdmItem<'_>, ty: &ItemType) -> bool {
    match (ty, item) {
        (ItemType::AnyItem, _) => true,
        (ItemType::Atomic(t), XdmItem::Atomic(a)) => a.atomic_type().derives_from(*t),
        (ItemType::Kind(k), XdmItem::Node(n)) => kind_matches(k, *n),
        (ItemType::AnyMap, XdmItem::Map(_)) | (ItemType::AnyArray, XdmItem::Array(_)) => true,
        _ => false,
    }
}

pub fn matches_sequence_type(seq: &[XdmItem<'_>], ty: &SequenceType) -> bool {
    match ty {
        SequenceType::Empty => seq.is_empty(),
        SequenceType::Items(item, occurrence) => {
            occurrence.allows(seq.len()) && seq.iter().all(|i| matches_item_type(i, item))
        }
    }
}

/// Atomizes the operand of `cast`/`castable`; `None` for the empty sequence.
fn cast_operand(seq: &[XdmItem<'_>], ty: SingleType) -> Result<Option<XdmAtomicValue>, Error> {
    if ty.atomic == AtomicType::AnyAtomicType {
        return Err(Error::from_code(ErrorCode::XPST0080, "cannot cast to xs:anyAtomicType"));
    }
    let mut atoms = atomize(seq)?;
    match atoms.len() {
        0 if ty.optional => Ok(None),
        0 => Err(Error::type_error(format!("empty sequence cannot be cast to {}", ty.atomic))),
        1 => Ok(atoms.pop()),
        n => Err(Error::type_error(format!("a sequence of {n} items cannot be cast to {}", ty.atomic))),
    }
}

pub fn castable(seq: &[XdmItem<'_>], ty: SingleType, ctx: &XPathContext<'_>) -> bool {
    match cast_operand(seq, ty) {
        Ok(None) => true,
        Ok(Some(a)) => cast_with_namespaces(&a, ty.atomic, Some(ctx.namespaces())).is_ok(),
        Err(_) => false,
    }
}

pub fn cast_sequence<'a>(
    seq: &[XdmItem<'a>],
    ty: SingleType,
    ctx: &XPathContext<'a>,
) -> Result<XdmSequence<'a>, Error> {
    let Some(a) = cast_operand(seq, ty)? else {
        return Ok(Vec::new());
    };
    let value = cast_with_namespaces(&a, ty.atomic, Some(ctx.namespaces()))?;
    Ok(vec![XdmItem::Atomic(value)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Occurrence;
    use crate::xdm::{XdmArray, XdmMap};

    #[test]
    fn occurrence_and_item_type() {
        let ints = vec![XdmItem::Atomic(XdmAtomicValue::Integer(1)), XdmItem::Atomic(XdmAtomicValue::Integer(2))];
        let decimal_plus = SequenceType::Items(ItemType::Atomic(AtomicType::Decimal), Occurrence::OneOrMore);
        assert!(matches_sequence_type(&ints, &decimal_plus));
        let one = SequenceType::Items(ItemType::Atomic(AtomicType::Integer), Occurrence::One);
        assert!(!matches_sequence_type(&ints, &one));
        assert!(matches_sequence_type(&[], &SequenceType::Empty));
        let string = SequenceType::Items(ItemType::Atomic(AtomicType::String), Occurrence::ZeroOrMore);
        assert!(!matches_sequence_type(&ints, &string));
    }

    #[test]
    fn maps_and_arrays() {
        let items = vec![XdmItem::Map(XdmMap::new()), XdmItem::Array(XdmArray::new(Vec::new()))];
        assert!(matches_item_type(&items[0], &ItemType::AnyMap));
        assert!(!matches_item_type(&items[0], &ItemType::AnyArray));
        assert!(matches_item_type(&items[1], &ItemType::AnyArray));
    }
}
