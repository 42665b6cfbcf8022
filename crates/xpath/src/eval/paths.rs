//! Paths, steps, node tests, predicates and the node set operators.

use super::{ItemIter, ebv, operand};
use crate::context::{EvalMode, XPathContext};
use crate::error::{Error, ErrorCode};
use crate::token::{KindTest, NameTest, Token, TokenKind};
use crate::tree::{Axis, NodeKind, NodeRef, SchemaType};
use crate::xdm::{AtomicType, ExpandedName, XdmAtomicValue, XdmItem, XdmSequence};
use itertools::Itertools;
use smallvec::SmallVec;
use std::collections::HashSet;

pub(super) fn select<'t, 'a: 't>(t: &'t Token, ctx: &XPathContext<'a>) -> Result<ItemIter<'t, 'a>, Error> {
    match &t.kind {
        TokenKind::Axis(axis) => {
            let test = operand(t, 0)?;
            axis_step(*axis, test, ctx)
        }
        TokenKind::NameTest(_) | TokenKind::KindTest(_) => axis_step(implicit_axis(t), t, ctx),
        TokenKind::Predicate => predicate(t, ctx),
        TokenKind::Path => {
            let left = operand(t, 0)?.evaluate(ctx)?;
            materialized(step_over(&left, operand(t, 1)?, ctx)?)
        }
        TokenKind::DescendantPath => {
            let left = operand(t, 0)?.evaluate(ctx)?;
            materialized(descendant_step(&left, operand(t, 1)?, ctx)?)
        }
        TokenKind::Root => {
            let root = document_root(ctx)?;
            let Some(step) = t.child(0) else {
                return materialized(vec![XdmItem::Node(root)]);
            };
            if root.kind() == NodeKind::Document {
                materialized(step_over(&[XdmItem::Node(root)], step, ctx)?)
            } else {
                materialized(virtual_document_step(root, step, ctx)?)
            }
        }
        TokenKind::DescendantRoot => {
            let root = document_root(ctx)?;
            let step = operand(t, 0)?;
            if root.kind() == NodeKind::Document {
                return materialized(descendant_step(&[XdmItem::Node(root)], step, ctx)?);
            }
            let mut nodes = virtual_document_step(root, step, ctx)?;
            let inputs: XdmSequence<'a> = root.axis(Axis::DescendantOrSelf).map(XdmItem::Node).collect();
            nodes.extend(step_over(&inputs, step, ctx)?);
            materialized(document_order(nodes)?)
        }
        TokenKind::Range => {
            let Some((start, end)) = super::range_bounds(t, ctx)? else {
                return Ok(Box::new(std::iter::empty()));
            };
            let integers = (start..=end).map(|i| Ok::<_, Error>(XdmItem::Atomic(XdmAtomicValue::Integer(i))));
            Ok(Box::new(integers))
        }
        TokenKind::Parenthesized => match operand(t, 0)? {
            inner if inner.is_step() => materialized(parenthesized(t, ctx)?),
            inner => Ok(inner.select(ctx)),
        },
        _ => materialized(t.evaluate(ctx)?),
    }
}

fn materialized<'t, 'a: 't>(items: XdmSequence<'a>) -> Result<ItemIter<'t, 'a>, Error> {
    Ok(Box::new(items.into_iter().map(Ok)))
}

/// Axis used by a node test written without one.
fn implicit_axis(test: &Token) -> Axis {
    match &test.kind {
        TokenKind::KindTest(KindTest::Attribute { .. } | KindTest::SchemaAttribute(_)) => Axis::Attribute,
        _ => Axis::Child,
    }
}

fn axis_step<'t, 'a: 't>(axis: Axis, test: &'t Token, ctx: &XPathContext<'a>) -> Result<ItemIter<'t, 'a>, Error> {
    let node = match &ctx.item {
        Some(XdmItem::Node(n)) => *n,
        Some(other) => {
            return Err(Error::from_code(
                ErrorCode::XPTY0020,
                format!("the context item of an axis step must be a node, got {other}"),
            ));
        }
        None => return Err(Error::missing_context()),
    };
    let mut step_ctx = ctx.clone();
    step_ctx.axis = Some(axis);
    Ok(Box::new(node.axis(axis).filter_map(move |candidate| {
        step_ctx.item = Some(XdmItem::Node(candidate));
        match node_test(test, &step_ctx) {
            Ok(true) => Some(Ok(XdmItem::Node(candidate))),
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        }
    })))
}

/// Whether the context item passes `test` on the context axis.
fn node_test(test: &Token, ctx: &XPathContext<'_>) -> Result<bool, Error> {
    let Some(XdmItem::Node(node)) = &ctx.item else {
        return Ok(false);
    };
    let axis = ctx.axis.unwrap_or_else(|| implicit_axis(test));
    let matched = match &test.kind {
        TokenKind::NameTest(name) => node.kind() == axis.principal_kind() && name_matches(name, *node),
        TokenKind::KindTest(kind) => kind_matches(kind, *node),
        _ => return Err(Error::type_error(format!("'{}' is not a node test", test.symbol)).or_at(test)),
    };
    if matched && ctx.mode == EvalMode::Schema {
        record_schema_type(test, *node);
    }
    Ok(matched)
}

fn record_schema_type(test: &Token, node: NodeRef<'_>) {
    let name = match node.schema_type() {
        Some(SchemaType::Atomic(t)) => Some(t.name()),
        Some(SchemaType::Complex(ct)) => ct.name.clone(),
        Some(SchemaType::Any) => Some(ExpandedName::xs("anyType")),
        None => None,
    };
    if let Some(name) = name {
        // first match wins
        let _ = test.xsd_type.set(name);
    }
}

fn name_matches(test: &NameTest, node: NodeRef<'_>) -> bool {
    match test {
        NameTest::Wildcard => true,
        NameTest::Name(name) => node.name().is_some_and(|n| n.matches(name)),
        NameTest::AnyLocal(ns) => node.name().is_some() && node.namespace_uri() == ns.as_deref(),
        NameTest::AnyNamespace(local) => node.local_name() == local,
    }
}

pub(crate) fn kind_matches(test: &KindTest, node: NodeRef<'_>) -> bool {
    match test {
        KindTest::AnyKind => true,
        KindTest::Text => node.kind() == NodeKind::Text,
        KindTest::Comment => node.kind() == NodeKind::Comment,
        KindTest::NamespaceNode => node.kind() == NodeKind::Namespace,
        KindTest::ProcessingInstruction(target) => {
            node.kind() == NodeKind::ProcessingInstruction && target.as_deref().is_none_or(|t| node.local_name() == t)
        }
        KindTest::Document(inner) => {
            node.kind() == NodeKind::Document
                && inner.as_deref().is_none_or(|inner| {
                    let elements: Vec<_> = node.children().filter(|c| c.kind() == NodeKind::Element).collect();
                    elements.len() == 1 && elements.iter().all(|e| kind_matches(inner, *e))
                })
        }
        KindTest::Element { name, type_name } => {
            node.kind() == NodeKind::Element
                && name.as_ref().is_none_or(|n| node.name().is_some_and(|nn| nn.matches(n)))
                && type_name.as_ref().is_none_or(|t| type_matches(node, t))
        }
        KindTest::Attribute { name, type_name } => {
            node.kind() == NodeKind::Attribute
                && name.as_ref().is_none_or(|n| node.name().is_some_and(|nn| nn.matches(n)))
                && type_name.as_ref().is_none_or(|t| type_matches(node, t))
        }
        KindTest::SchemaElement(n) => node.kind() == NodeKind::Element && node.name().is_some_and(|nn| nn.matches(n)),
        KindTest::SchemaAttribute(n) => {
            node.kind() == NodeKind::Attribute && node.name().is_some_and(|nn| nn.matches(n))
        }
    }
}

/// Type annotation check of `element(N, T)` and `attribute(N, T)`.
fn type_matches(node: NodeRef<'_>, type_name: &ExpandedName) -> bool {
    if *type_name == ExpandedName::xs("anyType") {
        return true;
    }
    match node.schema_type() {
        Some(SchemaType::Atomic(t)) => AtomicType::from_name(type_name).is_some_and(|target| t.derives_from(target)),
        Some(SchemaType::Complex(ct)) => ct.name.as_ref() == Some(type_name),
        Some(SchemaType::Any) => false,
        None => {
            let untyped = if node.kind() == NodeKind::Attribute { "untypedAtomic" } else { "untyped" };
            *type_name == ExpandedName::xs(untyped)
                || (node.kind() == NodeKind::Attribute && *type_name == ExpandedName::xs("anyAtomicType"))
        }
    }
}

fn document_root<'a>(ctx: &XPathContext<'a>) -> Result<NodeRef<'a>, Error> {
    match (&ctx.item, ctx.root) {
        (Some(XdmItem::Node(n)), _) => Ok(n.root()),
        (_, Some(root)) => Ok(root),
        _ => Err(Error::from_code(ErrorCode::XPDY0002, "there is no document root to start the path from")),
    }
}

/// Evaluates `step` once per input node and merges the results in document
/// order without duplicates. Atomic results are kept in evaluation order.
pub(super) fn step_over<'a>(
    inputs: &[XdmItem<'a>],
    step: &Token,
    ctx: &XPathContext<'a>,
) -> Result<XdmSequence<'a>, Error> {
    let size = inputs.len();
    let mut nodes: Vec<NodeRef<'a>> = Vec::new();
    let mut atomics = Vec::new();
    let mut seen = HashSet::new();
    let mut in_order = true;
    let mut step_ctx = ctx.clone();
    for (i, item) in inputs.iter().enumerate() {
        if !matches!(item, XdmItem::Node(_)) {
            return Err(Error::from_code(
                ErrorCode::XPTY0019,
                format!("the left-hand side of '/' must contain only nodes, got {item}"),
            )
            .or_at(step));
        }
        step_ctx.set_focus(item.clone(), i + 1, size);
        for result in step.select(&step_ctx) {
            match result? {
                XdmItem::Node(n) => {
                    if seen.insert(n) {
                        in_order &= nodes.last().is_none_or(|last| *last < n);
                        nodes.push(n);
                    }
                }
                other => atomics.push(other),
            }
        }
    }
    if !atomics.is_empty() {
        if !nodes.is_empty() {
            return Err(Error::from_code(ErrorCode::XPTY0018, "a path result mixes nodes and atomic values"));
        }
        return Ok(atomics);
    }
    if !in_order {
        nodes.sort();
    }
    Ok(nodes.into_iter().map(XdmItem::Node).collect())
}

/// `left//step`.
fn descendant_step<'a>(left: &[XdmItem<'a>], step: &Token, ctx: &XPathContext<'a>) -> Result<XdmSequence<'a>, Error> {
    let mut contexts = Vec::new();
    let mut seen = HashSet::new();
    for item in left {
        let XdmItem::Node(node) = item else {
            return Err(Error::from_code(
                ErrorCode::XPTY0019,
                format!("the left-hand side of '//' must contain only nodes, got {item}"),
            ));
        };
        // nested inputs share descendants
        if seen.contains(node) {
            continue;
        }
        for n in node.axis(Axis::DescendantOrSelf) {
            if seen.insert(n) {
                contexts.push(n);
            }
        }
    }
    contexts.sort();

    let child_test = match &step.kind {
        TokenKind::NameTest(_) => true,
        TokenKind::KindTest(k) => implicit_axis(step) == Axis::Child && !matches!(k, KindTest::Document(_)),
        _ => false,
    };
    if child_test {
        // descendant-or-self::node()/child::T without a positional filter
        let mut test_ctx = ctx.clone();
        test_ctx.axis = Some(Axis::Child);
        let mut out: Vec<NodeRef<'a>> = Vec::new();
        let mut found = HashSet::new();
        let mut in_order = true;
        for context in contexts {
            for n in context.axis(Axis::Child) {
                test_ctx.item = Some(XdmItem::Node(n));
                if node_test(step, &test_ctx)? && found.insert(n) {
                    in_order &= out.last().is_none_or(|last| *last < n);
                    out.push(n);
                }
            }
        }
        if !in_order {
            out.sort();
        }
        return Ok(out.into_iter().map(XdmItem::Node).collect());
    }
    let inputs: XdmSequence<'a> = contexts.into_iter().map(XdmItem::Node).collect();
    step_over(&inputs, step, ctx)
}

/// A step applied to the root of a tree without document node: the root
/// element acts as the only child of a virtual document.
fn virtual_document_step<'a>(
    root: NodeRef<'a>,
    step: &Token,
    ctx: &XPathContext<'a>,
) -> Result<XdmSequence<'a>, Error> {
    let Some((axis, test, predicates)) = decompose_step(step) else {
        return step_over(&[XdmItem::Node(root)], step, ctx);
    };
    let candidates: Vec<NodeRef<'a>> = match axis {
        Axis::Child => vec![root],
        Axis::Descendant | Axis::DescendantOrSelf => root.axis(Axis::DescendantOrSelf).collect(),
        _ => Vec::new(),
    };
    let mut test_ctx = ctx.clone();
    test_ctx.axis = Some(axis);
    let mut items = Vec::new();
    for n in candidates {
        test_ctx.item = Some(XdmItem::Node(n));
        if node_test(test, &test_ctx)? {
            items.push(XdmItem::Node(n));
        }
    }
    for predicate in predicates {
        items = filter(items, predicate, ctx)?;
    }
    Ok(items)
}

/// Splits `axis::test[p1][p2]` into its parts.
fn decompose_step(step: &Token) -> Option<(Axis, &Token, SmallVec<[&Token; 4]>)> {
    let mut predicates = SmallVec::new();
    let mut current = step;
    while matches!(current.kind, TokenKind::Predicate) {
        predicates.push(current.child(1)?);
        current = current.child(0)?;
    }
    predicates.reverse();
    match &current.kind {
        TokenKind::Axis(axis) => Some((*axis, current.child(0)?, predicates)),
        TokenKind::NameTest(_) | TokenKind::KindTest(_) => Some((implicit_axis(current), current, predicates)),
        _ => None,
    }
}

/// Positive integer value of a literal numeric predicate.
fn literal_position(predicate: &Token) -> Option<Option<usize>> {
    if !matches!(predicate.kind, TokenKind::Literal) {
        return None;
    }
    let value = predicate.value.as_ref()?;
    if !value.is_numeric() {
        return None;
    }
    let n = value.as_f64()?;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let position = (n >= 1.0 && n.fract() == 0.0 && n <= usize::MAX as f64).then(|| n as usize);
    Some(position)
}

fn predicate<'t, 'a: 't>(t: &'t Token, ctx: &XPathContext<'a>) -> Result<ItemIter<'t, 'a>, Error> {
    let base = operand(t, 0)?;
    let pred = operand(t, 1)?;
    if let Some(position) = literal_position(pred) {
        let Some(n) = position else {
            return Ok(Box::new(std::iter::empty()));
        };
        return Ok(Box::new(base.select(ctx).take(n).skip(n - 1)));
    }
    let items = base.select(ctx).collect::<Result<Vec<_>, _>>()?;
    materialized(filter(items, pred, ctx)?)
}

/// Keeps the items for which `pred` holds. A single numeric result selects
/// by position.
fn filter<'a>(items: XdmSequence<'a>, pred: &Token, ctx: &XPathContext<'a>) -> Result<XdmSequence<'a>, Error> {
    let size = items.len();
    let mut pred_ctx = ctx.clone();
    let mut out = Vec::new();
    for (i, item) in items.into_iter().enumerate() {
        pred_ctx.set_focus(item.clone(), i + 1, size);
        let result = pred.evaluate(&pred_ctx)?;
        let keep = match result.as_slice() {
            [XdmItem::Atomic(a)] if a.is_numeric() => {
                #[allow(clippy::cast_precision_loss)]
                let position = (i + 1) as f64;
                a.as_f64() == Some(position)
            }
            _ => ebv(&result)?,
        };
        if keep {
            out.push(item);
        }
    }
    Ok(out)
}

/// Parentheses around a step restore document order.
pub(super) fn parenthesized<'a>(t: &Token, ctx: &XPathContext<'a>) -> Result<XdmSequence<'a>, Error> {
    let inner = operand(t, 0)?;
    let value = inner.evaluate(ctx)?;
    if inner.is_step() && value.iter().all(|i| matches!(i, XdmItem::Node(_))) {
        return document_order(value);
    }
    Ok(value)
}

fn nodes_of<'a>(seq: XdmSequence<'a>, op: &str) -> Result<Vec<NodeRef<'a>>, Error> {
    seq.into_iter()
        .map(|item| match item {
            XdmItem::Node(n) => Ok(n),
            other => Err(Error::type_error(format!("the operands of '{op}' must be nodes, got {other}"))),
        })
        .collect()
}

fn strictly_increasing(nodes: &[NodeRef<'_>]) -> bool {
    nodes.iter().tuple_windows().all(|(a, b)| a < b)
}

/// Sorted, duplicate free node sequence.
pub(super) fn document_order(seq: XdmSequence<'_>) -> Result<XdmSequence<'_>, Error> {
    let mut nodes = nodes_of(seq, "/")?;
    nodes.sort();
    nodes.dedup();
    Ok(nodes.into_iter().map(XdmItem::Node).collect())
}

fn sorted_nodes<'a>(seq: XdmSequence<'a>, op: &str) -> Result<Vec<NodeRef<'a>>, Error> {
    let mut nodes = nodes_of(seq, op)?;
    if !strictly_increasing(&nodes) {
        nodes.sort();
        nodes.dedup();
    }
    Ok(nodes)
}

pub(super) fn set_operation<'a>(t: &Token, ctx: &XPathContext<'a>) -> Result<XdmSequence<'a>, Error> {
    let op = t.symbol.as_str();
    let left = sorted_nodes(operand(t, 0)?.evaluate(ctx)?, op)?;
    let right = sorted_nodes(operand(t, 1)?.evaluate(ctx)?, op)?;
    let nodes: Vec<NodeRef<'a>> = match t.kind {
        TokenKind::Union => left
            .into_iter()
            .merge(right)
            .dedup()
            .collect(),
        TokenKind::Intersect => {
            let right: HashSet<_> = right.into_iter().collect();
            left.into_iter().filter(|n| right.contains(n)).collect()
        }
        _ => {
            let right: HashSet<_> = right.into_iter().collect();
            left.into_iter().filter(|n| !right.contains(n)).collect()
        }
    };
    Ok(nodes.into_iter().map(XdmItem::Node).collect())
}
