//! Node accessors and document access.

use super::{CallCtx, arg_or_context, bool_seq, node_arg_or_context, optional_item, string_arg, string_seq};
use crate::consts::XML_URI;
use crate::context::EvalMode;
use crate::error::{Error, ErrorCode};
use crate::eval;
use crate::parser::XPathVersion;
use crate::tree::{Axis, NodeKind, NodeRef};
use crate::xdm::{XdmAtomicValue, XdmItem, XdmSequence};
use std::collections::HashSet;

/// `xs:string` in XPath 1.0, `xs:anyURI` later.
fn uri_seq<'a>(ctx: &CallCtx<'_, 'a>, uri: &str) -> XdmSequence<'a> {
    if ctx.version() == XPathVersion::V1_0 {
        string_seq(uri)
    } else {
        vec![XdmItem::Atomic(XdmAtomicValue::AnyUri(uri.to_string()))]
    }
}

/// `fn:id`: elements whose `id` or `xml:id` attribute is one of the given
/// whitespace separated tokens.
pub fn id<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    let mut wanted = HashSet::new();
    for item in &args[0] {
        let s = eval::item_string(item, ctx.version())?;
        wanted.extend(s.split_whitespace().map(str::to_string));
    }
    let node = match args.get(1) {
        Some(_) => node_arg_or_context(ctx, args, 1)?.ok_or_else(|| Error::type_error("fn:id needs a node"))?,
        None => ctx.context_node()?,
    };
    if wanted.is_empty() {
        return Ok(Vec::new());
    }
    let found = node
        .root()
        .axis(Axis::DescendantOrSelf)
        .filter(|n| n.kind() == NodeKind::Element)
        .filter(|n| {
            n.attributes().any(|a| {
                a.local_name() == "id"
                    && (a.namespace_uri().is_none() || a.namespace_uri() == Some(XML_URI))
                    && wanted.contains(a.value().trim())
            })
        })
        .map(XdmItem::Node)
        .collect();
    Ok(found)
}

pub fn local_name<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    let node = node_arg_or_context(ctx, args, 0)?;
    Ok(string_seq(node.map_or("", |n| n.local_name())))
}

pub fn namespace_uri<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    let node = node_arg_or_context(ctx, args, 0)?;
    Ok(uri_seq(ctx, node.and_then(|n| n.namespace_uri()).unwrap_or_default()))
}

pub fn name<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    let node = node_arg_or_context(ctx, args, 0)?;
    Ok(string_seq(node.and_then(|n| n.name()).map(ToString::to_string).unwrap_or_default()))
}

/// True when the nearest `xml:lang` equals the argument or starts with it
/// followed by `-`, ignoring case.
pub fn lang<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    let wanted = string_arg(ctx, &args[0])?.to_lowercase();
    let Some(node) = node_arg_or_context(ctx, args, 1)? else {
        return Ok(bool_seq(false));
    };
    let lang = node.axis(Axis::AncestorOrSelf).find_map(|n| {
        n.attributes().find(|a| a.local_name() == "lang" && a.namespace_uri() == Some(XML_URI))
    });
    let Some(lang) = lang else {
        return Ok(bool_seq(false));
    };
    let lang = lang.value().to_lowercase();
    let matched = lang == wanted || lang.strip_prefix(&wanted).is_some_and(|rest| rest.starts_with('-'));
    Ok(bool_seq(matched))
}

pub fn data<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    let seq = arg_or_context(ctx, args, 0)?;
    Ok(eval::atomize(&seq)?.into_iter().map(XdmItem::Atomic).collect())
}

pub fn root<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    let node = node_arg_or_context(ctx, args, 0)?;
    Ok(node.map(|n| XdmItem::Node(n.root())).into_iter().collect())
}

/// Documents come from the environment; nothing is fetched.
pub fn doc<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    if ctx.context.mode == EvalMode::Schema {
        return Ok(Vec::new());
    }
    let Some(item) = optional_item(ctx, &args[0])? else {
        return Ok(Vec::new());
    };
    let uri = eval::item_string(item, ctx.version())?;
    match ctx.context.env.documents.get(&uri) {
        Some(node) => Ok(vec![XdmItem::Node(*node)]),
        None => Err(Error::from_code(ErrorCode::FODC0002, format!("document {uri} is not available"))),
    }
}

pub fn doc_available<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    if ctx.context.mode == EvalMode::Schema {
        return Ok(bool_seq(false));
    }
    let uri = string_arg(ctx, &args[0])?;
    Ok(bool_seq(ctx.context.env.documents.contains_key(&uri)))
}

pub fn base_uri<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    let node = node_arg_or_context(ctx, args, 0)?;
    Ok(match node.and_then(|n| n.base_uri()) {
        Some(uri) => uri_seq(ctx, &uri),
        None => Vec::new(),
    })
}

pub fn document_uri<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    let node = node_arg_or_context(ctx, args, 0)?;
    let uri = node.filter(|n| n.kind() == NodeKind::Document).and_then(|n| n.tree().uri());
    Ok(uri.map(|u| uri_seq(ctx, u)).unwrap_or_default())
}

pub fn node_name<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    let node = node_arg_or_context(ctx, args, 0)?;
    let Some(name) = node.and_then(|n| n.name()) else {
        return Ok(Vec::new());
    };
    Ok(vec![XdmItem::Atomic(XdmAtomicValue::QName {
        ns_uri: name.ns_uri.as_ref().map(ToString::to_string),
        prefix: name.prefix.as_ref().map(ToString::to_string),
        local: name.local.to_string(),
    })])
}

pub fn in_scope_prefixes<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    let Some(node) = node_arg_or_context(ctx, args, 0)? else {
        return Err(Error::type_error("fn:in-scope-prefixes needs an element"));
    };
    if node.kind() != NodeKind::Element {
        let kind = node.kind().as_str();
        return Err(Error::type_error(format!("fn:in-scope-prefixes needs an element, got a {kind} node")));
    }
    let mut seen = HashSet::new();
    Ok(node
        .in_scope_namespaces()
        .into_iter()
        .filter(|(prefix, _)| seen.insert(*prefix))
        .map(|(prefix, _)| XdmItem::Atomic(XdmAtomicValue::String(prefix.to_string())))
        .collect())
}

pub fn has_children<'a>(ctx: &CallCtx<'_, 'a>, args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    let node = node_arg_or_context(ctx, args, 0)?;
    Ok(bool_seq(node.is_some_and(|n: NodeRef<'a>| n.has_children())))
}
