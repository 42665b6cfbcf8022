//! The built-in function library.
//!
//! Functions are plain fn pointers so the grammar tables can be built once
//! and shared. Each implementation receives the call context and its
//! already evaluated arguments.

pub mod constructors;
pub mod core;
pub mod maps;
pub mod nodes;
pub mod numeric;
pub mod sequences;
pub mod strings;
pub mod temporal;

use crate::collation::CollationManager;
use crate::context::XPathContext;
use crate::error::{Error, ErrorCode};
use crate::eval;
use crate::parser::XPathVersion;
use crate::token::{Token, TokenKind};
use crate::tree::NodeRef;
use crate::xdm::{ExpandedName, XdmAtomicValue, XdmItem, XdmSequence};
use std::collections::HashMap;
use std::fmt;

pub type FunctionImpl =
    for<'c, 'a> fn(&CallCtx<'c, 'a>, &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error>;

/// One overload of a built-in function.
#[derive(Clone)]
pub struct Function {
    pub name: ExpandedName,
    pub min: usize,
    /// `None` for variadic functions.
    pub max: Option<usize>,
    pub imp: FunctionImpl,
}

impl Function {
    pub fn accepts(&self, arity: usize) -> bool {
        arity >= self.min && self.max.is_none_or(|max| arity <= max)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("min", &self.min)
            .field("max", &self.max)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    fns: HashMap<ExpandedName, Vec<Function>>,
}

impl FunctionRegistry {
    /// Adds an overload. Overloads are kept with the highest minimum arity
    /// first and, for equal minimums, the smaller maximum first, so the
    /// most specific overload wins when ranges overlap.
    pub fn register(&mut self, name: ExpandedName, min: usize, max: Option<usize>, imp: FunctionImpl) {
        let overloads = self.fns.entry(name.clone()).or_default();
        overloads.push(Function { name, min, max, imp });
        overloads.sort_by(|a, b| {
            b.min.cmp(&a.min).then_with(|| match (a.max, b.max) {
                (Some(amax), Some(bmax)) => amax.cmp(&bmax),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            })
        });
    }

    /// Removes every overload of `name`.
    pub fn unregister(&mut self, name: &ExpandedName) -> bool {
        self.fns.remove(name).is_some()
    }

    pub fn contains(&self, name: &ExpandedName) -> bool {
        self.fns.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &ExpandedName> {
        self.fns.keys()
    }

    pub fn resolve(&self, name: &ExpandedName, arity: usize) -> Result<&Function, Error> {
        let Some(overloads) = self.fns.get(name) else {
            return Err(Error::from_code(ErrorCode::XPST0017, format!("unknown function {name}#{arity}")));
        };
        overloads.iter().find(|f| f.accepts(arity)).ok_or_else(|| {
            Error::from_code(ErrorCode::XPST0017, format!("function {name} does not accept {arity} arguments"))
        })
    }
}

/// What a function implementation sees of its call site.
pub struct CallCtx<'c, 'a> {
    pub context: &'c XPathContext<'a>,
    pub token: &'c Token,
}

impl<'a> CallCtx<'_, 'a> {
    pub fn version(&self) -> XPathVersion {
        self.token.version
    }

    pub fn function_name(&self) -> Option<&ExpandedName> {
        match &self.token.kind {
            TokenKind::FunctionCall(f) => Some(&f.name),
            _ => None,
        }
    }

    pub fn context_item(&self) -> Result<XdmItem<'a>, Error> {
        self.context.item.clone().ok_or_else(Error::missing_context)
    }

    pub fn context_node(&self) -> Result<NodeRef<'a>, Error> {
        match self.context_item()? {
            XdmItem::Node(n) => Ok(n),
            _ => Err(Error::type_error("the context item is not a node")),
        }
    }

    /// The collation named by an optional argument, else the default.
    pub fn collation(&self, arg: Option<&XdmSequence<'a>>) -> Result<CollationManager, Error> {
        match arg {
            Some(seq) => {
                let uri = string_arg(self, seq)?;
                self.context.collation(Some(&uri))
            }
            None => self.context.collation(None),
        }
    }
}

/// At most one item; XPath 1.0 takes the first of several.
pub(crate) fn optional_item<'s, 'a>(
    ctx: &CallCtx<'_, 'a>,
    seq: &'s [XdmItem<'a>],
) -> Result<Option<&'s XdmItem<'a>>, Error> {
    if seq.len() > 1 && ctx.version() > XPathVersion::V1_0 {
        return Err(Error::type_error(format!("expected at most one item but got {}", seq.len())));
    }
    Ok(seq.first())
}

/// Optional atomic argument.
pub(crate) fn optional_atomic(ctx: &CallCtx<'_, '_>, seq: &[XdmItem<'_>]) -> Result<Option<XdmAtomicValue>, Error> {
    match optional_item(ctx, seq)? {
        Some(item) => Ok(eval::atomize(std::slice::from_ref(item))?.into_iter().next()),
        None => Ok(None),
    }
}

/// String value of an optional argument; the empty sequence is "".
pub(crate) fn string_arg(ctx: &CallCtx<'_, '_>, seq: &[XdmItem<'_>]) -> Result<String, Error> {
    Ok(optional_string_arg(ctx, seq)?.unwrap_or_default())
}

pub(crate) fn optional_string_arg(ctx: &CallCtx<'_, '_>, seq: &[XdmItem<'_>]) -> Result<Option<String>, Error> {
    match optional_item(ctx, seq)? {
        Some(item) => eval::item_string(item, ctx.version()).map(Some),
        None => Ok(None),
    }
}

/// The argument at `index`, or the context item as a one-item sequence.
pub(crate) fn arg_or_context<'a>(
    ctx: &CallCtx<'_, 'a>,
    args: &[XdmSequence<'a>],
    index: usize,
) -> Result<XdmSequence<'a>, Error> {
    match args.get(index) {
        Some(seq) => Ok(seq.clone()),
        None => Ok(vec![ctx.context_item()?]),
    }
}

/// Node argument at `index` (empty allowed), or the context node.
pub(crate) fn node_arg_or_context<'a>(
    ctx: &CallCtx<'_, 'a>,
    args: &[XdmSequence<'a>],
    index: usize,
) -> Result<Option<NodeRef<'a>>, Error> {
    let Some(seq) = args.get(index) else {
        return ctx.context_node().map(Some);
    };
    match optional_item(ctx, seq)? {
        Some(XdmItem::Node(n)) => Ok(Some(*n)),
        Some(other) => Err(Error::type_error(format!("expected a node but got {other}"))),
        None => Ok(None),
    }
}

pub(crate) fn integer_arg(ctx: &CallCtx<'_, '_>, seq: &[XdmItem<'_>]) -> Result<i64, Error> {
    match optional_atomic(ctx, seq)? {
        Some(XdmAtomicValue::Integer(i)) => Ok(i),
        Some(a @ XdmAtomicValue::UntypedAtomic(_)) => match eval::casting::cast(&a, crate::xdm::AtomicType::Integer)? {
            XdmAtomicValue::Integer(i) => Ok(i),
            _ => Err(Error::type_error("expected xs:integer")),
        },
        Some(other) => Err(Error::type_error(format!("expected xs:integer but got {}", other.atomic_type()))),
        None => Err(Error::type_error("expected xs:integer but got the empty sequence")),
    }
}

pub(crate) fn bool_seq<'a>(b: bool) -> XdmSequence<'a> {
    vec![XdmItem::Atomic(XdmAtomicValue::Boolean(b))]
}

pub(crate) fn string_seq<'a>(s: impl Into<String>) -> XdmSequence<'a> {
    vec![XdmItem::Atomic(XdmAtomicValue::String(s.into()))]
}

pub(crate) fn integer_seq<'a>(i: i64) -> XdmSequence<'a> {
    vec![XdmItem::Atomic(XdmAtomicValue::Integer(i))]
}

pub(crate) fn double_seq<'a>(d: f64) -> XdmSequence<'a> {
    vec![XdmItem::Atomic(XdmAtomicValue::Double(d))]
}

pub(crate) fn atomic_seq<'a>(a: Option<XdmAtomicValue>) -> XdmSequence<'a> {
    a.map(XdmItem::Atomic).into_iter().collect()
}

/// Integer result of a count or length.
pub(crate) fn count_seq<'a>(n: usize) -> XdmSequence<'a> {
    integer_seq(i64::try_from(n).unwrap_or(i64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one<'a>(_: &CallCtx<'_, 'a>, _: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
        Ok(integer_seq(1))
    }

    fn two<'a>(_: &CallCtx<'_, 'a>, _: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
        Ok(integer_seq(2))
    }

    #[test]
    fn resolve_prefers_the_most_specific_overload() {
        let mut reg = FunctionRegistry::default();
        let name = ExpandedName::local("f");
        reg.register(name.clone(), 0, None, one);
        reg.register(name.clone(), 2, Some(2), two);
        assert_eq!(reg.resolve(&name, 2).expect("two").min, 2);
        assert_eq!(reg.resolve(&name, 5).expect("variadic").min, 0);
    }

    #[test]
    fn unknown_names_and_arities_are_static_errors() {
        let mut reg = FunctionRegistry::default();
        let name = ExpandedName::local("f");
        reg.register(name.clone(), 1, Some(1), one);
        assert_eq!(reg.resolve(&name, 2).err().map(|e| e.code_enum()), Some(ErrorCode::XPST0017));
        assert_eq!(
            reg.resolve(&ExpandedName::local("g"), 0).err().map(|e| e.code_enum()),
            Some(ErrorCode::XPST0017)
        );
        assert!(reg.unregister(&name));
        assert!(!reg.contains(&name));
    }
}
