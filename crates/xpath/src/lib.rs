//! An embeddable XPath 1.0–3.1 engine.
//!
//! Expressions are parsed once into a [`Token`] tree that is both the syntax
//! tree and the unit of evaluation. Documents (plain element trees, parsed XML
//! documents or XSD schemas) are turned into a [`NodeTree`] by
//! [`build_node_tree`], and an [`XPathContext`] binds the focus for a call to
//! [`Token::evaluate`] or [`Token::select`].
//!
//! ```
//! use thicket_xpath::etree::Element;
//! use thicket_xpath::{BuildOptions, XdmItem, build_node_tree};
//!
//! let root = Element::new("root")
//!     .with_child(Element::new("item").with_text("a"))
//!     .with_child(Element::new("item").with_text("b"));
//! let tree = build_node_tree(&root, BuildOptions::default())?;
//! let items = thicket_xpath::select(tree.root(), "//item[2]", [("p", "urn:p")])?;
//! assert!(matches!(items.as_slice(), [XdmItem::Node(n)] if n.string_value() == "b"));
//! # Ok::<(), thicket_xpath::Error>(())
//! ```

pub mod collation;
pub mod consts;
pub mod context;
pub mod error;
pub mod etree;
pub mod eval;
pub mod functions;
pub mod parser;
pub mod regex;
pub mod schema;
pub mod serialize;
pub mod token;
pub mod tree;
pub mod xdm;

pub use context::{EvalMode, XPathContext, XPathContextBuilder};
pub use error::{Error, ErrorCode, GrammarError};
pub use parser::{XPathParser, XPathVersion};
pub use schema::Schema;
pub use token::Token;
pub use tree::{Axis, BuildOptions, NodeKind, NodeRef, NodeTree, TreeSource, build_node_tree};
pub use xdm::{ExpandedName, XdmAtomicValue, XdmItem, XdmSequence};

/// Parses `path` with the latest grammar and evaluates it with `root` as the
/// context item.
pub fn select<'a, I, P, U>(root: NodeRef<'a>, path: &str, namespaces: I) -> Result<XdmSequence<'a>, Error>
where
    I: IntoIterator<Item = (P, U)>,
    P: Into<String>,
    U: Into<String>,
{
    let namespaces: std::collections::HashMap<String, String> =
        namespaces.into_iter().map(|(p, u)| (p.into(), u.into())).collect();
    let token = XPathParser::default().with_namespaces(namespaces.clone()).parse(path)?;
    token.evaluate(&XPathContext::new(root).with_namespaces(namespaces))
}
