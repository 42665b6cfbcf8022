//! The dynamic context an expression is evaluated in.

use crate::collation::{Collation, CollationManager, CollationRegistry};
use crate::consts::CODEPOINT_URI;
use crate::error::Error;
use crate::regex::{FancyRegexProvider, RegexProvider};
use crate::serialize::{Serializer, XmlSerializer};
use crate::tree::{Axis, NodeRef};
use crate::xdm::{ExpandedName, XdmItem, XdmSequence};
use chrono::{DateTime, FixedOffset};
use core::fmt;
use std::collections::HashMap;
use std::sync::Arc;

/// Evaluation against instance data, or against a schema's node tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EvalMode {
    #[default]
    Dynamic,
    Schema,
}

/// Parts of the context shared by every copy made during one evaluation.
pub struct Environment<'a> {
    pub documents: HashMap<String, NodeRef<'a>>,
    pub collations: CollationRegistry,
    pub default_collation: String,
    pub serializer: Arc<dyn Serializer>,
    pub regex: Arc<dyn RegexProvider>,
    pub implicit_timezone: FixedOffset,
    pub current_datetime: DateTime<FixedOffset>,
    pub env_vars: HashMap<String, String>,
    pub base_uri: Option<String>,
}

impl fmt::Debug for Environment<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("documents", &self.documents.keys().collect::<Vec<_>>())
            .field("default_collation", &self.default_collation)
            .field("implicit_timezone", &self.implicit_timezone)
            .field("current_datetime", &self.current_datetime)
            .field("base_uri", &self.base_uri)
            .finish_non_exhaustive()
    }
}

/// Focus, variables and shared environment of an evaluation.
///
/// Cloning is cheap: the focus is copied, everything else is reference
/// counted. The variable map is copied on write.
#[derive(Debug, Clone)]
pub struct XPathContext<'a> {
    pub(crate) root: Option<NodeRef<'a>>,
    pub(crate) item: Option<XdmItem<'a>>,
    pub(crate) position: usize,
    pub(crate) size: usize,
    /// Axis being walked when a node test is applied.
    pub(crate) axis: Option<Axis>,
    pub(crate) variables: Arc<HashMap<ExpandedName, XdmSequence<'a>>>,
    pub(crate) namespaces: Arc<HashMap<String, String>>,
    pub(crate) env: Arc<Environment<'a>>,
    pub(crate) mode: EvalMode,
}

impl<'a> XPathContext<'a> {
    /// Context with `root` as both the document root and the context item.
    pub fn new(root: NodeRef<'a>) -> Self {
        XPathContextBuilder::new().with_root(root).build()
    }

    /// Context for evaluating against a schema node tree.
    pub fn schema(root: NodeRef<'a>) -> Self {
        XPathContextBuilder::new().with_root(root).with_mode(EvalMode::Schema).build()
    }

    pub fn builder() -> XPathContextBuilder<'a> {
        XPathContextBuilder::new()
    }

    pub fn root(&self) -> Option<NodeRef<'a>> {
        self.root
    }

    pub fn item(&self) -> Option<&XdmItem<'a>> {
        self.item.as_ref()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn axis(&self) -> Option<Axis> {
        self.axis
    }

    pub fn mode(&self) -> EvalMode {
        self.mode
    }

    pub fn environment(&self) -> &Environment<'a> {
        &self.env
    }

    pub fn variable(&self, name: &ExpandedName) -> Option<&XdmSequence<'a>> {
        self.variables.get(name)
    }

    pub fn namespaces(&self) -> &HashMap<String, String> {
        &self.namespaces
    }

    #[must_use]
    pub fn with_namespaces(mut self, namespaces: HashMap<String, String>) -> Self {
        Arc::make_mut(&mut self.namespaces).extend(namespaces);
        self
    }

    #[must_use]
    pub fn with_variable(mut self, name: ExpandedName, value: XdmSequence<'a>) -> Self {
        self.bind(name, value);
        self
    }

    #[must_use]
    pub fn with_item(mut self, item: XdmItem<'a>) -> Self {
        self.item = Some(item);
        self.position = 1;
        self.size = 1;
        self
    }

    pub(crate) fn bind(&mut self, name: ExpandedName, value: XdmSequence<'a>) {
        Arc::make_mut(&mut self.variables).insert(name, value);
    }

    pub(crate) fn set_focus(&mut self, item: XdmItem<'a>, position: usize, size: usize) {
        self.item = Some(item);
        self.position = position;
        self.size = size;
        self.axis = None;
    }

    /// Collation named by `uri`, or the default collation.
    pub fn collation(&self, uri: Option<&str>) -> Result<CollationManager, Error> {
        let collation = self.env.collations.resolve(uri, &self.env.default_collation)?;
        Ok(CollationManager::new(collation))
    }
}

/// Dynamic configuration of an evaluation.
pub struct XPathContextBuilder<'a> {
    root: Option<NodeRef<'a>>,
    item: Option<XdmItem<'a>>,
    variables: HashMap<ExpandedName, XdmSequence<'a>>,
    namespaces: HashMap<String, String>,
    documents: HashMap<String, NodeRef<'a>>,
    collations: CollationRegistry,
    default_collation: Option<String>,
    serializer: Option<Arc<dyn Serializer>>,
    regex: Option<Arc<dyn RegexProvider>>,
    implicit_timezone: Option<FixedOffset>,
    current_datetime: Option<DateTime<FixedOffset>>,
    env_vars: HashMap<String, String>,
    base_uri: Option<String>,
    mode: EvalMode,
}

impl Default for XPathContextBuilder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> XPathContextBuilder<'a> {
    pub fn new() -> Self {
        Self {
            root: None,
            item: None,
            variables: HashMap::new(),
            namespaces: HashMap::new(),
            documents: HashMap::new(),
            collations: CollationRegistry::default(),
            default_collation: None,
            serializer: None,
            regex: None,
            implicit_timezone: None,
            current_datetime: None,
            env_vars: HashMap::new(),
            base_uri: None,
            mode: EvalMode::Dynamic,
        }
    }

    /// The document root; also the context item unless one is set.
    pub fn with_root(mut self, root: NodeRef<'a>) -> Self {
        self.root = Some(root);
        self
    }

    pub fn with_item(mut self, item: impl Into<XdmItem<'a>>) -> Self {
        self.item = Some(item.into());
        self
    }

    pub fn with_variable(mut self, name: ExpandedName, value: impl Into<XdmSequence<'a>>) -> Self {
        self.variables.insert(name, value.into());
        self
    }

    pub fn with_namespace(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.namespaces.insert(prefix.into(), uri.into());
        self
    }

    /// Makes `root` available to `fn:doc` under `uri`.
    pub fn with_document(mut self, uri: impl Into<String>, root: NodeRef<'a>) -> Self {
        self.documents.insert(uri.into(), root);
        self
    }

    pub fn with_collation(mut self, collation: Arc<dyn Collation>) -> Self {
        self.collations.register(collation);
        self
    }

    pub fn with_default_collation(mut self, uri: impl Into<String>) -> Self {
        self.default_collation = Some(uri.into());
        self
    }

    pub fn with_serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.serializer = Some(serializer);
        self
    }

    pub fn with_regex_provider(mut self, regex: Arc<dyn RegexProvider>) -> Self {
        self.regex = Some(regex);
        self
    }

    pub fn with_implicit_timezone(mut self, tz: FixedOffset) -> Self {
        self.implicit_timezone = Some(tz);
        self
    }

    pub fn with_current_datetime(mut self, now: DateTime<FixedOffset>) -> Self {
        self.current_datetime = Some(now);
        self
    }

    pub fn with_env_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(name.into(), value.into());
        self
    }

    pub fn with_env_vars<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env_vars.extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn with_base_uri(mut self, uri: impl Into<String>) -> Self {
        self.base_uri = Some(uri.into());
        self
    }

    pub fn with_mode(mut self, mode: EvalMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn build(self) -> XPathContext<'a> {
        let now = self.current_datetime.unwrap_or_else(|| chrono::Local::now().fixed_offset());
        let implicit_timezone = self.implicit_timezone.unwrap_or_else(|| *now.offset());
        let item = self.item.or_else(|| self.root.map(XdmItem::Node));
        let (position, size) = if item.is_some() { (1, 1) } else { (0, 0) };
        let env = Environment {
            documents: self.documents,
            collations: self.collations,
            default_collation: self.default_collation.unwrap_or_else(|| CODEPOINT_URI.to_string()),
            serializer: self.serializer.unwrap_or_else(|| Arc::new(XmlSerializer)),
            regex: self.regex.unwrap_or_else(|| Arc::new(FancyRegexProvider::new())),
            implicit_timezone,
            current_datetime: now,
            env_vars: self.env_vars,
            base_uri: self.base_uri,
        };
        XPathContext {
            root: self.root,
            item,
            position,
            size,
            axis: None,
            variables: Arc::new(self.variables),
            namespaces: Arc::new(self.namespaces),
            env: Arc::new(env),
            mode: self.mode,
        }
    }
}
