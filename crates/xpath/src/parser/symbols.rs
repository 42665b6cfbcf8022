//! Symbol tables: per grammar version, the map from a lexeme's symbol to its
//! null and left denotations, plus the version's function library.

use super::{Parser, XPathVersion};
use crate::consts::FNS;
use crate::error::{Error, GrammarError};
use crate::functions::{FunctionImpl, FunctionRegistry};
use crate::parser::lexer::Lexeme;
use crate::token::Token;
use crate::xdm::ExpandedName;
use compact_str::CompactString;
use std::collections::HashMap;

/// Category of a symbol, also carried by the tokens it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Label {
    Literal,
    Operator,
    Axis,
    Function,
    ConstructorFunction,
    KindTest,
    NameTest,
    Variable,
    Keyword,
    Constructor,
    Punctuation,
}

/// Null denotation: the lexeme starts an expression.
pub type NudFn = for<'p, 's> fn(&mut Parser<'p, 's>, Lexeme<'s>) -> Result<Token, Error>;
/// Left denotation: the lexeme follows an already parsed operand.
pub type LedFn = for<'p, 's> fn(&mut Parser<'p, 's>, Token, Lexeme<'s>) -> Result<Token, Error>;

#[derive(Clone)]
pub struct SymbolDef {
    pub symbol: CompactString,
    pub label: Label,
    pub lbp: u32,
    pub rbp: u32,
    pub nud: Option<NudFn>,
    pub led: Option<LedFn>,
}

impl std::fmt::Debug for SymbolDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymbolDef")
            .field("symbol", &self.symbol)
            .field("label", &self.label)
            .field("lbp", &self.lbp)
            .field("rbp", &self.rbp)
            .field("nud", &self.nud.is_some())
            .field("led", &self.led.is_some())
            .finish()
    }
}

/// Names that may never be used as function names.
pub const RESERVED_FUNCTION_NAMES: &[&str] = &[
    "attribute",
    "comment",
    "document-node",
    "element",
    "empty-sequence",
    "function",
    "if",
    "item",
    "namespace-node",
    "node",
    "processing-instruction",
    "schema-attribute",
    "schema-element",
    "switch",
    "text",
    "typeswitch",
    "map",
    "array",
];

#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    version: XPathVersion,
    symbols: HashMap<CompactString, SymbolDef>,
    functions: FunctionRegistry,
}

impl SymbolTable {
    pub fn new(version: XPathVersion) -> Self {
        Self { version, symbols: HashMap::new(), functions: FunctionRegistry::default() }
    }

    /// Copy of `self` re-labelled for a derived grammar version.
    #[must_use]
    pub fn derive(&self, version: XPathVersion) -> Self {
        let mut table = self.clone();
        table.version = version;
        table
    }

    pub fn version(&self) -> XPathVersion {
        self.version
    }

    pub fn get(&self, symbol: &str) -> Option<&SymbolDef> {
        self.symbols.get(symbol)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.contains_key(symbol)
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn symbols(&self) -> impl Iterator<Item = &SymbolDef> {
        self.symbols.values()
    }

    /// Inserts or replaces a definition.
    pub fn register(
        &mut self,
        symbol: &str,
        label: Label,
        lbp: u32,
        rbp: u32,
        nud: Option<NudFn>,
        led: Option<LedFn>,
    ) {
        tracing::trace!(symbol, version = %self.version, "register symbol");
        self.symbols.insert(
            CompactString::from(symbol),
            SymbolDef { symbol: CompactString::from(symbol), label, lbp, rbp, nud, led },
        );
    }

    pub fn literal(&mut self, symbol: &str, nud: NudFn) {
        self.register(symbol, Label::Literal, 0, 0, Some(nud), None);
    }

    pub fn prefix(&mut self, symbol: &str, label: Label, rbp: u32, nud: NudFn) {
        self.register(symbol, label, 0, rbp, Some(nud), None);
    }

    /// Left associative binary operator.
    pub fn infix(&mut self, symbol: &str, lbp: u32, led: LedFn) {
        self.register(symbol, Label::Operator, lbp, lbp, None, Some(led));
    }

    /// Right associative binary operator.
    pub fn infix_r(&mut self, symbol: &str, lbp: u32, led: LedFn) {
        self.register(symbol, Label::Operator, lbp, lbp - 1, None, Some(led));
    }

    pub fn postfix(&mut self, symbol: &str, lbp: u32, led: LedFn) {
        self.register(symbol, Label::Operator, lbp, 0, None, Some(led));
    }

    pub fn axis(&mut self, name: &str, nud: NudFn) {
        self.register(name, Label::Axis, 0, 90, Some(nud), None);
    }

    pub fn kind_test(&mut self, name: &str, nud: NudFn) {
        self.register(name, Label::KindTest, 0, 0, Some(nud), None);
    }

    pub fn keyword(&mut self, name: &str, nud: NudFn) {
        self.register(name, Label::Keyword, 0, 5, Some(nud), None);
    }

    /// Adds a nud to an existing symbol (which may only have a led so far).
    pub fn with_nud(&mut self, symbol: &str, nud: NudFn) -> Result<(), GrammarError> {
        let def = self
            .symbols
            .get_mut(symbol)
            .ok_or_else(|| GrammarError::UnknownSymbol(symbol.to_string()))?;
        def.nud = Some(nud);
        Ok(())
    }

    /// Registers a function of the default function namespace under its local
    /// name, which also becomes a symbol of the table.
    pub fn function(
        &mut self,
        local: &str,
        min: usize,
        max: Option<usize>,
        nud: NudFn,
        imp: FunctionImpl,
    ) -> Result<(), GrammarError> {
        if RESERVED_FUNCTION_NAMES.contains(&local) {
            return Err(GrammarError::ReservedName(local.to_string()));
        }
        if !self.symbols.contains_key(local) {
            self.register(local, Label::Function, 0, 0, Some(nud), None);
        }
        self.functions.register(ExpandedName::new(Some(FNS.to_string()), local), min, max, imp);
        Ok(())
    }

    /// Registers a function that is only reachable through a prefixed name.
    pub fn function_ns(&mut self, ns: &str, local: &str, min: usize, max: Option<usize>, imp: FunctionImpl) {
        self.functions.register(ExpandedName::new(Some(ns.to_string()), local), min, max, imp);
    }

    /// Removes a symbol and the default-namespace functions of that name.
    pub fn unregister(&mut self, symbol: &str) -> Result<(), GrammarError> {
        if self.symbols.remove(symbol).is_none() {
            return Err(GrammarError::UnknownSymbol(symbol.to_string()));
        }
        self.functions.unregister(&ExpandedName::new(Some(FNS.to_string()), symbol));
        Ok(())
    }

    /// Makes `alias` behave like `existing`.
    pub fn duplicate(&mut self, existing: &str, alias: &str) -> Result<(), GrammarError> {
        if self.symbols.contains_key(alias) {
            return Err(GrammarError::AlreadyRegistered(alias.to_string()));
        }
        let mut def = self
            .symbols
            .get(existing)
            .cloned()
            .ok_or_else(|| GrammarError::UnknownSymbol(existing.to_string()))?;
        def.symbol = CompactString::from(alias);
        self.symbols.insert(CompactString::from(alias), def);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::grammar;

    #[test]
    fn registration_conflicts_are_grammar_errors() {
        let mut table = SymbolTable::new(XPathVersion::V1_0);
        assert_eq!(table.unregister("nope"), Err(GrammarError::UnknownSymbol("nope".into())));
        assert_eq!(table.duplicate("nope", "alias"), Err(GrammarError::UnknownSymbol("nope".into())));
        let err = table.function("if", 1, Some(1), grammar::nud_name, crate::functions::core::true_);
        assert_eq!(err, Err(GrammarError::ReservedName("if".into())));
    }

    #[test]
    fn duplicate_copies_binding_powers() {
        let table = grammar::table(XPathVersion::V2_0).expect("table");
        let bar = table.get("|").expect("|");
        let union = table.get("union").expect("union");
        assert_eq!((bar.lbp, bar.rbp), (union.lbp, union.rbp));
        assert_eq!(union.symbol, "union");
    }

    #[test]
    fn later_versions_extend_earlier_ones() {
        let v1 = grammar::table(XPathVersion::V1_0).expect("v1");
        let v31 = grammar::table(XPathVersion::V3_1).expect("v31");
        assert!(!v1.contains("for"));
        assert!(v31.contains("for"));
        assert!(v31.contains("=>"));
        assert!(v1.contains("(name)"));
        assert!(!v1.contains("(braced_name)"));
        assert!(v31.contains("(braced_name)"));
    }
}
