use crate::consts::ERR_NS;
use crate::token::{Span, Token};
use crate::xdm::ExpandedName;
use core::fmt;
use std::sync::Arc;

/// Error codes emitted by the parser, the evaluator and the function library.
///
/// Every code maps onto a QName in the `err` namespace. `Unknown` covers codes
/// raised by host functions through `fn:error` that are not listed here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    FOAR0001, // division by zero
    FOAR0002, // numeric overflow
    FOAY0001, // array index out of bounds
    FOCA0001, // value too large for xs:decimal
    FOCA0002, // invalid lexical value
    FOCA0005, // NaN supplied as a duration operand
    FOCH0001, // codepoint not valid
    FOCH0002, // unsupported collation
    FOCH0003, // unsupported normalization form
    FODC0002, // error retrieving resource
    FODC0005, // invalid argument to fn:doc
    FODT0001, // overflow in date/time arithmetic
    FODT0002, // overflow in duration arithmetic
    FOER0000, // unidentified error (fn:error)
    FONS0004, // no namespace found for prefix
    FORG0001, // invalid value for cast
    FORG0002, // invalid argument to fn:resolve-uri
    FORG0003, // zero-or-one called with more than one item
    FORG0004, // one-or-more called with an empty sequence
    FORG0005, // exactly-one called with zero or several items
    FORG0006, // invalid argument type / effective boolean value
    FORX0001, // invalid regex flags
    FORX0002, // invalid regular expression
    FORX0003, // regex matches the empty string
    FORX0004, // invalid replacement string
    FOTY0013, // atomization of a function item (maps)
    SENR0001, // item cannot be serialized
    XPDY0002, // context item or document root is absent
    XPDY0050, // treat as: dynamic type does not match
    XPDY0130, // implementation limit exceeded
    XPST0003, // syntax error
    XPST0008, // undeclared variable or schema name
    XPST0017, // unknown function or wrong arity
    XPST0051, // unknown atomic type
    XPST0080, // cast to abstract type
    XPST0081, // unknown namespace prefix
    XPTY0004, // type error
    XPTY0018, // path result mixes nodes and atomic values
    XPTY0019, // path step on a non-node
    XPTY0020, // axis step on a non-node context item
    XQDY0137, // duplicate key in a map constructor
    Unknown,
}

const ALL_CODES: &[ErrorCode] = &[
    ErrorCode::FOAR0001,
    ErrorCode::FOAR0002,
    ErrorCode::FOAY0001,
    ErrorCode::FOCA0001,
    ErrorCode::FOCA0002,
    ErrorCode::FOCA0005,
    ErrorCode::FOCH0001,
    ErrorCode::FOCH0002,
    ErrorCode::FOCH0003,
    ErrorCode::FODC0002,
    ErrorCode::FODC0005,
    ErrorCode::FODT0001,
    ErrorCode::FODT0002,
    ErrorCode::FOER0000,
    ErrorCode::FONS0004,
    ErrorCode::FORG0001,
    ErrorCode::FORG0002,
    ErrorCode::FORG0003,
    ErrorCode::FORG0004,
    ErrorCode::FORG0005,
    ErrorCode::FORG0006,
    ErrorCode::FORX0001,
    ErrorCode::FORX0002,
    ErrorCode::FORX0003,
    ErrorCode::FORX0004,
    ErrorCode::FOTY0013,
    ErrorCode::SENR0001,
    ErrorCode::XPDY0002,
    ErrorCode::XPDY0050,
    ErrorCode::XPDY0130,
    ErrorCode::XPST0003,
    ErrorCode::XPST0008,
    ErrorCode::XPST0017,
    ErrorCode::XPST0051,
    ErrorCode::XPST0080,
    ErrorCode::XPST0081,
    ErrorCode::XPTY0004,
    ErrorCode::XPTY0018,
    ErrorCode::XPTY0019,
    ErrorCode::XPTY0020,
    ErrorCode::XQDY0137,
];

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::FOAR0001 => "FOAR0001",
            ErrorCode::FOAR0002 => "FOAR0002",
            ErrorCode::FOAY0001 => "FOAY0001",
            ErrorCode::FOCA0001 => "FOCA0001",
            ErrorCode::FOCA0002 => "FOCA0002",
            ErrorCode::FOCA0005 => "FOCA0005",
            ErrorCode::FOCH0001 => "FOCH0001",
            ErrorCode::FOCH0002 => "FOCH0002",
            ErrorCode::FOCH0003 => "FOCH0003",
            ErrorCode::FODC0002 => "FODC0002",
            ErrorCode::FODC0005 => "FODC0005",
            ErrorCode::FODT0001 => "FODT0001",
            ErrorCode::FODT0002 => "FODT0002",
            ErrorCode::FOER0000 => "FOER0000",
            ErrorCode::FONS0004 => "FONS0004",
            ErrorCode::FORG0001 => "FORG0001",
            ErrorCode::FORG0002 => "FORG0002",
            ErrorCode::FORG0003 => "FORG0003",
            ErrorCode::FORG0004 => "FORG0004",
            ErrorCode::FORG0005 => "FORG0005",
            ErrorCode::FORG0006 => "FORG0006",
            ErrorCode::FORX0001 => "FORX0001",
            ErrorCode::FORX0002 => "FORX0002",
            ErrorCode::FORX0003 => "FORX0003",
            ErrorCode::FORX0004 => "FORX0004",
            ErrorCode::FOTY0013 => "FOTY0013",
            ErrorCode::SENR0001 => "SENR0001",
            ErrorCode::XPDY0002 => "XPDY0002",
            ErrorCode::XPDY0050 => "XPDY0050",
            ErrorCode::XPDY0130 => "XPDY0130",
            ErrorCode::XPST0003 => "XPST0003",
            ErrorCode::XPST0008 => "XPST0008",
            ErrorCode::XPST0017 => "XPST0017",
            ErrorCode::XPST0051 => "XPST0051",
            ErrorCode::XPST0080 => "XPST0080",
            ErrorCode::XPST0081 => "XPST0081",
            ErrorCode::XPTY0004 => "XPTY0004",
            ErrorCode::XPTY0018 => "XPTY0018",
            ErrorCode::XPTY0019 => "XPTY0019",
            ErrorCode::XPTY0020 => "XPTY0020",
            ErrorCode::XQDY0137 => "XQDY0137",
            ErrorCode::Unknown => "UNKNOWN",
        }
    }

    /// Returns the QName of the code in the `http://www.w3.org/2005/xqt-errors` namespace.
    pub fn qname(self) -> ExpandedName {
        ExpandedName::new(Some(ERR_NS.to_string()), self.as_str())
    }

    /// Accepts `err:XPTY0004` as well as the bare local part.
    pub fn from_code(s: &str) -> Self {
        let local = s.strip_prefix("err:").unwrap_or(s);
        ALL_CODES.iter().copied().find(|c| c.as_str() == local).unwrap_or(ErrorCode::Unknown)
    }

    /// Static errors are detected while parsing or during a schema check.
    pub fn is_static(self) -> bool {
        self.as_str().starts_with("XPST")
    }
}

/// Where in the source text an error was raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub symbol: String,
    pub span: Span,
}

#[derive(Debug, Clone, thiserror::Error)]
pub struct Error {
    pub code: ExpandedName,
    pub message: String,
    pub location: Option<Location>,
    #[source]
    pub source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    pub fn new_qname(code: ExpandedName, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), location: None, source: None }
    }

    pub fn from_code(code: ErrorCode, msg: impl Into<String>) -> Self {
        Self::new_qname(code.qname(), msg)
    }

    pub fn syntax(msg: impl Into<String>) -> Self {
        Self::from_code(ErrorCode::XPST0003, msg)
    }

    pub fn type_error(msg: impl Into<String>) -> Self {
        Self::from_code(ErrorCode::XPTY0004, msg)
    }

    pub fn missing_context() -> Self {
        Self::from_code(ErrorCode::XPDY0002, "the context item is absent")
    }

    pub fn code_enum(&self) -> ErrorCode {
        if self.code.ns_uri.as_deref() == Some(ERR_NS) {
            ErrorCode::from_code(&self.code.local)
        } else {
            ErrorCode::Unknown
        }
    }

    /// Human readable code: `err:LOCAL` or `Q{ns}local`.
    pub fn format_code(&self) -> String {
        match self.code.ns_uri.as_deref() {
            Some(ERR_NS) => format!("err:{}", self.code.local),
            Some(ns) => format!("Q{{{ns}}}{}", self.code.local),
            None => self.code.local.clone(),
        }
    }

    pub fn with_source(
        mut self,
        source: impl Into<Option<Arc<dyn std::error::Error + Send + Sync>>>,
    ) -> Self {
        self.source = source.into();
        self
    }

    /// Attributes the error to `token` unless an inner token already claimed it.
    #[must_use]
    pub fn or_at(mut self, token: &Token) -> Self {
        if self.location.is_none() {
            self.location = Some(Location { symbol: token.symbol.to_string(), span: token.span });
        }
        self
    }

    #[must_use]
    pub fn at_span(mut self, symbol: &str, span: Span) -> Self {
        self.location = Some(Location { symbol: symbol.to_string(), span });
        self
    }
}

impl From<fancy_regex::Error> for Error {
    fn from(e: fancy_regex::Error) -> Self {
        Error::from_code(ErrorCode::FORX0002, "regex error")
            .with_source(Some(Arc::new(e) as Arc<dyn std::error::Error + Send + Sync>))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error: {} ({})", self.message, self.format_code())?;
        if let Some(loc) = &self.location {
            write!(f, " at line {}, column {}", loc.span.line, loc.span.column)?;
        }
        Ok(())
    }
}

/// Raised while a grammar version populates its symbol table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GrammarError {
    #[error("{0:?} is a reserved function name")]
    ReservedName(String),
    #[error("symbol {0:?} is not registered")]
    UnknownSymbol(String),
    #[error("symbol {0:?} is already registered")]
    AlreadyRegistered(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip_through_their_names() {
        for code in ALL_CODES {
            assert_eq!(ErrorCode::from_code(&format!("err:{}", code.as_str())), *code);
        }
        assert_eq!(ErrorCode::from_code("err:NOPE0000"), ErrorCode::Unknown);
    }

    #[test]
    fn display_includes_code_and_location() {
        let err = Error::syntax("unexpected token").at_span(
            "+",
            Span { offset: 2, line: 1, column: 3 },
        );
        assert_eq!(err.to_string(), "error: unexpected token (err:XPST0003) at line 1, column 3");
        assert_eq!(err.code_enum(), ErrorCode::XPST0003);
    }
}
