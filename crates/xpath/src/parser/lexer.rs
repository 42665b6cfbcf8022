use crate::error::Error;
use crate::token::Span;
use pest::Parser as _;

#[derive(pest_derive::Parser)]
#[grammar = "parser/xpath.pest"]
struct XPathLexer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexemeKind {
    Integer,
    Decimal,
    Double,
    String,
    Name,
    BracedName,
    Operator,
    Invalid,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lexeme<'s> {
    pub kind: LexemeKind,
    pub text: &'s str,
    pub span: Span,
}

impl<'s> Lexeme<'s> {
    /// Operator or name text compared against `s`.
    pub fn is(&self, s: &str) -> bool {
        matches!(self.kind, LexemeKind::Operator | LexemeKind::Name) && self.text == s
    }

    pub fn is_name(&self) -> bool {
        matches!(self.kind, LexemeKind::Name | LexemeKind::BracedName)
    }

    /// The symbol-table key of a literal or special lexeme; `None` for
    /// names and operators, which are looked up by their text.
    pub fn class_symbol(&self) -> Option<&'static str> {
        match self.kind {
            LexemeKind::Integer => Some("(integer)"),
            LexemeKind::Decimal => Some("(decimal)"),
            LexemeKind::Double => Some("(double)"),
            LexemeKind::String => Some("(string)"),
            LexemeKind::BracedName => Some("(braced_name)"),
            LexemeKind::Invalid => Some("(invalid)"),
            LexemeKind::End => Some("(end)"),
            LexemeKind::Name | LexemeKind::Operator => None,
        }
    }

    /// Human readable form used in error messages.
    pub fn describe(&self) -> String {
        match self.kind {
            LexemeKind::End => "end of expression".to_string(),
            _ => format!("'{}'", self.text),
        }
    }
}

/// Splits `source` into lexemes, appending an end marker.
pub fn tokenize(source: &str) -> Result<Vec<Lexeme<'_>>, Error> {
    let pairs = XPathLexer::parse(Rule::lexemes, source).map_err(|e| {
        Error::syntax(format!("cannot tokenize expression: {e}"))
            .with_source(Some(std::sync::Arc::new(e) as std::sync::Arc<dyn std::error::Error + Send + Sync>))
    })?;
    let mut out = Vec::new();
    for pair in pairs {
        let kind = match pair.as_rule() {
            Rule::integer => LexemeKind::Integer,
            Rule::decimal => LexemeKind::Decimal,
            Rule::double => LexemeKind::Double,
            Rule::string => LexemeKind::String,
            Rule::name => LexemeKind::Name,
            Rule::braced_name => LexemeKind::BracedName,
            Rule::operator => LexemeKind::Operator,
            Rule::invalid => LexemeKind::Invalid,
            _ => continue,
        };
        let start = pair.as_span().start_pos();
        let (line, column) = start.line_col();
        out.push(Lexeme { kind, text: pair.as_str(), span: Span { offset: start.pos(), line, column } });
    }
    let (line, column) = end_position(source);
    out.push(Lexeme {
        kind: LexemeKind::End,
        text: "",
        span: Span { offset: source.len(), line, column },
    });
    Ok(out)
}

fn end_position(source: &str) -> (usize, usize) {
    let line = source.matches('\n').count() + 1;
    let column = source.rsplit('\n').next().map_or(0, |l| l.chars().count()) + 1;
    (line, column)
}

/// Unquotes a string literal, collapsing doubled delimiters.
pub fn unescape_string(text: &str) -> String {
    let Some(quote) = text.chars().next() else {
        return String::new();
    };
    let inner = text.get(1..text.len().saturating_sub(1)).unwrap_or("");
    let doubled = if quote == '"' { "\"\"" } else { "''" };
    inner.replace(doubled, &quote.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<(LexemeKind, &str)> {
        tokenize(source).expect("lexes").into_iter().map(|l| (l.kind, l.text)).collect()
    }

    #[test]
    fn splits_names_operators_and_numbers() {
        assert_eq!(
            kinds("child::a-b[1.5]//x:y"),
            vec![
                (LexemeKind::Name, "child"),
                (LexemeKind::Operator, "::"),
                (LexemeKind::Name, "a-b"),
                (LexemeKind::Operator, "["),
                (LexemeKind::Decimal, "1.5"),
                (LexemeKind::Operator, "]"),
                (LexemeKind::Operator, "//"),
                (LexemeKind::Name, "x:y"),
                (LexemeKind::End, ""),
            ]
        );
    }

    #[test]
    fn skips_nested_comments_and_tracks_lines() {
        let lexemes = tokenize("1 (: outer (: inner :) :)\n  + 2e0").expect("lexes");
        assert_eq!(lexemes.len(), 4);
        assert_eq!(lexemes[1].text, "+");
        assert_eq!((lexemes[1].span.line, lexemes[1].span.column), (2, 3));
        assert_eq!(lexemes[2].kind, LexemeKind::Double);
    }

    #[test]
    fn strings_unescape_doubled_quotes() {
        let lexemes = tokenize("'it''s' \"a\"\"b\"").expect("lexes");
        assert_eq!(unescape_string(lexemes[0].text), "it's");
        assert_eq!(unescape_string(lexemes[1].text), "a\"b");
    }

    #[test]
    fn wildcards_and_braced_names() {
        assert_eq!(
            kinds("*:a p:* Q{urn:x}b"),
            vec![
                (LexemeKind::Name, "*:a"),
                (LexemeKind::Name, "p:*"),
                (LexemeKind::BracedName, "Q{urn:x}b"),
                (LexemeKind::End, ""),
            ]
        );
    }
}
