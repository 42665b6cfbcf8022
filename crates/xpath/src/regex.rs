use crate::error::{Error, ErrorCode};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};

/// Backend for `fn:matches`, `fn:replace` and `fn:tokenize`.
pub trait RegexProvider: Send + Sync {
    fn matches(&self, pattern: &str, flags: &str, text: &str) -> Result<bool, Error>;
    fn replace(&self, pattern: &str, flags: &str, text: &str, replacement: &str) -> Result<String, Error>;
    fn tokenize(&self, pattern: &str, flags: &str, text: &str) -> Result<Vec<String>, Error>;
}

fn regex_error(code: ErrorCode, msg: &str, e: fancy_regex::Error) -> Error {
    Error::from_code(code, msg)
        .with_source(Some(Arc::new(e) as Arc<dyn std::error::Error + Send + Sync>))
}

fn evaluation_error(e: fancy_regex::Error) -> Error {
    regex_error(ErrorCode::FORX0002, "regex evaluation failed", e)
}

/// Replacing or splitting on a pattern that matches "" would never advance.
fn reject_empty_match(re: &fancy_regex::Regex) -> Result<(), Error> {
    if re.is_match("").map_err(evaluation_error)? {
        return Err(Error::from_code(ErrorCode::FORX0003, "regex matches the zero-length string"));
    }
    Ok(())
}

/// XPath regular expressions on top of fancy-regex, which supports back-references.
///
/// Compiled patterns are cached per (pattern, flags) pair.
pub struct FancyRegexProvider {
    cache: Mutex<LruCache<(String, String), Arc<fancy_regex::Regex>>>,
}

const CACHE_SIZE: NonZeroUsize = match NonZeroUsize::new(64) {
    Some(n) => n,
    None => NonZeroUsize::MIN,
};

impl Default for FancyRegexProvider {
    fn default() -> Self {
        Self { cache: Mutex::new(LruCache::new(CACHE_SIZE)) }
    }
}

impl FancyRegexProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn compile(pattern: &str, flags: &str) -> Result<fancy_regex::Regex, Error> {
        if let Some(bad) = flags.chars().find(|c| !"imsxq".contains(*c)) {
            return Err(Error::from_code(ErrorCode::FORX0001, format!("unknown flag '{bad}' in regex flags")));
        }
        let source = if flags.contains('q') { fancy_regex::escape(pattern) } else { pattern.into() };
        fancy_regex::RegexBuilder::new(&source)
            .case_insensitive(flags.contains('i'))
            .multi_line(flags.contains('m'))
            .dot_matches_new_line(flags.contains('s'))
            .verbose_mode(flags.contains('x'))
            .build()
            .map_err(|e| regex_error(ErrorCode::FORX0002, "invalid regex pattern", e))
    }

    fn compiled(&self, pattern: &str, flags: &str) -> Result<Arc<fancy_regex::Regex>, Error> {
        let key = (pattern.to_string(), flags.to_string());
        if let Some(re) = self.cache.lock().unwrap_or_else(PoisonError::into_inner).get(&key) {
            return Ok(Arc::clone(re));
        }
        let re = Arc::new(Self::compile(pattern, flags)?);
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).put(key, Arc::clone(&re));
        Ok(re)
    }
}

/// `\` may only escape `$` or `\`, and `$` must start a group number.
fn check_replacement(replacement: &str) -> Result<(), Error> {
    let bytes = replacement.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => match bytes.get(i + 1) {
                Some(b'\\' | b'$') => i += 2,
                _ => {
                    return Err(Error::from_code(
                        ErrorCode::FORX0004,
                        "invalid escape in replacement string",
                    ));
                }
            },
            b'$' => {
                let digits = bytes[i + 1..].iter().take_while(|b| b.is_ascii_digit()).count();
                if digits == 0 {
                    return Err(Error::from_code(
                        ErrorCode::FORX0004,
                        "'$' must be followed by a group number",
                    ));
                }
                i += 1 + digits;
            }
            _ => i += 1,
        }
    }
    Ok(())
}

/// Expands `$n` (longest group number that exists) and the `\$` / `\\` escapes.
fn expand(replacement: &str, caps: &fancy_regex::Captures<'_>, out: &mut String) {
    let mut chars = replacement.char_indices();
    while let Some((i, ch)) = chars.next() {
        match ch {
            '\\' => {
                if let Some((_, escaped)) = chars.next() {
                    out.push(escaped);
                }
            }
            '$' => {
                let rest = &replacement[i + 1..];
                let digits: &str = &rest[..rest.bytes().take_while(u8::is_ascii_digit).count()];
                let mut len = digits.len();
                while len > 1 && digits[..len].parse::<usize>().map_or(true, |g| g >= caps.len()) {
                    len -= 1;
                }
                if let Ok(group) = digits[..len].parse::<usize>()
                    && let Some(m) = caps.get(group)
                {
                    out.push_str(m.as_str());
                }
                for _ in 0..len {
                    chars.next();
                }
            }
            other => out.push(other),
        }
    }
}

impl RegexProvider for FancyRegexProvider {
    fn matches(&self, pattern: &str, flags: &str, text: &str) -> Result<bool, Error> {
        self.compiled(pattern, flags)?.is_match(text).map_err(evaluation_error)
    }

    fn replace(&self, pattern: &str, flags: &str, text: &str, replacement: &str) -> Result<String, Error> {
        let re = self.compiled(pattern, flags)?;
        reject_empty_match(&re)?;
        if flags.contains('q') {
            return Ok(text.replace(pattern, replacement));
        }
        check_replacement(replacement)?;
        let mut result = String::with_capacity(text.len());
        let mut copied = 0;
        for captures in re.captures_iter(text) {
            let captures = captures.map_err(evaluation_error)?;
            if let Some(whole) = captures.get(0) {
                result += &text[copied..whole.start()];
                expand(replacement, &captures, &mut result);
                copied = whole.end();
            }
        }
        result += &text[copied..];
        Ok(result)
    }

    fn tokenize(&self, pattern: &str, flags: &str, text: &str) -> Result<Vec<String>, Error> {
        let re = self.compiled(pattern, flags)?;
        reject_empty_match(&re)?;
        re.split(text).map(|piece| piece.map(str::to_owned).map_err(evaluation_error)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replacement_groups_and_escapes() {
        let p = FancyRegexProvider::new();
        assert_eq!(p.replace("(a)(b)", "", "xaby", "[$2$1\\$]").expect("replace"), "x[ba$]y");
        assert_eq!(p.replace("a", "q", "a.a", "$").expect("literal"), "$.$");
        let err = p.replace("a", "", "a", "$x").err().expect("bad replacement");
        assert_eq!(err.code_enum(), ErrorCode::FORX0004);
    }

    #[test]
    fn zero_length_patterns_are_rejected() {
        let p = FancyRegexProvider::new();
        let err = p.tokenize("x*", "", "abc").err().expect("error");
        assert_eq!(err.code_enum(), ErrorCode::FORX0003);
    }

    #[test]
    fn flags_are_validated() {
        let p = FancyRegexProvider::new();
        assert!(p.matches("ABC", "i", "xabcx").expect("match"));
        let err = p.matches("a", "z", "a").err().expect("error");
        assert_eq!(err.code_enum(), ErrorCode::FORX0001);
    }
}
