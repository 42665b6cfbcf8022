use crate::error::{Error, ErrorCode};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub use crate::consts::{CODEPOINT_URI, SIMPLE_ACCENT_URI, SIMPLE_CASE_ACCENT_URI, SIMPLE_CASE_URI};

/// Orders strings for comparisons, sorting and the substring functions.
pub trait Collation: Send + Sync {
    fn uri(&self) -> &str;
    fn compare(&self, a: &str, b: &str) -> Ordering;
    /// Folded form used for substring matching; identity for exact collations.
    fn key(&self, s: &str) -> String {
        s.to_owned()
    }
    /// Locale-sensitive collations switch process state while in use.
    fn locale(&self) -> Option<&str> {
        None
    }
}

/// Unicode codepoint order, the default collation.
pub struct CodepointCollation;

impl Collation for CodepointCollation {
    fn uri(&self) -> &str {
        CODEPOINT_URI
    }
    fn compare(&self, a: &str, b: &str) -> Ordering {
        a.cmp(b)
    }
}

/// Compares strings after folding case, accents or both.
///
/// Accent folding decomposes to NFD and drops every character with a
/// non-zero canonical combining class.
pub struct FoldingCollation {
    uri: &'static str,
    fold_case: bool,
    fold_accents: bool,
}

impl FoldingCollation {
    pub const CASE: Self = Self { uri: SIMPLE_CASE_URI, fold_case: true, fold_accents: false };
    pub const ACCENT: Self = Self { uri: SIMPLE_ACCENT_URI, fold_case: false, fold_accents: true };
    pub const CASE_ACCENT: Self = Self { uri: SIMPLE_CASE_ACCENT_URI, fold_case: true, fold_accents: true };
}

impl Collation for FoldingCollation {
    fn uri(&self) -> &str {
        self.uri
    }

    fn compare(&self, a: &str, b: &str) -> Ordering {
        Ord::cmp(&self.key(a), &self.key(b))
    }

    fn key(&self, s: &str) -> String {
        use unicode_normalization::UnicodeNormalization;
        use unicode_normalization::char::canonical_combining_class;
        let base: String = if self.fold_accents {
            s.nfd().filter(|&c| canonical_combining_class(c) == 0).collect()
        } else {
            s.to_owned()
        };
        if self.fold_case { base.to_lowercase() } else { base }
    }
}

/// Known collations by URI.
pub struct CollationRegistry {
    collations: HashMap<String, Arc<dyn Collation>>,
}

impl Default for CollationRegistry {
    fn default() -> Self {
        let builtin: [Arc<dyn Collation>; 4] = [
            Arc::new(CodepointCollation),
            Arc::new(FoldingCollation::CASE),
            Arc::new(FoldingCollation::ACCENT),
            Arc::new(FoldingCollation::CASE_ACCENT),
        ];
        let collations = builtin.into_iter().map(|c| (c.uri().to_owned(), c)).collect();
        Self { collations }
    }
}

impl CollationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, uri: &str) -> Option<Arc<dyn Collation>> {
        self.collations.get(uri).map(Arc::clone)
    }

    /// Registers `collation` under its own URI, replacing any previous entry.
    pub fn register(&mut self, collation: Arc<dyn Collation>) {
        let uri = collation.uri().to_owned();
        self.collations.insert(uri, collation);
    }

    /// Looks up `uri`, falling back to `default_uri` and finally to codepoints.
    pub fn resolve(&self, uri: Option<&str>, default_uri: &str) -> Result<Arc<dyn Collation>, Error> {
        match uri {
            Some(u) => self.get(u).ok_or_else(|| {
                Error::from_code(ErrorCode::FOCH0002, format!("unknown collation URI: {u}"))
            }),
            None => Ok(self.get(default_uri).unwrap_or_else(|| Arc::new(CodepointCollation))),
        }
    }
}

static COLLATION_LOCK: Mutex<()> = Mutex::new(());

/// String comparisons under one collation.
///
/// A manager for a locale-sensitive collation holds the process-wide collation
/// lock for as long as it lives.
pub struct CollationManager {
    collation: Arc<dyn Collation>,
    _guard: Option<MutexGuard<'static, ()>>,
}

impl CollationManager {
    pub fn new(collation: Arc<dyn Collation>) -> Self {
        let guard = collation.locale().map(|locale| {
            tracing::trace!(locale, uri = collation.uri(), "acquiring collation lock");
            COLLATION_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
        });
        Self { collation, _guard: guard }
    }

    pub fn codepoint() -> Self {
        Self::new(Arc::new(CodepointCollation))
    }

    pub fn uri(&self) -> &str {
        self.collation.uri()
    }

    fn is_codepoint(&self) -> bool {
        self.collation.uri() == CODEPOINT_URI
    }

    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        self.collation.compare(a, b)
    }

    pub fn eq(&self, a: &str, b: &str) -> bool {
        self.compare(a, b) == Ordering::Equal
    }

    pub fn ne(&self, a: &str, b: &str) -> bool {
        !self.eq(a, b)
    }

    pub fn contains(&self, a: &str, b: &str) -> bool {
        if self.is_codepoint() {
            a.contains(b)
        } else {
            self.collation.key(a).contains(&self.collation.key(b))
        }
    }

    pub fn starts_with(&self, a: &str, b: &str) -> bool {
        if self.is_codepoint() {
            a.starts_with(b)
        } else {
            self.collation.key(a).starts_with(&self.collation.key(b))
        }
    }

    pub fn ends_with(&self, a: &str, b: &str) -> bool {
        if self.is_codepoint() {
            a.ends_with(b)
        } else {
            self.collation.key(a).ends_with(&self.collation.key(b))
        }
    }

    /// Byte range of the first match of `b` within `a`.
    pub fn find(&self, a: &str, b: &str) -> Option<(usize, usize)> {
        if self.is_codepoint() {
            return a.find(b).map(|start| (start, start + b.len()));
        }
        let needle = self.collation.key(b);
        if needle.is_empty() {
            return Some((0, 0));
        }
        let boundaries: Vec<usize> = a.char_indices().map(|(i, _)| i).chain([a.len()]).collect();
        for (n, &start) in boundaries.iter().enumerate() {
            if !self.collation.key(&a[start..]).starts_with(&needle) {
                continue;
            }
            for &end in &boundaries[n + 1..] {
                if self.collation.key(&a[start..end]) == needle {
                    return Some((start, end));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct GermanCollation;

    impl Collation for GermanCollation {
        fn uri(&self) -> &str {
            "urn:test:de"
        }
        fn compare(&self, a: &str, b: &str) -> Ordering {
            a.cmp(b)
        }
        fn locale(&self) -> Option<&str> {
            Some("de_DE")
        }
    }

    #[test]
    fn insensitive_collations_compare_keys() {
        let m = CollationManager::new(Arc::new(FoldingCollation::CASE_ACCENT));
        assert!(m.eq("Éte", "ete"));
        assert!(m.contains("CAFÉ au lait", "cafe"));
        assert_eq!(m.find("xxCafé!", "cafe"), Some((2, 7)));
    }

    #[test]
    fn accent_folding_keeps_case() {
        let accent = FoldingCollation::ACCENT;
        assert_eq!(accent.compare("résumé", "resume"), Ordering::Equal);
        assert_ne!(accent.compare("Resume", "resume"), Ordering::Equal);
        assert_eq!(FoldingCollation::CASE.compare("ABC", "abc"), Ordering::Equal);
    }

    #[test]
    fn codepoint_find_uses_byte_ranges() {
        let m = CollationManager::codepoint();
        assert_eq!(m.find("abcabc", "ca"), Some((2, 4)));
        assert!(m.ne("a", "A"));
    }

    #[test]
    fn locale_collations_serialize_access() {
        let first = CollationManager::new(Arc::new(GermanCollation));
        assert!(COLLATION_LOCK.try_lock().is_err());
        drop(first);
        assert!(COLLATION_LOCK.try_lock().is_ok());
    }

    #[test]
    fn unknown_collation_is_reported() {
        let reg = CollationRegistry::default();
        let err = reg.resolve(Some("urn:nope"), CODEPOINT_URI).err().expect("error");
        assert_eq!(err.code_enum(), ErrorCode::FOCH0002);
    }
}
