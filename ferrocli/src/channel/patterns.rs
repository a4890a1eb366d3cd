//! Pattern compilation and caching for prompt detection.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use regex::bytes::Regex;

use crate::error::{ChannelError, Result};

/// Flags applied to every regex the channel compiles.
const PROMPT_FLAGS: &str = "(?mi)";

/// A compiled prompt pattern and the source it was compiled from.
#[derive(Debug, Clone)]
pub struct PromptPattern {
    source: String,
    regex: Regex,
    literal: bool,
}

impl PromptPattern {
    /// Compile `pattern` as a multi-line, case-insensitive regex.
    pub fn regex(pattern: &str) -> Result<Self> {
        let regex = Regex::new(&format!("{PROMPT_FLAGS}{pattern}")).map_err(ChannelError::from)?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
            literal: false,
        })
    }

    /// Match `text` verbatim.
    pub fn literal(text: &str) -> Result<Self> {
        let regex = Regex::new(&regex::escape(text)).map_err(ChannelError::from)?;
        Ok(Self {
            source: text.to_string(),
            regex,
            literal: true,
        })
    }

    /// Compile a per-call override.
    ///
    /// Anchored overrides (`^...$`, optionally behind a leading flag group)
    /// are regexes; anything else is matched literally.
    pub fn from_override(pattern: &str) -> Result<Self> {
        if is_anchored(pattern) {
            Self::regex(pattern)
        } else {
            Self::literal(pattern)
        }
    }

    /// The compiled regex.
    pub fn as_regex(&self) -> &Regex {
        &self.regex
    }

    /// The pattern text as given.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// True when the pattern is matched verbatim.
    pub fn is_literal(&self) -> bool {
        self.literal
    }

    /// Check whether `data` contains a match.
    pub fn is_match(&self, data: &[u8]) -> bool {
        self.regex.is_match(data)
    }
}

/// True when `pattern` starts with `^` and ends with `$`, ignoring a leading
/// inline flag group such as `(?i)`.
pub fn is_anchored(pattern: &str) -> bool {
    let body = match pattern.strip_prefix("(?") {
        Some(rest) => match rest.find(')') {
            Some(end) if rest[..end].chars().all(|c| c.is_ascii_alphabetic() || c == '-') => {
                &rest[end + 1..]
            }
            _ => pattern,
        },
        None => pattern,
    };
    body.starts_with('^') && body.ends_with('$')
}

type CacheKey = (String, Option<String>);

/// Compiled patterns keyed by (configured pattern, per-call override).
///
/// A changed configured pattern is a different key, so stale compilations
/// are never returned. Entries live as long as the owning channel.
#[derive(Debug, Default)]
pub struct PatternCache {
    entries: RwLock<HashMap<CacheKey, Arc<PromptPattern>>>,
}

impl PatternCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The pattern to search for given the configured prompt and an optional
    /// override. An empty override means "use the configured prompt".
    pub fn get(&self, configured: &str, override_pattern: Option<&str>) -> Result<Arc<PromptPattern>> {
        let override_pattern = override_pattern.filter(|p| !p.is_empty());
        let key = (configured.to_string(), override_pattern.map(str::to_string));

        if let Some(found) = self
            .entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&key)
        {
            return Ok(found.clone());
        }

        let compiled = Arc::new(match override_pattern {
            Some(pattern) => PromptPattern::from_override(pattern)?,
            None => PromptPattern::regex(configured)?,
        });

        self.entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .entry(key)
            .or_insert_with(|| compiled.clone());
        Ok(compiled)
    }

    /// Number of cached compilations.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// True when nothing has been compiled yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_pattern_is_multiline_case_insensitive() {
        let pattern = PromptPattern::regex(r"^router#\s?$").unwrap();
        assert!(pattern.is_match(b"some output\nROUTER# "));
        assert!(!pattern.is_match(b"router> "));
    }

    #[test]
    fn test_override_anchoring() {
        assert!(is_anchored(r"^password:\s?$"));
        assert!(is_anchored(r"(?i)^password:\s?$"));
        assert!(!is_anchored("password:"));
        assert!(!is_anchored(r"^password:"));
        assert!(!is_anchored(r"(?:a)$"));

        let literal = PromptPattern::from_override("[confirm]").unwrap();
        assert!(literal.is_literal());
        assert!(literal.is_match(b"Proceed? [confirm]"));
        assert!(!literal.is_match(b"Proceed? c"));

        let anchored = PromptPattern::from_override(r"^Destination filename \[\S*\]\?$").unwrap();
        assert!(!anchored.is_literal());
        assert!(anchored.is_match(b"copy\ndestination filename [startup-config]?"));
    }

    #[test]
    fn test_cache_reuses_and_keys_on_both_patterns() {
        let cache = PatternCache::new();

        let first = cache.get(r"^\S+#$", None).unwrap();
        let again = cache.get(r"^\S+#$", Some("")).unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(cache.len(), 1);

        let other = cache.get(r"^\S+>$", None).unwrap();
        assert!(!Arc::ptr_eq(&first, &other));

        let overridden = cache.get(r"^\S+#$", Some("Password:")).unwrap();
        assert!(overridden.is_literal());
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_invalid_pattern_is_reported() {
        let cache = PatternCache::new();
        let err = cache.get(r"^(unclosed$", None).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Channel(ChannelError::InvalidPattern(_))
        ));
        assert!(cache.is_empty());
    }
}
