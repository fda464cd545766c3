//! URL patterns used to decide which requests the worker leaves alone.

use tracing::trace;
use url::Url;

/// Type of URL pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternType {
    /// Exact URL match.
    Exact,
    /// Prefix match.
    Prefix,
    /// Suffix match (e.g., file extension).
    Suffix,
    /// Contains substring anywhere in the serialized URL.
    Contains,
}

/// URL pattern for matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlPattern {
    pub pattern_type: PatternType,
    pub pattern: String,
}

impl UrlPattern {
    /// Create an exact match pattern.
    pub fn exact(url: &str) -> Self {
        Self {
            pattern_type: PatternType::Exact,
            pattern: url.to_string(),
        }
    }

    /// Create a prefix match pattern.
    pub fn prefix(prefix: &str) -> Self {
        Self {
            pattern_type: PatternType::Prefix,
            pattern: prefix.to_string(),
        }
    }

    /// Create a suffix match pattern.
    pub fn suffix(suffix: &str) -> Self {
        Self {
            pattern_type: PatternType::Suffix,
            pattern: suffix.to_string(),
        }
    }

    /// Create a contains pattern.
    pub fn contains(substring: &str) -> Self {
        Self {
            pattern_type: PatternType::Contains,
            pattern: substring.to_string(),
        }
    }

    /// Check if a URL matches this pattern.
    pub fn matches(&self, url: &Url) -> bool {
        self.matches_str(url.as_str())
    }

    /// Check a raw string (a full URL or just a path) against this pattern.
    pub fn matches_str(&self, s: &str) -> bool {
        match self.pattern_type {
            PatternType::Exact => s == self.pattern,
            PatternType::Prefix => s.starts_with(&self.pattern),
            PatternType::Suffix => s.ends_with(&self.pattern),
            PatternType::Contains => s.contains(&self.pattern),
        }
    }
}

/// An ordered set of patterns; a URL matches if any member matches.
#[derive(Debug, Clone, Default)]
pub struct UrlPatternSet {
    patterns: Vec<UrlPattern>,
}

impl UrlPatternSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set of `Contains` patterns from plain substrings.
    pub fn contains_any<I, S>(substrings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        substrings
            .into_iter()
            .map(|s| UrlPattern::contains(s.as_ref()))
            .collect()
    }

    pub fn push(&mut self, pattern: UrlPattern) {
        self.patterns.push(pattern);
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// First pattern matching `url`, if any.
    pub fn find(&self, url: &Url) -> Option<&UrlPattern> {
        let hit = self.patterns.iter().find(|p| p.matches(url));
        if let Some(p) = hit {
            trace!(url = %url, pattern = %p.pattern, "URL pattern matched");
        }
        hit
    }

    pub fn matches(&self, url: &Url) -> bool {
        self.find(url).is_some()
    }

    pub fn matches_str(&self, s: &str) -> bool {
        self.patterns.iter().any(|p| p.matches_str(s))
    }
}

impl FromIterator<UrlPattern> for UrlPatternSet {
    fn from_iter<T: IntoIterator<Item = UrlPattern>>(iter: T) -> Self {
        Self {
            patterns: iter.into_iter().collect(),
        }
    }
}
