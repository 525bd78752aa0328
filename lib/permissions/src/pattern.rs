//! Segment-wise permission patterns.
//!
//! A pattern is a colon-separated string such as `database:query:customers`.
//! A `*` segment matches any single token; a trailing `*` additionally
//! absorbs all remaining candidate segments. Comparison is case-sensitive,
//! literal-for-literal.

use crate::error::PatternError;
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// One segment of a permission pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    /// Matches exactly this token.
    Literal(String),
    /// Matches any single token (or the rest, when trailing).
    Wildcard,
}

/// A parsed `resource:action:scope` permission pattern.
///
/// Serialized as its source string, so grants round-trip through JSON as
/// plain pattern strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    raw: String,
    segments: Vec<Segment>,
}

impl Pattern {
    /// Parses a pattern string.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern is empty or contains an empty segment.
    pub fn parse(raw: impl Into<String>) -> Result<Self, PatternError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(PatternError::Empty);
        }

        let mut segments = Vec::new();
        for token in raw.split(':') {
            if token.is_empty() {
                return Err(PatternError::EmptySegment {
                    pattern: raw.clone(),
                });
            }
            segments.push(if token == "*" {
                Segment::Wildcard
            } else {
                Segment::Literal(token.to_string())
            });
        }

        Ok(Self { raw, segments })
    }

    /// Returns the source string of this pattern.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Checks whether a candidate `resource:action:scope` string is covered
    /// by this pattern.
    ///
    /// Each `*` segment matches exactly one candidate token. If the final
    /// pattern segment is `*`, it absorbs all remaining candidate segments
    /// regardless of count; otherwise the segment counts must match exactly.
    #[must_use]
    pub fn matches(&self, candidate: &str) -> bool {
        let tokens: Vec<&str> = candidate.split(':').collect();
        let trailing_wildcard = matches!(self.segments.last(), Some(Segment::Wildcard));

        if trailing_wildcard {
            // All segments before the trailing `*` must be present.
            if tokens.len() < self.segments.len() - 1 {
                return false;
            }
        } else if tokens.len() != self.segments.len() {
            return false;
        }

        for (i, segment) in self.segments.iter().enumerate() {
            let last = i == self.segments.len() - 1;
            match segment {
                Segment::Wildcard if last && trailing_wildcard => return true,
                Segment::Wildcard => {
                    if tokens.get(i).is_none() {
                        return false;
                    }
                }
                Segment::Literal(lit) => {
                    if tokens.get(i) != Some(&lit.as_str()) {
                        return false;
                    }
                }
            }
        }

        true
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl FromStr for Pattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Pattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for Pattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(raw).map_err(DeError::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(s: &str) -> Pattern {
        Pattern::parse(s).expect("pattern should parse")
    }

    #[test]
    fn literal_match() {
        assert!(pattern("database:query:customers").matches("database:query:customers"));
    }

    #[test]
    fn literal_mismatch() {
        assert!(!pattern("database:query:customers").matches("database:query:orders"));
    }

    #[test]
    fn trailing_wildcard_absorbs_remaining_segments() {
        let p = pattern("cache:*");
        assert!(p.matches("cache:read"));
        assert!(p.matches("cache:read:user:1"));
        assert!(!p.matches("database:read"));
    }

    #[test]
    fn trailing_wildcard_with_deep_candidate() {
        assert!(pattern("cache:read:user:*").matches("cache:read:user:42"));
        assert!(pattern("cache:read:user:*").matches("cache:read:user:42:sessions"));
    }

    #[test]
    fn trailing_wildcard_requires_preceding_segments() {
        // `cache:read:*` needs at least `cache:read` present.
        assert!(!pattern("cache:read:*").matches("cache"));
        assert!(pattern("cache:read:*").matches("cache:read"));
    }

    #[test]
    fn interior_wildcard_matches_single_segment_only() {
        let p = pattern("database:*:customers");
        assert!(p.matches("database:query:customers"));
        assert!(p.matches("database:write:customers"));
        assert!(!p.matches("database:query:extra:customers"));
        assert!(!p.matches("database:customers"));
    }

    #[test]
    fn exact_segment_count_required_without_trailing_wildcard() {
        let p = pattern("cache:read");
        assert!(!p.matches("cache:read:user"));
        assert!(!p.matches("cache"));
    }

    #[test]
    fn matching_is_case_sensitive() {
        assert!(!pattern("Cache:read").matches("cache:read"));
    }

    #[test]
    fn bare_wildcard_matches_everything() {
        let p = pattern("*");
        assert!(p.matches("cache:read:user:1"));
        assert!(p.matches("anything"));
    }

    #[test]
    fn parse_rejects_empty_pattern() {
        assert_eq!(Pattern::parse(""), Err(PatternError::Empty));
    }

    #[test]
    fn parse_rejects_empty_segment() {
        let result = Pattern::parse("cache::read");
        assert!(matches!(result, Err(PatternError::EmptySegment { .. })));
    }

    #[test]
    fn pattern_serde_roundtrip() {
        let p = pattern("cache:read:user:*");
        let json = serde_json::to_string(&p).expect("serialize");
        assert_eq!(json, "\"cache:read:user:*\"");
        let parsed: Pattern = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(p, parsed);
    }

    #[test]
    fn pattern_deserialize_rejects_invalid() {
        let result: Result<Pattern, _> = serde_json::from_str("\"cache::read\"");
        assert!(result.is_err());
    }
}
