//! Error types for the permissions crate.

use std::fmt;

/// Errors from parsing permission patterns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    /// The pattern string is empty.
    Empty,
    /// A segment in the pattern is empty (e.g. `cache::read`).
    EmptySegment { pattern: String },
}

impl fmt::Display for PatternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "permission pattern is empty"),
            Self::EmptySegment { pattern } => {
                write!(f, "permission pattern '{pattern}' contains an empty segment")
            }
        }
    }
}

impl std::error::Error for PatternError {}
