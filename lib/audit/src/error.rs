//! Error types for the audit crate.

use std::fmt;

/// Errors from audit sink and store operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditError {
    /// The sink rejected or failed a write.
    WriteFailed { reason: String },
    /// The query could not be executed.
    QueryFailed { reason: String },
    /// The logger has shut down.
    Closed,
}

impl fmt::Display for AuditError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WriteFailed { reason } => write!(f, "audit write failed: {reason}"),
            Self::QueryFailed { reason } => write!(f, "audit query failed: {reason}"),
            Self::Closed => write!(f, "audit logger is closed"),
        }
    }
}

impl std::error::Error for AuditError {}

/// An operational report of a persistently failed audit write.
///
/// Surfaced on the logger's operational-error channel for alerting; never
/// returned to dispatch callers and never causes the original request to
/// fail or be retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditWriteFailure {
    /// The entry that could not be written (by ID).
    pub entry_id: tollgate_core::AuditEntryId,
    /// Write attempts made before giving up.
    pub attempts: u32,
    /// The final sink error.
    pub reason: String,
}

impl fmt::Display for AuditWriteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "audit entry {} lost after {} attempts: {}",
            self.entry_id, self.attempts, self.reason
        )
    }
}
