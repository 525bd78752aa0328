//! Append-only audit trail for the tollgate gateway.
//!
//! This crate provides:
//!
//! - **AuditEntry**: the immutable record of one dispatch attempt
//! - **AuditLogger**: bounded queue plus background writer, off the
//!   dispatch critical path
//! - **AuditStore**: read-only query interface for compliance export

pub mod entry;
pub mod error;
pub mod logger;
pub mod query;

pub use entry::{AuditDecision, AuditEntry};
pub use error::{AuditError, AuditWriteFailure};
pub use logger::{AuditConfig, AuditLogger, AuditSink, BackpressurePolicy};
pub use query::{AuditQuery, AuditStore, InMemoryAuditStore};
