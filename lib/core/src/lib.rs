//! Core domain types and utilities for the tollgate gateway.
//!
//! This crate provides the foundational ID types and error handling shared
//! by every other tollgate crate.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{AuditEntryId, ConnectorId, DispatchId, GroupId, PrincipalId};
