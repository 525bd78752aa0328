//! Permission pattern matching for the tollgate gateway.
//!
//! This crate provides:
//!
//! - **Pattern**: segment-wise `resource:action:scope` matching with wildcards
//! - **Grants**: per-principal pattern sets and effective-grant resolution
//!
//! Matching is pure and requires no locking; deny precedence is a policy
//! layer concern, not a matcher concern.

pub mod error;
pub mod grant;
pub mod pattern;

pub use error::PatternError;
pub use grant::{GrantSet, Grantee, PermissionGrant, Principal};
pub use pattern::Pattern;
