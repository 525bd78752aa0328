//! Connector registry and lifecycle management for the tollgate gateway.
//!
//! This crate provides:
//!
//! - **Connector trait**: the narrow interface to external systems
//! - **Registry**: owns connector records and drives the lifecycle state machine
//! - **Health prober**: per-connector periodic probing
//! - **Rate limiter**: per-connector token-bucket admission control

pub mod connector;
pub mod error;
pub mod health;
pub mod rate_limit;
pub mod record;
pub mod registry;

pub use connector::{Connector, ConnectorFactory, Operation, OperationResult};
pub use error::{ConnectorError, RegistryError};
pub use health::HealthProber;
pub use rate_limit::{RateLimitConfig, RateLimitResult, RateLimiter};
pub use record::{ConnectorRecord, ConnectorSpec, ConnectorState, HealthStatus};
pub use registry::{ConnectorPatch, ConnectorRegistry, ConnectorStatus, DispatchGuard};
