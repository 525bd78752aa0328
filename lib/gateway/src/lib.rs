//! The tollgate gateway: permission-aware dispatch to external connectors.
//!
//! This crate assembles the registry, policy evaluator, rate limiter, health
//! prober, and audit logger into:
//!
//! - **Dispatcher**: the per-request admission pipeline
//! - **Gateway**: the management surface over connector lifecycles
//! - **GatewayConfig**: environment-driven configuration

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod gateway;

pub use config::GatewayConfig;
pub use dispatcher::{DispatchRequest, Dispatcher};
pub use error::GatewayError;
pub use gateway::Gateway;
