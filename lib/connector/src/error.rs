//! Error types for the connector crate.
//!
//! - `ConnectorError`: failures from external connector calls and probes
//! - `RegistryError`: registry management and lifecycle violations

use crate::record::ConnectorState;
use std::fmt;
use tollgate_core::ConnectorId;

/// Errors from connector operations against the external system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectorError {
    /// Connection to the external system failed.
    ConnectionFailed { reason: String },
    /// Authentication with the external system failed.
    AuthenticationFailed { reason: String },
    /// Invalid operation parameters.
    InvalidParameters { reason: String },
    /// Protocol error talking to the external system.
    ProtocolError { reason: String },
    /// The external call timed out.
    Timeout,
}

impl fmt::Display for ConnectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionFailed { reason } => {
                write!(f, "connection failed: {reason}")
            }
            Self::AuthenticationFailed { reason } => {
                write!(f, "authentication failed: {reason}")
            }
            Self::InvalidParameters { reason } => {
                write!(f, "invalid parameters: {reason}")
            }
            Self::ProtocolError { reason } => {
                write!(f, "protocol error: {reason}")
            }
            Self::Timeout => write!(f, "operation timed out"),
        }
    }
}

impl std::error::Error for ConnectorError {}

/// Errors from registry management operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// No connector with this ID exists (or it has been purged).
    NotFound { id: ConnectorId },
    /// The connector exists but is not in a dispatchable state.
    Unavailable {
        id: ConnectorId,
        state: ConnectorState,
    },
    /// The requested lifecycle transition is not a legal edge.
    InvalidTransition {
        id: ConnectorId,
        from: ConnectorState,
        to: ConnectorState,
    },
    /// The connector spec or patch failed validation.
    InvalidSpec { reason: String },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { id } => write!(f, "connector not found: {id}"),
            Self::Unavailable { id, state } => {
                write!(f, "connector {id} unavailable in state {state}")
            }
            Self::InvalidTransition { id, from, to } => {
                write!(f, "connector {id}: illegal transition {from} -> {to}")
            }
            Self::InvalidSpec { reason } => write!(f, "invalid connector spec: {reason}"),
        }
    }
}

impl std::error::Error for RegistryError {}
