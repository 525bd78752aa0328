//! Error types for the gateway crate.

use std::fmt;
use std::time::Duration;
use tollgate_connector::{ConnectorState, RegistryError};
use tollgate_core::ConnectorId;

/// Errors returned to dispatch and management callers.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayError {
    /// No grant pattern permits the request.
    PermissionDenied,
    /// A policy rule denied the request.
    PolicyViolation {
        rule: Option<String>,
        reason: String,
    },
    /// The connector's token bucket is exhausted.
    RateLimited { retry_after: Duration },
    /// The connector exists but cannot accept dispatches.
    ConnectorUnavailable {
        id: ConnectorId,
        state: ConnectorState,
    },
    /// No connector with this ID.
    NotFound { id: ConnectorId },
    /// The requested lifecycle transition is not legal.
    InvalidTransition {
        id: ConnectorId,
        from: ConnectorState,
        to: ConnectorState,
    },
    /// A spec or patch failed validation or could not build a client.
    ConfigurationError { reason: String },
    /// The external call failed or timed out.
    DownstreamError { reason: String },
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PermissionDenied => write!(f, "permission denied"),
            Self::PolicyViolation { rule, reason } => match rule {
                Some(rule) => write!(f, "denied by rule {rule}: {reason}"),
                None => write!(f, "denied by policy: {reason}"),
            },
            Self::RateLimited { retry_after } => {
                write!(f, "rate limited, retry after {}ms", retry_after.as_millis())
            }
            Self::ConnectorUnavailable { id, state } => {
                write!(f, "connector {id} unavailable in state {state}")
            }
            Self::NotFound { id } => write!(f, "connector {id} not found"),
            Self::InvalidTransition { id, from, to } => {
                write!(f, "connector {id} cannot move from {from} to {to}")
            }
            Self::ConfigurationError { reason } => {
                write!(f, "invalid configuration: {reason}")
            }
            Self::DownstreamError { reason } => write!(f, "downstream call failed: {reason}"),
        }
    }
}

impl std::error::Error for GatewayError {}

impl From<RegistryError> for GatewayError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::NotFound { id } => Self::NotFound { id },
            RegistryError::Unavailable { id, state } => Self::ConnectorUnavailable { id, state },
            RegistryError::InvalidTransition { id, from, to } => {
                Self::InvalidTransition { id, from, to }
            }
            RegistryError::InvalidSpec { reason } => Self::ConfigurationError { reason },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_rule_name() {
        let err = GatewayError::PolicyViolation {
            rule: Some("spend-cap".to_string()),
            reason: "budget_exceeded".to_string(),
        };
        assert!(err.to_string().contains("spend-cap"));
        assert!(err.to_string().contains("budget_exceeded"));
    }

    #[test]
    fn registry_errors_map_over() {
        let id = ConnectorId::new();
        let err: GatewayError = RegistryError::Unavailable {
            id,
            state: ConnectorState::Disabled,
        }
        .into();
        assert!(matches!(
            err,
            GatewayError::ConnectorUnavailable {
                state: ConnectorState::Disabled,
                ..
            }
        ));
    }
}
