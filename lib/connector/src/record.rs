//! Connector records and the lifecycle state machine.

use crate::error::RegistryError;
use crate::rate_limit::RateLimitConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use tollgate_core::ConnectorId;
use tollgate_permissions::GrantSet;

/// Consecutive probe failures that move an active or disabled connector to
/// the error state.
pub const PROBE_FAILURE_THRESHOLD: u32 = 3;

/// The lifecycle state of a connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorState {
    /// Created, awaiting the initial health probe.
    Creating,
    /// Dispatchable.
    Active,
    /// Explicitly disabled; not dispatchable but still probed.
    Disabled,
    /// Failed configuration or probing; needs an update to recover.
    Error,
    /// Deletion requested; draining in-flight requests.
    Deleting,
    /// Terminal; the record has been purged.
    Removed,
}

impl ConnectorState {
    /// Returns whether this state accepts new dispatches.
    #[must_use]
    pub fn is_dispatchable(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Returns whether an explicit delete may begin from this state.
    #[must_use]
    pub fn can_begin_delete(&self) -> bool {
        !matches!(self, Self::Deleting | Self::Removed)
    }

    #[must_use]
    fn as_str(&self) -> &'static str {
        match self {
            Self::Creating => "creating",
            Self::Active => "active",
            Self::Disabled => "disabled",
            Self::Error => "error",
            Self::Deleting => "deleting",
            Self::Removed => "removed",
        }
    }
}

impl fmt::Display for ConnectorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Last-known health of a connector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HealthStatus {
    /// Not yet probed.
    Unknown,
    /// Last probe succeeded.
    Healthy {
        /// When the probe ran.
        checked_at: DateTime<Utc>,
    },
    /// Last probe failed.
    Unhealthy {
        /// When the probe ran.
        checked_at: DateTime<Utc>,
        /// Why the probe failed.
        reason: String,
    },
}

impl HealthStatus {
    /// Returns true if the last probe succeeded.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy { .. })
    }
}

/// Input to connector creation: everything a connector binds together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorSpec {
    /// Human-readable name.
    pub name: String,
    /// Connector type (e.g. "redis", "postgres", "travel_api").
    pub connector_type: String,
    /// Type-specific configuration blob.
    pub config: JsonValue,
    /// Permission grants enforced for requests through this connector.
    #[serde(default)]
    pub grants: GrantSet,
    /// Rate-limit settings.
    pub rate_limit: RateLimitConfig,
    /// Per-connector probe interval in seconds, overriding the gateway
    /// default.
    #[serde(default)]
    pub probe_interval_secs: Option<u64>,
}

impl ConnectorSpec {
    /// Validates the spec.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSpec` if the name or type is empty or the rate-limit
    /// settings are out of range.
    pub fn validate(&self) -> Result<(), RegistryError> {
        if self.name.trim().is_empty() {
            return Err(RegistryError::InvalidSpec {
                reason: "name must not be empty".to_string(),
            });
        }
        if self.connector_type.trim().is_empty() {
            return Err(RegistryError::InvalidSpec {
                reason: "connector type must not be empty".to_string(),
            });
        }
        if self.probe_interval_secs == Some(0) {
            return Err(RegistryError::InvalidSpec {
                reason: "probe interval must be positive".to_string(),
            });
        }
        self.rate_limit
            .validate()
            .map_err(|reason| RegistryError::InvalidSpec { reason })
    }
}

/// The registry-owned record of one connector.
///
/// Owned exclusively by the registry; other components hold only the
/// [`ConnectorId`].
#[derive(Debug, Clone)]
pub struct ConnectorRecord {
    /// Globally unique identifier.
    pub id: ConnectorId,
    /// Human-readable name.
    pub name: String,
    /// Connector type.
    pub connector_type: String,
    /// Type-specific configuration blob.
    pub config: JsonValue,
    /// Permission grants for this connector.
    pub grants: GrantSet,
    /// Rate-limit settings.
    pub rate_limit: RateLimitConfig,
    /// Per-connector probe interval override in seconds.
    pub probe_interval_secs: Option<u64>,
    /// Current lifecycle state.
    pub state: ConnectorState,
    /// Last-known health.
    pub health: HealthStatus,
    /// Consecutive failed probes since the last success.
    pub consecutive_failures: u32,
    /// Whether an update requested revalidation out of the error state.
    pub revalidate: bool,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the record was last updated.
    pub updated_at: DateTime<Utc>,
}

impl ConnectorRecord {
    /// Creates a record from a validated spec, in the `creating` state.
    #[must_use]
    pub fn from_spec(id: ConnectorId, spec: ConnectorSpec) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: spec.name,
            connector_type: spec.connector_type,
            config: spec.config,
            grants: spec.grants,
            rate_limit: spec.rate_limit,
            probe_interval_secs: spec.probe_interval_secs,
            state: ConnectorState::Creating,
            health: HealthStatus::Unknown,
            consecutive_failures: 0,
            revalidate: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies a probe outcome, returning the resulting state.
    ///
    /// Implements the probe-driven edges of the state machine:
    /// `creating -> active|error`, `active|disabled -> error` after
    /// [`PROBE_FAILURE_THRESHOLD`] consecutive failures, and
    /// `error -> active` when an update requested revalidation.
    pub fn apply_probe(&mut self, success: bool, reason: Option<String>) -> ConnectorState {
        let now = Utc::now();
        self.health = if success {
            HealthStatus::Healthy { checked_at: now }
        } else {
            HealthStatus::Unhealthy {
                checked_at: now,
                reason: reason.unwrap_or_else(|| "probe failed".to_string()),
            }
        };

        match (self.state, success) {
            (ConnectorState::Creating, true) => {
                self.consecutive_failures = 0;
                self.state = ConnectorState::Active;
            }
            (ConnectorState::Creating, false) => {
                self.state = ConnectorState::Error;
            }
            (ConnectorState::Active | ConnectorState::Disabled, true) => {
                self.consecutive_failures = 0;
            }
            (ConnectorState::Active | ConnectorState::Disabled, false) => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= PROBE_FAILURE_THRESHOLD {
                    self.state = ConnectorState::Error;
                }
            }
            (ConnectorState::Error, true) if self.revalidate => {
                self.consecutive_failures = 0;
                self.revalidate = false;
                self.state = ConnectorState::Active;
            }
            // Error without revalidation, deleting, removed: probes do not
            // move the state.
            _ => {}
        }

        self.updated_at = now;
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> ConnectorSpec {
        ConnectorSpec {
            name: "orders-cache".to_string(),
            connector_type: "redis".to_string(),
            config: serde_json::json!({"url": "redis://localhost"}),
            grants: GrantSet::default(),
            rate_limit: RateLimitConfig::new(10.0, 20),
            probe_interval_secs: None,
        }
    }

    #[test]
    fn valid_spec_passes_validation() {
        assert!(spec().validate().is_ok());
    }

    #[test]
    fn empty_name_is_rejected() {
        let mut s = spec();
        s.name = "  ".to_string();
        assert!(matches!(
            s.validate(),
            Err(RegistryError::InvalidSpec { .. })
        ));
    }

    #[test]
    fn zero_rate_is_rejected() {
        let mut s = spec();
        s.rate_limit = RateLimitConfig::new(0.0, 20);
        assert!(matches!(
            s.validate(),
            Err(RegistryError::InvalidSpec { .. })
        ));
    }

    #[test]
    fn zero_probe_interval_is_rejected() {
        let mut s = spec();
        s.probe_interval_secs = Some(0);
        assert!(matches!(
            s.validate(),
            Err(RegistryError::InvalidSpec { .. })
        ));
    }

    #[test]
    fn record_starts_creating_and_unknown() {
        let record = ConnectorRecord::from_spec(ConnectorId::new(), spec());
        assert_eq!(record.state, ConnectorState::Creating);
        assert_eq!(record.health, HealthStatus::Unknown);
    }

    #[test]
    fn initial_probe_success_activates() {
        let mut record = ConnectorRecord::from_spec(ConnectorId::new(), spec());
        assert_eq!(record.apply_probe(true, None), ConnectorState::Active);
        assert!(record.health.is_healthy());
    }

    #[test]
    fn initial_probe_failure_errors() {
        let mut record = ConnectorRecord::from_spec(ConnectorId::new(), spec());
        let state = record.apply_probe(false, Some("refused".to_string()));
        assert_eq!(state, ConnectorState::Error);
    }

    #[test]
    fn three_consecutive_failures_move_active_to_error() {
        let mut record = ConnectorRecord::from_spec(ConnectorId::new(), spec());
        record.apply_probe(true, None);

        assert_eq!(record.apply_probe(false, None), ConnectorState::Active);
        assert_eq!(record.apply_probe(false, None), ConnectorState::Active);
        assert_eq!(record.apply_probe(false, None), ConnectorState::Error);
    }

    #[test]
    fn success_resets_failure_streak() {
        let mut record = ConnectorRecord::from_spec(ConnectorId::new(), spec());
        record.apply_probe(true, None);

        record.apply_probe(false, None);
        record.apply_probe(false, None);
        record.apply_probe(true, None);
        record.apply_probe(false, None);
        record.apply_probe(false, None);
        assert_eq!(record.state, ConnectorState::Active);

        record.apply_probe(false, None);
        assert_eq!(record.state, ConnectorState::Error);
    }

    #[test]
    fn error_recovers_only_with_revalidation() {
        let mut record = ConnectorRecord::from_spec(ConnectorId::new(), spec());
        record.apply_probe(false, None);
        assert_eq!(record.state, ConnectorState::Error);

        // A stray successful probe does not self-heal.
        record.apply_probe(true, None);
        assert_eq!(record.state, ConnectorState::Error);

        record.revalidate = true;
        assert_eq!(record.apply_probe(true, None), ConnectorState::Active);
        assert!(!record.revalidate);
    }

    #[test]
    fn probes_do_not_move_deleting() {
        let mut record = ConnectorRecord::from_spec(ConnectorId::new(), spec());
        record.state = ConnectorState::Deleting;
        assert_eq!(record.apply_probe(true, None), ConnectorState::Deleting);
        assert_eq!(record.apply_probe(false, None), ConnectorState::Deleting);
    }

    #[test]
    fn disabled_connectors_can_error_from_probes() {
        let mut record = ConnectorRecord::from_spec(ConnectorId::new(), spec());
        record.apply_probe(true, None);
        record.state = ConnectorState::Disabled;

        record.apply_probe(false, None);
        record.apply_probe(false, None);
        assert_eq!(record.apply_probe(false, None), ConnectorState::Error);
    }

    #[test]
    fn state_display() {
        assert_eq!(ConnectorState::Creating.to_string(), "creating");
        assert_eq!(ConnectorState::Removed.to_string(), "removed");
    }
}
