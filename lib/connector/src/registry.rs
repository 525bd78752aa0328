//! The connector registry.
//!
//! Owns every connector record and drives the lifecycle state machine. The
//! registry is shared behind an `Arc`; each record carries its own lock and
//! in-flight counter so dispatches against different connectors never
//! serialize on a global write lock.

use crate::connector::{Connector, ConnectorFactory};
use crate::error::RegistryError;
use crate::rate_limit::RateLimitConfig;
use crate::record::{ConnectorRecord, ConnectorSpec, ConnectorState, HealthStatus};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tollgate_core::ConnectorId;
use tollgate_permissions::GrantSet;
use tracing::{debug, info};

/// A partial update to a connector.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectorPatch {
    /// New name, if changing.
    pub name: Option<String>,
    /// New configuration blob, if changing.
    pub config: Option<JsonValue>,
    /// New grant set, if changing.
    pub grants: Option<GrantSet>,
    /// New rate-limit settings, if changing.
    pub rate_limit: Option<RateLimitConfig>,
}

/// Externally visible connector state, as returned by the management surface.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectorStatus {
    /// The connector ID.
    pub id: ConnectorId,
    /// Human-readable name.
    pub name: String,
    /// Connector type.
    pub connector_type: String,
    /// Current lifecycle state.
    pub state: ConnectorState,
    /// Last-known health.
    pub health: HealthStatus,
}

/// One registered connector: its record, its live client, and the in-flight
/// request count. Per-connector synchronization lives here.
struct ConnectorHandle {
    record: RwLock<ConnectorRecord>,
    connector: RwLock<Arc<dyn Connector>>,
    in_flight: AtomicU64,
}

impl ConnectorHandle {
    /// A failed update moves a live connector to `error`.
    fn mark_update_failed(&self) {
        let mut record = self.record.write().unwrap();
        if !matches!(
            record.state,
            ConnectorState::Deleting | ConnectorState::Removed
        ) {
            record.state = ConnectorState::Error;
        }
        record.updated_at = Utc::now();
    }

    fn status(&self) -> ConnectorStatus {
        let record = self.record.read().unwrap();
        ConnectorStatus {
            id: record.id,
            name: record.name.clone(),
            connector_type: record.connector_type.clone(),
            state: record.state,
            health: record.health.clone(),
        }
    }
}

/// What the prober needs for one probe: resolved fresh each tick so a purged
/// connector is simply "not found".
pub struct ProbeTarget {
    /// The live connector client; the probe call runs without any record lock.
    pub connector: Arc<dyn Connector>,
    /// Lifecycle state at resolution time.
    pub state: ConnectorState,
    /// Whether an update requested revalidation out of the error state.
    pub revalidate: bool,
}

/// Owns connector records and drives their lifecycle.
pub struct ConnectorRegistry {
    connectors: RwLock<HashMap<ConnectorId, Arc<ConnectorHandle>>>,
    factory: Box<dyn ConnectorFactory>,
}

impl ConnectorRegistry {
    /// Creates a registry that builds connector clients with the given factory.
    #[must_use]
    pub fn new(factory: Box<dyn ConnectorFactory>) -> Self {
        Self {
            connectors: RwLock::new(HashMap::new()),
            factory,
        }
    }

    fn handle(&self, id: ConnectorId) -> Result<Arc<ConnectorHandle>, RegistryError> {
        let connectors = self.connectors.read().unwrap();
        connectors
            .get(&id)
            .cloned()
            .ok_or(RegistryError::NotFound { id })
    }

    /// Registers a new connector from a spec, in the `creating` state.
    ///
    /// The connector becomes `active` once its initial health probe succeeds.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSpec` if validation fails or the factory cannot build
    /// a client from the configuration.
    pub fn create(&self, spec: ConnectorSpec) -> Result<ConnectorId, RegistryError> {
        spec.validate()?;
        let connector = self
            .factory
            .build(&spec)
            .map_err(|e| RegistryError::InvalidSpec {
                reason: e.to_string(),
            })?;

        let id = ConnectorId::new();
        let handle = Arc::new(ConnectorHandle {
            record: RwLock::new(ConnectorRecord::from_spec(id, spec)),
            connector: RwLock::new(connector),
            in_flight: AtomicU64::new(0),
        });

        let mut connectors = self.connectors.write().unwrap();
        connectors.insert(id, handle);
        info!(%id, "connector registered");
        Ok(id)
    }

    /// Returns the status of a connector.
    pub fn status(&self, id: ConnectorId) -> Result<ConnectorStatus, RegistryError> {
        Ok(self.handle(id)?.status())
    }

    /// Lists all connectors that have not been purged.
    #[must_use]
    pub fn list(&self) -> Vec<ConnectorStatus> {
        let connectors = self.connectors.read().unwrap();
        connectors.values().map(|handle| handle.status()).collect()
    }

    /// Returns a connector's rate-limit settings.
    pub fn rate_limit(&self, id: ConnectorId) -> Result<RateLimitConfig, RegistryError> {
        let handle = self.handle(id)?;
        let record = handle.record.read().unwrap();
        Ok(record.rate_limit)
    }

    /// Applies a partial update.
    ///
    /// A patch that fails validation moves the connector to `error` and the
    /// call fails with `InvalidSpec`. A configuration change rebuilds the
    /// connector client, with build failure handled the same way. When the
    /// connector is already in
    /// `error`, a successful update requests revalidation so the next
    /// successful probe restores `active`.
    pub fn update(
        &self,
        id: ConnectorId,
        patch: ConnectorPatch,
    ) -> Result<ConnectorStatus, RegistryError> {
        let handle = self.handle(id)?;

        // Validate against the merged record before touching anything.
        let merged = {
            let record = handle.record.read().unwrap();
            ConnectorSpec {
                name: patch.name.clone().unwrap_or_else(|| record.name.clone()),
                connector_type: record.connector_type.clone(),
                config: patch.config.clone().unwrap_or_else(|| record.config.clone()),
                grants: patch.grants.clone().unwrap_or_else(|| record.grants.clone()),
                rate_limit: patch.rate_limit.unwrap_or(record.rate_limit),
                probe_interval_secs: record.probe_interval_secs,
            }
        };
        if let Err(e) = merged.validate() {
            handle.mark_update_failed();
            return Err(e);
        }

        let rebuilt = if patch.config.is_some() {
            match self.factory.build(&merged) {
                Ok(connector) => Some(connector),
                Err(e) => {
                    handle.mark_update_failed();
                    return Err(RegistryError::InvalidSpec {
                        reason: e.to_string(),
                    });
                }
            }
        } else {
            None
        };

        if let Some(connector) = rebuilt {
            let mut live = handle.connector.write().unwrap();
            *live = connector;
        }

        let mut record = handle.record.write().unwrap();
        record.name = merged.name;
        record.config = merged.config;
        record.grants = merged.grants;
        record.rate_limit = merged.rate_limit;
        if record.state == ConnectorState::Error {
            record.revalidate = true;
            record.consecutive_failures = 0;
        }
        record.updated_at = Utc::now();
        debug!(%id, "connector updated");

        drop(record);
        Ok(handle.status())
    }

    /// Enables a connector. Idempotent: enabling an already-active connector
    /// returns the current state without error.
    pub fn enable(&self, id: ConnectorId) -> Result<ConnectorState, RegistryError> {
        let handle = self.handle(id)?;
        let mut record = handle.record.write().unwrap();
        match record.state {
            ConnectorState::Active => Ok(ConnectorState::Active),
            ConnectorState::Disabled => {
                record.state = ConnectorState::Active;
                record.updated_at = Utc::now();
                info!(%id, "connector enabled");
                Ok(ConnectorState::Active)
            }
            from => Err(RegistryError::InvalidTransition {
                id,
                from,
                to: ConnectorState::Active,
            }),
        }
    }

    /// Disables a connector. Idempotent, mirroring [`enable`](Self::enable).
    pub fn disable(&self, id: ConnectorId) -> Result<ConnectorState, RegistryError> {
        let handle = self.handle(id)?;
        let mut record = handle.record.write().unwrap();
        match record.state {
            ConnectorState::Disabled => Ok(ConnectorState::Disabled),
            ConnectorState::Active => {
                record.state = ConnectorState::Disabled;
                record.updated_at = Utc::now();
                info!(%id, "connector disabled");
                Ok(ConnectorState::Disabled)
            }
            from => Err(RegistryError::InvalidTransition {
                id,
                from,
                to: ConnectorState::Disabled,
            }),
        }
    }

    /// Begins deletion. The connector moves to `deleting` immediately; once
    /// the last in-flight request drains, the record is purged (`removed`).
    /// Repeating the call while still draining returns `deleting`.
    pub fn begin_delete(&self, id: ConnectorId) -> Result<ConnectorState, RegistryError> {
        let handle = self.handle(id)?;
        {
            let mut record = handle.record.write().unwrap();
            match record.state {
                ConnectorState::Deleting => {}
                state if state.can_begin_delete() => {
                    record.state = ConnectorState::Deleting;
                    record.updated_at = Utc::now();
                    info!(%id, "connector deletion started");
                }
                from => {
                    return Err(RegistryError::InvalidTransition {
                        id,
                        from,
                        to: ConnectorState::Deleting,
                    });
                }
            }
        }

        if self.purge_if_drained(id) {
            Ok(ConnectorState::Removed)
        } else {
            Ok(ConnectorState::Deleting)
        }
    }

    /// Purges a `deleting` connector once no requests are in flight.
    ///
    /// Returns true if the record was removed.
    pub fn purge_if_drained(&self, id: ConnectorId) -> bool {
        let mut connectors = self.connectors.write().unwrap();
        let Some(handle) = connectors.get(&id) else {
            return false;
        };
        let draining = {
            let record = handle.record.read().unwrap();
            record.state == ConnectorState::Deleting
        };
        if draining && handle.in_flight.load(Ordering::SeqCst) == 0 {
            connectors.remove(&id);
            info!(%id, "connector purged");
            true
        } else {
            false
        }
    }

    /// Admits a dispatch against a connector.
    ///
    /// Requires the `active` state; on success the in-flight count is
    /// incremented and released when the returned guard drops.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` when the connector is absent or not active.
    pub fn begin_dispatch(
        self: &Arc<Self>,
        id: ConnectorId,
    ) -> Result<DispatchGuard, RegistryError> {
        let handle = self.handle(id).map_err(|_| RegistryError::Unavailable {
            id,
            state: ConnectorState::Removed,
        })?;

        {
            let record = handle.record.read().unwrap();
            if !record.state.is_dispatchable() {
                return Err(RegistryError::Unavailable {
                    id,
                    state: record.state,
                });
            }
            // Incremented under the record lock so a concurrent delete
            // observes either the new count or the pre-dispatch state.
            handle.in_flight.fetch_add(1, Ordering::SeqCst);
        }

        Ok(DispatchGuard {
            registry: Arc::clone(self),
            handle,
            id,
        })
    }

    /// Resolves the probe target for a connector, or `None` if purged.
    #[must_use]
    pub fn probe_target(&self, id: ConnectorId) -> Option<ProbeTarget> {
        let handle = self.handle(id).ok()?;
        let connector = handle.connector.read().unwrap().clone();
        let record = handle.record.read().unwrap();
        Some(ProbeTarget {
            connector,
            state: record.state,
            revalidate: record.revalidate,
        })
    }

    /// Applies a probe outcome, returning the resulting state (or `None` if
    /// the connector was purged in the meantime).
    pub fn apply_probe(
        &self,
        id: ConnectorId,
        success: bool,
        reason: Option<String>,
    ) -> Option<ConnectorState> {
        let handle = self.handle(id).ok()?;
        let mut record = handle.record.write().unwrap();
        let before = record.state;
        let after = record.apply_probe(success, reason);
        if before != after {
            info!(%id, %before, %after, "probe transition");
        }
        Some(after)
    }
}

/// Tracks one admitted dispatch; dropping it releases the in-flight slot and
/// completes a pending deletion.
pub struct DispatchGuard {
    registry: Arc<ConnectorRegistry>,
    handle: Arc<ConnectorHandle>,
    id: ConnectorId,
}

impl DispatchGuard {
    /// The connector being dispatched against.
    #[must_use]
    pub fn id(&self) -> ConnectorId {
        self.id
    }

    /// The live connector client.
    #[must_use]
    pub fn connector(&self) -> Arc<dyn Connector> {
        self.handle.connector.read().unwrap().clone()
    }

    /// The grant set in effect for this connector.
    #[must_use]
    pub fn grants(&self) -> GrantSet {
        self.handle.record.read().unwrap().grants.clone()
    }
}

impl Drop for DispatchGuard {
    fn drop(&mut self) {
        self.handle.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.registry.purge_if_drained(self.id);
    }
}
