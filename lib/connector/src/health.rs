//! Periodic health probing.
//!
//! The prober holds connector IDs, never owning references: every tick it
//! re-resolves the target through the registry, so a purged connector is
//! simply "not found" and its probe task ends. The probe network call runs
//! without any record lock held; only reading the target and applying the
//! resulting transition touch the lock.

use crate::record::ConnectorState;
use crate::registry::ConnectorRegistry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tollgate_core::ConnectorId;
use tracing::debug;

/// Runs one probe cycle for a connector.
///
/// Returns `None` when the connector is gone or deleting (the caller should
/// stop probing). Connectors in `error` are skipped until an update requests
/// revalidation.
pub async fn probe_once(
    registry: &ConnectorRegistry,
    id: ConnectorId,
) -> Option<ConnectorState> {
    let target = registry.probe_target(id)?;
    match target.state {
        ConnectorState::Deleting | ConnectorState::Removed => return None,
        ConnectorState::Error if !target.revalidate => {
            return Some(ConnectorState::Error);
        }
        _ => {}
    }

    // The external call runs with no lock held.
    let outcome = target.connector.health_check().await;
    let (success, reason) = match outcome {
        Ok(true) => (true, None),
        Ok(false) => (false, Some("probe reported unhealthy".to_string())),
        Err(e) => (false, Some(e.to_string())),
    };
    debug!(%id, success, "probe completed");
    registry.apply_probe(id, success, reason)
}

/// Drives independent periodic probe timers, one per watched connector.
pub struct HealthProber {
    registry: Arc<ConnectorRegistry>,
    interval: Duration,
    tasks: Mutex<HashMap<ConnectorId, JoinHandle<()>>>,
}

impl HealthProber {
    /// Creates a prober over the registry with the given probe interval.
    #[must_use]
    pub fn new(registry: Arc<ConnectorRegistry>, interval: Duration) -> Self {
        Self {
            registry,
            interval,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Starts probing a connector at the prober's default interval. The
    /// first probe fires immediately, which is what moves a freshly created
    /// connector out of `creating`.
    pub fn watch(&self, id: ConnectorId) {
        self.watch_with_interval(id, self.interval);
    }

    /// Starts probing a connector at a connector-specific interval.
    pub fn watch_with_interval(&self, id: ConnectorId, interval: Duration) {
        let registry = Arc::clone(&self.registry);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if probe_once(&registry, id).await.is_none() {
                    debug!(%id, "probe target gone, stopping");
                    break;
                }
            }
        });

        let mut tasks = self.tasks.lock().unwrap();
        if let Some(previous) = tasks.insert(id, task) {
            previous.abort();
        }
    }

    /// Stops probing a connector.
    pub fn unwatch(&self, id: ConnectorId) {
        let mut tasks = self.tasks.lock().unwrap();
        if let Some(task) = tasks.remove(&id) {
            task.abort();
        }
    }

    /// Stops all probe tasks.
    pub fn shutdown(&self) {
        let mut tasks = self.tasks.lock().unwrap();
        for (_, task) in tasks.drain() {
            task.abort();
        }
    }
}

impl Drop for HealthProber {
    fn drop(&mut self) {
        self.shutdown();
    }
}
