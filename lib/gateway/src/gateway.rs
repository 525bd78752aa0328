//! The assembled gateway: registry, prober, limiter, policy, and audit
//! behind one management and dispatch surface.
//!
//! The gateway keeps the rate limiter and prober in step with connector
//! lifecycle changes so callers only ever talk to one object.

use crate::config::GatewayConfig;
use crate::dispatcher::{DispatchRequest, Dispatcher};
use crate::error::GatewayError;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tollgate_audit::{AuditLogger, AuditSink, AuditWriteFailure};
use tollgate_connector::{
    ConnectorFactory, ConnectorPatch, ConnectorRegistry, ConnectorSpec, ConnectorState,
    ConnectorStatus, HealthProber, OperationResult, RateLimiter,
};
use tollgate_core::ConnectorId;
use tollgate_permissions::Principal;
use tollgate_policy::PolicyEvaluator;
use tracing::info;

/// The permission-aware connector gateway.
pub struct Gateway {
    registry: Arc<ConnectorRegistry>,
    limiter: Arc<RateLimiter>,
    prober: HealthProber,
    audit: Arc<AuditLogger>,
    dispatcher: Dispatcher,
}

impl Gateway {
    /// Assembles a gateway over a connector factory, policy, and audit sink.
    ///
    /// Returns the gateway and the operational-error channel carrying
    /// persistent audit write failures.
    #[must_use]
    pub fn new(
        factory: Box<dyn ConnectorFactory>,
        policy: PolicyEvaluator,
        sink: Arc<dyn AuditSink>,
        config: &GatewayConfig,
    ) -> (Self, mpsc::UnboundedReceiver<AuditWriteFailure>) {
        let registry = Arc::new(ConnectorRegistry::new(factory));
        let limiter = Arc::new(RateLimiter::new());
        let (audit, ops_rx) = AuditLogger::spawn(sink, config.audit);
        let audit = Arc::new(audit);
        let prober = HealthProber::new(Arc::clone(&registry), config.probe_interval());
        let dispatcher = Dispatcher::new(
            Arc::clone(&registry),
            policy,
            Arc::clone(&limiter),
            Arc::clone(&audit),
            config.dispatch_timeout(),
        );

        info!(
            probe_interval_secs = config.probe_interval_secs,
            "gateway assembled"
        );
        (
            Self {
                registry,
                limiter,
                prober,
                audit,
                dispatcher,
            },
            ops_rx,
        )
    }

    /// Registers a connector, starts its rate-limit bucket full, and begins
    /// health probing. The connector activates on its first successful probe.
    pub fn create_connector(&self, spec: ConnectorSpec) -> Result<ConnectorId, GatewayError> {
        let rate_limit = spec.rate_limit;
        let probe_interval = spec.probe_interval_secs.map(Duration::from_secs);
        let id = self.registry.create(spec)?;
        self.limiter.register(id, rate_limit);
        match probe_interval {
            Some(interval) => self.prober.watch_with_interval(id, interval),
            None => self.prober.watch(id),
        }
        Ok(id)
    }

    /// Applies a partial update, keeping the rate-limit bucket in sync.
    pub fn update_connector(
        &self,
        id: ConnectorId,
        patch: ConnectorPatch,
    ) -> Result<ConnectorStatus, GatewayError> {
        let status = self.registry.update(id, patch)?;
        let rate_limit = self.registry.rate_limit(id)?;
        self.limiter.update(id, rate_limit);
        Ok(status)
    }

    /// Enables a disabled connector.
    pub fn enable_connector(&self, id: ConnectorId) -> Result<ConnectorState, GatewayError> {
        Ok(self.registry.enable(id)?)
    }

    /// Disables an active connector. In-flight requests complete; new
    /// dispatches are refused.
    pub fn disable_connector(&self, id: ConnectorId) -> Result<ConnectorState, GatewayError> {
        Ok(self.registry.disable(id)?)
    }

    /// Begins deleting a connector and stops probing and rate limiting it.
    /// The record is purged once the last in-flight request drains.
    pub fn delete_connector(&self, id: ConnectorId) -> Result<ConnectorState, GatewayError> {
        let state = self.registry.begin_delete(id)?;
        self.limiter.remove(id);
        self.prober.unwatch(id);
        Ok(state)
    }

    /// Returns a connector's status.
    pub fn connector(&self, id: ConnectorId) -> Result<ConnectorStatus, GatewayError> {
        Ok(self.registry.status(id)?)
    }

    /// Lists all connectors that have not been purged.
    #[must_use]
    pub fn list_connectors(&self) -> Vec<ConnectorStatus> {
        self.registry.list()
    }

    /// Runs a test operation through the same admission pipeline as
    /// production traffic. The audit entry is flagged non-billable.
    pub async fn test_connector(
        &self,
        principal: Principal,
        id: ConnectorId,
        resource: impl Into<String>,
        action: impl Into<String>,
        scope: impl Into<String>,
        params: JsonValue,
    ) -> Result<OperationResult, GatewayError> {
        let request = DispatchRequest::new(principal, id, resource, action, scope)
            .with_params(params)
            .non_billing();
        self.dispatcher.dispatch(request).await
    }

    /// Dispatches one operation through the admission pipeline.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::dispatch`].
    pub async fn dispatch(
        &self,
        request: DispatchRequest,
    ) -> Result<OperationResult, GatewayError> {
        self.dispatcher.dispatch(request).await
    }

    /// The audit logger, for drop and write-failure counters.
    #[must_use]
    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    /// Stops probing and drains the audit queue.
    pub async fn shutdown(&self) {
        self.prober.shutdown();
        self.audit.shutdown().await;
    }
}
