//! The dispatch pipeline.
//!
//! Every request passes the same gates in order: connector admission,
//! permission and policy evaluation, rate limiting, then the external call
//! under a timeout. Whatever the outcome, exactly one audit entry is
//! recorded per attempt; the entry never changes the decision already made.

use crate::error::GatewayError;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tollgate_audit::{AuditDecision, AuditEntry, AuditLogger};
use tollgate_connector::{
    ConnectorRegistry, ConnectorState, Operation, OperationResult, RateLimitResult, RateLimiter,
};
use tollgate_core::{ConnectorId, DispatchId};
use tollgate_permissions::Principal;
use tollgate_policy::{Decision, PolicyEvaluator, PolicyRequest};
use tracing::{debug, instrument};

/// Audit reasons produced by the pipeline itself rather than a policy rule.
mod reason {
    pub const RATE_LIMITED: &str = "rate_limited";
    pub const CONNECTOR_UNAVAILABLE: &str = "connector_unavailable";
}

/// One request to execute an operation through a connector.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    /// Unique ID for tracing this attempt.
    pub id: DispatchId,
    /// The requesting identity.
    pub principal: Principal,
    /// The target connector.
    pub connector_id: ConnectorId,
    /// Requested resource.
    pub resource: String,
    /// Requested action.
    pub action: String,
    /// Requested scope.
    pub scope: String,
    /// Operation parameters passed through to the connector.
    pub params: JsonValue,
    /// Cost attributed to the request, consumed by budget rules.
    pub cost: u64,
    /// Downstream timeout override; the gateway default applies when unset.
    pub timeout: Option<Duration>,
    /// False for connectivity tests issued through the management surface.
    pub billable: bool,
}

impl DispatchRequest {
    /// Creates a request with empty parameters, zero cost, and the default
    /// timeout.
    #[must_use]
    pub fn new(
        principal: Principal,
        connector_id: ConnectorId,
        resource: impl Into<String>,
        action: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            id: DispatchId::new(),
            principal,
            connector_id,
            resource: resource.into(),
            action: action.into(),
            scope: scope.into(),
            params: JsonValue::Object(Default::default()),
            cost: 0,
            timeout: None,
            billable: true,
        }
    }

    /// Sets the operation parameters.
    #[must_use]
    pub fn with_params(mut self, params: JsonValue) -> Self {
        self.params = params;
        self
    }

    /// Sets the attributed cost.
    #[must_use]
    pub fn with_cost(mut self, cost: u64) -> Self {
        self.cost = cost;
        self
    }

    /// Sets a per-request downstream timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Flags the attempt as non-billable test traffic.
    #[must_use]
    pub fn non_billing(mut self) -> Self {
        self.billable = false;
        self
    }
}

/// Runs dispatch requests through the admission gates and audits every
/// attempt.
pub struct Dispatcher {
    registry: Arc<ConnectorRegistry>,
    policy: PolicyEvaluator,
    limiter: Arc<RateLimiter>,
    audit: Arc<AuditLogger>,
    default_timeout: Duration,
}

impl Dispatcher {
    /// Creates a dispatcher over the shared registry, limiter, and logger.
    #[must_use]
    pub fn new(
        registry: Arc<ConnectorRegistry>,
        policy: PolicyEvaluator,
        limiter: Arc<RateLimiter>,
        audit: Arc<AuditLogger>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            policy,
            limiter,
            audit,
            default_timeout,
        }
    }

    /// The policy evaluator in use.
    #[must_use]
    pub fn policy(&self) -> &PolicyEvaluator {
        &self.policy
    }

    /// Dispatches one operation.
    ///
    /// # Errors
    ///
    /// Returns the gate that refused the request, or the downstream failure.
    /// Every call records exactly one audit entry, successful or not.
    #[instrument(
        skip_all,
        fields(
            dispatch = %request.id,
            connector = %request.connector_id,
            principal = %request.principal.id,
        )
    )]
    pub async fn dispatch(
        &self,
        request: DispatchRequest,
    ) -> Result<OperationResult, GatewayError> {
        let started = Instant::now();
        let outcome = self.admit_and_execute(&request).await;
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let (decision, deny_reason) = classify(&outcome);
        let mut entry = AuditEntry::new(
            request.principal.id,
            request.connector_id,
            request.resource,
            request.action,
            request.scope,
            decision,
        )
        .with_latency_ms(latency_ms)
        .with_cost(request.cost);
        if !request.billable {
            entry = entry.non_billing();
        }
        if let Some(deny_reason) = deny_reason {
            entry = entry.with_reason(deny_reason);
        }
        self.audit.record(entry).await;

        outcome
    }

    /// The gates, in order. The in-flight guard is held across the external
    /// call and released before the audit write.
    async fn admit_and_execute(
        &self,
        request: &DispatchRequest,
    ) -> Result<OperationResult, GatewayError> {
        let guard = self.registry.begin_dispatch(request.connector_id)?;

        let grants = guard.grants();
        let policy_request = PolicyRequest {
            principal: &request.principal,
            grants: &grants,
            resource: &request.resource,
            action: &request.action,
            scope: &request.scope,
            cost: request.cost,
        };
        match self.policy.evaluate(&policy_request) {
            Decision::Allow => {}
            Decision::Deny { rule: None, reason } => {
                debug!(%reason, "dispatch refused");
                return Err(GatewayError::PermissionDenied);
            }
            Decision::Deny { rule, reason } => {
                debug!(?rule, %reason, "dispatch refused");
                return Err(GatewayError::PolicyViolation { rule, reason });
            }
        }

        // Tokens are consumed here and never refunded, even if the external
        // call fails.
        match self.limiter.try_acquire(request.connector_id) {
            None => {
                return Err(GatewayError::ConnectorUnavailable {
                    id: request.connector_id,
                    state: ConnectorState::Removed,
                });
            }
            Some(RateLimitResult::Limited { retry_after }) => {
                return Err(GatewayError::RateLimited { retry_after });
            }
            Some(RateLimitResult::Allowed { .. }) => {}
        }

        let operation = Operation {
            resource: request.resource.clone(),
            action: request.action.clone(),
            params: request.params.clone(),
        };
        let connector = guard.connector();
        let timeout = request.timeout.unwrap_or(self.default_timeout);
        match tokio::time::timeout(timeout, connector.execute(operation)).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => Err(GatewayError::DownstreamError {
                reason: e.to_string(),
            }),
            Err(_) => Err(GatewayError::DownstreamError {
                reason: format!("timed out after {}ms", timeout.as_millis()),
            }),
        }
    }
}

/// Maps a pipeline outcome to its audit classification.
fn classify(
    outcome: &Result<OperationResult, GatewayError>,
) -> (AuditDecision, Option<String>) {
    match outcome {
        Ok(_) => (AuditDecision::Allowed, None),
        Err(GatewayError::PermissionDenied) => (
            AuditDecision::Denied,
            Some(tollgate_policy::reason::PERMISSION_DENIED.to_string()),
        ),
        Err(GatewayError::PolicyViolation { reason, .. }) => {
            (AuditDecision::Denied, Some(reason.clone()))
        }
        Err(GatewayError::RateLimited { .. }) => (
            AuditDecision::RateLimited,
            Some(reason::RATE_LIMITED.to_string()),
        ),
        Err(GatewayError::DownstreamError { reason }) => {
            (AuditDecision::DownstreamFailed, Some(reason.clone()))
        }
        Err(GatewayError::ConnectorUnavailable { .. } | GatewayError::NotFound { .. }) => (
            AuditDecision::Denied,
            Some(reason::CONNECTOR_UNAVAILABLE.to_string()),
        ),
        Err(e) => (AuditDecision::Denied, Some(e.to_string())),
    }
}
