//! Audit trail entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tollgate_core::{AuditEntryId, ConnectorId, PrincipalId};

/// The final classification of one dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditDecision {
    /// Allowed and the downstream call succeeded.
    Allowed,
    /// Denied by permissions or a policy rule before any external call.
    Denied,
    /// Rejected by the rate limiter before any external call.
    RateLimited,
    /// Allowed, but the downstream call failed or timed out.
    DownstreamFailed,
}

/// One immutable record of a dispatch attempt.
///
/// Entries are never mutated or deleted once recorded. Timestamps are
/// clamped monotonic non-decreasing per logger; ordering across connectors
/// is not guaranteed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique entry ID.
    pub id: AuditEntryId,
    /// When the attempt completed.
    pub timestamp: DateTime<Utc>,
    /// The requesting principal.
    pub principal: PrincipalId,
    /// The target connector.
    pub connector_id: ConnectorId,
    /// Requested resource.
    pub resource: String,
    /// Requested action.
    pub action: String,
    /// Requested scope.
    pub scope: String,
    /// Final classification.
    pub decision: AuditDecision,
    /// Denial or failure reason, if any.
    pub reason: Option<String>,
    /// End-to-end latency of the attempt in milliseconds.
    pub latency_ms: u64,
    /// Cost attributed to the request.
    pub cost: u64,
    /// False for test dispatches issued through the management surface.
    pub billable: bool,
}

impl AuditEntry {
    /// Creates an entry stamped with the current time.
    #[must_use]
    pub fn new(
        principal: PrincipalId,
        connector_id: ConnectorId,
        resource: impl Into<String>,
        action: impl Into<String>,
        scope: impl Into<String>,
        decision: AuditDecision,
    ) -> Self {
        Self {
            id: AuditEntryId::new(),
            timestamp: Utc::now(),
            principal,
            connector_id,
            resource: resource.into(),
            action: action.into(),
            scope: scope.into(),
            decision,
            reason: None,
            latency_ms: 0,
            cost: 0,
            billable: true,
        }
    }

    /// Sets the denial or failure reason.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Sets the measured latency.
    #[must_use]
    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Sets the request cost.
    #[must_use]
    pub fn with_cost(mut self, cost: u64) -> Self {
        self.cost = cost;
        self
    }

    /// Flags the entry as non-billable (test traffic).
    #[must_use]
    pub fn non_billing(mut self) -> Self {
        self.billable = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_builder() {
        let entry = AuditEntry::new(
            PrincipalId::new(),
            ConnectorId::new(),
            "database",
            "query",
            "agent:x",
            AuditDecision::Denied,
        )
        .with_reason("budget_exceeded")
        .with_cost(50)
        .non_billing();

        assert_eq!(entry.decision, AuditDecision::Denied);
        assert_eq!(entry.reason.as_deref(), Some("budget_exceeded"));
        assert_eq!(entry.cost, 50);
        assert!(!entry.billable);
    }

    #[test]
    fn entry_serde_roundtrip() {
        let entry = AuditEntry::new(
            PrincipalId::new(),
            ConnectorId::new(),
            "cache",
            "read",
            "user:1",
            AuditDecision::Allowed,
        )
        .with_latency_ms(12);

        let json = serde_json::to_string(&entry).expect("serialize");
        let parsed: AuditEntry = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(entry, parsed);
    }

    #[test]
    fn decision_serde_tag() {
        let json = serde_json::to_value(AuditDecision::RateLimited).expect("serialize");
        assert_eq!(json, "rate_limited");
    }
}
