//! The outcome of a policy evaluation.

use serde::{Deserialize, Serialize};

/// Well-known denial reasons.
pub mod reason {
    /// No grant pattern matched the request.
    pub const PERMISSION_DENIED: &str = "permission_denied";
    /// A budget rule's cumulative counter would exceed its limit.
    pub const BUDGET_EXCEEDED: &str = "budget_exceeded";
    /// A content rule matched a blocked term.
    pub const CONTENT_BLOCKED: &str = "content_blocked";
}

/// An allow/deny decision with the reason for denial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    /// The request may proceed.
    Allow,
    /// The request is denied.
    Deny {
        /// The rule that denied, if any (`None` for permission denials).
        rule: Option<String>,
        /// The denial reason (e.g. `budget_exceeded`).
        reason: String,
    },
}

impl Decision {
    /// Creates a denial attributed to a rule.
    #[must_use]
    pub fn deny_by_rule(rule: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Deny {
            rule: Some(rule.into()),
            reason: reason.into(),
        }
    }

    /// Creates a permission denial (no rule involved).
    #[must_use]
    pub fn permission_denied() -> Self {
        Self::Deny {
            rule: None,
            reason: reason::PERMISSION_DENIED.to_string(),
        }
    }

    /// Returns true if the request may proceed.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// Returns the denial reason, if denied.
    #[must_use]
    pub fn denial_reason(&self) -> Option<&str> {
        match self {
            Self::Allow => None,
            Self::Deny { reason, .. } => Some(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_is_allowed() {
        assert!(Decision::Allow.is_allowed());
        assert_eq!(Decision::Allow.denial_reason(), None);
    }

    #[test]
    fn deny_carries_rule_and_reason() {
        let decision = Decision::deny_by_rule("spend-cap", reason::BUDGET_EXCEEDED);
        assert!(!decision.is_allowed());
        assert_eq!(decision.denial_reason(), Some(reason::BUDGET_EXCEEDED));
    }

    #[test]
    fn permission_denied_has_no_rule() {
        let decision = Decision::permission_denied();
        match decision {
            Decision::Deny { rule, reason } => {
                assert_eq!(rule, None);
                assert_eq!(reason, "permission_denied");
            }
            Decision::Allow => panic!("expected denial"),
        }
    }
}
