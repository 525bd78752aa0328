//! Policy rule records.

use serde::{Deserialize, Serialize};
use tollgate_permissions::Pattern;

/// The kind-specific configuration of a policy rule.
///
/// New kinds are added here plus a matching [`RuleEvaluator`] registration;
/// no inheritance hierarchy is involved.
///
/// [`RuleEvaluator`]: crate::evaluator::RuleEvaluator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleKind {
    /// Caps cumulative request cost within each matched scope.
    BudgetLimit {
        /// Maximum cumulative cost per scope.
        limit: u64,
    },
    /// Blocks requests whose resource or action contains a blocked term.
    ContentFilter {
        /// Terms that trigger the rule (matched case-insensitively).
        blocked_terms: Vec<String>,
    },
}

impl RuleKind {
    /// Returns the kind discriminant used for evaluator registry lookup.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::BudgetLimit { .. } => "budget_limit",
            Self::ContentFilter { .. } => "content_filter",
        }
    }
}

/// The action a triggered rule results in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    /// A triggered rule records a match but does not halt evaluation.
    Allow,
    /// A triggered rule halts evaluation and denies the request.
    Deny,
}

/// A configured policy rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Unique rule name, used in audit reasons and budget counter keys.
    pub name: String,
    /// Kind-specific configuration.
    pub kind: RuleKind,
    /// Scope pattern the rule applies to (matched against the request scope).
    pub scope: Pattern,
    /// Resulting action when the rule triggers.
    pub action: RuleAction,
    /// Evaluation priority; lower values evaluate first.
    pub priority: u32,
}

impl PolicyRule {
    /// Creates a deny rule with the given priority.
    #[must_use]
    pub fn deny(
        name: impl Into<String>,
        kind: RuleKind,
        scope: Pattern,
        priority: u32,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            scope,
            action: RuleAction::Deny,
            priority,
        }
    }
}
