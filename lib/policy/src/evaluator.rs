//! The policy evaluation pipeline.
//!
//! Evaluation is two-phase: first the permission matcher must permit the
//! request under the principal's effective grants, then the applicable rules
//! run in priority-then-declaration order. The first rule that triggers with
//! a deny action halts evaluation.

use crate::decision::{Decision, reason};
use crate::rule::{PolicyRule, RuleAction, RuleKind};
use std::collections::HashMap;
use std::sync::Mutex;
use tollgate_permissions::{GrantSet, Principal};
use tracing::{debug, warn};

/// A single request under evaluation.
#[derive(Debug, Clone)]
pub struct PolicyRequest<'a> {
    /// The requesting identity.
    pub principal: &'a Principal,
    /// The grants in effect (typically the target connector's grant set).
    pub grants: &'a GrantSet,
    /// Requested resource (e.g. `database`).
    pub resource: &'a str,
    /// Requested action (e.g. `query`).
    pub action: &'a str,
    /// Requested scope (e.g. `agent:x7`).
    pub scope: &'a str,
    /// Cost attributed to the request, consumed by budget rules.
    pub cost: u64,
}

impl PolicyRequest<'_> {
    /// Returns the `resource:action:scope` candidate string for matching.
    #[must_use]
    pub fn candidate(&self) -> String {
        format!("{}:{}:{}", self.resource, self.action, self.scope)
    }
}

/// The outcome of evaluating one rule against one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOutcome {
    /// The rule did not trigger.
    Pass,
    /// The rule triggered; combined with the rule's action to decide.
    Triggered {
        /// The reason to report if the rule's action is deny.
        reason: String,
    },
}

/// Evaluation function for one rule kind.
///
/// Implementations may keep state (budget counters do); any state change
/// must happen atomically with the returned outcome.
pub trait RuleEvaluator: Send + Sync {
    /// Evaluates a rule against a request.
    fn evaluate(&self, rule: &PolicyRule, request: &PolicyRequest<'_>) -> RuleOutcome;
}

/// Budget rule evaluation with per-(rule, scope) cumulative counters.
///
/// A request is denied when `counter + cost > limit`; otherwise the counter
/// is incremented under the same lock, so concurrent requests cannot
/// both slip under the limit.
#[derive(Debug, Default)]
pub struct BudgetEvaluator {
    counters: Mutex<HashMap<(String, String), u64>>,
}

impl BudgetEvaluator {
    /// Creates a budget evaluator with empty counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cumulative spend recorded for a rule in a scope.
    #[must_use]
    pub fn spent(&self, rule_name: &str, scope: &str) -> u64 {
        let counters = self.counters.lock().unwrap();
        counters
            .get(&(rule_name.to_string(), scope.to_string()))
            .copied()
            .unwrap_or(0)
    }
}

impl RuleEvaluator for BudgetEvaluator {
    fn evaluate(&self, rule: &PolicyRule, request: &PolicyRequest<'_>) -> RuleOutcome {
        let RuleKind::BudgetLimit { limit } = &rule.kind else {
            return RuleOutcome::Pass;
        };

        let mut counters = self.counters.lock().unwrap();
        let counter = counters
            .entry((rule.name.clone(), request.scope.to_string()))
            .or_insert(0);

        // A cost that overflows the counter is over any representable limit.
        let total = counter.checked_add(request.cost);
        match total {
            Some(total) if total <= *limit => {
                *counter = total;
                RuleOutcome::Pass
            }
            _ => {
                debug!(
                    rule = %rule.name,
                    scope = %request.scope,
                    spent = *counter,
                    cost = request.cost,
                    limit,
                    "budget exhausted"
                );
                RuleOutcome::Triggered {
                    reason: reason::BUDGET_EXCEEDED.to_string(),
                }
            }
        }
    }
}

/// Content rule evaluation: triggers when the resource or action contains a
/// blocked term (case-insensitive).
#[derive(Debug, Default)]
pub struct ContentFilterEvaluator;

impl RuleEvaluator for ContentFilterEvaluator {
    fn evaluate(&self, rule: &PolicyRule, request: &PolicyRequest<'_>) -> RuleOutcome {
        let RuleKind::ContentFilter { blocked_terms } = &rule.kind else {
            return RuleOutcome::Pass;
        };

        let resource = request.resource.to_lowercase();
        let action = request.action.to_lowercase();
        let blocked = blocked_terms.iter().any(|term| {
            let term = term.to_lowercase();
            resource.contains(&term) || action.contains(&term)
        });

        if blocked {
            RuleOutcome::Triggered {
                reason: reason::CONTENT_BLOCKED.to_string(),
            }
        } else {
            RuleOutcome::Pass
        }
    }
}

/// Evaluates permission grants and policy rules for dispatch requests.
pub struct PolicyEvaluator {
    rules: Vec<PolicyRule>,
    evaluators: HashMap<&'static str, Box<dyn RuleEvaluator>>,
}

impl PolicyEvaluator {
    /// Creates an evaluator over the given rules with the built-in
    /// budget and content evaluators registered.
    #[must_use]
    pub fn new(rules: Vec<PolicyRule>) -> Self {
        let mut evaluators: HashMap<&'static str, Box<dyn RuleEvaluator>> = HashMap::new();
        evaluators.insert("budget_limit", Box::new(BudgetEvaluator::new()));
        evaluators.insert("content_filter", Box::new(ContentFilterEvaluator));
        Self { rules, evaluators }
    }

    /// Registers an evaluator for a rule kind, replacing any existing one.
    ///
    /// This is the extension point for future rule kinds.
    pub fn register_evaluator(
        &mut self,
        kind_name: &'static str,
        evaluator: Box<dyn RuleEvaluator>,
    ) {
        self.evaluators.insert(kind_name, evaluator);
    }

    /// Returns the configured rules in declaration order.
    #[must_use]
    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }

    /// Evaluates a request to an allow/deny decision.
    ///
    /// 1. The principal's effective grants must permit
    ///    `resource:action:scope`, else `permission_denied`.
    /// 2. Rules whose scope pattern matches the request scope run in
    ///    priority order (ties broken by declaration order). The first rule
    ///    that triggers with a deny action halts evaluation with that rule's
    ///    reason. Triggered allow rules are recorded but do not halt.
    /// 3. If no rule denies, the decision is allow.
    pub fn evaluate(&self, request: &PolicyRequest<'_>) -> Decision {
        let candidate = request.candidate();
        if !request.grants.permits(request.principal, &candidate) {
            debug!(principal = %request.principal.id, %candidate, "no grant matches");
            return Decision::permission_denied();
        }

        let mut applicable: Vec<&PolicyRule> = self
            .rules
            .iter()
            .filter(|rule| rule.scope.matches(request.scope))
            .collect();
        // Stable sort keeps declaration order within a priority.
        applicable.sort_by_key(|rule| rule.priority);

        for rule in applicable {
            let Some(evaluator) = self.evaluators.get(rule.kind.name()) else {
                warn!(rule = %rule.name, kind = rule.kind.name(), "no evaluator registered for rule kind");
                continue;
            };

            match evaluator.evaluate(rule, request) {
                RuleOutcome::Pass => {}
                RuleOutcome::Triggered { reason } => match rule.action {
                    RuleAction::Deny => {
                        return Decision::deny_by_rule(&rule.name, reason);
                    }
                    RuleAction::Allow => {
                        debug!(rule = %rule.name, "allow rule matched");
                    }
                },
            }
        }

        Decision::Allow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tollgate_core::PrincipalId;
    use tollgate_permissions::{Pattern, PermissionGrant};

    fn pattern(s: &str) -> Pattern {
        Pattern::parse(s).expect("pattern should parse")
    }

    fn grants_for(user: PrincipalId, specs: &[&str]) -> GrantSet {
        GrantSet::new(vec![PermissionGrant::for_user(
            user,
            specs.iter().map(|s| pattern(s)).collect(),
        )])
    }

    fn request<'a>(
        principal: &'a Principal,
        grants: &'a GrantSet,
        scope: &'a str,
        cost: u64,
    ) -> PolicyRequest<'a> {
        PolicyRequest {
            principal,
            grants,
            resource: "database",
            action: "query",
            scope,
            cost,
        }
    }

    #[test]
    fn permission_denied_without_matching_grant() {
        let user = PrincipalId::new();
        let principal = Principal::user(user);
        let grants = grants_for(user, &["cache:*"]);
        let evaluator = PolicyEvaluator::new(vec![]);

        let decision = evaluator.evaluate(&request(&principal, &grants, "agent:x", 1));
        assert_eq!(decision.denial_reason(), Some(reason::PERMISSION_DENIED));
    }

    #[test]
    fn allow_with_grant_and_no_rules() {
        let user = PrincipalId::new();
        let principal = Principal::user(user);
        let grants = grants_for(user, &["database:query:*"]);
        let evaluator = PolicyEvaluator::new(vec![]);

        let decision = evaluator.evaluate(&request(&principal, &grants, "agent:x", 1));
        assert!(decision.is_allowed());
    }

    #[test]
    fn budget_allows_up_to_exact_limit_then_denies() {
        let user = PrincipalId::new();
        let principal = Principal::user(user);
        let grants = grants_for(user, &["database:query:*"]);
        let evaluator = PolicyEvaluator::new(vec![PolicyRule::deny(
            "spend-cap",
            RuleKind::BudgetLimit { limit: 1000 },
            pattern("agent:x"),
            10,
        )]);

        // 400 + 600 lands exactly on the limit.
        assert!(
            evaluator
                .evaluate(&request(&principal, &grants, "agent:x", 400))
                .is_allowed()
        );
        assert!(
            evaluator
                .evaluate(&request(&principal, &grants, "agent:x", 600))
                .is_allowed()
        );

        // Any further non-zero cost is over budget.
        let decision = evaluator.evaluate(&request(&principal, &grants, "agent:x", 1));
        assert_eq!(decision.denial_reason(), Some(reason::BUDGET_EXCEEDED));

        // Zero-cost requests still pass.
        assert!(
            evaluator
                .evaluate(&request(&principal, &grants, "agent:x", 0))
                .is_allowed()
        );
    }

    #[test]
    fn budget_counters_are_per_scope() {
        let user = PrincipalId::new();
        let principal = Principal::user(user);
        let grants = grants_for(user, &["database:query:*"]);
        let evaluator = PolicyEvaluator::new(vec![PolicyRule::deny(
            "spend-cap",
            RuleKind::BudgetLimit { limit: 100 },
            pattern("agent:*"),
            10,
        )]);

        assert!(
            evaluator
                .evaluate(&request(&principal, &grants, "agent:x", 100))
                .is_allowed()
        );
        // agent:x is exhausted, agent:y is untouched.
        assert!(
            !evaluator
                .evaluate(&request(&principal, &grants, "agent:x", 1))
                .is_allowed()
        );
        assert!(
            evaluator
                .evaluate(&request(&principal, &grants, "agent:y", 100))
                .is_allowed()
        );
    }

    #[test]
    fn denied_requests_do_not_consume_budget() {
        let evaluator = BudgetEvaluator::new();
        let user = PrincipalId::new();
        let principal = Principal::user(user);
        let grants = grants_for(user, &["database:query:*"]);
        let rule = PolicyRule::deny(
            "spend-cap",
            RuleKind::BudgetLimit { limit: 10 },
            pattern("agent:x"),
            10,
        );

        let over = request(&principal, &grants, "agent:x", 11);
        assert!(matches!(
            evaluator.evaluate(&rule, &over),
            RuleOutcome::Triggered { .. }
        ));
        assert_eq!(evaluator.spent("spend-cap", "agent:x"), 0);

        let under = request(&principal, &grants, "agent:x", 10);
        assert_eq!(evaluator.evaluate(&rule, &under), RuleOutcome::Pass);
        assert_eq!(evaluator.spent("spend-cap", "agent:x"), 10);
    }

    #[test]
    fn oversized_cost_is_denied_without_overflow() {
        let evaluator = BudgetEvaluator::new();
        let user = PrincipalId::new();
        let principal = Principal::user(user);
        let grants = grants_for(user, &["database:query:*"]);
        let rule = PolicyRule::deny(
            "spend-cap",
            RuleKind::BudgetLimit { limit: 1000 },
            pattern("agent:x"),
            10,
        );

        assert_eq!(
            evaluator.evaluate(&rule, &request(&principal, &grants, "agent:x", 500)),
            RuleOutcome::Pass
        );

        // A cost that would wrap the counter is over budget, not a bypass.
        let huge = request(&principal, &grants, "agent:x", u64::MAX);
        assert!(matches!(
            evaluator.evaluate(&rule, &huge),
            RuleOutcome::Triggered { .. }
        ));
        assert_eq!(evaluator.spent("spend-cap", "agent:x"), 500);

        // The counter still works afterwards.
        assert_eq!(
            evaluator.evaluate(&rule, &request(&principal, &grants, "agent:x", 500)),
            RuleOutcome::Pass
        );
    }

    #[test]
    fn content_filter_blocks_matching_resource() {
        let user = PrincipalId::new();
        let principal = Principal::user(user);
        let grants = grants_for(user, &["*"]);
        let evaluator = PolicyEvaluator::new(vec![PolicyRule::deny(
            "no-payroll",
            RuleKind::ContentFilter {
                blocked_terms: vec!["payroll".to_string()],
            },
            pattern("*"),
            5,
        )]);

        let blocked = PolicyRequest {
            principal: &principal,
            grants: &grants,
            resource: "payroll_db",
            action: "query",
            scope: "agent:x",
            cost: 1,
        };
        let decision = evaluator.evaluate(&blocked);
        assert_eq!(decision.denial_reason(), Some(reason::CONTENT_BLOCKED));

        let clean = PolicyRequest {
            resource: "inventory",
            ..blocked
        };
        assert!(evaluator.evaluate(&clean).is_allowed());
    }

    #[test]
    fn rules_evaluate_in_priority_then_declaration_order() {
        let user = PrincipalId::new();
        let principal = Principal::user(user);
        let grants = grants_for(user, &["database:query:*"]);

        // Declared later but with a lower priority, the content filter must
        // run before the budget rule and report its own reason.
        let evaluator = PolicyEvaluator::new(vec![
            PolicyRule::deny(
                "spend-cap",
                RuleKind::BudgetLimit { limit: 0 },
                pattern("agent:*"),
                20,
            ),
            PolicyRule::deny(
                "no-query",
                RuleKind::ContentFilter {
                    blocked_terms: vec!["query".to_string()],
                },
                pattern("agent:*"),
                10,
            ),
        ]);

        let decision = evaluator.evaluate(&request(&principal, &grants, "agent:x", 5));
        match decision {
            Decision::Deny { rule, reason } => {
                assert_eq!(rule.as_deref(), Some("no-query"));
                assert_eq!(reason, "content_blocked");
            }
            Decision::Allow => panic!("expected denial"),
        }
    }

    #[test]
    fn declaration_order_breaks_priority_ties() {
        let user = PrincipalId::new();
        let principal = Principal::user(user);
        let grants = grants_for(user, &["database:query:*"]);

        let evaluator = PolicyEvaluator::new(vec![
            PolicyRule::deny(
                "first",
                RuleKind::ContentFilter {
                    blocked_terms: vec!["query".to_string()],
                },
                pattern("agent:*"),
                10,
            ),
            PolicyRule::deny(
                "second",
                RuleKind::ContentFilter {
                    blocked_terms: vec!["query".to_string()],
                },
                pattern("agent:*"),
                10,
            ),
        ]);

        let decision = evaluator.evaluate(&request(&principal, &grants, "agent:x", 1));
        match decision {
            Decision::Deny { rule, .. } => assert_eq!(rule.as_deref(), Some("first")),
            Decision::Allow => panic!("expected denial"),
        }
    }

    #[test]
    fn rules_outside_scope_do_not_apply() {
        let user = PrincipalId::new();
        let principal = Principal::user(user);
        let grants = grants_for(user, &["database:query:*"]);
        let evaluator = PolicyEvaluator::new(vec![PolicyRule::deny(
            "spend-cap",
            RuleKind::BudgetLimit { limit: 0 },
            pattern("agent:other"),
            10,
        )]);

        assert!(
            evaluator
                .evaluate(&request(&principal, &grants, "agent:x", 50))
                .is_allowed()
        );
    }

    #[test]
    fn triggered_allow_rule_does_not_halt() {
        let user = PrincipalId::new();
        let principal = Principal::user(user);
        let grants = grants_for(user, &["database:query:*"]);

        let mut audit_only = PolicyRule::deny(
            "flag-query",
            RuleKind::ContentFilter {
                blocked_terms: vec!["query".to_string()],
            },
            pattern("agent:*"),
            1,
        );
        audit_only.action = RuleAction::Allow;

        let evaluator = PolicyEvaluator::new(vec![audit_only]);
        assert!(
            evaluator
                .evaluate(&request(&principal, &grants, "agent:x", 1))
                .is_allowed()
        );
    }
}
