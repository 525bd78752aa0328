//! Policy evaluation for the tollgate gateway.
//!
//! This crate combines permission grants with policy rules (budget limits,
//! content filters) to produce an allow/deny decision with a reason.
//!
//! Rule kinds are a tagged variant with one evaluation function per kind,
//! looked up from an extensible registry of evaluators.

pub mod decision;
pub mod evaluator;
pub mod rule;

pub use decision::{Decision, reason};
pub use evaluator::{PolicyEvaluator, PolicyRequest, RuleEvaluator, RuleOutcome};
pub use rule::{PolicyRule, RuleAction, RuleKind};
