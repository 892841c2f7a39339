/*
 * flowplan-rules - Rule kinds and the phase-ordered driver
 *
 * Rules adapt the flowplan-core matchers and transformers to the planner's
 * phase loop:
 * - phase.rs    : ordered plan phases
 * - rule.rs     : assert / transformer / partitioner rule kinds
 * - registry.rs : phase-then-declaration rule ordering
 * - exec.rs     : the driver (copy, apply, install-or-discard, annotate)
 */

pub mod exec;
pub mod phase;
pub mod registry;
pub mod rule;

pub use exec::{PartitionRecord, RuleExec, RuleRecord, RuleResult};
pub use phase::PlanPhase;
pub use registry::RuleRegistry;
pub use rule::{default_rule_name, Mutation, Rule, RuleExpression, RuleOutcome};
