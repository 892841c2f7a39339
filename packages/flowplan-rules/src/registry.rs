//! Rule registry
//!
//! Holds the rule list and serves it back in phase-then-declaration order.
//! Registration order is significant: within a phase, rules run as added.

use std::fmt;

use crate::phase::PlanPhase;
use crate::rule::Rule;

pub struct RuleRegistry<N, S> {
    rules: Vec<Rule<N, S>>,
}

impl<N, S> RuleRegistry<N, S> {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn add(&mut self, rule: Rule<N, S>) -> &mut Self {
        self.rules.push(rule);
        self
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules declared for `phase`, in declaration order.
    pub fn rules_in_phase(&self, phase: PlanPhase) -> impl Iterator<Item = &Rule<N, S>> {
        self.rules.iter().filter(move |rule| rule.phase() == phase)
    }

    /// All rules in phase-then-declaration order.
    pub fn ordered(&self) -> Vec<&Rule<N, S>> {
        PlanPhase::ALL
            .iter()
            .flat_map(|&phase| self.rules_in_phase(phase))
            .collect()
    }
}

impl<N, S> Default for RuleRegistry<N, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N, S> fmt::Debug for RuleRegistry<N, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleRegistry")
            .field("rules", &self.rules.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::RuleExpression;
    use flowplan_core::ExpressionGraph;

    fn named_assert(phase: PlanPhase, identifier: &str) -> Rule<&'static str, &'static str> {
        Rule::assert(
            phase,
            identifier,
            RuleExpression::new(ExpressionGraph::new()),
            "never fires",
        )
    }

    #[test]
    fn test_ordered_by_phase_then_declaration() {
        let mut registry = RuleRegistry::new();
        registry
            .add(named_assert(PlanPhase::ResolveElements, "SecondRule"))
            .add(named_assert(PlanPhase::PreBalance, "FirstRule"))
            .add(named_assert(PlanPhase::ResolveElements, "ThirdRule"));

        let names: Vec<&str> = registry.ordered().iter().map(|r| r.name()).collect();

        assert_eq!(names, vec!["first", "second", "third"]);
    }
}
