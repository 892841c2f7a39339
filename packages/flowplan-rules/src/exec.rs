//! Rule driver
//!
//! The phase loop. For each phase in order, each rule runs against a deep
//! copy of the current graph; the end graph replaces the current graph only
//! when the rule actually changed it, judged by the change flag plus a
//! structural comparison so an in-place rewrite that reuses the container is
//! still detected. Failures are annotated with phase and rule and, when
//! tracing is enabled, a DOT snapshot of the failing graph.

use std::fmt;
use std::time::Instant;

use tracing::{debug, info};

use flowplan_core::errors::{PlannerError, Result};
use flowplan_core::{
    ChildTransform, ElementGraph, Match, Partitions, PlannerContext,
};

use crate::phase::PlanPhase;
use crate::registry::RuleRegistry;

/// Diagnostic record of one rule application.
#[derive(Debug)]
pub struct RuleRecord {
    pub phase: PlanPhase,
    pub rule: String,
    pub changed: bool,
    pub matches: Vec<Match>,
    pub children: Vec<ChildTransform>,
}

/// Partitions attached by a partitioner rule.
#[derive(Debug)]
pub struct PartitionRecord {
    pub phase: PlanPhase,
    pub rule: String,
    pub partitions: Partitions,
}

/// Final graph plus the per-rule records of the whole plan.
pub struct RuleResult<N, S> {
    pub end_graph: ElementGraph<N, S>,
    pub records: Vec<RuleRecord>,
    pub partitions: Vec<PartitionRecord>,
}

impl<N: fmt::Debug, S: fmt::Debug> fmt::Debug for RuleResult<N, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleResult")
            .field("end_graph", &self.end_graph)
            .field("records", &self.records)
            .field("partitions", &self.partitions)
            .finish()
    }
}

/// Sequences the registered rules over a graph, phase by phase.
pub struct RuleExec<N, S> {
    registry: RuleRegistry<N, S>,
}

impl<N: Clone + fmt::Debug, S: Clone + fmt::Debug> RuleExec<N, S> {
    pub fn new(registry: RuleRegistry<N, S>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &RuleRegistry<N, S> {
        &self.registry
    }

    pub fn exec(
        &self,
        ctx: &PlannerContext<N, S>,
        graph: ElementGraph<N, S>,
    ) -> Result<RuleResult<N, S>> {
        let started = Instant::now();

        let mut current = graph;
        let mut records = Vec::new();
        let mut partitions = Vec::new();

        for phase in PlanPhase::ALL {
            let mut applied = 0usize;

            for rule in self.registry.rules_in_phase(phase) {
                if let Some(limit) = ctx.config().plan_timeout {
                    let elapsed = started.elapsed();

                    if elapsed > limit {
                        return Err(PlannerError::PlannerTimeout { elapsed, limit });
                    }
                }

                let copy = current.deep_copy();

                let outcome = match rule.apply(ctx, copy) {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        return Err(self.annotate(ctx, phase, rule.name(), &current, err))
                    }
                };

                if let Some(found) = outcome.partitions {
                    partitions.push(PartitionRecord {
                        phase,
                        rule: rule.name().to_string(),
                        partitions: found,
                    });
                }

                let transform = outcome.transform;
                let changed = transform.changed() && !transform.end_graph().structurally_eq(&current);

                debug!(rule = rule.name(), %phase, changed, "rule finished");

                records.push(RuleRecord {
                    phase,
                    rule: rule.name().to_string(),
                    changed,
                    matches: transform.matches().to_vec(),
                    children: transform.children().to_vec(),
                });

                if changed {
                    current = transform.into_end_graph();
                    ctx.trace_graph(&format!("{phase}-{}", rule.name()), &current, &[])?;
                }

                applied += 1;
            }

            if applied > 0 {
                info!(%phase, rules = applied, "phase complete");
            }
        }

        Ok(RuleResult {
            end_graph: current,
            records,
            partitions,
        })
    }

    /// Name the failing phase and rule on the error and, when tracing, write
    /// the failing graph with the assertion's captures highlighted.
    fn annotate(
        &self,
        ctx: &PlannerContext<N, S>,
        phase: PlanPhase,
        rule: &str,
        graph: &ElementGraph<N, S>,
        err: PlannerError,
    ) -> PlannerError {
        let highlights = match &err {
            PlannerError::PlannerAssertion { captured, .. } => captured.clone(),
            _ => Vec::new(),
        };

        let snapshot = ctx
            .trace_graph(&format!("{phase}-{rule}-failed"), graph, &highlights)
            .ok()
            .flatten();

        PlannerError::Rule {
            phase: phase.to_string(),
            rule: rule.to_string(),
            snapshot,
            source: Box::new(err),
        }
    }
}
