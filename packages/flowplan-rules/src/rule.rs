//! Rule kinds
//!
//! A rule tags a unit of planner work with a phase and a name. Three kinds:
//! asserts fail the plan when their pattern matches, transformers rewrite
//! the graph to fixed point, partitioners attach an annotated sub-graph
//! collection without touching the parent.

use std::fmt;
use std::rc::Rc;

use tracing::debug;

use flowplan_core::errors::{PlannerError, Result};
use flowplan_core::{
    Capture, ContractedGraph, ElementGraph, ExpressionGraph, ExpressionGraphPartitioner,
    GraphFinder, Match, Partitions, PlannerContext, Transform, Transformer,
};

use crate::phase::PlanPhase;

/// Cosmetic rule name from a static identifier: a trailing `Rule` or
/// `Assert` is stripped and the camel-case remainder hyphenated.
pub fn default_rule_name(identifier: &str) -> String {
    let base = identifier
        .strip_suffix("Rule")
        .or_else(|| identifier.strip_suffix("Assert"))
        .unwrap_or(identifier);

    let mut out = String::new();

    for (i, c) in base.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('-');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }

    out
}

/// Bundle of up to three expression graphs: an optional contraction, an
/// optional match against the contraction, and the match expression proper.
pub struct RuleExpression<N, S> {
    contraction: Option<ExpressionGraph<N, S>>,
    contracted_match: Option<ExpressionGraph<N, S>>,
    expression: ExpressionGraph<N, S>,
}

impl<N, S> fmt::Debug for RuleExpression<N, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleExpression")
            .field("contraction", &self.contraction)
            .field("contracted_match", &self.contracted_match)
            .field("expression", &self.expression)
            .finish()
    }
}

impl<N, S> RuleExpression<N, S> {
    pub fn new(expression: ExpressionGraph<N, S>) -> Self {
        Self {
            contraction: None,
            contracted_match: None,
            expression,
        }
    }

    pub fn contracted(
        contraction: ExpressionGraph<N, S>,
        expression: ExpressionGraph<N, S>,
    ) -> Self {
        Self {
            contraction: Some(contraction),
            contracted_match: None,
            expression,
        }
    }

    pub fn contracted_match(
        contraction: ExpressionGraph<N, S>,
        contracted_match: ExpressionGraph<N, S>,
        expression: ExpressionGraph<N, S>,
    ) -> Self {
        Self {
            contraction: Some(contraction),
            contracted_match: Some(contracted_match),
            expression,
        }
    }

    /// General form; a contracted-match without a contraction is a
    /// configuration error.
    pub fn from_parts(
        contraction: Option<ExpressionGraph<N, S>>,
        contracted_match: Option<ExpressionGraph<N, S>>,
        expression: ExpressionGraph<N, S>,
    ) -> Result<Self> {
        if contracted_match.is_some() && contraction.is_none() {
            return Err(PlannerError::config(
                "a contracted match expression requires a contraction expression",
            ));
        }

        Ok(Self {
            contraction,
            contracted_match,
            expression,
        })
    }

    pub fn expression(&self) -> &ExpressionGraph<N, S> {
        &self.expression
    }

    pub fn contraction(&self) -> Option<&ExpressionGraph<N, S>> {
        self.contraction.as_ref()
    }
}

/// The graph mutation a transformer rule performs on its match.
pub enum Mutation<N> {
    /// Contract away every Primary capture.
    Remove,
    /// Rewire the single Primary's edges onto the single Secondary.
    Replace,
    /// Insert a fresh element after the single Primary.
    Insert(Rc<dyn Fn() -> N>),
}

impl<N> Mutation<N> {
    pub fn insert(factory: impl Fn() -> N + 'static) -> Self {
        Mutation::Insert(Rc::new(factory))
    }
}

enum RuleKind<N, S> {
    Assert {
        expression: RuleExpression<N, S>,
        message: String,
    },
    Transform {
        transformer: Transformer<N, S>,
    },
    Partition {
        partitioner: ExpressionGraphPartitioner<N, S>,
    },
}

/// What a rule hands back to the driver.
pub struct RuleOutcome<N, S> {
    pub transform: Transform<N, S>,
    pub partitions: Option<Partitions>,
}

/// A named, phase-tagged unit of planner work.
pub struct Rule<N, S> {
    name: String,
    phase: PlanPhase,
    kind: RuleKind<N, S>,
}

impl<N: Clone + fmt::Debug, S: Clone> Rule<N, S> {
    /// Assert rule: fails the plan with the interpolated message when the
    /// expression matches. `{Primary}` and `{Secondary}` placeholders are
    /// substituted with the captured elements.
    pub fn assert(
        phase: PlanPhase,
        identifier: &str,
        expression: RuleExpression<N, S>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            name: default_rule_name(identifier),
            phase,
            kind: RuleKind::Assert {
                expression,
                message: message.into(),
            },
        }
    }

    /// Transformer rule: the mutation is applied to fixed point.
    pub fn transformer(
        phase: PlanPhase,
        identifier: &str,
        expression: RuleExpression<N, S>,
        mutation: Mutation<N>,
    ) -> Self {
        let RuleExpression {
            contraction,
            contracted_match,
            expression,
        } = expression;

        let mut base = match mutation {
            Mutation::Remove => Transformer::remove(expression),
            Mutation::Replace => Transformer::replace(expression),
            Mutation::Insert(factory) => Transformer::Insert {
                expression,
                contraction: None,
                contracted_match: None,
                factory,
            },
        };

        if let Some(contraction) = contraction {
            base = base.with_contraction(contraction);
        }
        if let Some(contracted_match) = contracted_match {
            base = base.with_contracted_match(contracted_match);
        }

        Self {
            name: default_rule_name(identifier),
            phase,
            kind: RuleKind::Transform {
                transformer: Transformer::recursive(base),
            },
        }
    }

    /// Partitioner rule: attaches partitions, never mutates the parent.
    pub fn partitioner(
        phase: PlanPhase,
        identifier: &str,
        partitioner: ExpressionGraphPartitioner<N, S>,
    ) -> Self {
        Self {
            name: default_rule_name(identifier),
            phase,
            kind: RuleKind::Partition { partitioner },
        }
    }

    /// Run the rule against its own copy of the graph.
    pub fn apply(
        &self,
        ctx: &PlannerContext<N, S>,
        graph: ElementGraph<N, S>,
    ) -> Result<RuleOutcome<N, S>> {
        debug!(rule = %self.name, phase = %self.phase, "applying rule");

        match &self.kind {
            RuleKind::Assert {
                expression,
                message,
            } => {
                let found = match expression.contraction() {
                    None => {
                        GraphFinder::new(expression.expression()).find_first(ctx, &graph)?
                    }
                    Some(contraction) => {
                        let contracted = ContractedGraph::contract(ctx, &graph, contraction)?;
                        GraphFinder::new(expression.expression())
                            .find_first(ctx, contracted.graph())?
                    }
                };

                match found {
                    None => Ok(RuleOutcome {
                        transform: Transform::identity(graph),
                        partitions: None,
                    }),
                    Some(found) => {
                        let mut captured = found.captured(Capture::Primary).to_vec();
                        captured.extend_from_slice(found.captured(Capture::Secondary));

                        Err(PlannerError::PlannerAssertion {
                            message: interpolate(message, &graph, &found),
                            captured,
                        })
                    }
                }
            }
            RuleKind::Transform { transformer } => Ok(RuleOutcome {
                transform: transformer.apply(ctx, graph)?,
                partitions: None,
            }),
            RuleKind::Partition { partitioner } => {
                let partitions = partitioner.partition(ctx, &graph, &[])?;

                Ok(RuleOutcome {
                    transform: Transform::identity(graph),
                    partitions: Some(partitions),
                })
            }
        }
    }
}

impl<N, S> Rule<N, S> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phase(&self) -> PlanPhase {
        self.phase
    }
}

impl<N, S> fmt::Debug for Rule<N, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            RuleKind::Assert { .. } => "assert",
            RuleKind::Transform { .. } => "transform",
            RuleKind::Partition { .. } => "partition",
        };
        write!(f, "Rule({}, {}, {})", self.name, self.phase, kind)
    }
}

/// Substitute `{Primary}` and `{Secondary}` with the captured elements.
fn interpolate<N: fmt::Debug, S>(
    template: &str,
    graph: &ElementGraph<N, S>,
    found: &Match,
) -> String {
    let render = |capture: Capture| {
        found
            .captured(capture)
            .iter()
            .filter_map(|&id| graph.element(id))
            .map(|element| format!("{element:?}"))
            .collect::<Vec<_>>()
            .join(", ")
    };

    template
        .replace("{Primary}", &render(Capture::Primary))
        .replace("{Secondary}", &render(Capture::Secondary))
}
