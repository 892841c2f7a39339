//! Graph transformers
//!
//! One tagged variant per transform, interpreted by a single dispatch:
//! the three mutating transforms (remove, replace, insert) apply one match
//! to the graph in place; contract rewrites the graph to its contraction;
//! sub-graph matches against a contraction and projects the result back;
//! recursive re-applies any transform until it stops changing the graph or
//! the configured iteration cap trips.
//!
//! `apply` consumes the working graph and returns a `Transform` record:
//! the end graph, whether it changed, the matches that drove the change,
//! and summaries of any internally produced child transforms.

mod contracted;

pub use contracted::ContractedGraph;

use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::context::PlannerContext;
use crate::errors::{PlannerError, Result};
use crate::expression::{Capture, ExpressionGraph};
use crate::finder::{FinderContext, GraphFinder, Match};
use crate::graph::{ElementGraph, ElementSubGraph};

/// Result record of one transform application.
#[derive(Debug)]
pub struct Transform<N, S> {
    name: &'static str,
    end_graph: ElementGraph<N, S>,
    changed: bool,
    matches: Vec<Match>,
    children: Vec<ChildTransform>,
    sub_graph: Option<ElementSubGraph>,
}

impl<N, S> Transform<N, S> {
    fn unchanged(name: &'static str, end_graph: ElementGraph<N, S>) -> Self {
        Self {
            name,
            end_graph,
            changed: false,
            matches: Vec::new(),
            children: Vec::new(),
            sub_graph: None,
        }
    }

    /// Record for a caller that inspected the graph without transforming it.
    pub fn identity(end_graph: ElementGraph<N, S>) -> Self {
        Self::unchanged("identity", end_graph)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn end_graph(&self) -> &ElementGraph<N, S> {
        &self.end_graph
    }

    pub fn into_end_graph(self) -> ElementGraph<N, S> {
        self.end_graph
    }

    pub fn changed(&self) -> bool {
        self.changed
    }

    pub fn matches(&self) -> &[Match] {
        &self.matches
    }

    pub fn children(&self) -> &[ChildTransform] {
        &self.children
    }

    /// Sub-graph view produced by the sub-graph transform, when any.
    pub fn sub_graph(&self) -> Option<&ElementSubGraph> {
        self.sub_graph.as_ref()
    }

    fn summary(&self) -> ChildTransform {
        ChildTransform {
            name: self.name,
            changed: self.changed,
            matches: self.matches.clone(),
        }
    }
}

/// Diagnostic summary of a child transform; intermediate graphs are not
/// retained.
#[derive(Debug, Clone)]
pub struct ChildTransform {
    pub name: &'static str,
    pub changed: bool,
    pub matches: Vec<Match>,
}

/// The transform tree. Composition is by value: e.g.
/// `Transformer::recursive(Transformer::remove(expr))`.
pub enum Transformer<N, S> {
    Remove {
        expression: ExpressionGraph<N, S>,
        contraction: Option<ExpressionGraph<N, S>>,
        contracted_match: Option<ExpressionGraph<N, S>>,
    },
    Replace {
        expression: ExpressionGraph<N, S>,
        contraction: Option<ExpressionGraph<N, S>>,
        contracted_match: Option<ExpressionGraph<N, S>>,
    },
    Insert {
        expression: ExpressionGraph<N, S>,
        contraction: Option<ExpressionGraph<N, S>>,
        contracted_match: Option<ExpressionGraph<N, S>>,
        factory: Rc<dyn Fn() -> N>,
    },
    Contract {
        contraction: ExpressionGraph<N, S>,
    },
    SubGraph {
        contraction: ExpressionGraph<N, S>,
        expression: ExpressionGraph<N, S>,
    },
    Recursive {
        inner: Box<Transformer<N, S>>,
    },
}

impl<N, S> Transformer<N, S> {
    pub fn remove(expression: ExpressionGraph<N, S>) -> Self {
        Transformer::Remove {
            expression,
            contraction: None,
            contracted_match: None,
        }
    }

    pub fn replace(expression: ExpressionGraph<N, S>) -> Self {
        Transformer::Replace {
            expression,
            contraction: None,
            contracted_match: None,
        }
    }

    pub fn insert(expression: ExpressionGraph<N, S>, factory: impl Fn() -> N + 'static) -> Self {
        Transformer::Insert {
            expression,
            contraction: None,
            contracted_match: None,
            factory: Rc::new(factory),
        }
    }

    pub fn recursive(inner: Transformer<N, S>) -> Self {
        Transformer::Recursive {
            inner: Box::new(inner),
        }
    }

    /// Match against a contracted view instead of the raw graph. Only
    /// meaningful for the mutating variants.
    pub fn with_contraction(mut self, pattern: ExpressionGraph<N, S>) -> Self {
        match &mut self {
            Transformer::Remove { contraction, .. }
            | Transformer::Replace { contraction, .. }
            | Transformer::Insert { contraction, .. } => *contraction = Some(pattern),
            _ => {}
        }
        self
    }

    /// Scope the mutation to a sub-graph: the contracted-match pattern is
    /// matched against the contraction and projected back onto the original
    /// graph; elements outside the projection are excluded from the
    /// mutation's match. Requires a contraction.
    pub fn with_contracted_match(mut self, pattern: ExpressionGraph<N, S>) -> Self {
        match &mut self {
            Transformer::Remove {
                contracted_match, ..
            }
            | Transformer::Replace {
                contracted_match, ..
            }
            | Transformer::Insert {
                contracted_match, ..
            } => *contracted_match = Some(pattern),
            _ => {}
        }
        self
    }

    pub fn name(&self) -> &'static str {
        match self {
            Transformer::Remove { .. } => "remove",
            Transformer::Replace { .. } => "replace",
            Transformer::Insert { .. } => "insert",
            Transformer::Contract { .. } => "contract",
            Transformer::SubGraph { .. } => "sub-graph",
            Transformer::Recursive { .. } => "recursive",
        }
    }
}

impl<N: Clone, S: Clone> Transformer<N, S> {
    pub fn apply(
        &self,
        ctx: &PlannerContext<N, S>,
        graph: ElementGraph<N, S>,
    ) -> Result<Transform<N, S>> {
        match self {
            Transformer::Remove {
                expression,
                contraction,
                contracted_match,
            }
            | Transformer::Replace {
                expression,
                contraction,
                contracted_match,
            }
            | Transformer::Insert {
                expression,
                contraction,
                contracted_match,
                ..
            } => self.apply_mutation(
                ctx,
                graph,
                expression,
                contraction.as_ref(),
                contracted_match.as_ref(),
            ),
            Transformer::Contract { contraction } => {
                let contracted = ContractedGraph::contract(ctx, &graph, contraction)?;
                let matches = contracted.matches().to_vec();
                let end_graph = contracted.into_graph();
                let changed = !end_graph.structurally_eq(&graph);

                Ok(Transform {
                    name: self.name(),
                    end_graph,
                    changed,
                    matches,
                    children: Vec::new(),
                    sub_graph: None,
                })
            }
            Transformer::SubGraph {
                contraction,
                expression,
            } => {
                let contracted = ContractedGraph::contract(ctx, &graph, contraction)?;
                let found = GraphFinder::new(expression).find_first(ctx, contracted.graph())?;

                match found {
                    None => Ok(Transform::unchanged(self.name(), graph)),
                    Some(found) => {
                        let sub_graph = contracted.project(&graph, &found);

                        Ok(Transform {
                            name: self.name(),
                            end_graph: graph,
                            changed: false,
                            matches: vec![found],
                            children: Vec::new(),
                            sub_graph: Some(sub_graph),
                        })
                    }
                }
            }
            Transformer::Recursive { inner } => self.apply_recursive(ctx, inner, graph),
        }
    }

    /// Single-step mutation: find the first match (optionally on a
    /// contracted view, optionally scoped to a projected sub-graph) and
    /// rewrite the graph through the captures.
    fn apply_mutation(
        &self,
        ctx: &PlannerContext<N, S>,
        mut graph: ElementGraph<N, S>,
        expression: &ExpressionGraph<N, S>,
        contraction: Option<&ExpressionGraph<N, S>>,
        contracted_match: Option<&ExpressionGraph<N, S>>,
    ) -> Result<Transform<N, S>> {
        let finder = GraphFinder::new(expression);

        // contracted view is matched; the original graph is mutated -- ids
        // survive the deep copy inside the contraction
        let found = match (contraction, contracted_match) {
            (None, _) => finder.find_first(ctx, &graph)?,
            (Some(pattern), None) => {
                let contracted = ContractedGraph::contract(ctx, &graph, pattern)?;
                finder.find_first(ctx, contracted.graph())?
            }
            (Some(pattern), Some(contracted_pattern)) => {
                let contracted = ContractedGraph::contract(ctx, &graph, pattern)?;
                let sub_found =
                    GraphFinder::new(contracted_pattern).find_first(ctx, contracted.graph())?;

                match sub_found {
                    None => None,
                    Some(sub_found) => {
                        let sub_graph = contracted.project(&graph, &sub_found);
                        let outside = graph
                            .elements()
                            .filter(|&id| !sub_graph.contains_element(id));
                        let scoped = FinderContext::default().with_excluded(outside);
                        finder.find_first_with(ctx, &graph, &scoped)?
                    }
                }
            }
        };

        let Some(found) = found else {
            return Ok(Transform::unchanged(self.name(), graph));
        };

        match self {
            Transformer::Remove { .. } => {
                let primaries = found.captured(Capture::Primary);

                if primaries.is_empty() {
                    return Err(PlannerError::bad_captures(
                        "remove transform expects at least one Primary capture",
                    ));
                }

                for &id in primaries {
                    graph.remove_and_contract(id, ctx.semantics())?;
                }
            }
            Transformer::Replace { .. } => {
                let primary = found.single_captured(Capture::Primary)?;
                let secondary = found.single_captured(Capture::Secondary)?;

                graph.replace_element_with(primary, secondary)?;
            }
            Transformer::Insert { factory, .. } => {
                let primary = found.single_captured(Capture::Primary)?;

                graph.insert_element_after(primary, factory(), ctx.semantics())?;
            }
            _ => unreachable!("mutation dispatch"),
        }

        debug!(transform = self.name(), "applied mutation");

        Ok(Transform {
            name: self.name(),
            end_graph: graph,
            changed: true,
            matches: vec![found],
            children: Vec::new(),
            sub_graph: None,
        })
    }

    /// Re-apply `inner` until it stops changing the graph, also comparing
    /// structure so an in-place rewrite that reuses the container still
    /// terminates the loop. Trips `PlannerLoop` at the configured cap.
    fn apply_recursive(
        &self,
        ctx: &PlannerContext<N, S>,
        inner: &Transformer<N, S>,
        mut graph: ElementGraph<N, S>,
    ) -> Result<Transform<N, S>> {
        let cap = ctx.config().recursive_max_iterations;

        let mut children = Vec::new();
        let mut matches = Vec::new();
        let mut changed = false;
        let mut iterations = 0u64;

        loop {
            if iterations >= cap {
                return Err(PlannerError::PlannerLoop { iterations });
            }
            iterations += 1;

            let before = graph.deep_copy();
            let child = inner.apply(ctx, graph)?;

            let step_changed = child.changed() && !child.end_graph().structurally_eq(&before);

            children.push(child.summary());
            matches.extend(child.matches().iter().cloned());
            graph = child.into_end_graph();

            if !step_changed {
                break;
            }

            changed = true;
        }

        Ok(Transform {
            name: self.name(),
            end_graph: graph,
            changed,
            matches,
            children,
            sub_graph: None,
        })
    }
}

impl<N, S> fmt::Debug for Transformer<N, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Transformer::{}", self.name())
    }
}
