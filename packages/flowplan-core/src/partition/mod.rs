//! Graph partitioning
//!
//! A partitioner carves annotated sub-graphs out of a parent graph, driven
//! by matches of an expression graph against an optionally contracted view.
//! The parent graph is never modified; partitions are ordered views with
//! per-label captured-element annotations.

use tracing::debug;

use crate::context::PlannerContext;
use crate::errors::Result;
use crate::expression::{Capture, ExpressionGraph};
use crate::finder::{FinderContext, GraphFinder, Match};
use crate::graph::{ElementGraph, ElementId, ElementSubGraph};
use crate::transform::ContractedGraph;

/// (annotation label, capture) pair: elements captured under `capture` are
/// recorded on the partition under `label`.
#[derive(Debug, Clone)]
pub struct ElementAnnotation {
    label: String,
    capture: Capture,
}

impl ElementAnnotation {
    pub fn new(label: impl Into<String>, capture: Capture) -> Self {
        Self {
            label: label.into(),
            capture,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn capture(&self) -> Capture {
        self.capture
    }
}

/// One partition: an ordered sub-graph view plus its annotations.
#[derive(Debug, Clone)]
pub struct AnnotatedSubGraph {
    index: usize,
    sub_graph: ElementSubGraph,
    annotations: Vec<(String, Vec<ElementId>)>,
}

impl AnnotatedSubGraph {
    /// Position in iteration order; the tie-breaker for downstream sorting.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn sub_graph(&self) -> &ElementSubGraph {
        &self.sub_graph
    }

    /// Elements recorded under `label`, insertion order preserved.
    pub fn annotation(&self, label: &str) -> &[ElementId] {
        self.annotations
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, ids)| ids.as_slice())
            .unwrap_or(&[])
    }

    pub fn annotations(&self) -> &[(String, Vec<ElementId>)] {
        &self.annotations
    }
}

/// Ordered collection of partitions over one parent graph.
#[derive(Debug, Clone, Default)]
pub struct Partitions {
    partitions: Vec<AnnotatedSubGraph>,
}

impl Partitions {
    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&AnnotatedSubGraph> {
        self.partitions.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AnnotatedSubGraph> {
        self.partitions.iter()
    }
}

/// Yields (sub-graph, match) pairs until the expression stops matching.
/// Matched elements accumulate in the finder context, so successive
/// occurrences never overlap and iteration always terminates.
pub struct SubGraphIterator<'a, N, S> {
    ctx: &'a PlannerContext<N, S>,
    parent: &'a ElementGraph<N, S>,
    contracted: ContractedGraph<N, S>,
    finder: GraphFinder<'a, N, S>,
    finder_context: FinderContext,
}

impl<'a, N: Clone, S: Clone> SubGraphIterator<'a, N, S> {
    pub fn new(
        ctx: &'a PlannerContext<N, S>,
        parent: &'a ElementGraph<N, S>,
        contraction: Option<&'a ExpressionGraph<N, S>>,
        expression: &'a ExpressionGraph<N, S>,
        excludes: &[ElementId],
    ) -> Result<Self> {
        let contracted = match contraction {
            Some(pattern) => ContractedGraph::contract(ctx, parent, pattern)?,
            None => ContractedGraph::identity(parent),
        };

        Ok(Self {
            ctx,
            parent,
            contracted,
            finder: GraphFinder::new(expression),
            finder_context: FinderContext::default().with_excluded(excludes.iter().copied()),
        })
    }

    /// Matches applied while building the contracted view.
    pub fn contracted_matches(&self) -> &[Match] {
        self.contracted.matches()
    }

    pub fn next_sub_graph(&mut self) -> Result<Option<(ElementSubGraph, Match)>> {
        let found = self
            .finder
            .find_first_with(self.ctx, self.contracted.graph(), &self.finder_context)?;

        match found {
            None => Ok(None),
            Some(found) => {
                self.finder_context.record_found(&found);
                let sub_graph = self.contracted.project(self.parent, &found);
                Ok(Some((sub_graph, found)))
            }
        }
    }
}

/// Partitioner over an optional contraction pattern, an optional match
/// expression and a list of annotations.
///
/// Without a match expression the whole parent graph, masked of its
/// bookends, is the single partition.
pub struct ExpressionGraphPartitioner<N, S> {
    contraction: Option<ExpressionGraph<N, S>>,
    expression: Option<ExpressionGraph<N, S>>,
    annotations: Vec<ElementAnnotation>,
}

impl<N: Clone, S: Clone> ExpressionGraphPartitioner<N, S> {
    pub fn new(
        contraction: Option<ExpressionGraph<N, S>>,
        expression: Option<ExpressionGraph<N, S>>,
        annotations: Vec<ElementAnnotation>,
    ) -> Self {
        Self {
            contraction,
            expression,
            annotations,
        }
    }

    pub fn annotations(&self) -> &[ElementAnnotation] {
        &self.annotations
    }

    pub fn partition(
        &self,
        ctx: &PlannerContext<N, S>,
        parent: &ElementGraph<N, S>,
        excludes: &[ElementId],
    ) -> Result<Partitions> {
        let Some(expression) = &self.expression else {
            return Ok(Partitions {
                partitions: vec![AnnotatedSubGraph {
                    index: 0,
                    sub_graph: ElementSubGraph::masked_whole(parent),
                    annotations: Vec::new(),
                }],
            });
        };

        let mut iterator = SubGraphIterator::new(
            ctx,
            parent,
            self.contraction.as_ref(),
            expression,
            excludes,
        )?;

        let mut partitions = Vec::new();

        while let Some((sub_graph, found)) = iterator.next_sub_graph()? {
            let annotations = self
                .annotations
                .iter()
                .map(|a| (a.label.clone(), found.captured(a.capture).to_vec()))
                .collect();

            partitions.push(AnnotatedSubGraph {
                index: partitions.len(),
                sub_graph,
                annotations,
            });
        }

        debug!(partitions = partitions.len(), "partitioning finished");

        Ok(Partitions { partitions })
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::config::PlannerConfig;
    use crate::context::FlowSemantics;
    use crate::expression::ElementExpression;

    #[derive(Debug, Clone, PartialEq)]
    struct Scope {
        blocking: bool,
    }

    struct Semantics;

    impl FlowSemantics<&'static str, Scope> for Semantics {
        fn compose_scopes(&self, incoming: &Scope, outgoing: &Scope) -> Scope {
            Scope {
                blocking: incoming.blocking || outgoing.blocking,
            }
        }

        fn default_scope(&self) -> Scope {
            Scope { blocking: false }
        }
    }

    fn context() -> PlannerContext<&'static str, Scope> {
        PlannerContext::new(PlannerConfig::default(), Rc::new(Semantics)).unwrap()
    }

    fn nb() -> Scope {
        Scope { blocking: false }
    }

    fn kind(name: &'static str, capture: Capture) -> ElementExpression<&'static str> {
        ElementExpression::new(name, capture, move |n: &&str| *n == name)
    }

    /// head -> tap -> {group-1, group-2} -> tail (group fan-out)
    fn fanout() -> (ElementGraph<&'static str, Scope>, Vec<ElementId>) {
        let mut graph = ElementGraph::new();
        let tap = graph.add_element("tap");
        let g1 = graph.add_element("group-1");
        let g2 = graph.add_element("group-2");
        graph.add_scope(graph.head(), tap, nb()).unwrap();
        graph.add_scope(tap, g1, nb()).unwrap();
        graph.add_scope(tap, g2, nb()).unwrap();
        graph.add_scope(g1, graph.tail(), nb()).unwrap();
        graph.add_scope(g2, graph.tail(), nb()).unwrap();

        (graph, vec![tap, g1, g2])
    }

    #[test]
    fn test_absent_expression_returns_whole_graph() {
        let ctx = context();
        let (graph, ids) = fanout();

        let partitioner: ExpressionGraphPartitioner<&str, Scope> =
            ExpressionGraphPartitioner::new(None, None, Vec::new());

        let partitions = partitioner.partition(&ctx, &graph, &[]).unwrap();

        assert_eq!(partitions.len(), 1);
        let only = partitions.get(0).unwrap();
        assert_eq!(only.sub_graph().len(), ids.len());
        assert!(only.annotations().is_empty());
    }

    #[test]
    fn test_partitions_in_iteration_order_with_annotations() {
        let ctx = context();
        let (graph, ids) = fanout();

        let expression = || {
            let mut expr = ExpressionGraph::new();
            let tap = expr.add(kind("tap", Capture::Secondary));
            let group = expr.add(ElementExpression::new(
                "group",
                Capture::Primary,
                |n: &&str| n.starts_with("group"),
            ));
            expr.arcs(tap, group);
            expr
        };

        let partitioner = ExpressionGraphPartitioner::new(
            None,
            Some(expression()),
            vec![
                ElementAnnotation::new("grouping", Capture::Primary),
                ElementAnnotation::new("source", Capture::Secondary),
            ],
        );

        let partitions = partitioner.partition(&ctx, &graph, &[]).unwrap();

        // tap is consumed by the first occurrence, so only one partition
        assert_eq!(partitions.len(), 1);
        let first = partitions.get(0).unwrap();
        assert_eq!(first.index(), 0);
        assert_eq!(first.annotation("grouping"), &[ids[1]]);
        assert_eq!(first.annotation("source"), &[ids[0]]);
        assert_eq!(first.annotation("absent"), &[] as &[ElementId]);
    }

    #[test]
    fn test_excludes_steer_iteration() {
        let ctx = context();
        let (graph, ids) = fanout();

        let mut expr = ExpressionGraph::new();
        expr.add(ElementExpression::new(
            "group",
            Capture::Primary,
            |n: &&str| n.starts_with("group"),
        ));

        let partitioner = ExpressionGraphPartitioner::new(
            None,
            Some(expr),
            vec![ElementAnnotation::new("grouping", Capture::Primary)],
        );

        let all = partitioner.partition(&ctx, &graph, &[]).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all.get(0).unwrap().annotation("grouping"), &[ids[1]]);
        assert_eq!(all.get(1).unwrap().annotation("grouping"), &[ids[2]]);

        let skipped = partitioner.partition(&ctx, &graph, &[ids[1]]).unwrap();
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped.get(0).unwrap().annotation("grouping"), &[ids[2]]);
    }

    #[test]
    fn test_parent_graph_is_not_modified() {
        let ctx = context();
        let (graph, _) = fanout();
        let before = graph.deep_copy();

        let mut expr = ExpressionGraph::new();
        expr.add(ElementExpression::new(
            "group",
            Capture::Primary,
            |n: &&str| n.starts_with("group"),
        ));

        let partitioner = ExpressionGraphPartitioner::new(None, Some(expr), Vec::new());
        partitioner.partition(&ctx, &graph, &[]).unwrap();

        assert!(graph.structurally_eq(&before));
    }
}
