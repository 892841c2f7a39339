//! Subgraph isomorphism finder
//!
//! `GraphFinder` runs the VF2 state machine for an expression graph against
//! an element graph, producing `Match` objects: the vertex mapping plus the
//! captured element sets per capture label. Matching is against the induced
//! subgraph: every element-graph edge between two mapped vertices must have
//! a pattern counterpart. Search is depth-first and deterministic; two runs
//! over identical inputs yield the same ordered stream of matches.

mod bipartite;
mod indexed;
mod state;

pub use indexed::{IndexedElementGraph, IndexedMatchGraph};

use rustc_hash::FxHashSet;
use tracing::debug;

use crate::context::PlannerContext;
use crate::errors::{PlannerError, Result};
use crate::expression::{Capture, ExpressionGraph};
use crate::graph::{ElementGraph, ElementId, ScopeId};
use state::State;

/// Per-search inputs: exclusion, requirement and ignore sets, plus the
/// found sets accumulated across successive searches by iterating callers.
#[derive(Debug, Clone, Default)]
pub struct FinderContext {
    excluded: FxHashSet<ElementId>,
    required: FxHashSet<ElementId>,
    ignored: FxHashSet<ElementId>,
    found_elements: FxHashSet<ElementId>,
    found_scopes: FxHashSet<ScopeId>,
}

impl FinderContext {
    pub fn with_excluded(mut self, elements: impl IntoIterator<Item = ElementId>) -> Self {
        self.excluded.extend(elements);
        self
    }

    pub fn with_required(mut self, elements: impl IntoIterator<Item = ElementId>) -> Self {
        self.required.extend(elements);
        self
    }

    pub fn with_ignored(mut self, elements: impl IntoIterator<Item = ElementId>) -> Self {
        self.ignored.extend(elements);
        self
    }

    /// Found elements are excluded from later searches.
    pub fn is_excluded(&self, id: ElementId) -> bool {
        self.excluded.contains(&id) || self.found_elements.contains(&id)
    }

    pub fn is_ignored(&self, id: ElementId) -> bool {
        self.ignored.contains(&id)
    }

    pub fn is_required(&self, id: ElementId) -> bool {
        self.required.contains(&id)
    }

    pub fn required_is_empty(&self) -> bool {
        self.required.is_empty()
    }

    /// Fold a match's vertices and scopes into the found sets.
    pub fn record_found(&mut self, found: &Match) {
        self.found_elements.extend(found.mapped_elements());
        self.found_scopes.extend(found.matched_scopes().iter().copied());
    }

    pub fn found_elements(&self) -> &FxHashSet<ElementId> {
        &self.found_elements
    }

    pub fn found_scopes(&self) -> &FxHashSet<ScopeId> {
        &self.found_scopes
    }
}

/// A found occurrence: total mapping from pattern vertices to element ids,
/// with the captured elements per label in pattern insertion order.
#[derive(Debug, Clone)]
pub struct Match {
    mapping: Vec<(usize, ElementId)>,
    captured: [Vec<ElementId>; 5],
    matched_scopes: Vec<ScopeId>,
}

impl Match {
    /// (pattern index, element id) pairs in pattern-index order.
    pub fn mapping(&self) -> &[(usize, ElementId)] {
        &self.mapping
    }

    /// Captured elements for `capture`, insertion order preserved.
    pub fn captured(&self, capture: Capture) -> &[ElementId] {
        &self.captured[capture as usize]
    }

    /// The single element captured under `capture`; arity violations are
    /// capture errors.
    pub fn single_captured(&self, capture: Capture) -> Result<ElementId> {
        let set = self.captured(capture);

        match set {
            [one] => Ok(*one),
            [] => Err(PlannerError::bad_captures(format!(
                "expected one {capture} capture, found none"
            ))),
            many => Err(PlannerError::bad_captures(format!(
                "expected one {capture} capture, found {}",
                many.len()
            ))),
        }
    }

    /// Every mapped element, in pattern-index order.
    pub fn mapped_elements(&self) -> Vec<ElementId> {
        self.mapping.iter().map(|&(_, id)| id).collect()
    }

    /// Scopes of every matched bundle.
    pub fn matched_scopes(&self) -> &[ScopeId] {
        &self.matched_scopes
    }
}

/// Runs an expression graph against element graphs.
pub struct GraphFinder<'e, N, S> {
    expression: &'e ExpressionGraph<N, S>,
}

impl<'e, N, S> GraphFinder<'e, N, S> {
    pub fn new(expression: &'e ExpressionGraph<N, S>) -> Self {
        Self { expression }
    }

    pub fn expression(&self) -> &ExpressionGraph<N, S> {
        self.expression
    }

    /// First match in search order, if any.
    pub fn find_first(
        &self,
        ctx: &PlannerContext<N, S>,
        graph: &ElementGraph<N, S>,
    ) -> Result<Option<Match>> {
        self.find_first_with(ctx, graph, &FinderContext::default())
    }

    pub fn find_first_with(
        &self,
        ctx: &PlannerContext<N, S>,
        graph: &ElementGraph<N, S>,
        finder: &FinderContext,
    ) -> Result<Option<Match>> {
        let mut matches = self.search(ctx, graph, finder, false)?;
        Ok(matches.pop())
    }

    /// Every match, in deterministic search order. Matches may overlap.
    pub fn find_all_matches(
        &self,
        ctx: &PlannerContext<N, S>,
        graph: &ElementGraph<N, S>,
    ) -> Result<Vec<Match>> {
        self.search(ctx, graph, &FinderContext::default(), true)
    }

    /// Repeated first-match search, folding each match into `finder`'s found
    /// sets so occurrences never share elements. Stops when no match
    /// remains.
    pub fn find_all_on_primary(
        &self,
        ctx: &PlannerContext<N, S>,
        graph: &ElementGraph<N, S>,
        finder: &mut FinderContext,
    ) -> Result<Vec<Match>> {
        let mut found = Vec::new();

        loop {
            match self.find_first_with(ctx, graph, finder)? {
                None => break,
                Some(next) => {
                    finder.record_found(&next);
                    found.push(next);
                }
            }
        }

        Ok(found)
    }

    fn search(
        &self,
        ctx: &PlannerContext<N, S>,
        graph: &ElementGraph<N, S>,
        finder: &FinderContext,
        find_all: bool,
    ) -> Result<Vec<Match>> {
        let order = self
            .expression
            .search_order()
            .unwrap_or(ctx.config().search_order);

        let element_graph = IndexedElementGraph::new(graph, order)?;
        let match_graph = IndexedMatchGraph::new(self.expression);

        if match_graph.is_empty() {
            return Ok(Vec::new());
        }

        let mut state = State::new(ctx, finder, &match_graph, &element_graph);
        let mut matches = Vec::new();

        Self::search_step(&mut state, &match_graph, &element_graph, &mut matches, find_all);

        debug!(matches = matches.len(), find_all, "isomorphism search finished");

        Ok(matches)
    }

    /// Depth-first over candidate pairs; `true` means stop unwinding.
    fn search_step(
        state: &mut State<'_, N, S>,
        match_graph: &IndexedMatchGraph<'_, N, S>,
        element_graph: &IndexedElementGraph<'_, N, S>,
        matches: &mut Vec<Match>,
        find_all: bool,
    ) -> bool {
        if state.is_goal() {
            matches.push(build_match(state, match_graph, element_graph));
            return !find_all;
        }

        if state.is_dead() {
            return false;
        }

        let mut prev = None;

        while let Some((node1, node2)) = state.next_pair(prev) {
            prev = Some((node1, node2));

            if state.is_feasible_pair(node1, node2) {
                state.add_pair(node1, node2);

                if Self::search_step(state, match_graph, element_graph, matches, find_all) {
                    return true;
                }

                state.back_track();
            }
        }

        false
    }
}

fn build_match<N, S>(
    state: &State<'_, N, S>,
    match_graph: &IndexedMatchGraph<'_, N, S>,
    element_graph: &IndexedElementGraph<'_, N, S>,
) -> Match {
    let pairs = state.vertex_mapping();

    let mapping: Vec<(usize, ElementId)> = pairs
        .iter()
        .map(|&(i, j)| (i, element_graph.vertex(j)))
        .collect();

    let mut captured: [Vec<ElementId>; 5] = Default::default();

    for &(i, j) in &pairs {
        let capture = match_graph.expression(i).capture();
        captured[capture as usize].push(element_graph.vertex(j));
    }

    let mut matched_scopes = Vec::new();

    for &(i1, j1) in &pairs {
        for &(i2, j2) in &pairs {
            if i1 != i2 && match_graph.contains_edge(i1, i2) {
                for (scope, _) in element_graph.scopes_between(j1, j2) {
                    matched_scopes.push(scope);
                }
            }
        }
    }

    Match {
        mapping,
        captured,
        matched_scopes,
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::config::PlannerConfig;
    use crate::context::FlowSemantics;
    use crate::expression::{ElementExpression, ScopeExpression};

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

    fn non_blocking() -> Scope {
        Scope { blocking: false }
    }

    fn blocking() -> Scope {
        Scope { blocking: true }
    }

    /// head -> tap -> pipe -> join -> tail, with a second blocking edge
    /// tap -> join.
    fn join_graph() -> (ElementGraph<&'static str, Scope>, Vec<ElementId>) {
        let mut graph = ElementGraph::new();
        let tap = graph.add_element("tap");
        let pipe = graph.add_element("pipe");
        let join = graph.add_element("join");
        graph.add_scope(graph.head(), tap, non_blocking()).unwrap();
        graph.add_scope(tap, pipe, non_blocking()).unwrap();
        graph.add_scope(pipe, join, non_blocking()).unwrap();
        graph.add_scope(tap, join, blocking()).unwrap();
        graph.add_scope(join, graph.tail(), non_blocking()).unwrap();

        (graph, vec![tap, pipe, join])
    }

    fn kind(name: &'static str, capture: Capture) -> ElementExpression<&'static str> {
        ElementExpression::new(name, capture, move |n: &&str| *n == name)
    }

    #[test]
    fn test_find_first_simple_chain() {
        let ctx = context();
        let (graph, ids) = join_graph();

        let mut pattern = ExpressionGraph::new();
        let tap = pattern.add(kind("tap", Capture::Primary));
        let pipe = pattern.add(kind("pipe", Capture::Secondary));
        pattern.arcs(tap, pipe);

        let found = GraphFinder::new(&pattern)
            .find_first(&ctx, &graph)
            .unwrap()
            .expect("match");

        assert_eq!(found.captured(Capture::Primary), &[ids[0]]);
        assert_eq!(found.captured(Capture::Secondary), &[ids[1]]);
    }

    #[test]
    fn test_no_match_when_kind_absent() {
        let ctx = context();
        let (graph, _) = join_graph();

        let mut pattern = ExpressionGraph::new();
        let sink = pattern.add(kind("sink", Capture::Primary));
        let pipe = pattern.add(kind("pipe", Capture::Secondary));
        pattern.arcs(sink, pipe);

        assert!(GraphFinder::new(&pattern)
            .find_first(&ctx, &graph)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_scope_predicate_restricts_edges() {
        let ctx = context();
        let (graph, ids) = join_graph();

        let mut pattern = ExpressionGraph::new();
        let tap = pattern.add(kind("tap", Capture::Primary));
        let join = pattern.add(kind("join", Capture::Secondary));
        pattern.arc(
            tap,
            ScopeExpression::new("blocking", |s: &Scope| s.blocking),
            join,
        );

        let found = GraphFinder::new(&pattern)
            .find_first(&ctx, &graph)
            .unwrap()
            .expect("blocking edge match");

        assert_eq!(found.captured(Capture::Primary), &[ids[0]]);
        assert_eq!(found.captured(Capture::Secondary), &[ids[2]]);
    }

    #[test]
    fn test_wildcard_accepts_any_bundle() {
        let ctx = context();
        let mut graph: ElementGraph<&str, Scope> = ElementGraph::new();
        let a = graph.add_element("a");
        let b = graph.add_element("b");
        graph.add_scope(graph.head(), a, non_blocking()).unwrap();
        graph.add_scope(a, b, non_blocking()).unwrap();
        graph.add_scope(a, b, blocking()).unwrap();
        graph.add_scope(b, graph.tail(), non_blocking()).unwrap();

        let mut pattern = ExpressionGraph::new();
        let pa = pattern.add(kind("a", Capture::Primary));
        let pb = pattern.add(kind("b", Capture::Secondary));
        pattern.arcs(pa, pb);

        assert!(GraphFinder::new(&pattern)
            .find_first(&ctx, &graph)
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_parallel_bundle_requires_perfect_matching() {
        let ctx = context();
        let mut graph: ElementGraph<&str, Scope> = ElementGraph::new();
        let a = graph.add_element("a");
        let b = graph.add_element("b");
        graph.add_scope(graph.head(), a, non_blocking()).unwrap();
        // scopes listed opposite to the pattern's expression order
        graph.add_scope(a, b, non_blocking()).unwrap();
        graph.add_scope(a, b, blocking()).unwrap();
        graph.add_scope(b, graph.tail(), non_blocking()).unwrap();

        let mut pattern = ExpressionGraph::new();
        let pa = pattern.add(kind("a", Capture::Primary));
        let pb = pattern.add(kind("b", Capture::Secondary));
        pattern.arc(
            pa,
            ScopeExpression::new("blocking", |s: &Scope| s.blocking),
            pb,
        );
        pattern.arc(
            pa,
            ScopeExpression::new("non-blocking", |s: &Scope| !s.blocking),
            pb,
        );

        assert!(GraphFinder::new(&pattern)
            .find_first(&ctx, &graph)
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_parallel_bundle_cardinality_must_agree() {
        let ctx = context();
        let mut graph: ElementGraph<&str, Scope> = ElementGraph::new();
        let a = graph.add_element("a");
        let b = graph.add_element("b");
        graph.add_scope(graph.head(), a, non_blocking()).unwrap();
        graph.add_scope(a, b, non_blocking()).unwrap();
        graph.add_scope(b, graph.tail(), non_blocking()).unwrap();

        let mut pattern = ExpressionGraph::new();
        let pa = pattern.add(kind("a", Capture::Primary));
        let pb = pattern.add(kind("b", Capture::Secondary));
        pattern.arc(pa, ScopeExpression::new("nb", |s: &Scope| !s.blocking), pb);
        pattern.arc(pa, ScopeExpression::new("nb", |s: &Scope| !s.blocking), pb);

        // two non-wildcard expressions against a single scope
        assert!(GraphFinder::new(&pattern)
            .find_first(&ctx, &graph)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_excluded_elements_never_match() {
        let ctx = context();
        let (graph, ids) = join_graph();

        let mut pattern = ExpressionGraph::new();
        pattern.add(kind("pipe", Capture::Primary));

        let finder = GraphFinder::new(&pattern);
        let excluded = FinderContext::default().with_excluded([ids[1]]);

        assert!(finder
            .find_first_with(&ctx, &graph, &excluded)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_required_constrains_primary() {
        let ctx = context();
        let (graph, ids) = join_graph();

        let mut pattern = ExpressionGraph::new();
        pattern.add(ElementExpression::any(Capture::Primary));

        let finder = GraphFinder::new(&pattern);

        let required = FinderContext::default().with_required([ids[2]]);
        let found = finder
            .find_first_with(&ctx, &graph, &required)
            .unwrap()
            .expect("required match");
        assert_eq!(found.captured(Capture::Primary), &[ids[2]]);
    }

    #[test]
    fn test_find_all_matches_is_ordered_and_deterministic() {
        let ctx = context();
        let (graph, _) = join_graph();

        let build = || {
            let mut pattern = ExpressionGraph::new();
            pattern.add(ElementExpression::any(Capture::Primary));
            pattern
        };

        let first_pattern = build();
        let first: Vec<Vec<ElementId>> = GraphFinder::new(&first_pattern)
            .find_all_matches(&ctx, &graph)
            .unwrap()
            .iter()
            .map(|m| m.mapped_elements())
            .collect();
        let second_pattern = build();
        let second: Vec<Vec<ElementId>> = GraphFinder::new(&second_pattern)
            .find_all_matches(&ctx, &graph.deep_copy())
            .unwrap()
            .iter()
            .map(|m| m.mapped_elements())
            .collect();

        assert_eq!(first.len(), 3);
        assert_eq!(first, second);
    }

    #[test]
    fn test_find_all_on_primary_accumulates_found() {
        let ctx = context();
        let (graph, _) = join_graph();

        let mut pattern = ExpressionGraph::new();
        pattern.add(ElementExpression::any(Capture::Primary));

        let finder = GraphFinder::new(&pattern);
        let mut finder_ctx = FinderContext::default();

        let found = finder
            .find_all_on_primary(&ctx, &graph, &mut finder_ctx)
            .unwrap();

        // each element matched exactly once, then excluded
        assert_eq!(found.len(), 3);
        assert_eq!(finder_ctx.found_elements().len(), 3);
    }

    #[test]
    fn test_single_captured_arity_errors() {
        let ctx = context();
        let (graph, _) = join_graph();

        let mut pattern = ExpressionGraph::new();
        pattern.add(ElementExpression::any(Capture::Primary));

        let found = GraphFinder::new(&pattern)
            .find_first(&ctx, &graph)
            .unwrap()
            .unwrap();

        assert!(found.single_captured(Capture::Primary).is_ok());
        assert!(matches!(
            found.single_captured(Capture::Secondary),
            Err(PlannerError::BadCaptures(_))
        ));
    }

    /// Brute force cross-check on a small graph: enumerate every injective
    /// assignment of pattern vertices to elements and compare existence
    /// against the finder (wildcard chain patterns only). Matching is on the
    /// induced subgraph, so adjacency between assigned elements without a
    /// pattern counterpart invalidates an assignment.
    #[test]
    fn test_completeness_against_brute_force() {
        let ctx = context();
        let (graph, _) = join_graph();
        let elements: Vec<ElementId> = graph.elements().collect();

        let cases: Vec<Vec<&'static str>> = vec![
            vec!["tap", "pipe"],
            vec!["tap", "join"],
            vec!["pipe", "join"],
            vec!["pipe", "tap"],
            vec!["join", "tap"],
            vec!["tap", "pipe", "join"],
        ];

        for kinds in cases {
            let mut pattern = ExpressionGraph::new();
            let handles: Vec<_> = kinds
                .iter()
                .map(|k| pattern.add(kind(k, Capture::Ignore)))
                .collect();
            for pair in handles.windows(2) {
                pattern.arcs(pair[0], pair[1]);
            }

            let brute = brute_force_exists(&graph, &elements, &kinds);
            let found = GraphFinder::new(&pattern)
                .find_first(&ctx, &graph)
                .unwrap()
                .is_some();

            assert_eq!(found, brute, "disagreement on chain {kinds:?}");
        }
    }

    fn brute_force_exists(
        graph: &ElementGraph<&'static str, Scope>,
        elements: &[ElementId],
        kinds: &[&'static str],
    ) -> bool {
        fn assignments(
            graph: &ElementGraph<&'static str, Scope>,
            elements: &[ElementId],
            kinds: &[&'static str],
            chosen: &mut Vec<ElementId>,
        ) -> bool {
            if chosen.len() == kinds.len() {
                let chain_edges_present = chosen
                    .windows(2)
                    .all(|pair| graph.contains_scope_between(pair[0], pair[1]));

                // no adjacency beyond the chain's own arcs
                let induced = chosen.iter().enumerate().all(|(i, &x)| {
                    chosen.iter().enumerate().all(|(j, &y)| {
                        i == j || !graph.contains_scope_between(x, y) || j == i + 1
                    })
                });

                return chain_edges_present && induced;
            }

            for &candidate in elements {
                if chosen.contains(&candidate) {
                    continue;
                }
                if graph.element(candidate) != Some(&kinds[chosen.len()]) {
                    continue;
                }

                chosen.push(candidate);
                if assignments(graph, elements, kinds, chosen) {
                    return true;
                }
                chosen.pop();
            }

            false
        }

        assignments(graph, elements, kinds, &mut Vec::new())
    }
}
