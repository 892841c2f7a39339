//! Property tests over randomly shaped chains: determinism of the match
//! stream, contraction preserving reachability, and deep-copy isolation.

use std::rc::Rc;

use proptest::prelude::*;

use flowplan_core::{
    Capture, ElementExpression, ElementGraph, ElementId, ExpressionGraph, FlowSemantics,
    GraphFinder, PlannerConfig, PlannerContext, SearchOrder,
};

#[derive(Debug, Clone, PartialEq)]
struct Scope(u32);

struct Sum;

impl FlowSemantics<u8, Scope> for Sum {
    fn compose_scopes(&self, incoming: &Scope, outgoing: &Scope) -> Scope {
        Scope(incoming.0 + outgoing.0)
    }

    fn default_scope(&self) -> Scope {
        Scope(0)
    }
}

fn context(order: SearchOrder) -> PlannerContext<u8, Scope> {
    PlannerContext::new(
        PlannerConfig::default().with_search_order(order),
        Rc::new(Sum),
    )
    .unwrap()
}

/// head -> k0 -> k1 -> ... -> tail, with an extra skip edge every third
/// element to vary the shape.
fn build_chain(kinds: &[u8]) -> (ElementGraph<u8, Scope>, Vec<ElementId>) {
    let mut graph = ElementGraph::new();
    let ids: Vec<ElementId> = kinds.iter().map(|&k| graph.add_element(k)).collect();

    graph.add_scope(graph.head(), ids[0], Scope(1)).unwrap();
    for (i, pair) in ids.windows(2).enumerate() {
        graph.add_scope(pair[0], pair[1], Scope(i as u32)).unwrap();
    }
    for i in (0..ids.len().saturating_sub(2)).step_by(3) {
        graph.add_scope(ids[i], ids[i + 2], Scope(100)).unwrap();
    }
    graph
        .add_scope(*ids.last().unwrap(), graph.tail(), Scope(1))
        .unwrap();

    (graph, ids)
}

fn kind_pattern(kind: u8) -> ExpressionGraph<u8, Scope> {
    let mut pattern = ExpressionGraph::new();
    pattern.add(ElementExpression::new("kind", Capture::Primary, move |n: &u8| {
        *n == kind
    }));
    pattern
}

proptest! {
    #[test]
    fn prop_match_stream_is_deterministic(kinds in prop::collection::vec(0u8..3, 1..8)) {
        let (graph, _) = build_chain(&kinds);
        let copy = graph.deep_copy();

        for order in [
            SearchOrder::Topological,
            SearchOrder::ReverseTopological,
            SearchOrder::DepthFirst,
            SearchOrder::BreadthFirst,
        ] {
            let ctx = context(order);
            let pattern = kind_pattern(1);
            let finder = GraphFinder::new(&pattern);

            let first: Vec<Vec<ElementId>> = finder
                .find_all_matches(&ctx, &graph)
                .unwrap()
                .iter()
                .map(|m| m.mapped_elements())
                .collect();
            let second: Vec<Vec<ElementId>> = finder
                .find_all_matches(&ctx, &copy)
                .unwrap()
                .iter()
                .map(|m| m.mapped_elements())
                .collect();

            prop_assert_eq!(first, second);
        }
    }

    #[test]
    fn prop_contraction_preserves_reachability(kinds in prop::collection::vec(0u8..3, 3..9)) {
        let ctx = context(SearchOrder::Topological);
        let (mut graph, ids) = build_chain(&kinds);

        // remove every vertex of kind 1 except the endpoints
        let victims: Vec<ElementId> = ids[1..ids.len() - 1]
            .iter()
            .copied()
            .filter(|&id| graph.element(id) == Some(&1))
            .collect();

        for id in victims {
            graph.remove_and_contract(id, ctx.semantics()).unwrap();
        }

        // the chain endpoints must still be connected through survivors
        let first = ids[0];
        let last = *ids.last().unwrap();
        prop_assert!(reachable(&graph, first, last));
        graph.validate_shape().unwrap();
    }

    #[test]
    fn prop_deep_copy_isolates_mutation(kinds in prop::collection::vec(0u8..3, 2..8)) {
        let ctx = context(SearchOrder::Topological);
        let (graph, ids) = build_chain(&kinds);
        let mut copy = graph.deep_copy();

        copy.remove_and_contract(ids[0], ctx.semantics()).unwrap();

        prop_assert!(graph.contains(ids[0]));
        prop_assert!(!copy.contains(ids[0]));
        prop_assert!(!graph.structurally_eq(&copy));
    }
}

fn reachable(graph: &ElementGraph<u8, Scope>, from: ElementId, to: ElementId) -> bool {
    let mut stack = vec![from];
    let mut seen = vec![from];

    while let Some(next) = stack.pop() {
        if next == to {
            return true;
        }

        for succ in graph.successors(next) {
            if !seen.contains(&succ) {
                seen.push(succ);
                stack.push(succ);
            }
        }
    }

    false
}
