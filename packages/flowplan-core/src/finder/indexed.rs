//! Indexed graph views
//!
//! Before matching, both sides are frozen into dense integer indexings with
//! successor/predecessor tables materialised once. The element side is
//! ordered by the configured search order; the expression side by insertion
//! order. Every neighbour iteration in the matcher walks these tables in
//! ascending index order, which is the planner's sole source of
//! determinism.

use rustc_hash::FxHashMap;

use crate::config::SearchOrder;
use crate::errors::Result;
use crate::expression::{ElementExpression, ExpressionGraph, ExprId, ScopeExpression};
use crate::graph::{ElementGraph, ElementId, ScopeId};

/// Dense indexing of a masked element graph.
pub struct IndexedElementGraph<'a, N, S> {
    graph: &'a ElementGraph<N, S>,
    vertices: Vec<ElementId>,
    successors: Vec<Vec<usize>>,
    predecessors: Vec<Vec<usize>>,
}

impl<'a, N, S> IndexedElementGraph<'a, N, S> {
    pub fn new(graph: &'a ElementGraph<N, S>, order: SearchOrder) -> Result<Self> {
        let vertices = graph.search_ordered_elements(order)?;

        let index_of: FxHashMap<ElementId, usize> = vertices
            .iter()
            .enumerate()
            .map(|(i, &id)| (id, i))
            .collect();

        let mut successors = Vec::with_capacity(vertices.len());
        let mut predecessors = Vec::with_capacity(vertices.len());

        for &id in &vertices {
            successors.push(Self::resolve(&index_of, graph.successors(id)));
            predecessors.push(Self::resolve(&index_of, graph.predecessors(id)));
        }

        Ok(Self {
            graph,
            vertices,
            successors,
            predecessors,
        })
    }

    fn resolve(index_of: &FxHashMap<ElementId, usize>, neighbors: Vec<ElementId>) -> Vec<usize> {
        // bookends carry no index and drop out here
        let mut out: Vec<usize> = neighbors
            .into_iter()
            .filter_map(|id| index_of.get(&id).copied())
            .collect();
        out.sort_unstable();
        out
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn graph(&self) -> &'a ElementGraph<N, S> {
        self.graph
    }

    pub fn vertex(&self, index: usize) -> ElementId {
        self.vertices[index]
    }

    pub fn element(&self, index: usize) -> &'a N {
        self.graph
            .element(self.vertices[index])
            .expect("indexed vertex is an element")
    }

    pub fn successors(&self, index: usize) -> &[usize] {
        &self.successors[index]
    }

    pub fn predecessors(&self, index: usize) -> &[usize] {
        &self.predecessors[index]
    }

    pub fn contains_edge(&self, source: usize, target: usize) -> bool {
        self.graph
            .contains_scope_between(self.vertices[source], self.vertices[target])
    }

    /// Parallel scopes of the bundle `source -> target`, in edge-id order.
    pub fn scopes_between(&self, source: usize, target: usize) -> Vec<(ScopeId, &'a S)> {
        self.graph
            .scopes_between(self.vertices[source], self.vertices[target])
            .into_iter()
            .map(|s| (s, self.graph.scope(s).expect("scope weight")))
            .collect()
    }

    /// Masked in/out edge counts for topology constraints.
    pub fn degrees(&self, index: usize) -> (usize, usize) {
        self.graph.masked_degrees(self.vertices[index])
    }
}

/// Dense indexing of an expression graph, insertion order.
pub struct IndexedMatchGraph<'a, N, S> {
    graph: &'a ExpressionGraph<N, S>,
    vertices: Vec<ExprId>,
    successors: Vec<Vec<usize>>,
    predecessors: Vec<Vec<usize>>,
}

impl<'a, N, S> IndexedMatchGraph<'a, N, S> {
    pub fn new(graph: &'a ExpressionGraph<N, S>) -> Self {
        let vertices: Vec<ExprId> = graph.vertices().collect();

        let index_of: FxHashMap<ExprId, usize> = vertices
            .iter()
            .enumerate()
            .map(|(i, &id)| (id, i))
            .collect();

        let resolve = |neighbors: Vec<ExprId>| {
            let mut out: Vec<usize> = neighbors.into_iter().map(|id| index_of[&id]).collect();
            out.sort_unstable();
            out
        };

        let successors = vertices.iter().map(|&id| resolve(graph.successors(id))).collect();
        let predecessors = vertices
            .iter()
            .map(|&id| resolve(graph.predecessors(id)))
            .collect();

        Self {
            graph,
            vertices,
            successors,
            predecessors,
        }
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn expression(&self, index: usize) -> &'a ElementExpression<N> {
        self.graph.expression(self.vertices[index])
    }

    pub fn successors(&self, index: usize) -> &[usize] {
        &self.successors[index]
    }

    pub fn predecessors(&self, index: usize) -> &[usize] {
        &self.predecessors[index]
    }

    pub fn contains_edge(&self, source: usize, target: usize) -> bool {
        !self
            .graph
            .scope_expressions_between(self.vertices[source], self.vertices[target])
            .is_empty()
    }

    pub fn scope_expressions_between(
        &self,
        source: usize,
        target: usize,
    ) -> Vec<&'a ScopeExpression<S>> {
        self.graph
            .scope_expressions_between(self.vertices[source], self.vertices[target])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::{Capture, ElementExpression};

    fn diamond() -> (ElementGraph<&'static str, &'static str>, Vec<ElementId>) {
        // head -> a -> {b, c} -> d -> tail
        let mut graph = ElementGraph::new();
        let a = graph.add_element("a");
        let b = graph.add_element("b");
        let c = graph.add_element("c");
        let d = graph.add_element("d");
        graph.add_scope(graph.head(), a, "h").unwrap();
        graph.add_scope(a, b, "ab").unwrap();
        graph.add_scope(a, c, "ac").unwrap();
        graph.add_scope(b, d, "bd").unwrap();
        graph.add_scope(c, d, "cd").unwrap();
        graph.add_scope(d, graph.tail(), "t").unwrap();

        (graph, vec![a, b, c, d])
    }

    #[test]
    fn test_topological_order_masks_bookends() {
        let (graph, ids) = diamond();
        let indexed = IndexedElementGraph::new(&graph, SearchOrder::Topological).unwrap();

        assert_eq!(indexed.len(), 4);
        assert_eq!(indexed.vertex(0), ids[0]);
        assert_eq!(indexed.vertex(3), ids[3]);
    }

    #[test]
    fn test_reverse_topological_order() {
        let (graph, ids) = diamond();
        let indexed = IndexedElementGraph::new(&graph, SearchOrder::ReverseTopological).unwrap();

        assert_eq!(indexed.vertex(0), ids[3]);
        assert_eq!(indexed.vertex(3), ids[0]);
    }

    #[test]
    fn test_adjacency_tables() {
        let (graph, _) = diamond();
        let indexed = IndexedElementGraph::new(&graph, SearchOrder::Topological).unwrap();

        // a at index 0 splits into b and c
        assert_eq!(indexed.successors(0).len(), 2);
        assert_eq!(indexed.predecessors(0).len(), 0);
        // d joins b and c
        assert_eq!(indexed.predecessors(3).len(), 2);
        assert!(indexed.contains_edge(0, 1));
        assert!(!indexed.contains_edge(1, 0));
    }

    #[test]
    fn test_traversal_orders_are_total() {
        let (graph, _) = diamond();

        for order in [SearchOrder::DepthFirst, SearchOrder::BreadthFirst] {
            let indexed = IndexedElementGraph::new(&graph, order).unwrap();
            assert_eq!(indexed.len(), 4);
        }
    }

    #[test]
    fn test_match_graph_insertion_order() {
        let mut pattern: ExpressionGraph<&str, &str> = ExpressionGraph::new();
        let a = pattern.add(ElementExpression::any(Capture::Primary));
        let b = pattern.add(ElementExpression::any(Capture::Secondary));
        pattern.arcs(a, b);

        let indexed = IndexedMatchGraph::new(&pattern);

        assert_eq!(indexed.len(), 2);
        assert_eq!(indexed.expression(0).capture(), Capture::Primary);
        assert_eq!(indexed.successors(0), &[1]);
        assert_eq!(indexed.predecessors(1), &[0]);
    }
}
