//! Expression graph model
//!
//! A pattern over element graphs: vertices are element expressions
//! (predicate + capture label + optional branching-topology constraint),
//! edges are scope expressions. The distinguished wildcard scope expression
//! matches any bundle of parallel edges between a pair; every other
//! expression participates in exact-cardinality bundle matching.
//!
//! The builder mirrors the arc/arcs construction style of hand-written rule
//! expressions: `add` returns a vertex handle, `arc`/`arcs` wire handles.

use std::fmt;
use std::rc::Rc;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};

use crate::config::SearchOrder;

/// Capture labels, in priority order. Downstream transforms key off
/// Primary/Secondary; Include and Ignore shield elements from contraction;
/// Exclude marks vertices matched but reported under no transform target.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Capture {
    Primary,
    Secondary,
    Include,
    Exclude,
    Ignore,
}

impl Capture {
    pub const ALL: [Capture; 5] = [
        Capture::Primary,
        Capture::Secondary,
        Capture::Include,
        Capture::Exclude,
        Capture::Ignore,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capture::Primary => "Primary",
            Capture::Secondary => "Secondary",
            Capture::Include => "Include",
            Capture::Exclude => "Exclude",
            Capture::Ignore => "Ignore",
        }
    }
}

impl fmt::Display for Capture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Branching-topology constraint, evaluated against the masked in/out edge
/// counts of a candidate element. The labels are opaque to the collaborator;
/// only the planner compares them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Topo {
    /// More than one incoming edge.
    Splice,
    /// More than one outgoing edge.
    Split,
    /// Splices without splitting.
    SpliceOnly,
    /// Splits without splicing.
    SplitOnly,
    /// Exactly one incoming edge.
    LinearIn,
    /// Exactly one outgoing edge.
    LinearOut,
}

impl Topo {
    pub fn admits(&self, in_degree: usize, out_degree: usize) -> bool {
        match self {
            Topo::Splice => in_degree > 1,
            Topo::Split => out_degree > 1,
            Topo::SpliceOnly => in_degree > 1 && out_degree <= 1,
            Topo::SplitOnly => out_degree > 1 && in_degree <= 1,
            Topo::LinearIn => in_degree == 1,
            Topo::LinearOut => out_degree == 1,
        }
    }
}

type ElementPredicate<N> = Rc<dyn Fn(&N) -> bool>;
type ScopePredicate<S> = Rc<dyn Fn(&S) -> bool>;

/// Predicate over flow elements plus a capture label.
pub struct ElementExpression<N> {
    name: String,
    capture: Capture,
    topo: Option<Topo>,
    predicate: ElementPredicate<N>,
}

impl<N> ElementExpression<N> {
    pub fn new(
        name: impl Into<String>,
        capture: Capture,
        predicate: impl Fn(&N) -> bool + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            capture,
            topo: None,
            predicate: Rc::new(predicate),
        }
    }

    /// Matches every element; useful as an anchor vertex.
    pub fn any(capture: Capture) -> Self {
        Self::new("any", capture, |_| true)
    }

    pub fn with_topo(mut self, topo: Topo) -> Self {
        self.topo = Some(topo);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capture(&self) -> Capture {
        self.capture
    }

    pub fn topo(&self) -> Option<Topo> {
        self.topo
    }

    /// Node-predicate consistency: the element must satisfy the kind
    /// predicate and, when present, the topology constraint against the
    /// masked degrees.
    pub fn applies(&self, element: &N, in_degree: usize, out_degree: usize) -> bool {
        if let Some(topo) = self.topo {
            if !topo.admits(in_degree, out_degree) {
                return false;
            }
        }

        (self.predicate)(element)
    }
}

impl<N> Clone for ElementExpression<N> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            capture: self.capture,
            topo: self.topo,
            predicate: Rc::clone(&self.predicate),
        }
    }
}

impl<N> fmt::Debug for ElementExpression<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}", self.name, self.capture)?;
        if let Some(topo) = self.topo {
            write!(f, ", {topo:?}")?;
        }
        write!(f, "]")
    }
}

/// Predicate over scopes. The wildcard applies to all: any bundle of one or
/// more parallel scopes between the endpoints matches, regardless of
/// cardinality.
pub struct ScopeExpression<S> {
    name: String,
    predicate: Option<ScopePredicate<S>>,
}

impl<S> ScopeExpression<S> {
    pub fn new(name: impl Into<String>, predicate: impl Fn(&S) -> bool + 'static) -> Self {
        Self {
            name: name.into(),
            predicate: Some(Rc::new(predicate)),
        }
    }

    pub fn wildcard() -> Self {
        Self {
            name: "*".to_string(),
            predicate: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn applies_to_all(&self) -> bool {
        self.predicate.is_none()
    }

    pub fn applies(&self, scope: &S) -> bool {
        match &self.predicate {
            Some(predicate) => predicate(scope),
            None => true,
        }
    }
}

impl<S> Clone for ScopeExpression<S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            predicate: self.predicate.clone(),
        }
    }
}

impl<S> fmt::Debug for ScopeExpression<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScopeExpression({})", self.name)
    }
}

/// Handle to a vertex of an [`ExpressionGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExprId(NodeIndex);

/// Directed multi-graph of element expressions and scope expressions.
pub struct ExpressionGraph<N, S> {
    graph: DiGraph<ElementExpression<N>, ScopeExpression<S>>,
    search_order: Option<SearchOrder>,
}

impl<N, S> ExpressionGraph<N, S> {
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            search_order: None,
        }
    }

    /// Pin the element-graph search order this pattern prefers, overriding
    /// the configured default.
    pub fn with_search_order(mut self, order: SearchOrder) -> Self {
        self.search_order = Some(order);
        self
    }

    pub fn search_order(&self) -> Option<SearchOrder> {
        self.search_order
    }

    pub fn add(&mut self, expression: ElementExpression<N>) -> ExprId {
        ExprId(self.graph.add_node(expression))
    }

    /// Wire `source -> target` with an explicit scope expression.
    pub fn arc(&mut self, source: ExprId, scope: ScopeExpression<S>, target: ExprId) -> &mut Self {
        self.graph.add_edge(source.0, target.0, scope);
        self
    }

    /// Wire `source -> target` with the wildcard. Calling twice demands two
    /// parallel element-graph edges.
    pub fn arcs(&mut self, source: ExprId, target: ExprId) -> &mut Self {
        self.arc(source, ScopeExpression::wildcard(), target)
    }

    pub fn vertex_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Vertices in insertion order.
    pub fn vertices(&self) -> impl Iterator<Item = ExprId> + '_ {
        self.graph.node_indices().map(ExprId)
    }

    pub fn expression(&self, id: ExprId) -> &ElementExpression<N> {
        &self.graph[id.0]
    }

    /// Vertices carrying `capture`, in insertion order.
    pub fn captures(&self, capture: Capture) -> Vec<ExprId> {
        self.graph
            .node_indices()
            .filter(|&n| self.graph[n].capture() == capture)
            .map(ExprId)
            .collect()
    }

    /// Parallel scope expressions from `source` to `target`, in insertion
    /// order.
    pub fn scope_expressions_between(
        &self,
        source: ExprId,
        target: ExprId,
    ) -> Vec<&ScopeExpression<S>> {
        let mut edges: Vec<_> = self
            .graph
            .edges_connecting(source.0, target.0)
            .map(|e| (e.id(), e.weight()))
            .collect();
        edges.sort_by_key(|(id, _)| *id);
        edges.into_iter().map(|(_, w)| w).collect()
    }

    pub fn successors(&self, id: ExprId) -> Vec<ExprId> {
        self.neighbors(id, Direction::Outgoing)
    }

    pub fn predecessors(&self, id: ExprId) -> Vec<ExprId> {
        self.neighbors(id, Direction::Incoming)
    }

    fn neighbors(&self, id: ExprId, direction: Direction) -> Vec<ExprId> {
        let mut out: Vec<NodeIndex> = self.graph.neighbors_directed(id.0, direction).collect();
        out.sort_unstable();
        out.dedup();
        out.into_iter().map(ExprId).collect()
    }
}

impl<N, S> Default for ExpressionGraph<N, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N, S> Clone for ExpressionGraph<N, S> {
    fn clone(&self) -> Self {
        Self {
            graph: self.graph.clone(),
            search_order: self.search_order,
        }
    }
}

impl<N, S> fmt::Debug for ExpressionGraph<N, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpressionGraph")
            .field("vertices", &self.graph.node_count())
            .field("edges", &self.graph.edge_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_ordering() {
        assert!(Capture::Primary < Capture::Secondary);
        assert!(Capture::Secondary < Capture::Include);
        assert!(Capture::Exclude < Capture::Ignore);
    }

    #[test]
    fn test_topo_admits() {
        assert!(Topo::Split.admits(1, 2));
        assert!(!Topo::Split.admits(2, 1));
        assert!(Topo::Splice.admits(2, 1));
        assert!(Topo::SplitOnly.admits(0, 2));
        assert!(!Topo::SplitOnly.admits(2, 2));
        assert!(Topo::LinearIn.admits(1, 5));
        assert!(!Topo::LinearIn.admits(0, 1));
    }

    #[test]
    fn test_element_expression_applies() {
        let expr: ElementExpression<&str> =
            ElementExpression::new("tap", Capture::Primary, |n: &&str| n.starts_with("tap"))
                .with_topo(Topo::Split);

        assert!(expr.applies(&"tap-1", 0, 2));
        assert!(!expr.applies(&"tap-1", 0, 1)); // topo fails
        assert!(!expr.applies(&"pipe", 0, 2)); // kind fails
    }

    #[test]
    fn test_wildcard_scope_expression() {
        let wild: ScopeExpression<u32> = ScopeExpression::wildcard();
        assert!(wild.applies_to_all());
        assert!(wild.applies(&7));

        let even: ScopeExpression<u32> = ScopeExpression::new("even", |s| s % 2 == 0);
        assert!(!even.applies_to_all());
        assert!(even.applies(&2));
        assert!(!even.applies(&3));
    }

    #[test]
    fn test_parallel_arcs_accumulate() {
        let mut pattern: ExpressionGraph<&str, u32> = ExpressionGraph::new();
        let a = pattern.add(ElementExpression::any(Capture::Primary));
        let b = pattern.add(ElementExpression::any(Capture::Secondary));
        pattern.arcs(a, b).arcs(a, b);

        assert_eq!(pattern.scope_expressions_between(a, b).len(), 2);
        assert_eq!(pattern.successors(a), vec![b]);
    }
}
