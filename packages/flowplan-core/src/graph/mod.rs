//! Element graph model
//!
//! Directed multi-graph of opaque flow elements with typed edges (scopes).
//! The graph owns every vertex and edge in a single `StableDiGraph`
//! container; all other planner components hold only `ElementId`/`ScopeId`
//! indices into it. Stable indices survive `deep_copy`, so ids recorded by a
//! match remain valid in the copy a rule mutates.
//!
//! Two synthetic bookends, `head` and `tail`, dominate the sources and
//! post-dominate the sinks. They exist from construction, are excluded from
//! element iteration on the masked view, and are never valid targets of the
//! mutation operations.

mod subgraph;

pub use subgraph::ElementSubGraph;

use std::fmt;

use petgraph::algo::toposort;
use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::stable_graph::StableDiGraph;
use petgraph::visit::{Bfs, Dfs, EdgeRef};
use petgraph::Direction;
use rustc_hash::FxHashSet;
use tracing::debug;

use crate::config::SearchOrder;
use crate::context::FlowSemantics;
use crate::errors::{PlannerError, Result};

/// Identity of a flow element within its owning graph. Stable across
/// mutation of other vertices and across `deep_copy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(NodeIndex);

impl ElementId {
    /// Dense numeric form, for diagnostics only.
    pub fn index(&self) -> usize {
        self.0.index()
    }
}

/// Identity of a scope (edge) within its owning graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(EdgeIndex);

impl ScopeId {
    pub fn index(&self) -> usize {
        self.0.index()
    }
}

/// Internal vertex payload: the two synthetic bookends or a user element.
#[derive(Debug, Clone)]
enum GraphNode<N> {
    Head,
    Tail,
    Element(N),
}

impl<N> GraphNode<N> {
    fn element(&self) -> Option<&N> {
        match self {
            GraphNode::Element(n) => Some(n),
            _ => None,
        }
    }

    fn is_bookend(&self) -> bool {
        !matches!(self, GraphNode::Element(_))
    }
}

/// Record of one predecessor/successor pair short-circuited by
/// [`ElementGraph::remove_and_contract`]. The removed edge ids are reported
/// so callers tracking per-edge state (contraction provenance) can migrate
/// it onto the installed edge.
#[derive(Debug, Clone, Copy)]
pub struct Contraction {
    pub removed: ElementId,
    pub source: ElementId,
    pub target: ElementId,
    /// The former `source -> removed` edge.
    pub incoming: ScopeId,
    /// The former `removed -> target` edge.
    pub outgoing: ScopeId,
    /// The installed `source -> target` edge carrying the composed scope.
    pub installed: ScopeId,
}

/// Directed multi-graph of flow elements and scopes.
pub struct ElementGraph<N, S> {
    graph: StableDiGraph<GraphNode<N>, S>,
    head: NodeIndex,
    tail: NodeIndex,
}

impl<N, S> ElementGraph<N, S> {
    pub fn new() -> Self {
        let mut graph = StableDiGraph::default();
        let head = graph.add_node(GraphNode::Head);
        let tail = graph.add_node(GraphNode::Tail);

        Self { graph, head, tail }
    }

    pub fn head(&self) -> ElementId {
        ElementId(self.head)
    }

    pub fn tail(&self) -> ElementId {
        ElementId(self.tail)
    }

    pub fn is_bookend(&self, id: ElementId) -> bool {
        id.0 == self.head || id.0 == self.tail
    }

    pub fn contains(&self, id: ElementId) -> bool {
        self.graph.node_weight(id.0).is_some()
    }

    /// The user element behind `id`; `None` for bookends and removed ids.
    pub fn element(&self, id: ElementId) -> Option<&N> {
        self.graph.node_weight(id.0).and_then(GraphNode::element)
    }

    pub fn scope(&self, id: ScopeId) -> Option<&S> {
        self.graph.edge_weight(id.0)
    }

    pub fn scope_endpoints(&self, id: ScopeId) -> Option<(ElementId, ElementId)> {
        self.graph
            .edge_endpoints(id.0)
            .map(|(u, v)| (ElementId(u), ElementId(v)))
    }

    /// Number of user elements (bookends excluded).
    pub fn element_count(&self) -> usize {
        self.graph.node_count() - 2
    }

    pub fn scope_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// All vertices including bookends, in id order.
    pub fn vertices(&self) -> impl Iterator<Item = ElementId> + '_ {
        self.graph.node_indices().map(ElementId)
    }

    /// User elements only, in id order.
    pub fn elements(&self) -> impl Iterator<Item = ElementId> + '_ {
        let head = self.head;
        let tail = self.tail;
        self.graph
            .node_indices()
            .filter(move |&n| n != head && n != tail)
            .map(ElementId)
    }

    /// All scopes, in id order.
    pub fn scopes(&self) -> impl Iterator<Item = ScopeId> + '_ {
        self.graph.edge_indices().map(ScopeId)
    }

    /// Every vertex is distinct; calling twice with equal values creates two
    /// vertices.
    pub fn add_element(&mut self, element: N) -> ElementId {
        ElementId(self.graph.add_node(GraphNode::Element(element)))
    }

    /// Insert a scope edge. Parallel edges between the same ordered pair are
    /// permitted and significant.
    pub fn add_scope(&mut self, source: ElementId, target: ElementId, scope: S) -> Result<ScopeId> {
        if !self.contains(source) || !self.contains(target) {
            return Err(PlannerError::graph_shape(format!(
                "edge endpoints must be present: {:?} -> {:?}",
                source, target
            )));
        }

        if source == target {
            return Err(PlannerError::graph_shape(format!(
                "self loops are not permitted: {:?}",
                source
            )));
        }

        Ok(ScopeId(self.graph.add_edge(source.0, target.0, scope)))
    }

    /// Distinct successor ids, ascending.
    pub fn successors(&self, id: ElementId) -> Vec<ElementId> {
        self.neighbors(id, Direction::Outgoing)
    }

    /// Distinct predecessor ids, ascending.
    pub fn predecessors(&self, id: ElementId) -> Vec<ElementId> {
        self.neighbors(id, Direction::Incoming)
    }

    fn neighbors(&self, id: ElementId, direction: Direction) -> Vec<ElementId> {
        let mut out: Vec<ElementId> = self
            .graph
            .neighbors_directed(id.0, direction)
            .map(ElementId)
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Parallel scopes from `source` to `target`, in edge-id (insertion)
    /// order.
    pub fn scopes_between(&self, source: ElementId, target: ElementId) -> Vec<ScopeId> {
        let mut out: Vec<ScopeId> = self
            .graph
            .edges_connecting(source.0, target.0)
            .map(|e| ScopeId(e.id()))
            .collect();
        out.sort_unstable();
        out
    }

    pub fn contains_scope_between(&self, source: ElementId, target: ElementId) -> bool {
        self.graph
            .edges_connecting(source.0, target.0)
            .next()
            .is_some()
    }

    /// Outgoing (scope, target) pairs in edge-id order.
    pub fn out_scopes(&self, id: ElementId) -> Vec<(ScopeId, ElementId)> {
        let mut out: Vec<(ScopeId, ElementId)> = self
            .graph
            .edges_directed(id.0, Direction::Outgoing)
            .map(|e| (ScopeId(e.id()), ElementId(e.target())))
            .collect();
        out.sort_unstable();
        out
    }

    /// Incoming (scope, source) pairs in edge-id order.
    pub fn in_scopes(&self, id: ElementId) -> Vec<(ScopeId, ElementId)> {
        let mut out: Vec<(ScopeId, ElementId)> = self
            .graph
            .edges_directed(id.0, Direction::Incoming)
            .map(|e| (ScopeId(e.id()), ElementId(e.source())))
            .collect();
        out.sort_unstable();
        out
    }

    /// Incident edge counts against non-bookend neighbours; parallel edges
    /// count individually. This is the degree the topology expressions see.
    pub fn masked_degrees(&self, id: ElementId) -> (usize, usize) {
        let in_degree = self
            .graph
            .edges_directed(id.0, Direction::Incoming)
            .filter(|e| !self.graph[e.source()].is_bookend())
            .count();
        let out_degree = self
            .graph
            .edges_directed(id.0, Direction::Outgoing)
            .filter(|e| !self.graph[e.target()].is_bookend())
            .count();

        (in_degree, out_degree)
    }

    fn require_element(&self, id: ElementId, op: &str) -> Result<()> {
        if !self.contains(id) {
            return Err(PlannerError::graph_shape(format!(
                "{op}: unknown vertex {id:?}"
            )));
        }

        if self.is_bookend(id) {
            return Err(PlannerError::graph_shape(format!(
                "{op}: bookends cannot be mutated"
            )));
        }

        Ok(())
    }

    /// Remove `id`, short-circuiting every (predecessor, successor) pair
    /// with an edge carrying the pairwise composition of the predecessor and
    /// successor scopes. Composition is delegated to the collaborator and
    /// must be associative across successive contractions.
    pub fn remove_and_contract(
        &mut self,
        id: ElementId,
        semantics: &dyn FlowSemantics<N, S>,
    ) -> Result<Vec<Contraction>> {
        self.require_element(id, "remove_and_contract")?;

        let incoming = self.in_scopes(id);
        let outgoing = self.out_scopes(id);

        let mut contractions = Vec::with_capacity(incoming.len() * outgoing.len());

        for &(in_scope, source) in &incoming {
            for &(out_scope, target) in &outgoing {
                if source == target {
                    // would re-introduce a self loop; drop the pair
                    continue;
                }

                let composed = semantics.compose_scopes(
                    self.graph.edge_weight(in_scope.0).expect("incoming scope"),
                    self.graph.edge_weight(out_scope.0).expect("outgoing scope"),
                );
                let installed = ScopeId(self.graph.add_edge(source.0, target.0, composed));

                contractions.push(Contraction {
                    removed: id,
                    source,
                    target,
                    incoming: in_scope,
                    outgoing: out_scope,
                    installed,
                });
            }
        }

        self.graph.remove_node(id.0);
        debug!(removed = id.index(), pairs = contractions.len(), "contracted vertex");

        Ok(contractions)
    }

    /// Rewire every incoming and outgoing edge of `old` to terminate at
    /// `new`, preserving scope values and their relative order, then remove
    /// `old`. Edges that would become self loops (edges between `old` and
    /// `new`) are dropped.
    pub fn replace_element_with(&mut self, old: ElementId, new: ElementId) -> Result<()> {
        self.require_element(old, "replace_element_with")?;
        self.require_element(new, "replace_element_with")?;

        if old == new {
            return Ok(());
        }

        for (scope, source) in self.in_scopes(old) {
            let weight = self.graph.remove_edge(scope.0).expect("incoming edge");

            if source != new {
                self.graph.add_edge(source.0, new.0, weight);
            }
        }

        for (scope, target) in self.out_scopes(old) {
            let weight = self.graph.remove_edge(scope.0).expect("outgoing edge");

            if target != new {
                self.graph.add_edge(new.0, target.0, weight);
            }
        }

        self.graph.remove_node(old.0);

        Ok(())
    }

    /// Insert `element` directly after `prev`: one fresh default-scope edge
    /// `prev -> new`, and every former outgoing scope of `prev` moved to
    /// leave from `new`. The collaborator is free to normalise the default
    /// scope afterwards.
    pub fn insert_element_after(
        &mut self,
        prev: ElementId,
        element: N,
        semantics: &dyn FlowSemantics<N, S>,
    ) -> Result<ElementId> {
        self.require_element(prev, "insert_element_after")?;

        let outgoing = self.out_scopes(prev);
        let new = self.add_element(element);

        self.graph
            .add_edge(prev.0, new.0, semantics.default_scope());

        for (scope, target) in outgoing {
            let weight = self.graph.remove_edge(scope.0).expect("outgoing edge");
            self.graph.add_edge(new.0, target.0, weight);
        }

        Ok(new)
    }

    /// Masked vertices in the requested search order. Depth- and
    /// breadth-first walk forward from `head`; vertices unreachable that way
    /// are appended in id order so the listing is always total.
    /// Topological order on a cyclic graph is a shape violation.
    pub fn search_ordered_elements(&self, order: SearchOrder) -> Result<Vec<ElementId>> {
        let ordered: Vec<NodeIndex> = match order {
            SearchOrder::Topological | SearchOrder::ReverseTopological => {
                let mut sorted = toposort(&self.graph, None).map_err(|cycle| {
                    PlannerError::graph_shape(format!(
                        "topological search order requires an acyclic graph; cycle at vertex {}",
                        cycle.node_id().index()
                    ))
                })?;

                if order == SearchOrder::ReverseTopological {
                    sorted.reverse();
                }

                sorted
            }
            SearchOrder::DepthFirst => {
                let mut visited = Vec::with_capacity(self.graph.node_count());
                let mut dfs = Dfs::new(&self.graph, self.head);
                while let Some(n) = dfs.next(&self.graph) {
                    visited.push(n);
                }
                self.append_unvisited(visited)
            }
            SearchOrder::BreadthFirst => {
                let mut visited = Vec::with_capacity(self.graph.node_count());
                let mut bfs = Bfs::new(&self.graph, self.head);
                while let Some(n) = bfs.next(&self.graph) {
                    visited.push(n);
                }
                self.append_unvisited(visited)
            }
        };

        Ok(ordered
            .into_iter()
            .filter(|&n| n != self.head && n != self.tail)
            .map(ElementId)
            .collect())
    }

    fn append_unvisited(&self, mut visited: Vec<NodeIndex>) -> Vec<NodeIndex> {
        let seen: FxHashSet<NodeIndex> = visited.iter().copied().collect();
        visited.extend(self.graph.node_indices().filter(|n| !seen.contains(n)));
        visited
    }

    /// Structure check: no self loops, and every vertex weakly connected to
    /// `head`.
    pub fn validate_shape(&self) -> Result<()> {
        for edge in self.graph.edge_indices() {
            let (u, v) = self.graph.edge_endpoints(edge).expect("edge endpoints");
            if u == v {
                return Err(PlannerError::graph_shape(format!(
                    "self loop at vertex {}",
                    u.index()
                )));
            }
        }

        let mut seen: FxHashSet<NodeIndex> = FxHashSet::default();
        let mut stack = vec![self.head];
        seen.insert(self.head);

        while let Some(n) = stack.pop() {
            for direction in [Direction::Outgoing, Direction::Incoming] {
                for next in self.graph.neighbors_directed(n, direction) {
                    if seen.insert(next) {
                        stack.push(next);
                    }
                }
            }
        }

        for n in self.graph.node_indices() {
            if !seen.contains(&n) {
                return Err(PlannerError::graph_shape(format!(
                    "vertex {} is disconnected from head",
                    n.index()
                )));
            }
        }

        Ok(())
    }

    /// Same vertex-id set and same (source, target) edge multiset. Scope
    /// and element values are opaque and not compared; this is the change
    /// detector the rule driver and the recursive transformer rely on.
    pub fn structurally_eq(&self, other: &Self) -> bool {
        if self.graph.node_count() != other.graph.node_count()
            || self.graph.edge_count() != other.graph.edge_count()
        {
            return false;
        }

        let mut ours: Vec<NodeIndex> = self.graph.node_indices().collect();
        let mut theirs: Vec<NodeIndex> = other.graph.node_indices().collect();
        ours.sort_unstable();
        theirs.sort_unstable();

        if ours != theirs {
            return false;
        }

        let endpoints = |g: &StableDiGraph<GraphNode<N>, S>| {
            let mut pairs: Vec<(NodeIndex, NodeIndex)> = g
                .edge_indices()
                .map(|e| g.edge_endpoints(e).expect("edge endpoints"))
                .collect();
            pairs.sort_unstable();
            pairs
        };

        endpoints(&self.graph) == endpoints(&other.graph)
    }
}

impl<N: Clone, S: Clone> ElementGraph<N, S> {
    /// Deep copy of the structure. `StableDiGraph::clone` preserves node and
    /// edge indices, so every `ElementId`/`ScopeId` minted against `self`
    /// is valid against the copy. Element and scope values are cloned;
    /// callers wanting shared elements instantiate `N` as `Rc<..>`.
    pub fn deep_copy(&self) -> Self {
        Self {
            graph: self.graph.clone(),
            head: self.head,
            tail: self.tail,
        }
    }
}

impl<N, S> Default for ElementGraph<N, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: fmt::Debug, S> fmt::Debug for ElementGraph<N, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("ElementGraph");
        dbg.field("elements", &self.element_count());
        dbg.field("scopes", &self.scope_count());
        dbg.finish()
    }
}
