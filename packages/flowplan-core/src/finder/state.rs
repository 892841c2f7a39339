//! VF2 match state
//!
//! Implementation of the state-space search from:
//!
//! Cordella, L. P., Foggia, P., Sansone, C., & Vento, M. (2004).
//! "A (sub)graph isomorphism algorithm for matching large graphs."
//! IEEE Transactions on Pattern Analysis and Machine Intelligence, 26(10).
//!
//! Adapted to multi-graphs with edge predicates and capture filtering.
//! Field names mirror the paper: `core` holds the partial mapping, `in`/
//! `out` stamp the core length at which a vertex entered a terminal set,
//! and the `t*len` counters size those sets for the lookahead.
//!
//! Where the reference implementation branched by copying the state and
//! sharing the arrays, this one pushes a frame per `add_pair` and restores
//! it in `back_track`; after a backtrack the state is bit-identical to the
//! state before the pair was added.

use tracing::trace;

use crate::config::EdgeMatching;
use crate::context::PlannerContext;
use crate::expression::Capture;
use crate::finder::bipartite::{has_perfect_matching, permutation_has_true_diagonal};
use crate::finder::indexed::{IndexedElementGraph, IndexedMatchGraph};
use crate::finder::FinderContext;

/// Unmapped marker in the core arrays.
pub(crate) const NULL_NODE: usize = usize::MAX;

struct Frame {
    added1: usize,
    core_len: usize,
    t1in_len: usize,
    t1out_len: usize,
    t1both_len: usize,
    t2in_len: usize,
    t2out_len: usize,
    t2both_len: usize,
}

pub(crate) struct State<'a, N, S> {
    ctx: &'a PlannerContext<N, S>,
    finder: &'a FinderContext,
    match_graph: &'a IndexedMatchGraph<'a, N, S>,
    element_graph: &'a IndexedElementGraph<'a, N, S>,

    n1: usize,
    n2: usize,

    core_len: usize,

    t1both_len: usize,
    t2both_len: usize,
    t1in_len: usize,
    t1out_len: usize,
    t2in_len: usize,
    t2out_len: usize,

    core1: Vec<usize>,
    core2: Vec<usize>,
    in1: Vec<usize>,
    in2: Vec<usize>,
    out1: Vec<usize>,
    out2: Vec<usize>,

    /// Optional explicit visit order for pattern vertices, applied when no
    /// terminal constraint narrows the choice.
    order: Option<Vec<usize>>,

    frames: Vec<Frame>,
}

impl<'a, N, S> State<'a, N, S> {
    pub(crate) fn new(
        ctx: &'a PlannerContext<N, S>,
        finder: &'a FinderContext,
        match_graph: &'a IndexedMatchGraph<'a, N, S>,
        element_graph: &'a IndexedElementGraph<'a, N, S>,
    ) -> Self {
        let n1 = match_graph.len();
        let n2 = element_graph.len();

        Self {
            ctx,
            finder,
            match_graph,
            element_graph,
            n1,
            n2,
            core_len: 0,
            t1both_len: 0,
            t2both_len: 0,
            t1in_len: 0,
            t1out_len: 0,
            t2in_len: 0,
            t2out_len: 0,
            core1: vec![NULL_NODE; n1],
            core2: vec![NULL_NODE; n2],
            in1: vec![0; n1],
            in2: vec![0; n2],
            out1: vec![0; n1],
            out2: vec![0; n2],
            order: None,
            frames: Vec::with_capacity(n1),
        }
    }

    pub(crate) fn with_order(mut self, order: Vec<usize>) -> Self {
        self.order = Some(order);
        self
    }

    pub(crate) fn is_goal(&self) -> bool {
        self.core_len == self.n1
    }

    pub(crate) fn is_dead(&self) -> bool {
        self.n1 > self.n2
            || self.t1both_len > self.t2both_len
            || self.t1out_len > self.t2out_len
            || self.t1in_len > self.t2in_len
    }

    /// Mapped (pattern index, element index) pairs in pattern-index order.
    pub(crate) fn vertex_mapping(&self) -> Vec<(usize, usize)> {
        self.core1
            .iter()
            .enumerate()
            .filter(|(_, &j)| j != NULL_NODE)
            .map(|(i, &j)| (i, j))
            .collect()
    }

    /// Candidate selection: the next unmapped pair under the strictest
    /// terminal constraint non-empty on both sides, in indexed order.
    pub(crate) fn next_pair(&self, prev: Option<(usize, usize)>) -> Option<(usize, usize)> {
        let (mut prev_n1, mut prev_n2) = match prev {
            None => (0, 0),
            Some((p1, p2)) => (p1, p2 + 1),
        };

        if self.t1both_len > self.core_len && self.t2both_len > self.core_len {
            while prev_n1 < self.n1
                && (self.core1[prev_n1] != NULL_NODE
                    || self.out1[prev_n1] == 0
                    || self.in1[prev_n1] == 0)
            {
                prev_n1 += 1;
                prev_n2 = 0;
            }
        } else if self.t1out_len > self.core_len && self.t2out_len > self.core_len {
            while prev_n1 < self.n1
                && (self.core1[prev_n1] != NULL_NODE || self.out1[prev_n1] == 0)
            {
                prev_n1 += 1;
                prev_n2 = 0;
            }
        } else if self.t1in_len > self.core_len && self.t2in_len > self.core_len {
            while prev_n1 < self.n1
                && (self.core1[prev_n1] != NULL_NODE || self.in1[prev_n1] == 0)
            {
                prev_n1 += 1;
                prev_n2 = 0;
            }
        } else if prev_n1 == 0 && self.order.is_some() {
            let order = self.order.as_ref().expect("order");
            let mut i = 0;

            while i < self.n1 {
                prev_n1 = order[i];
                if self.core1[prev_n1] == NULL_NODE {
                    break;
                }
                i += 1;
            }

            if i == self.n1 {
                prev_n1 = self.n1;
            }
        } else {
            while prev_n1 < self.n1 && self.core1[prev_n1] != NULL_NODE {
                prev_n1 += 1;
                prev_n2 = 0;
            }
        }

        if self.t1both_len > self.core_len && self.t2both_len > self.core_len {
            while prev_n2 < self.n2
                && (self.core2[prev_n2] != NULL_NODE
                    || self.out2[prev_n2] == 0
                    || self.in2[prev_n2] == 0)
            {
                prev_n2 += 1;
            }
        } else if self.t1out_len > self.core_len && self.t2out_len > self.core_len {
            while prev_n2 < self.n2
                && (self.core2[prev_n2] != NULL_NODE || self.out2[prev_n2] == 0)
            {
                prev_n2 += 1;
            }
        } else if self.t1in_len > self.core_len && self.t2in_len > self.core_len {
            while prev_n2 < self.n2
                && (self.core2[prev_n2] != NULL_NODE || self.in2[prev_n2] == 0)
            {
                prev_n2 += 1;
            }
        } else {
            while prev_n2 < self.n2 && self.core2[prev_n2] != NULL_NODE {
                prev_n2 += 1;
            }
        }

        trace!(prev_n1, prev_n2, "next candidate pair");

        if prev_n1 < self.n1 && prev_n2 < self.n2 {
            Some((prev_n1, prev_n2))
        } else {
            None
        }
    }

    fn are_compatible_nodes(&self, node1: usize, node2: usize) -> bool {
        let expression = self.match_graph.expression(node1);
        let id = self.element_graph.vertex(node2);

        if expression.capture() == Capture::Primary && !self.finder.required_is_empty() {
            return self.finder.is_required(id);
        }

        if self.finder.is_excluded(id) || self.finder.is_ignored(id) {
            return false;
        }

        let (in_degree, out_degree) = self.element_graph.degrees(node2);

        expression.applies(self.element_graph.element(node2), in_degree, out_degree)
    }

    /// Bundle compatibility between the pattern pair `(v1, v2)` and the
    /// element pair `(v3, v4)`: a single wildcard applies to everything;
    /// otherwise equal cardinality and a perfect matching of expressions
    /// onto scopes.
    fn are_compatible_edges(&self, v1: usize, v2: usize, v3: usize, v4: usize) -> bool {
        let matchers = self.match_graph.scope_expressions_between(v1, v2);

        if matchers.len() == 1 && matchers[0].applies_to_all() {
            return true;
        }

        let scopes = self.element_graph.scopes_between(v3, v4);

        if matchers.len() != scopes.len() {
            return false;
        }

        let compat: Vec<Vec<bool>> = matchers
            .iter()
            .map(|matcher| scopes.iter().map(|(_, scope)| matcher.applies(scope)).collect())
            .collect();

        match self.ctx.config().edge_matching {
            EdgeMatching::Bipartite => has_perfect_matching(&compat),
            EdgeMatching::Permutation => permutation_has_true_diagonal(&compat),
        }
    }

    /// Node consistency, the four neighbour passes, and the VF2 lookahead.
    pub(crate) fn is_feasible_pair(&self, node1: usize, node2: usize) -> bool {
        debug_assert!(node1 < self.n1);
        debug_assert!(node2 < self.n2);
        debug_assert_eq!(self.core1[node1], NULL_NODE);
        debug_assert_eq!(self.core2[node2], NULL_NODE);

        if !self.are_compatible_nodes(node1, node2) {
            return false;
        }

        let mut termout1 = 0usize;
        let mut termout2 = 0usize;
        let mut termin1 = 0usize;
        let mut termin2 = 0usize;
        let mut new1 = 0usize;
        let mut new2 = 0usize;

        for &other1 in self.match_graph.successors(node1) {
            if self.core1[other1] != NULL_NODE {
                let other2 = self.core1[other1];
                if !self.element_graph.contains_edge(node2, other2)
                    || !self.are_compatible_edges(node1, other1, node2, other2)
                {
                    return false;
                }
            } else {
                if self.in1[other1] != 0 {
                    termin1 += 1;
                }
                if self.out1[other1] != 0 {
                    termout1 += 1;
                }
                if self.in1[other1] == 0 && self.out1[other1] == 0 {
                    new1 += 1;
                }
            }
        }

        for &other1 in self.match_graph.predecessors(node1) {
            if self.core1[other1] != NULL_NODE {
                let other2 = self.core1[other1];
                if !self.element_graph.contains_edge(other2, node2)
                    || !self.are_compatible_edges(other1, node1, other2, node2)
                {
                    return false;
                }
            } else {
                if self.in1[other1] != 0 {
                    termin1 += 1;
                }
                if self.out1[other1] != 0 {
                    termout1 += 1;
                }
                if self.in1[other1] == 0 && self.out1[other1] == 0 {
                    new1 += 1;
                }
            }
        }

        for &other2 in self.element_graph.successors(node2) {
            if self.core2[other2] != NULL_NODE {
                let other1 = self.core2[other2];
                if !self.match_graph.contains_edge(node1, other1) {
                    return false;
                }
            } else {
                if self.in2[other2] != 0 {
                    termin2 += 1;
                }
                if self.out2[other2] != 0 {
                    termout2 += 1;
                }
                if self.in2[other2] == 0 && self.out2[other2] == 0 {
                    new2 += 1;
                }
            }
        }

        for &other2 in self.element_graph.predecessors(node2) {
            if self.core2[other2] != NULL_NODE {
                let other1 = self.core2[other2];
                if !self.match_graph.contains_edge(other1, node1) {
                    return false;
                }
            } else {
                if self.in2[other2] != 0 {
                    termin2 += 1;
                }
                if self.out2[other2] != 0 {
                    termout2 += 1;
                }
                if self.in2[other2] == 0 && self.out2[other2] == 0 {
                    new2 += 1;
                }
            }
        }

        termin1 <= termin2 && termout1 <= termout2 && new1 <= new2
    }

    /// Extend the core by `(node1, node2)`, stamping the new core length
    /// into every terminal array entry that was untouched.
    pub(crate) fn add_pair(&mut self, node1: usize, node2: usize) {
        debug_assert!(node1 < self.n1);
        debug_assert!(node2 < self.n2);
        debug_assert!(self.core_len < self.n1);
        debug_assert!(self.core_len < self.n2);

        self.frames.push(Frame {
            added1: node1,
            core_len: self.core_len,
            t1in_len: self.t1in_len,
            t1out_len: self.t1out_len,
            t1both_len: self.t1both_len,
            t2in_len: self.t2in_len,
            t2out_len: self.t2out_len,
            t2both_len: self.t2both_len,
        });

        self.core_len += 1;
        let stamp = self.core_len;

        if self.in1[node1] == 0 {
            self.in1[node1] = stamp;
            self.t1in_len += 1;

            if self.out1[node1] != 0 {
                self.t1both_len += 1;
            }
        }
        if self.out1[node1] == 0 {
            self.out1[node1] = stamp;
            self.t1out_len += 1;

            if self.in1[node1] != 0 {
                self.t1both_len += 1;
            }
        }

        if self.in2[node2] == 0 {
            self.in2[node2] = stamp;
            self.t2in_len += 1;

            if self.out2[node2] != 0 {
                self.t2both_len += 1;
            }
        }
        if self.out2[node2] == 0 {
            self.out2[node2] = stamp;
            self.t2out_len += 1;

            if self.in2[node2] != 0 {
                self.t2both_len += 1;
            }
        }

        self.core1[node1] = node2;
        self.core2[node2] = node1;

        for &other in self.match_graph.predecessors(node1) {
            if self.in1[other] == 0 {
                self.in1[other] = stamp;
                self.t1in_len += 1;

                if self.out1[other] != 0 {
                    self.t1both_len += 1;
                }
            }
        }

        for &other in self.match_graph.successors(node1) {
            if self.out1[other] == 0 {
                self.out1[other] = stamp;
                self.t1out_len += 1;

                if self.in1[other] != 0 {
                    self.t1both_len += 1;
                }
            }
        }

        for &other in self.element_graph.predecessors(node2) {
            if self.in2[other] == 0 {
                self.in2[other] = stamp;
                self.t2in_len += 1;

                if self.out2[other] != 0 {
                    self.t2both_len += 1;
                }
            }
        }

        for &other in self.element_graph.successors(node2) {
            if self.out2[other] == 0 {
                self.out2[other] = stamp;
                self.t2out_len += 1;

                if self.in2[other] != 0 {
                    self.t2both_len += 1;
                }
            }
        }
    }

    /// Undo the most recent `add_pair`: clear every entry stamped with the
    /// current core length and restore the saved counters.
    pub(crate) fn back_track(&mut self) {
        let frame = self.frames.pop().expect("back_track without add_pair");
        let stamp = self.core_len;
        let added1 = frame.added1;

        if self.in1[added1] == stamp {
            self.in1[added1] = 0;
        }

        for &other in self.match_graph.predecessors(added1) {
            if self.in1[other] == stamp {
                self.in1[other] = 0;
            }
        }

        if self.out1[added1] == stamp {
            self.out1[added1] = 0;
        }

        for &other in self.match_graph.successors(added1) {
            if self.out1[other] == stamp {
                self.out1[other] = 0;
            }
        }

        let node2 = self.core1[added1];

        if self.in2[node2] == stamp {
            self.in2[node2] = 0;
        }

        for &other in self.element_graph.predecessors(node2) {
            if self.in2[other] == stamp {
                self.in2[other] = 0;
            }
        }

        if self.out2[node2] == stamp {
            self.out2[node2] = 0;
        }

        for &other in self.element_graph.successors(node2) {
            if self.out2[other] == stamp {
                self.out2[other] = 0;
            }
        }

        self.core1[added1] = NULL_NODE;
        self.core2[node2] = NULL_NODE;

        self.core_len = frame.core_len;
        self.t1in_len = frame.t1in_len;
        self.t1out_len = frame.t1out_len;
        self.t1both_len = frame.t1both_len;
        self.t2in_len = frame.t2in_len;
        self.t2out_len = frame.t2out_len;
        self.t2both_len = frame.t2both_len;
    }
}
