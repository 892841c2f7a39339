//! Contracted graphs
//!
//! A contracted graph is a deep copy of an element graph with the vertices a
//! contraction pattern designates removed and short-circuited. Every
//! composed edge records the chain of elements it stands for, in path
//! order, so a match found against the contraction can be projected back
//! onto the original graph.
//!
//! Contraction runs to fixed point: matches are taken one at a time in
//! search order; within a match, captured Include and Ignore elements stay,
//! and every other matched element that is not the Primary capture is
//! removed. A match that removes nothing ends the loop.

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::context::PlannerContext;
use crate::errors::Result;
use crate::expression::{Capture, ExpressionGraph};
use crate::finder::{GraphFinder, Match};
use crate::graph::{ElementGraph, ElementId, ElementSubGraph, ScopeId};

pub struct ContractedGraph<N, S> {
    graph: ElementGraph<N, S>,
    provenance: FxHashMap<ScopeId, Vec<ElementId>>,
    matches: Vec<Match>,
}

impl<N: Clone, S: Clone> ContractedGraph<N, S> {
    /// Deep copy without any contraction; the degenerate case used when a
    /// partitioner has no contraction pattern.
    pub fn identity(original: &ElementGraph<N, S>) -> Self {
        Self {
            graph: original.deep_copy(),
            provenance: FxHashMap::default(),
            matches: Vec::new(),
        }
    }

    /// Contract `original` to fixed point under `contraction`.
    pub fn contract(
        ctx: &PlannerContext<N, S>,
        original: &ElementGraph<N, S>,
        contraction: &ExpressionGraph<N, S>,
    ) -> Result<Self> {
        let mut work = original.deep_copy();
        let mut provenance: FxHashMap<ScopeId, Vec<ElementId>> = FxHashMap::default();
        let mut matches = Vec::new();

        let finder = GraphFinder::new(contraction);

        loop {
            let Some(found) = finder.find_first(ctx, &work)? else {
                break;
            };

            let removable = removable_elements(&found);

            if removable.is_empty() {
                break;
            }

            for id in removable {
                let steps = work.remove_and_contract(id, ctx.semantics())?;

                // migrate chains from the replaced edges onto the installed
                // ones before dropping the stale entries
                let mut installed = Vec::with_capacity(steps.len());

                for step in &steps {
                    let mut chain = provenance.get(&step.incoming).cloned().unwrap_or_default();
                    chain.push(step.removed);
                    if let Some(rest) = provenance.get(&step.outgoing) {
                        chain.extend(rest.iter().copied());
                    }
                    installed.push((step.installed, chain));
                }

                for step in &steps {
                    provenance.remove(&step.incoming);
                    provenance.remove(&step.outgoing);
                }

                for (scope, chain) in installed {
                    provenance.insert(scope, chain);
                }
            }

            matches.push(found);
        }

        debug!(
            elements = work.element_count(),
            contracted_matches = matches.len(),
            "contraction reached fixed point"
        );

        Ok(Self {
            graph: work,
            provenance,
            matches,
        })
    }

    pub fn graph(&self) -> &ElementGraph<N, S> {
        &self.graph
    }

    pub fn into_graph(self) -> ElementGraph<N, S> {
        self.graph
    }

    /// Matches consumed while contracting, in application order.
    pub fn matches(&self) -> &[Match] {
        &self.matches
    }

    /// Elements a composed scope stands for, in path order. Empty for edges
    /// carried over unchanged.
    pub fn provenance(&self, scope: ScopeId) -> &[ElementId] {
        self.provenance
            .get(&scope)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Project a match found against this contraction onto `parent`: the
    /// mapped vertices plus every element the matched bundles stand for,
    /// as an induced sub-graph of the parent.
    pub fn project(&self, parent: &ElementGraph<N, S>, found: &Match) -> ElementSubGraph {
        let mut elements = found.mapped_elements();

        for scope in found.matched_scopes() {
            elements.extend_from_slice(self.provenance(*scope));
        }

        ElementSubGraph::induced(parent, elements)
    }
}

/// Matched elements to contract away: everything mapped that is not
/// captured Primary, Include or Ignore.
fn removable_elements(found: &Match) -> Vec<ElementId> {
    let keep = |id: &ElementId| {
        found.captured(Capture::Primary).contains(id)
            || found.captured(Capture::Include).contains(id)
            || found.captured(Capture::Ignore).contains(id)
    };

    found
        .mapped_elements()
        .into_iter()
        .filter(|id| !keep(id))
        .collect()
}
