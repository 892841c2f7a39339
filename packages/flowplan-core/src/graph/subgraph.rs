//! Read-only sub-graph views
//!
//! A sub-graph is an ordered selection of element and scope ids over a
//! parent graph. It never copies elements and never outlives the ids it
//! holds becoming stale, which is the caller's obligation (partitions are
//! consumed before their parent is mutated).

use rustc_hash::FxHashSet;

use crate::graph::{ElementGraph, ElementId, ScopeId};

/// Ordered view over a parent [`ElementGraph`].
#[derive(Debug, Clone, Default)]
pub struct ElementSubGraph {
    elements: Vec<ElementId>,
    scopes: Vec<ScopeId>,
}

impl ElementSubGraph {
    /// View over `elements` plus every parent scope whose endpoints are both
    /// selected. Element order is preserved first-mention; scopes are in
    /// id order.
    pub fn induced<N, S>(parent: &ElementGraph<N, S>, elements: Vec<ElementId>) -> Self {
        let mut seen: FxHashSet<ElementId> = FxHashSet::default();
        let mut ordered = Vec::with_capacity(elements.len());

        for id in elements {
            if parent.contains(id) && seen.insert(id) {
                ordered.push(id);
            }
        }

        let mut scopes: Vec<ScopeId> = parent
            .scopes()
            .filter(|&s| {
                let (u, v) = parent.scope_endpoints(s).expect("scope endpoints");
                seen.contains(&u) && seen.contains(&v)
            })
            .collect();
        scopes.sort_unstable();

        Self {
            elements: ordered,
            scopes,
        }
    }

    /// The whole parent graph with the bookends masked out.
    pub fn masked_whole<N, S>(parent: &ElementGraph<N, S>) -> Self {
        Self::induced(parent, parent.elements().collect())
    }

    pub fn elements(&self) -> &[ElementId] {
        &self.elements
    }

    pub fn scopes(&self) -> &[ScopeId] {
        &self.scopes
    }

    pub fn contains_element(&self, id: ElementId) -> bool {
        self.elements.contains(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }
}
