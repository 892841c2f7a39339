//! Planner context
//!
//! Bundles the validated configuration, the flow-element collaborator and
//! the optional trace writer. One context is built before planning and
//! threaded by reference through every finder, transformer and rule; there
//! is no process-wide state.

use std::cell::RefCell;
use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;

use crate::config::PlannerConfig;
use crate::errors::Result;
use crate::graph::{ElementGraph, ElementId};
use crate::trace::TraceWriter;

/// The collaborator contract over opaque flow elements `N` and scopes `S`.
///
/// `compose_scopes` is required to be associative: contraction composes
/// scopes pairwise and successive contractions must not depend on the order
/// in which vertices were removed.
pub trait FlowSemantics<N, S> {
    /// Combine the scope entering a contracted vertex with the scope leaving
    /// it into the scope of the short-circuiting edge.
    fn compose_scopes(&self, incoming: &S, outgoing: &S) -> S;

    /// A fresh scope for edges the planner introduces itself.
    fn default_scope(&self) -> S;
}

/// Per-plan context handed to every planner component.
pub struct PlannerContext<N, S> {
    config: PlannerConfig,
    semantics: Rc<dyn FlowSemantics<N, S>>,
    trace: Option<RefCell<TraceWriter>>,
}

impl<N, S> PlannerContext<N, S> {
    /// Validates the configuration and opens the trace directory when
    /// tracing is enabled.
    pub fn new(config: PlannerConfig, semantics: Rc<dyn FlowSemantics<N, S>>) -> Result<Self> {
        config.validate()?;

        let trace = match (&config.trace.enabled, &config.trace.path) {
            (true, Some(path)) => Some(RefCell::new(TraceWriter::new(path)?)),
            _ => None,
        };

        Ok(Self {
            config,
            semantics,
            trace,
        })
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn semantics(&self) -> &dyn FlowSemantics<N, S> {
        self.semantics.as_ref()
    }

    pub fn is_tracing(&self) -> bool {
        self.trace.is_some()
    }

    /// Write a DOT snapshot of `graph` if tracing is enabled, returning the
    /// path written. Highlighted elements render filled.
    pub fn trace_graph(
        &self,
        name: &str,
        graph: &ElementGraph<N, S>,
        highlights: &[ElementId],
    ) -> Result<Option<PathBuf>>
    where
        N: fmt::Debug,
        S: fmt::Debug,
    {
        match &self.trace {
            Some(writer) => {
                let path = writer.borrow_mut().write_graph(name, graph, highlights)?;
                Ok(Some(path))
            }
            None => Ok(None),
        }
    }
}
