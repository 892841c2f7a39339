//! Error types for flowplan-core
//!
//! One taxonomy for the whole planner. Only `Config` is raised at
//! construction time; everything else surfaces during planning and is
//! annotated with phase and rule by the driver (`Rule` variant).

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::graph::ElementId;

pub type Result<T> = std::result::Result<T, PlannerError>;

/// Planner failure taxonomy.
#[derive(Debug, Error)]
pub enum PlannerError {
    /// An element-graph invariant was violated (dangling edge, unknown
    /// vertex, self-loop, bookend mutation).
    #[error("graph shape violation: {0}")]
    GraphShape(String),

    /// A transformer received a capture set of the wrong arity.
    #[error("bad captures: {0}")]
    BadCaptures(String),

    /// An assert rule matched; carries the interpolated user message.
    #[error("planner assertion: {message}")]
    PlannerAssertion {
        message: String,
        captured: Vec<ElementId>,
    },

    /// The recursive transformer exceeded its iteration cap.
    #[error("recursive transform did not reach a fixed point after {iterations} iterations")]
    PlannerLoop { iterations: u64 },

    /// Driver-level wall-time ceiling exceeded.
    #[error("planning exceeded the wall clock limit: {elapsed:?} > {limit:?}")]
    PlannerTimeout { elapsed: Duration, limit: Duration },

    /// Configuration options are inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    /// Trace output could not be written.
    #[error("trace io error: {0}")]
    Trace(#[from] std::io::Error),

    /// A rule failed; added by the driver so a failure names its phase and
    /// rule and, when tracing is on, the graph snapshot written for it.
    #[error("rule '{rule}' failed in phase {phase}: {source}")]
    Rule {
        phase: String,
        rule: String,
        snapshot: Option<PathBuf>,
        #[source]
        source: Box<PlannerError>,
    },
}

impl PlannerError {
    pub fn graph_shape(msg: impl Into<String>) -> Self {
        PlannerError::GraphShape(msg.into())
    }

    pub fn bad_captures(msg: impl Into<String>) -> Self {
        PlannerError::BadCaptures(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        PlannerError::Config(msg.into())
    }

    /// True when the underlying failure is an assertion, through any number
    /// of driver annotations.
    pub fn is_assertion(&self) -> bool {
        match self {
            PlannerError::PlannerAssertion { .. } => true,
            PlannerError::Rule { source, .. } => source.is_assertion(),
            _ => false,
        }
    }
}
