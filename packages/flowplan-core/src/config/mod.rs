//! Planner configuration
//!
//! Recognized options mirror the planner's external surface:
//! trace output, element-graph search order, the recursive transformer's
//! iteration cap, the edge-matching algorithm, and the optional wall-clock
//! ceiling enforced by the rule driver between rules.
//!
//! `validate()` is the only place a `Config` error is raised; the planner
//! assumes a validated config afterwards.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{PlannerError, Result};

/// Vertex ordering applied to the element graph before matching.
///
/// The indexed order is the matcher's sole source of determinism, so the
/// choice changes which of several equivalent matches is found first, never
/// whether one is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchOrder {
    Topological,
    #[serde(rename = "reverse")]
    ReverseTopological,
    #[serde(rename = "dfs")]
    DepthFirst,
    #[serde(rename = "bfs")]
    BreadthFirst,
}

impl Default for SearchOrder {
    fn default() -> Self {
        SearchOrder::Topological
    }
}

impl SearchOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchOrder::Topological => "topological",
            SearchOrder::ReverseTopological => "reverse",
            SearchOrder::DepthFirst => "dfs",
            SearchOrder::BreadthFirst => "bfs",
        }
    }
}

/// Algorithm used to decide edge-bundle compatibility between a set of scope
/// expressions and a set of parallel scopes.
///
/// `Permutation` enumerates orderings and goes factorial in the bundle size;
/// it is retained only for regression comparison against `Bipartite`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeMatching {
    Bipartite,
    Permutation,
}

impl Default for EdgeMatching {
    fn default() -> Self {
        EdgeMatching::Bipartite
    }
}

/// Trace output settings. When enabled, graphs are serialized to DOT under
/// `path` at rule boundaries and on planner failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceConfig {
    pub enabled: bool,
    pub path: Option<PathBuf>,
}

/// Planner-wide configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    pub trace: TraceConfig,
    pub search_order: SearchOrder,
    /// Iteration cap for the recursive transformer.
    pub recursive_max_iterations: u64,
    pub edge_matching: EdgeMatching,
    /// Wall-clock ceiling checked by the rule driver between rules.
    pub plan_timeout: Option<Duration>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            trace: TraceConfig::default(),
            search_order: SearchOrder::default(),
            recursive_max_iterations: 1 << 31,
            edge_matching: EdgeMatching::default(),
            plan_timeout: None,
        }
    }
}

impl PlannerConfig {
    /// Check cross-option consistency.
    pub fn validate(&self) -> Result<()> {
        if self.trace.enabled && self.trace.path.is_none() {
            return Err(PlannerError::config(
                "trace.enabled requires trace.path to be set",
            ));
        }

        if self.recursive_max_iterations == 0 {
            return Err(PlannerError::config(
                "recursive.max-iterations must be at least 1",
            ));
        }

        Ok(())
    }

    pub fn with_search_order(mut self, order: SearchOrder) -> Self {
        self.search_order = order;
        self
    }

    pub fn with_edge_matching(mut self, algorithm: EdgeMatching) -> Self {
        self.edge_matching = algorithm;
        self
    }

    pub fn with_trace(mut self, path: impl Into<PathBuf>) -> Self {
        self.trace = TraceConfig {
            enabled: true,
            path: Some(path.into()),
        };
        self
    }

    pub fn with_plan_timeout(mut self, limit: Duration) -> Self {
        self.plan_timeout = Some(limit);
        self
    }
}
