/*
 * flowplan-core - Rule-driven graph planner core
 *
 * The matching and rewriting machinery a dataflow planner is built from:
 * - graph/      : element multi-graph with bookends and in-place rewrites
 * - expression/ : pattern graphs (predicates + capture labels)
 * - finder/     : VF2 subgraph isomorphism with edge-bundle matching
 * - transform/  : contract / sub-graph / mutate / recursive transforms
 * - partition/  : annotated sub-graph extraction
 *
 * Everything is single-threaded and deterministic: identical inputs yield
 * identical match streams and end graphs. Flow elements and scopes are
 * opaque type parameters; the collaborator supplies predicates and the
 * scope composition used by contraction.
 */

pub mod config;
pub mod context;
pub mod errors;
pub mod expression;
pub mod finder;
pub mod graph;
pub mod partition;
pub mod trace;
pub mod transform;

pub use config::{EdgeMatching, PlannerConfig, SearchOrder, TraceConfig};
pub use context::{FlowSemantics, PlannerContext};
pub use errors::{PlannerError, Result};
pub use expression::{Capture, ElementExpression, ExpressionGraph, ScopeExpression, Topo};
pub use finder::{FinderContext, GraphFinder, Match};
pub use graph::{Contraction, ElementGraph, ElementId, ElementSubGraph, ScopeId};
pub use partition::{
    AnnotatedSubGraph, ElementAnnotation, ExpressionGraphPartitioner, Partitions, SubGraphIterator,
};
pub use trace::TraceWriter;
pub use transform::{ChildTransform, ContractedGraph, Transform, Transformer};
