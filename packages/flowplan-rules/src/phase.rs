//! Plan phases
//!
//! The planner lifecycle as an ordered enum. Rules declare a phase; the
//! driver runs phases in declaration order and, within a phase, rules in
//! registration order.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum PlanPhase {
    PreBalance,
    Balance,
    PreResolveElements,
    ResolveElements,
    PostResolveElements,
    PrePartitionElements,
    PartitionElements,
    PostPartitionElements,
    PartitionSteps,
    PostPartitionSteps,
}

impl PlanPhase {
    pub const ALL: [PlanPhase; 10] = [
        PlanPhase::PreBalance,
        PlanPhase::Balance,
        PlanPhase::PreResolveElements,
        PlanPhase::ResolveElements,
        PlanPhase::PostResolveElements,
        PlanPhase::PrePartitionElements,
        PlanPhase::PartitionElements,
        PlanPhase::PostPartitionElements,
        PlanPhase::PartitionSteps,
        PlanPhase::PostPartitionSteps,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanPhase::PreBalance => "PreBalance",
            PlanPhase::Balance => "Balance",
            PlanPhase::PreResolveElements => "PreResolveElements",
            PlanPhase::ResolveElements => "ResolveElements",
            PlanPhase::PostResolveElements => "PostResolveElements",
            PlanPhase::PrePartitionElements => "PrePartitionElements",
            PlanPhase::PartitionElements => "PartitionElements",
            PlanPhase::PostPartitionElements => "PostPartitionElements",
            PlanPhase::PartitionSteps => "PartitionSteps",
            PlanPhase::PostPartitionSteps => "PostPartitionSteps",
        }
    }
}

impl fmt::Display for PlanPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
