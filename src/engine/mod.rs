//! The progression engine.
//!
//! - `resolver`: ordered, access-filtered step sequences
//! - `view`: batch-loaded learner records
//! - `gate`: may the learner move past a step
//! - `lifecycle`: start, restart, completion and drift of attempts

pub mod gate;
pub mod lifecycle;
pub mod resolver;
pub mod view;

use serde::Serialize;

use crate::core::Attempt;
use crate::navigation::Destination;

pub use gate::GatingEngine;
pub use lifecycle::AttemptLifecycleManager;
pub use resolver::{ParentCourse, ResolvedStep, StepGraphResolver};
pub use view::{LearnerView, StepRecord};

/// A step together with where to find it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepTarget {
    pub step: ResolvedStep,
    pub destination: Destination,
}

/// Outcome of advancing past a step.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NextStep {
    /// The learner may continue to this step.
    Step(StepTarget),
    /// The last step was passed and the attempt completed.
    Completed {
        attempt: Attempt,
        destination: Destination,
    },
}

impl NextStep {
    /// Destination the learner should be sent to.
    pub fn destination(&self) -> &Destination {
        match self {
            NextStep::Step(target) => &target.destination,
            NextStep::Completed { destination, .. } => destination,
        }
    }
}
