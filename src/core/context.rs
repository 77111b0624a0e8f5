//! Navigation context passed explicitly through resolver and gating calls.

use serde::{Deserialize, Serialize};

use super::{StepId, TrainingId};

/// Where the learner currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationContext {
    pub training_id: TrainingId,
    pub current_step_id: StepId,
}

impl NavigationContext {
    /// Create a context for a step in a training.
    pub fn new(training_id: TrainingId, current_step_id: StepId) -> Self {
        Self {
            training_id,
            current_step_id,
        }
    }
}
