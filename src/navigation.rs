//! Navigation targets.
//!
//! The engine never builds URLs. It asks a [`NavigationTargets`]
//! implementation for an opaque [`Destination`] and hands that back to the
//! caller untouched.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::TrainingId;
use crate::engine::ResolvedStep;

/// Opaque reference to where the learner should go next.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Destination(String);

impl Destination {
    /// Wrap an opaque reference.
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    /// The wrapped reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Maps resolved steps to destinations.
pub trait NavigationTargets: Send + Sync {
    /// Destination of a step.
    fn step_target(&self, training_id: TrainingId, step: &ResolvedStep) -> Destination;

    /// The training's canonical landing destination.
    fn landing_target(&self, training_id: TrainingId) -> Destination;
}

/// Colon-separated references: `step:<training>:<typology>:<entity>` and
/// `training:<training>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTargets;

impl NavigationTargets for DefaultTargets {
    fn step_target(&self, training_id: TrainingId, step: &ResolvedStep) -> Destination {
        Destination(format!(
            "step:{}:{}:{}",
            training_id,
            step.typology().as_str(),
            step.entity_id()
        ))
    }

    fn landing_target(&self, training_id: TrainingId) -> Destination {
        Destination(format!("training:{}", training_id))
    }
}
