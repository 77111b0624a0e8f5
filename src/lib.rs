//! pathgate - Learning path progression and gating
//!
//! Given a training (an ordered tree of modules, courses, meetings and
//! instructor-led trainings) and a learner's attempt history, pathgate
//! resolves the step sequence, decides whether the learner may advance,
//! computes scores, progress and skill stages, and manages the lifecycle of
//! training attempts.

pub mod cli;
pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod events;
pub mod identity;
pub mod navigation;
pub mod pathway;
pub mod stats;
pub mod storage;

pub use config::Config;
pub use core::{
    Attempt, AttemptStatus, NavigationContext, NavigationMode, Step, Training, Typology,
};
pub use engine::{
    AttemptLifecycleManager, GatingEngine, LearnerView, NextStep, ResolvedStep, StepGraphResolver,
    StepTarget,
};
pub use error::{GateBlock, PathgateError, Remediation, Result};
pub use events::{EventSink, JsonlEventLog, MemoryEventSink, NullEventSink, PathEvent};
pub use identity::{Membership, OpenMembership, Roster};
pub use navigation::{DefaultTargets, Destination, NavigationTargets};
pub use pathway::Pathway;
pub use stats::{ModuleScore, ScoreAggregator, SkillProgression, SkillTracker};
pub use storage::{FileStore, MemoryStore, Store, WriteBatch};

// CLI commands
pub use cli::{AttemptCommand, NextCommand, ProgressCommand, SkillsCommand, StepsCommand};
