//! Core types for pathgate.
//!
//! The training graph (`model`), per-user state (`attempt`) and the explicit
//! navigation context passed through every resolver and gating call.

pub mod attempt;
pub mod context;
pub mod model;

pub type TrainingId = u64;
pub type StepId = u64;
pub type UserId = u64;
pub type ModuleId = u64;
pub type CourseId = u64;
pub type MeetingId = u64;
pub type IltId = u64;
pub type AttemptId = u64;
pub type ModuleAttemptId = u64;
pub type ActivityId = u64;
pub type AnswerId = u64;
pub type SkillId = u64;

pub use attempt::{
    Answer, Attempt, AttemptStatus, EventResult, ModuleAttempt, NewAttempt, ProgressRecord,
    SkillStatistic, StepFingerprint,
};
pub use context::NavigationContext;
pub use model::{
    Activity, CourseStep, IltStep, KeepResults, MeetingStep, Module, ModuleStep, NavigationMode,
    Position, Skill, SkillTag, Step, StepKind, Training, Typology,
};
