//! CLI commands for pathgate.
//!
//! - **Navigation**: steps (and the landing step), next
//! - **Attempts**: start, restart, discard
//! - **Scores**: progress (training or module), skills

// Navigation
pub mod next;
pub mod steps;

// Attempts
pub mod attempt;

// Scores
pub mod progress;
pub mod skills;

pub use attempt::{AttemptAction, AttemptCommand, AttemptOptions, AttemptOutput};
pub use next::{NextCommand, NextOptions, NextOutcome, NextOutput};
pub use progress::{ProgressCommand, ProgressOptions, ProgressOutput};
pub use skills::{SkillsCommand, SkillsOptions, SkillsOutput};
pub use steps::{StepInfo, StepsCommand, StepsOptions, StepsOutput};
