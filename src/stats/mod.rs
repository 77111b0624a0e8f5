//! Scores, progress and skill statistics.
//!
//! `scoring` aggregates module and training scores into the cached
//! [`ProgressRecord`](crate::core::ProgressRecord); `skills` walks skill
//! stages from tagged answers.

pub mod scoring;
pub mod skills;

pub use scoring::{ModuleScore, ScoreAggregator};
pub use skills::{progress_skill, tree_finished, SkillProgression, SkillTracker};
