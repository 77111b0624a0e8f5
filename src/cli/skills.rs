//! Skills command for pathgate.
//!
//! Recomputes a learner's stage on a skill and reports whether the skill
//! tree below it is mastered.

use serde::{Deserialize, Serialize};

use crate::core::{SkillId, SkillStatistic, UserId};
use crate::pathway::Pathway;
use crate::storage::Store;

/// Options for the skills command.
#[derive(Debug, Clone, Default)]
pub struct SkillsOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
}

/// Output format for the skills command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillsOutput {
    pub success: bool,
    pub skill_id: SkillId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistic: Option<SkillStatistic>,
    /// Whether the skill and all of its descendants are mastered.
    pub tree_finished: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SkillsOutput {
    pub fn failure(skill_id: SkillId, error: impl Into<String>) -> Self {
        Self {
            success: false,
            skill_id,
            statistic: None,
            tree_finished: false,
            error: Some(error.into()),
        }
    }
}

/// The skills command implementation.
pub struct SkillsCommand<'a, S: Store> {
    pathway: &'a Pathway<S>,
}

impl<'a, S: Store> SkillsCommand<'a, S> {
    pub fn new(pathway: &'a Pathway<S>) -> Self {
        Self { pathway }
    }

    /// Run the skills command.
    pub fn run(&self, user_id: UserId, skill_id: SkillId) -> SkillsOutput {
        let statistic = match self.pathway.compute_skill_progression(user_id, skill_id) {
            Ok(statistic) => statistic,
            Err(e) => return SkillsOutput::failure(skill_id, e.to_string()),
        };

        match self.pathway.skills_tree_finished(user_id, skill_id) {
            Ok(tree_finished) => SkillsOutput {
                success: true,
                skill_id,
                statistic: Some(statistic),
                tree_finished,
                error: None,
            },
            Err(e) => SkillsOutput::failure(skill_id, e.to_string()),
        }
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &SkillsOutput, options: &SkillsOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            return serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string());
        }

        let Some(statistic) = output.statistic.as_ref().filter(|_| output.success) else {
            return format!(
                "Skills failed: {}\n",
                output.error.as_deref().unwrap_or("unknown error")
            );
        };

        format!(
            "Skill {}: stage {}, {}% mastered, score {}%{}\n",
            output.skill_id,
            statistic.stage,
            statistic.progress,
            statistic.score,
            if output.tree_finished {
                " (tree finished)"
            } else {
                ""
            }
        )
    }
}
