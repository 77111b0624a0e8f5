//! Progress command for pathgate.
//!
//! Shows a learner's progress and score on a training, or the score of a
//! single module.

use serde::{Deserialize, Serialize};

use crate::core::{ModuleId, TrainingId, UserId};
use crate::pathway::Pathway;
use crate::stats::ModuleScore;
use crate::storage::Store;

/// Options for the progress command.
#[derive(Debug, Clone, Default)]
pub struct ProgressOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
    /// Show this module's score instead of the training's.
    pub module: Option<ModuleId>,
}

/// Output format for the progress command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressOutput {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<ModuleScoreInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Module score for output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleScoreInfo {
    pub module_id: ModuleId,
    pub module_attempt_id: u64,
    pub percent: u32,
    pub points: u32,
    pub max_score: u32,
    pub finished: bool,
}

impl ModuleScoreInfo {
    fn new(module_id: ModuleId, score: &ModuleScore) -> Self {
        Self {
            module_id,
            module_attempt_id: score.module_attempt_id,
            percent: score.percent,
            points: score.points,
            max_score: score.max_score,
            finished: score.finished,
        }
    }
}

impl ProgressOutput {
    fn empty() -> Self {
        Self {
            success: true,
            progress: None,
            score: None,
            module: None,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::empty()
        }
    }
}

/// The progress command implementation.
pub struct ProgressCommand<'a, S: Store> {
    pathway: &'a Pathway<S>,
}

impl<'a, S: Store> ProgressCommand<'a, S> {
    pub fn new(pathway: &'a Pathway<S>) -> Self {
        Self { pathway }
    }

    /// Run the progress command.
    pub fn run(
        &self,
        training_id: TrainingId,
        user_id: UserId,
        options: &ProgressOptions,
    ) -> ProgressOutput {
        if let Some(module_id) = options.module {
            return match self.pathway.get_module_score(user_id, module_id) {
                Ok(score) => ProgressOutput {
                    module: score.map(|s| ModuleScoreInfo::new(module_id, &s)),
                    ..ProgressOutput::empty()
                },
                Err(e) => ProgressOutput::failure(e.to_string()),
            };
        }

        let progress = match self.pathway.get_progress(training_id, user_id) {
            Ok(progress) => progress,
            Err(e) => return ProgressOutput::failure(e.to_string()),
        };
        match self.pathway.get_score(training_id, user_id) {
            Ok(score) => ProgressOutput {
                progress: Some(progress),
                score: Some(score),
                ..ProgressOutput::empty()
            },
            Err(e) => ProgressOutput::failure(e.to_string()),
        }
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &ProgressOutput, options: &ProgressOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            return serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string());
        }

        if !output.success {
            return format!(
                "Progress failed: {}\n",
                output.error.as_deref().unwrap_or("unknown error")
            );
        }

        if options.module.is_some() {
            return match &output.module {
                Some(m) => format!(
                    "Module {}: {}% ({}/{} points){}\n",
                    m.module_id,
                    m.percent,
                    m.points,
                    m.max_score,
                    if m.finished { "" } else { ", in progress" }
                ),
                None => "No attempts on this module.\n".to_string(),
            };
        }

        format!(
            "Progress: {}%\nScore: {}%\n",
            output.progress.unwrap_or_default(),
            output.score.unwrap_or_default()
        )
    }
}
