//! Steps command for pathgate.
//!
//! Lists the resolved step sequence of a training, or the step a learner
//! lands on when entering it.

use serde::{Deserialize, Serialize};

use crate::core::{NavigationMode, TrainingId, UserId};
use crate::engine::{ResolvedStep, StepTarget};
use crate::navigation::Destination;
use crate::pathway::Pathway;
use crate::storage::Store;

/// Options for the steps command.
#[derive(Debug, Clone, Default)]
pub struct StepsOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
    /// Navigation mode; the training's own mode when unset.
    pub mode: Option<NavigationMode>,
    /// Only show the landing step.
    pub first: bool,
}

/// One step in the output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepInfo {
    pub step_id: u64,
    pub typology: String,
    pub entity_id: u64,
    pub mandatory: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_score: Option<u32>,
    /// Step id of the owning course.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_step_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
}

impl StepInfo {
    pub fn from_step(step: &ResolvedStep, destination: Option<&Destination>) -> Self {
        Self {
            step_id: step.id(),
            typology: step.typology().as_str().to_string(),
            entity_id: step.entity_id(),
            mandatory: step.step.mandatory,
            required_score: step.step.required_score,
            course_step_id: step.parent().map(|p| p.step_id),
            destination: destination.map(|d| d.to_string()),
        }
    }

    pub fn from_target(target: &StepTarget) -> Self {
        Self::from_step(&target.step, Some(&target.destination))
    }
}

/// Output format for the steps command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepsOutput {
    pub success: bool,
    pub training_id: TrainingId,
    pub count: usize,
    pub steps: Vec<StepInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepsOutput {
    pub fn success(training_id: TrainingId, steps: Vec<StepInfo>) -> Self {
        Self {
            success: true,
            training_id,
            count: steps.len(),
            steps,
            error: None,
        }
    }

    pub fn failure(training_id: TrainingId, error: impl Into<String>) -> Self {
        Self {
            success: false,
            training_id,
            count: 0,
            steps: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// The steps command implementation.
pub struct StepsCommand<'a, S: Store> {
    pathway: &'a Pathway<S>,
}

impl<'a, S: Store> StepsCommand<'a, S> {
    pub fn new(pathway: &'a Pathway<S>) -> Self {
        Self { pathway }
    }

    /// Run the steps command.
    pub fn run(
        &self,
        training_id: TrainingId,
        user_id: UserId,
        options: &StepsOptions,
    ) -> StepsOutput {
        if options.first {
            return match self.pathway.first_step(training_id, user_id) {
                Ok(target) => {
                    StepsOutput::success(training_id, vec![StepInfo::from_target(&target)])
                }
                Err(e) => StepsOutput::failure(training_id, e.to_string()),
            };
        }

        match self
            .pathway
            .resolve_steps(training_id, user_id, options.mode)
        {
            Ok(steps) => StepsOutput::success(
                training_id,
                steps.iter().map(|s| StepInfo::from_step(s, None)).collect(),
            ),
            Err(e) => StepsOutput::failure(training_id, e.to_string()),
        }
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &StepsOutput, options: &StepsOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string())
        } else {
            self.format_human_readable(output)
        }
    }

    fn format_human_readable(&self, output: &StepsOutput) -> String {
        if !output.success {
            return format!(
                "Steps failed: {}\n",
                output.error.as_deref().unwrap_or("unknown error")
            );
        }

        let mut lines = Vec::new();
        for (i, step) in output.steps.iter().enumerate() {
            let indent = if step.course_step_id.is_some() { "   " } else { "" };
            let mut line = format!(
                "{}{}. [{}] step {} ({} {})",
                indent,
                i + 1,
                if step.mandatory { "mandatory" } else { "optional" },
                step.step_id,
                step.typology,
                step.entity_id
            );
            if let Some(required) = step.required_score {
                line.push_str(&format!(" requires {}%", required));
            }
            if let Some(destination) = &step.destination {
                line.push_str(&format!(" -> {}", destination));
            }
            lines.push(line);
        }
        lines.push(String::new());
        lines.join("\n")
    }
}
