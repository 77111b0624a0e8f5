//! Next command for pathgate.
//!
//! Asks the gate to let a learner past a step and reports where to go:
//! the next step, the landing page of a completed training, or the step
//! that has to be redone.

use serde::{Deserialize, Serialize};

use crate::core::{AttemptStatus, NavigationContext, StepId, TrainingId, UserId};
use crate::engine::NextStep;
use crate::error::{exit_codes, GateBlock, PathgateError};
use crate::pathway::Pathway;
use crate::storage::Store;

use super::steps::StepInfo;

/// Options for the next command.
#[derive(Debug, Clone, Default)]
pub struct NextOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
}

/// How the request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextOutcome {
    Step,
    Completed,
    Blocked,
    Drift,
    Error,
}

/// Details of a gating refusal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockInfo {
    pub kind: String,
    pub message: String,
    pub remediation_step_id: StepId,
    pub remediation: String,
    /// True when nothing but a grader has to act.
    pub waits_on_grader: bool,
}

impl BlockInfo {
    fn from_block(block: &GateBlock) -> Self {
        Self {
            kind: block.kind().to_string(),
            message: block.to_string(),
            remediation_step_id: block.remediation().step_id,
            remediation: block.remediation().destination.to_string(),
            waits_on_grader: block.clears_by_itself(),
        }
    }
}

/// Output format for the next command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextOutput {
    pub success: bool,
    pub outcome: NextOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<StepInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AttemptStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block: Option<BlockInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub differences: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NextOutput {
    fn empty(success: bool, outcome: NextOutcome) -> Self {
        Self {
            success,
            outcome,
            step: None,
            destination: None,
            status: None,
            score: None,
            block: None,
            differences: Vec::new(),
            error: None,
        }
    }

    pub fn from_next(next: &NextStep) -> Self {
        match next {
            NextStep::Step(target) => Self {
                step: Some(StepInfo::from_target(target)),
                destination: Some(target.destination.to_string()),
                ..Self::empty(true, NextOutcome::Step)
            },
            NextStep::Completed {
                attempt,
                destination,
            } => Self {
                destination: Some(destination.to_string()),
                status: Some(attempt.status),
                score: Some(attempt.score),
                ..Self::empty(true, NextOutcome::Completed)
            },
        }
    }

    pub fn from_error(error: &PathgateError) -> Self {
        match error {
            PathgateError::Blocked(block) => Self {
                destination: Some(block.remediation().destination.to_string()),
                block: Some(BlockInfo::from_block(block)),
                ..Self::empty(false, NextOutcome::Blocked)
            },
            PathgateError::StructuralDrift { differences, .. } => Self {
                differences: differences.clone(),
                error: Some(error.to_string()),
                ..Self::empty(false, NextOutcome::Drift)
            },
            other => Self {
                error: Some(other.to_string()),
                ..Self::empty(false, NextOutcome::Error)
            },
        }
    }

    /// Process exit code for this outcome.
    pub fn exit_code(&self) -> i32 {
        match self.outcome {
            NextOutcome::Step | NextOutcome::Completed => exit_codes::OK,
            NextOutcome::Blocked => exit_codes::BLOCKED,
            NextOutcome::Drift => exit_codes::DRIFT,
            NextOutcome::Error => exit_codes::ERROR,
        }
    }
}

/// The next command implementation.
pub struct NextCommand<'a, S: Store> {
    pathway: &'a Pathway<S>,
}

impl<'a, S: Store> NextCommand<'a, S> {
    pub fn new(pathway: &'a Pathway<S>) -> Self {
        Self { pathway }
    }

    /// Run the next command.
    pub fn run(&self, training_id: TrainingId, step_id: StepId, user_id: UserId) -> NextOutput {
        let context = NavigationContext::new(training_id, step_id);
        match self.pathway.get_next_step(context, user_id) {
            Ok(next) => NextOutput::from_next(&next),
            Err(e) => NextOutput::from_error(&e),
        }
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &NextOutput, options: &NextOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string())
        } else {
            self.format_human_readable(output)
        }
    }

    fn format_human_readable(&self, output: &NextOutput) -> String {
        let destination = output.destination.as_deref().unwrap_or("-");
        match output.outcome {
            NextOutcome::Step => format!(
                "Continue to step {}: {}\n",
                output.step.as_ref().map(|s| s.step_id).unwrap_or_default(),
                destination
            ),
            NextOutcome::Completed => format!(
                "Training completed ({}, score {}%): {}\n",
                match output.status {
                    Some(AttemptStatus::Passed) => "passed",
                    Some(AttemptStatus::Failed) => "failed",
                    _ => "in progress",
                },
                output.score.unwrap_or_default(),
                destination
            ),
            NextOutcome::Blocked => {
                let Some(block) = &output.block else {
                    return "Blocked.\n".to_string();
                };
                let mut text = format!("Blocked: {}\nGo back to: {}\n", block.message, destination);
                if block.waits_on_grader {
                    text.push_str("Waiting for manual grading.\n");
                }
                text
            }
            NextOutcome::Drift => {
                let mut lines = vec![
                    "The training changed since it was completed:".to_string(),
                ];
                lines.extend(output.differences.iter().map(|d| format!("  - {}", d)));
                lines.push("Run `pathgate discard` to drop the stale completion.".to_string());
                lines.push(String::new());
                lines.join("\n")
            }
            NextOutcome::Error => format!(
                "Next failed: {}\n",
                output.error.as_deref().unwrap_or("unknown error")
            ),
        }
    }
}
