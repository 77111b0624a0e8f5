//! Attempt commands for pathgate.
//!
//! Start, restart, and discard a stale completion of a training attempt.

use serde::{Deserialize, Serialize};

use crate::core::{Attempt, AttemptStatus, TrainingId, UserId};
use crate::pathway::Pathway;
use crate::storage::Store;

/// What to do with the attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttemptAction {
    /// Start, or return the open attempt.
    #[default]
    Start,
    /// Finalize a completed attempt and start over.
    Restart,
    /// Drop a completion recorded against an older training structure.
    Discard,
}

impl AttemptAction {
    fn verb(&self) -> &'static str {
        match self {
            Self::Start => "Start",
            Self::Restart => "Restart",
            Self::Discard => "Discard",
        }
    }
}

/// Options for the attempt commands.
#[derive(Debug, Clone, Default)]
pub struct AttemptOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
    pub action: AttemptAction,
}

/// Output format for the attempt commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptOutput {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AttemptStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AttemptOutput {
    pub fn success(attempt: &Attempt) -> Self {
        Self {
            success: true,
            attempt_id: Some(attempt.id),
            status: Some(attempt.status),
            started: Some(attempt.started.format("%Y-%m-%d %H:%M:%S UTC").to_string()),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            attempt_id: None,
            status: None,
            started: None,
            error: Some(error.into()),
        }
    }
}

/// The attempt command implementation.
pub struct AttemptCommand<'a, S: Store> {
    pathway: &'a Pathway<S>,
}

impl<'a, S: Store> AttemptCommand<'a, S> {
    pub fn new(pathway: &'a Pathway<S>) -> Self {
        Self { pathway }
    }

    /// Run the attempt command.
    pub fn run(
        &self,
        training_id: TrainingId,
        user_id: UserId,
        options: &AttemptOptions,
    ) -> AttemptOutput {
        let result = match options.action {
            AttemptAction::Start => self.pathway.start_attempt(training_id, user_id),
            AttemptAction::Restart => self.pathway.restart_attempt(training_id, user_id),
            AttemptAction::Discard => self
                .pathway
                .discard_stale_completion(training_id, user_id),
        };

        match result {
            Ok(attempt) => AttemptOutput::success(&attempt),
            Err(e) => AttemptOutput::failure(e.to_string()),
        }
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &AttemptOutput, options: &AttemptOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            return serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string());
        }

        if !output.success {
            return format!(
                "{} failed: {}\n",
                options.action.verb(),
                output.error.as_deref().unwrap_or("unknown error")
            );
        }

        format!(
            "Attempt {} in progress since {}\n",
            output.attempt_id.unwrap_or_default(),
            output.started.as_deref().unwrap_or("-")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::core::{NavigationMode, Step, Training};
    use crate::storage::MemoryStore;

    fn pathway() -> Pathway<MemoryStore> {
        let store = MemoryStore::new();
        store
            .put_training(
                &Training::new(1, 99, NavigationMode::Free).with_step(Step::module(1, 10)),
            )
            .unwrap();
        Pathway::new(store, Config::default())
    }

    fn options(action: AttemptAction) -> AttemptOptions {
        AttemptOptions {
            action,
            ..Default::default()
        }
    }

    #[test]
    fn test_start_twice_same_attempt() {
        let pathway = pathway();
        let cmd = AttemptCommand::new(&pathway);

        let first = cmd.run(1, 5, &options(AttemptAction::Start));
        let second = cmd.run(1, 5, &options(AttemptAction::Start));
        assert!(first.success);
        assert_eq!(first.attempt_id, second.attempt_id);
        assert_eq!(first.status, Some(AttemptStatus::InProgress));
    }

    #[test]
    fn test_restart_in_progress_fails() {
        let pathway = pathway();
        let cmd = AttemptCommand::new(&pathway);
        cmd.run(1, 5, &options(AttemptAction::Start));

        let output = cmd.run(1, 5, &options(AttemptAction::Restart));
        assert!(!output.success);
        assert!(cmd
            .format_output(&output, &options(AttemptAction::Restart))
            .starts_with("Restart failed"));
    }

    #[test]
    fn test_discard_without_completion_fails() {
        let pathway = pathway();
        let cmd = AttemptCommand::new(&pathway);

        let output = cmd.run(1, 5, &options(AttemptAction::Discard));
        assert!(!output.success);
        assert!(output.error.is_some());
    }
}
