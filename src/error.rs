//! Error types for pathgate.
//!
//! Two families live here. `PathgateError` covers failures that stop an
//! operation (missing steps, structural drift, storage trouble). `GateBlock`
//! is the expected negative answer of a gating decision: it is not fatal and
//! always names the step the learner has to go back to.
//!
//! Side channels (event emission, progress cache refresh) follow a fail-open
//! rule through the [`FailOpen`] trait: log a warning, keep going.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::core::{AttemptId, ModuleAttemptId, SkillId, StepId, TrainingId, UserId};
use crate::navigation::Destination;

/// Where a blocked learner should be sent to fix the block.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Remediation {
    /// Step that has to be (re)done.
    pub step_id: StepId,
    /// Opaque destination of that step.
    pub destination: Destination,
}

/// Negative outcome of a gating decision.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GateBlock {
    /// The step's best score is below its required score.
    #[error(
        "score {best_score:?} is below the required {required} on step {}",
        .remediation.step_id
    )]
    InsufficientScore {
        required: u32,
        best_score: Option<u32>,
        remediation: Remediation,
    },

    /// The step has to be attempted (or attended) first.
    #[error("step {} must be attempted first: {reason}", .remediation.step_id)]
    AttemptRequired {
        reason: String,
        remediation: Remediation,
    },

    /// An answer on a manually graded activity still waits for evaluation.
    #[error("step {} has answers pending manual grading", .remediation.step_id)]
    ManualGradingPending { remediation: Remediation },
}

impl GateBlock {
    /// Remediation link carried by every block.
    pub fn remediation(&self) -> &Remediation {
        match self {
            Self::InsufficientScore { remediation, .. }
            | Self::AttemptRequired { remediation, .. }
            | Self::ManualGradingPending { remediation } => remediation,
        }
    }

    /// Short machine-readable name of the block.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InsufficientScore { .. } => "insufficient_score",
            Self::AttemptRequired { .. } => "attempt_required",
            Self::ManualGradingPending { .. } => "manual_grading_pending",
        }
    }

    /// Whether the block clears without any learner action.
    pub fn clears_by_itself(&self) -> bool {
        matches!(self, Self::ManualGradingPending { .. })
    }
}

/// The main error type for pathgate operations.
#[derive(Error, Debug)]
pub enum PathgateError {
    /// The training resolves to zero steps. A configuration problem.
    #[error("training {training_id} has no resolvable steps")]
    NoSteps { training_id: TrainingId },

    /// Gating refused to let the learner through.
    #[error("gate blocked: {0}")]
    Blocked(#[from] GateBlock),

    /// A completed attempt no longer matches the live training structure.
    #[error(
        "training {training_id} changed since user {user_id} completed it ({} difference(s)); \
         stale completion must be discarded explicitly",
        .differences.len()
    )]
    StructuralDrift {
        training_id: TrainingId,
        user_id: UserId,
        differences: Vec<String>,
    },

    /// Creating an attempt collided with an already open one.
    #[error("an open attempt {existing} already exists")]
    ConcurrentAttempt { existing: AttemptId },

    /// Restart refused because the open attempt is still in progress.
    #[error("attempt {attempt_id} is still in progress and cannot be restarted")]
    AttemptInProgress { attempt_id: AttemptId },

    /// No training with this id.
    #[error("training not found: {training_id}")]
    TrainingNotFound { training_id: TrainingId },

    /// The referenced step is not part of the resolved sequence.
    #[error("step {step_id} is not part of training {training_id}")]
    StepNotFound {
        training_id: TrainingId,
        step_id: StepId,
    },

    /// No skill with this id.
    #[error("skill not found: {skill_id}")]
    SkillNotFound { skill_id: SkillId },

    /// The module attempt does not belong to the open training attempt.
    #[error("module attempt {module_attempt_id} not found in the open attempt")]
    ModuleAttemptNotFound { module_attempt_id: ModuleAttemptId },

    /// An operation needed an open attempt and found none.
    #[error("user {user_id} has no open attempt on training {training_id}")]
    NoOpenAttempt {
        training_id: TrainingId,
        user_id: UserId,
    },

    /// I/O errors from the file store, config or event log.
    #[error("storage error at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// JSON or TOML (de)serialization errors.
    #[error("serialization error: {message}")]
    Serde { message: String },

    /// Configuration loading errors.
    #[error("config error: {message}")]
    Config { message: String },

    /// Records that violate a data-model invariant.
    #[error("invalid state: {message}")]
    InvalidState { message: String },
}

/// A specialized Result type for pathgate operations.
pub type Result<T> = std::result::Result<T, PathgateError>;

impl PathgateError {
    /// Create a storage error from an I/O error.
    pub fn storage(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    /// Create a serialization error.
    pub fn serde(message: impl Into<String>) -> Self {
        Self::Serde {
            message: message.into(),
        }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Whether the caller can recover without an administrator.
    ///
    /// Gate blocks and in-progress restarts resolve through learner action,
    /// a concurrent start resolves by reusing the existing attempt.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Blocked(_) | Self::ConcurrentAttempt { .. } | Self::AttemptInProgress { .. }
        )
    }
}

impl From<io::Error> for PathgateError {
    fn from(err: io::Error) -> Self {
        Self::Storage {
            path: PathBuf::new(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for PathgateError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serde {
            message: err.to_string(),
        }
    }
}

/// Fail-open handling for side channels.
pub trait FailOpen<T> {
    /// Log a warning and return the default value on error.
    fn fail_open_default(self, context: &str) -> T
    where
        T: Default;
}

impl<T> FailOpen<T> for Result<T> {
    fn fail_open_default(self, context: &str) -> T
    where
        T: Default,
    {
        match self {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!("{}: {} (fail-open: using default)", context, err);
                T::default()
            }
        }
    }
}

/// Exit codes for the pathgate CLI.
pub mod exit_codes {
    /// The operation succeeded.
    pub const OK: i32 = 0;

    /// The operation failed.
    pub const ERROR: i32 = 1;

    /// Gating blocked the learner.
    pub const BLOCKED: i32 = 2;

    /// The training changed since completion; confirmation required.
    pub const DRIFT: i32 = 3;
}
