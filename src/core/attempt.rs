//! Per-user state: attempts, answers, results and statistics.
//!
//! Training attempts form an append-only history per (user, training). At
//! most one of them is open (`finalized == false`) at any time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::model::{Position, SkillTag, Step, Typology};
use super::{
    ActivityId, AnswerId, AttemptId, ModuleAttemptId, ModuleId, SkillId, StepId, TrainingId,
    UserId,
};

/// Status of a training attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    #[default]
    InProgress,
    Passed,
    Failed,
}

impl AttemptStatus {
    /// Check if the attempt reached a terminal score.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AttemptStatus::Passed | AttemptStatus::Failed)
    }
}

/// Identity of a step at completion time, used to detect structural drift.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepFingerprint {
    pub typology: Typology,
    pub entity_id: u64,
    pub position: Position,
    /// Entity id of the owning course, for nested steps.
    #[serde(default)]
    pub parent_entity_id: Option<u64>,
    pub mandatory: bool,
}

impl StepFingerprint {
    /// Fingerprint a step, optionally nested in a course.
    pub fn of(step: &Step, parent_entity_id: Option<u64>) -> Self {
        Self {
            typology: step.typology(),
            entity_id: step.entity_id(),
            position: step.position,
            parent_entity_id,
            mandatory: step.mandatory,
        }
    }

    /// Short human-readable label.
    pub fn label(&self) -> String {
        match self.parent_entity_id {
            Some(parent) => format!(
                "{} {} in course {} at ({}, {})",
                self.typology.as_str(),
                self.entity_id,
                parent,
                self.position.row,
                self.position.column
            ),
            None => format!(
                "{} {} at ({}, {})",
                self.typology.as_str(),
                self.entity_id,
                self.position.row,
                self.position.column
            ),
        }
    }
}

/// One user's run through a training.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub id: AttemptId,
    pub user_id: UserId,
    pub training_id: TrainingId,
    pub status: AttemptStatus,
    pub started: DateTime<Utc>,
    #[serde(default)]
    pub finished: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finalized: bool,
    #[serde(default)]
    pub score: u32,
    /// Last visited step.
    #[serde(default)]
    pub current_step: Option<StepId>,
    /// Step sequence recorded when the attempt reached a terminal status.
    #[serde(default)]
    pub completed_structure: Option<Vec<StepFingerprint>>,
}

impl Attempt {
    /// Check if the attempt is still the open one.
    pub fn is_open(&self) -> bool {
        !self.finalized
    }

    /// Close the attempt: stamp `finished` if missing and finalize.
    pub fn close(&mut self, now: DateTime<Utc>) {
        if self.finished.is_none() {
            self.finished = Some(now);
        }
        self.finalized = true;
    }
}

/// Data needed to create a training attempt; storage assigns the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAttempt {
    pub user_id: UserId,
    pub training_id: TrainingId,
    pub started: DateTime<Utc>,
}

impl NewAttempt {
    /// Create a draft starting now.
    pub fn now(user_id: UserId, training_id: TrainingId) -> Self {
        Self {
            user_id,
            training_id,
            started: Utc::now(),
        }
    }

    /// Materialize with an assigned id.
    pub fn into_attempt(self, id: AttemptId) -> Attempt {
        Attempt {
            id,
            user_id: self.user_id,
            training_id: self.training_id,
            status: AttemptStatus::InProgress,
            started: self.started,
            finished: None,
            finalized: false,
            score: 0,
            current_step: None,
            completed_structure: None,
        }
    }
}

/// One user's run through a single module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleAttempt {
    pub id: ModuleAttemptId,
    pub user_id: UserId,
    pub module_id: ModuleId,
    pub training_attempt_id: AttemptId,
    pub started: DateTime<Utc>,
    #[serde(default)]
    pub finished: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finalized: bool,
    /// Score in percent.
    #[serde(default)]
    pub score: u32,
    #[serde(default)]
    pub last_activity_id: Option<ActivityId>,
}

impl ModuleAttempt {
    /// Check if the module attempt was finished.
    pub fn is_finished(&self) -> bool {
        self.finished.is_some()
    }

    /// Close the module attempt.
    pub fn close(&mut self, now: DateTime<Utc>) {
        if self.finished.is_none() {
            self.finished = Some(now);
        }
        self.finalized = true;
    }
}

/// An answer to one activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub id: AnswerId,
    pub user_id: UserId,
    pub activity_id: ActivityId,
    pub module_attempt_id: ModuleAttemptId,
    pub score: u32,
    /// Max score of the activity when answered; 0 means unset.
    #[serde(default)]
    pub max_score: u32,
    /// False while a manual grader has not looked at it.
    #[serde(default = "default_evaluated")]
    pub evaluated: bool,
    #[serde(default)]
    pub skill: Option<SkillTag>,
    pub created: DateTime<Utc>,
}

fn default_evaluated() -> bool {
    true
}

/// Outcome of a meeting or ILT for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventResult {
    pub user_id: UserId,
    pub typology: Typology,
    pub entity_id: u64,
    #[serde(default)]
    pub score: Option<u32>,
    #[serde(default)]
    pub attended: bool,
}

/// Skill mastery of one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillStatistic {
    pub user_id: UserId,
    pub skill_id: SkillId,
    pub score: u32,
    /// Mastery in percent.
    pub progress: u32,
    /// Remaining stage; 0 is full mastery.
    pub stage: u32,
}

/// Denormalized progress cache for a (user, training) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub user_id: UserId,
    pub training_id: TrainingId,
    pub progress: u32,
    pub score: u32,
    pub updated: DateTime<Utc>,
}

impl ProgressRecord {
    /// A zeroed record.
    pub fn zero(user_id: UserId, training_id: TrainingId) -> Self {
        Self {
            user_id,
            training_id,
            progress: 0,
            score: 0,
            updated: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_attempt_is_open_in_progress() {
        let attempt = NewAttempt::now(1, 2).into_attempt(9);
        assert_eq!(attempt.id, 9);
        assert_eq!(attempt.status, AttemptStatus::InProgress);
        assert!(attempt.is_open());
        assert!(attempt.finished.is_none());
    }

    #[test]
    fn test_close_keeps_existing_finish_time() {
        let mut attempt = NewAttempt::now(1, 2).into_attempt(1);
        let earlier = Utc::now() - chrono::Duration::hours(1);
        attempt.finished = Some(earlier);
        attempt.close(Utc::now());

        assert!(attempt.finalized);
        assert_eq!(attempt.finished, Some(earlier));
    }

    #[test]
    fn test_status_is_terminal() {
        assert!(!AttemptStatus::InProgress.is_terminal());
        assert!(AttemptStatus::Passed.is_terminal());
        assert!(AttemptStatus::Failed.is_terminal());
    }

    #[test]
    fn test_fingerprint_label() {
        let fp = StepFingerprint::of(&Step::module(1, 10).mandatory(), Some(100));
        assert_eq!(fp.label(), "module 10 in course 100 at (0, 0)");
    }

    #[test]
    fn test_answer_defaults_to_evaluated() {
        let json = r#"{"id":1,"user_id":1,"activity_id":2,"module_attempt_id":3,
            "score":5,"created":"2026-01-01T00:00:00Z"}"#;
        let answer: Answer = serde_json::from_str(json).unwrap();
        assert!(answer.evaluated);
        assert_eq!(answer.max_score, 0);
    }
}
