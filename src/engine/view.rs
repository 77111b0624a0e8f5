//! Batch-loaded learner state.
//!
//! Everything a gating evaluation reads is fetched once, up front, into a
//! [`LearnerView`]. Gating itself never touches storage.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::{Attempt, Module, ModuleId, Step, StepId, StepKind, Training, UserId};
use crate::error::Result;
use crate::stats::scoring::{self, target_attempt};
use crate::storage::Store;

/// What the learner achieved on one step within the open attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Authoritative score in percent, `None` when nothing is scored yet.
    pub score: Option<u32>,
    /// Finished attempts (attendance for meetings and ILTs).
    pub attempts: u32,
    /// A manually graded activity waits for evaluation.
    pub pending_manual: bool,
    /// The learner attended the meeting or ILT.
    pub attended: bool,
}

/// Read-only lookup tables for one (user, training) evaluation.
#[derive(Debug, Clone)]
pub struct LearnerView {
    training_id: u64,
    user_id: UserId,
    owner: bool,
    attempt: Option<Attempt>,
    records: HashMap<StepId, StepRecord>,
}

impl LearnerView {
    /// Load the learner's records for every step of the training.
    ///
    /// Only module attempts of the open training attempt count; without an
    /// open attempt every module step is unscored.
    pub fn load<S: Store + ?Sized>(
        store: &S,
        training: &Training,
        user_id: UserId,
    ) -> Result<Self> {
        let attempt = store.open_attempt(user_id, training.id)?;
        let mut records = HashMap::new();
        let mut loader = Loader {
            store,
            user_id,
            attempt: attempt.as_ref(),
            records: &mut records,
        };
        for step in &training.steps {
            loader.load_step(step)?;
        }

        tracing::debug!(
            training_id = training.id,
            user_id,
            steps = records.len(),
            open_attempt = attempt.as_ref().map(|a| a.id),
            "loaded learner view"
        );

        Ok(Self {
            training_id: training.id,
            user_id,
            owner: training.owner_id == user_id,
            attempt,
            records,
        })
    }

    /// Build a view from precomputed records.
    pub fn from_records(
        training_id: u64,
        user_id: UserId,
        owner: bool,
        attempt: Option<Attempt>,
        records: HashMap<StepId, StepRecord>,
    ) -> Self {
        Self {
            training_id,
            user_id,
            owner,
            attempt,
            records,
        }
    }

    pub fn training_id(&self) -> u64 {
        self.training_id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Whether the learner owns the training.
    pub fn is_owner(&self) -> bool {
        self.owner
    }

    /// The open attempt, if any.
    pub fn attempt(&self) -> Option<&Attempt> {
        self.attempt.as_ref()
    }

    /// Record of a step; unknown steps are empty.
    pub fn record(&self, step_id: StepId) -> StepRecord {
        self.records.get(&step_id).copied().unwrap_or_default()
    }
}

struct Loader<'a, S: Store + ?Sized> {
    store: &'a S,
    user_id: UserId,
    attempt: Option<&'a Attempt>,
    records: &'a mut HashMap<StepId, StepRecord>,
}

impl<S: Store + ?Sized> Loader<'_, S> {
    fn load_step(&mut self, step: &Step) -> Result<StepRecord> {
        let record = match &step.kind {
            StepKind::Module(m) => self.module_record(m.module_id)?,
            StepKind::Meeting(_) | StepKind::Ilt(_) => self.event_record(step)?,
            StepKind::Course(c) => {
                let mut children = Vec::with_capacity(c.steps.len());
                for child in &c.steps {
                    children.push(self.load_step(child)?);
                }
                course_record(&children)
            }
        };
        self.records.insert(step.id, record);
        Ok(record)
    }

    fn module_record(&self, module_id: ModuleId) -> Result<StepRecord> {
        let Some(attempt) = self.attempt else {
            return Ok(StepRecord::default());
        };

        let module = self.store.module(module_id)?;
        let attempts: Vec<_> = self
            .store
            .module_attempts(self.user_id, module_id)?
            .into_iter()
            .filter(|m| m.training_attempt_id == attempt.id)
            .collect();

        let keep = module.as_ref().map(|m| m.keep_results).unwrap_or_default();
        let score = target_attempt(&attempts, keep)
            .filter(|t| t.is_finished())
            .map(|t| t.score);
        let finished = attempts.iter().filter(|a| a.is_finished()).count() as u32;

        let pending_manual = match &module {
            Some(module) if module.activities.iter().any(|a| a.manual_grading) => {
                let mut answers = Vec::new();
                for module_attempt in &attempts {
                    answers.extend(self.store.answers_for(module_attempt.id)?);
                }
                manual_grading_pending(module, &answers)
            }
            _ => false,
        };

        Ok(StepRecord {
            score,
            attempts: finished,
            pending_manual,
            attended: false,
        })
    }

    fn event_record(&self, step: &Step) -> Result<StepRecord> {
        let result = self
            .store
            .event_result(self.user_id, step.typology(), step.entity_id())?;
        Ok(match result {
            Some(result) => StepRecord {
                score: result.score,
                attempts: u32::from(result.attended || result.score.is_some()),
                pending_manual: false,
                attended: result.attended,
            },
            None => StepRecord::default(),
        })
    }
}

/// Whether the latest answer of any manually graded activity is unevaluated.
fn manual_grading_pending(module: &Module, answers: &[crate::core::Answer]) -> bool {
    scoring::latest_answers(answers).iter().any(|answer| {
        !answer.evaluated
            && module
                .activity(answer.activity_id)
                .is_some_and(|a| a.manual_grading)
    })
}

/// Aggregate a course from its sub-steps: rounded average of the scored
/// children, the fewest attempts of any child, pending if any child is.
fn course_record(children: &[StepRecord]) -> StepRecord {
    let scored: Vec<u32> = children.iter().filter_map(|c| c.score).collect();
    let score = if scored.is_empty() {
        None
    } else {
        let sum: u64 = scored.iter().map(|&s| u64::from(s)).sum();
        Some(scoring::round_ratio(sum, scored.len() as u64))
    };

    StepRecord {
        score,
        attempts: children.iter().map(|c| c.attempts).min().unwrap_or(0),
        pending_manual: children.iter().any(|c| c.pending_manual),
        attended: false,
    }
}
