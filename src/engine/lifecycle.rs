//! Attempt lifecycle.
//!
//! Per (user, training) pair an attempt moves through
//! `NONE → IN_PROGRESS → {PASSED, FAILED} → FINALIZED`. Transitions that
//! touch several records (restart, discarding a stale completion) commit a
//! single [`WriteBatch`].

use chrono::Utc;

use crate::core::{
    Attempt, AttemptStatus, NewAttempt, ProgressRecord, StepFingerprint, Training, TrainingId,
    UserId,
};
use crate::engine::StepGraphResolver;
use crate::error::{PathgateError, Result};
use crate::events::{emit, EventSink, PathEventType};
use crate::storage::{Store, WriteBatch};

/// Creates, restarts and finalizes training attempts.
pub struct AttemptLifecycleManager<'a, S: Store + ?Sized> {
    store: &'a S,
    events: &'a dyn EventSink,
}

impl<'a, S: Store + ?Sized> AttemptLifecycleManager<'a, S> {
    pub fn new(store: &'a S, events: &'a dyn EventSink) -> Self {
        Self { store, events }
    }

    /// Start an attempt, or return the open one.
    ///
    /// Storage refuses a second open attempt; losing that race returns the
    /// winner's attempt.
    pub fn start(&self, training_id: TrainingId, user_id: UserId) -> Result<Attempt> {
        if let Some(open) = self.store.open_attempt(user_id, training_id)? {
            return Ok(open);
        }

        match self.store.create_attempt(NewAttempt::now(user_id, training_id)) {
            Ok(attempt) => {
                tracing::info!(training_id, user_id, attempt_id = attempt.id, "attempt started");
                emit(
                    self.events,
                    PathEventType::AttemptStarted {
                        training_id,
                        user_id,
                        attempt_id: attempt.id,
                    },
                );
                Ok(attempt)
            }
            Err(PathgateError::ConcurrentAttempt { existing }) => {
                tracing::debug!(training_id, user_id, existing, "reusing concurrent attempt");
                self.store
                    .open_attempt(user_id, training_id)?
                    .ok_or_else(|| {
                        PathgateError::invalid_state(format!(
                            "open attempt {existing} vanished during start"
                        ))
                    })
            }
            Err(err) => Err(err),
        }
    }

    /// Close the open attempt and start a fresh one.
    ///
    /// The open attempt must have reached `PASSED` or `FAILED`; an attempt
    /// still in progress refuses the restart.
    pub fn restart(&self, training_id: TrainingId, user_id: UserId) -> Result<Attempt> {
        let now = Utc::now();
        let mut batch = WriteBatch {
            progress: vec![ProgressRecord::zero(user_id, training_id)],
            create: Some(NewAttempt::now(user_id, training_id)),
            ..Default::default()
        };

        let open = self.store.open_attempt(user_id, training_id)?;
        if let Some(open) = &open {
            if !open.status.is_terminal() {
                return Err(PathgateError::AttemptInProgress {
                    attempt_id: open.id,
                });
            }
            let mut closed = open.clone();
            closed.close(now);
            batch.attempts.push(closed);
            batch.module_attempts = self.open_module_attempts(open.id, now)?;
        }

        let module_attempts_closed = batch.module_attempts.len();
        let attempt = self.commit_fresh(batch)?;

        tracing::info!(
            training_id,
            user_id,
            closed = ?open.as_ref().map(|a| a.id),
            attempt_id = attempt.id,
            module_attempts_closed,
            "attempt restarted"
        );
        emit(
            self.events,
            PathEventType::AttemptRestarted {
                training_id,
                user_id,
                closed_attempt_id: open.map(|a| a.id),
                attempt_id: attempt.id,
                module_attempts_closed,
            },
        );
        Ok(attempt)
    }

    /// Record the end of the open attempt.
    ///
    /// Stores the terminal status, the training score and the structure the
    /// learner completed. The attempt stays open until a restart.
    pub fn complete(
        &self,
        training: &Training,
        user_id: UserId,
        status: AttemptStatus,
        score: u32,
    ) -> Result<Attempt> {
        let mut attempt = self.store.open_attempt(user_id, training.id)?.ok_or(
            PathgateError::NoOpenAttempt {
                training_id: training.id,
                user_id,
            },
        )?;

        attempt.status = status;
        attempt.score = score;
        attempt.finished = Some(Utc::now());
        attempt.completed_structure = Some(StepGraphResolver::fingerprints(training));
        self.store.put_attempt(&attempt)?;

        tracing::info!(
            training_id = training.id,
            user_id,
            attempt_id = attempt.id,
            ?status,
            score,
            "attempt completed"
        );
        emit(
            self.events,
            PathEventType::AttemptCompleted {
                training_id: training.id,
                user_id,
                attempt_id: attempt.id,
                status,
                score,
            },
        );
        Ok(attempt)
    }

    /// Differences between the open attempt's recorded structure and the
    /// training's current one. Empty when nothing was recorded.
    pub fn drift(&self, training: &Training, user_id: UserId) -> Result<Vec<String>> {
        let Some(attempt) = self.store.open_attempt(user_id, training.id)? else {
            return Ok(Vec::new());
        };
        let Some(recorded) = attempt.completed_structure.as_deref() else {
            return Ok(Vec::new());
        };
        Ok(structure_differences(
            recorded,
            &StepGraphResolver::fingerprints(training),
        ))
    }

    /// Fail with `StructuralDrift` when the completed structure changed.
    pub fn check_drift(&self, training: &Training, user_id: UserId) -> Result<()> {
        let differences = self.drift(training, user_id)?;
        if differences.is_empty() {
            return Ok(());
        }

        let attempt_id = self
            .store
            .open_attempt(user_id, training.id)?
            .map(|a| a.id)
            .unwrap_or_default();
        tracing::warn!(
            training_id = training.id,
            user_id,
            attempt_id,
            differences = differences.len(),
            "structural drift detected"
        );
        emit(
            self.events,
            PathEventType::StructuralDrift {
                training_id: training.id,
                user_id,
                attempt_id,
                differences: differences.len(),
            },
        );
        Err(PathgateError::StructuralDrift {
            training_id: training.id,
            user_id,
            differences,
        })
    }

    /// Confirmed removal of a stale completion.
    ///
    /// Finalizes the completed attempt with its recorded structure cleared,
    /// closes its module attempts, zeroes the progress cache and starts a
    /// fresh attempt, all in one batch.
    pub fn discard_stale_completion(
        &self,
        training_id: TrainingId,
        user_id: UserId,
    ) -> Result<Attempt> {
        let now = Utc::now();
        let open = self.store.open_attempt(user_id, training_id)?.ok_or(
            PathgateError::NoOpenAttempt {
                training_id,
                user_id,
            },
        )?;
        if open.completed_structure.is_none() {
            return Err(PathgateError::invalid_state(format!(
                "attempt {} has no completion to discard",
                open.id
            )));
        }

        let mut stale = open.clone();
        stale.completed_structure = None;
        stale.close(now);

        let batch = WriteBatch {
            attempts: vec![stale],
            module_attempts: self.open_module_attempts(open.id, now)?,
            progress: vec![ProgressRecord::zero(user_id, training_id)],
            create: Some(NewAttempt::now(user_id, training_id)),
        };
        let attempt = self.commit_fresh(batch)?;

        tracing::info!(
            training_id,
            user_id,
            discarded = open.id,
            attempt_id = attempt.id,
            "stale completion discarded"
        );
        emit(
            self.events,
            PathEventType::CompletionDiscarded {
                training_id,
                user_id,
                attempt_id: open.id,
            },
        );
        Ok(attempt)
    }

    /// Open module attempts of a training attempt, closed at `now`.
    fn open_module_attempts(
        &self,
        attempt_id: u64,
        now: chrono::DateTime<Utc>,
    ) -> Result<Vec<crate::core::ModuleAttempt>> {
        Ok(self
            .store
            .module_attempts_of(attempt_id)?
            .into_iter()
            .filter(|m| !m.finalized)
            .map(|mut m| {
                m.close(now);
                m
            })
            .collect())
    }

    fn commit_fresh(&self, batch: WriteBatch) -> Result<Attempt> {
        self.store
            .commit(batch)?
            .ok_or_else(|| PathgateError::invalid_state("batch did not create an attempt"))
    }
}

/// Positional comparison of two structures.
fn structure_differences(recorded: &[StepFingerprint], current: &[StepFingerprint]) -> Vec<String> {
    let len = recorded.len().max(current.len());
    (0..len)
        .filter_map(|i| match (recorded.get(i), current.get(i)) {
            (Some(was), Some(now)) if was != now => Some(format!(
                "step {}: {} became {}",
                i + 1,
                was.label(),
                now.label()
            )),
            (Some(was), None) => Some(format!("step {}: {} removed", i + 1, was.label())),
            (None, Some(now)) => Some(format!("step {}: {} added", i + 1, now.label())),
            _ => None,
        })
        .collect()
}
