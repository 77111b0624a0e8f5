//! Storage traits for pathgate.
//!
//! [`Store`] is the durable-storage collaborator of the engine. Both shipped
//! stores hold a [`Dataset`] and implement [`DocumentStore`]; `Store` comes
//! for free from that.

use crate::core::{
    Answer, Attempt, AttemptId, EventResult, Module, ModuleAttempt, ModuleAttemptId, ModuleId,
    NewAttempt, ProgressRecord, Skill, SkillId, SkillStatistic, Training, TrainingId, Typology,
    UserId,
};
use crate::error::Result;
use crate::identity::Roster;
use crate::storage::Dataset;

/// Writes committed together or not at all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    /// Training attempts to update.
    pub attempts: Vec<Attempt>,
    /// Module attempts to update.
    pub module_attempts: Vec<ModuleAttempt>,
    /// Progress cache records to upsert.
    pub progress: Vec<ProgressRecord>,
    /// Attempt to create after the updates, subject to the open-attempt check.
    pub create: Option<NewAttempt>,
}

/// Durable storage consumed by the engine.
pub trait Store: Send + Sync {
    fn training(&self, id: TrainingId) -> Result<Option<Training>>;
    fn put_training(&self, training: &Training) -> Result<()>;

    fn module(&self, id: ModuleId) -> Result<Option<Module>>;
    fn put_module(&self, module: &Module) -> Result<()>;

    /// Training attempts of a pair, oldest first.
    fn attempts(&self, user_id: UserId, training_id: TrainingId) -> Result<Vec<Attempt>>;

    /// The open (non-finalized) attempt of a pair, if any.
    fn open_attempt(&self, user_id: UserId, training_id: TrainingId) -> Result<Option<Attempt>> {
        Ok(self
            .attempts(user_id, training_id)?
            .into_iter()
            .find(|a| a.is_open()))
    }

    /// Create an attempt.
    ///
    /// Fails with `ConcurrentAttempt` when the pair already has an open one.
    fn create_attempt(&self, draft: NewAttempt) -> Result<Attempt>;

    /// Update an attempt.
    fn put_attempt(&self, attempt: &Attempt) -> Result<()>;

    /// Module attempts of a user on a module, oldest first.
    fn module_attempts(&self, user_id: UserId, module_id: ModuleId) -> Result<Vec<ModuleAttempt>>;

    /// Module attempts belonging to a training attempt, oldest first.
    fn module_attempts_of(&self, training_attempt_id: AttemptId) -> Result<Vec<ModuleAttempt>>;

    fn create_module_attempt(
        &self,
        user_id: UserId,
        module_id: ModuleId,
        training_attempt_id: AttemptId,
    ) -> Result<ModuleAttempt>;
    fn put_module_attempt(&self, attempt: &ModuleAttempt) -> Result<()>;

    /// Answers given within a module attempt, oldest first.
    fn answers_for(&self, module_attempt_id: ModuleAttemptId) -> Result<Vec<Answer>>;

    /// Answers of a user tagged with a skill, oldest first.
    fn answers_by_skill(&self, user_id: UserId, skill_id: SkillId) -> Result<Vec<Answer>>;
    fn put_answer(&self, answer: &Answer) -> Result<()>;

    fn event_result(
        &self,
        user_id: UserId,
        typology: Typology,
        entity_id: u64,
    ) -> Result<Option<EventResult>>;
    fn put_event_result(&self, result: &EventResult) -> Result<()>;

    fn skill(&self, id: SkillId) -> Result<Option<Skill>>;
    fn put_skill(&self, skill: &Skill) -> Result<()>;

    /// The skill and its descendants, depth-first, root first.
    fn skill_tree(&self, root: SkillId) -> Result<Vec<Skill>>;

    fn skill_statistic(&self, user_id: UserId, skill_id: SkillId)
        -> Result<Option<SkillStatistic>>;
    fn put_skill_statistic(&self, statistic: &SkillStatistic) -> Result<()>;

    fn progress(&self, user_id: UserId, training_id: TrainingId) -> Result<Option<ProgressRecord>>;

    /// Atomic insert-or-replace of the progress cache.
    fn upsert_progress(&self, record: &ProgressRecord) -> Result<()>;

    /// Meeting and ILT memberships.
    fn roster(&self) -> Result<Roster>;
    fn put_roster(&self, roster: &Roster) -> Result<()>;

    /// Commit a batch atomically. Returns the created attempt, if any.
    fn commit(&self, batch: WriteBatch) -> Result<Option<Attempt>>;
}

/// A store that holds the whole [`Dataset`].
///
/// `write_document` must be all-or-nothing: when the closure fails, none of
/// its changes may become visible.
pub trait DocumentStore: Send + Sync {
    fn read_document<R>(&self, f: impl FnOnce(&Dataset) -> Result<R>) -> Result<R>;
    fn write_document<R>(&self, f: impl FnOnce(&mut Dataset) -> Result<R>) -> Result<R>;
}

impl<D: DocumentStore> Store for D {
    fn training(&self, id: TrainingId) -> Result<Option<Training>> {
        self.read_document(|d| Ok(d.training(id)))
    }

    fn put_training(&self, training: &Training) -> Result<()> {
        self.write_document(|d| {
            d.put_training(training);
            Ok(())
        })
    }

    fn module(&self, id: ModuleId) -> Result<Option<Module>> {
        self.read_document(|d| Ok(d.module(id)))
    }

    fn put_module(&self, module: &Module) -> Result<()> {
        self.write_document(|d| {
            d.put_module(module);
            Ok(())
        })
    }

    fn attempts(&self, user_id: UserId, training_id: TrainingId) -> Result<Vec<Attempt>> {
        self.read_document(|d| Ok(d.attempts(user_id, training_id)))
    }

    fn create_attempt(&self, draft: NewAttempt) -> Result<Attempt> {
        self.write_document(|d| d.create_attempt(draft))
    }

    fn put_attempt(&self, attempt: &Attempt) -> Result<()> {
        self.write_document(|d| d.put_attempt(attempt))
    }

    fn module_attempts(&self, user_id: UserId, module_id: ModuleId) -> Result<Vec<ModuleAttempt>> {
        self.read_document(|d| Ok(d.module_attempts(user_id, module_id)))
    }

    fn module_attempts_of(&self, training_attempt_id: AttemptId) -> Result<Vec<ModuleAttempt>> {
        self.read_document(|d| Ok(d.module_attempts_of(training_attempt_id)))
    }

    fn create_module_attempt(
        &self,
        user_id: UserId,
        module_id: ModuleId,
        training_attempt_id: AttemptId,
    ) -> Result<ModuleAttempt> {
        self.write_document(|d| {
            Ok(d.create_module_attempt(user_id, module_id, training_attempt_id))
        })
    }

    fn put_module_attempt(&self, attempt: &ModuleAttempt) -> Result<()> {
        self.write_document(|d| {
            d.put_module_attempt(attempt);
            Ok(())
        })
    }

    fn answers_for(&self, module_attempt_id: ModuleAttemptId) -> Result<Vec<Answer>> {
        self.read_document(|d| Ok(d.answers_for(module_attempt_id)))
    }

    fn answers_by_skill(&self, user_id: UserId, skill_id: SkillId) -> Result<Vec<Answer>> {
        self.read_document(|d| Ok(d.answers_by_skill(user_id, skill_id)))
    }

    fn put_answer(&self, answer: &Answer) -> Result<()> {
        self.write_document(|d| {
            d.put_answer(answer);
            Ok(())
        })
    }

    fn event_result(
        &self,
        user_id: UserId,
        typology: Typology,
        entity_id: u64,
    ) -> Result<Option<EventResult>> {
        self.read_document(|d| Ok(d.event_result(user_id, typology, entity_id)))
    }

    fn put_event_result(&self, result: &EventResult) -> Result<()> {
        self.write_document(|d| {
            d.put_event_result(result);
            Ok(())
        })
    }

    fn skill(&self, id: SkillId) -> Result<Option<Skill>> {
        self.read_document(|d| Ok(d.skill(id)))
    }

    fn put_skill(&self, skill: &Skill) -> Result<()> {
        self.write_document(|d| {
            d.put_skill(skill);
            Ok(())
        })
    }

    fn skill_tree(&self, root: SkillId) -> Result<Vec<Skill>> {
        self.read_document(|d| Ok(d.skill_tree(root)))
    }

    fn skill_statistic(
        &self,
        user_id: UserId,
        skill_id: SkillId,
    ) -> Result<Option<SkillStatistic>> {
        self.read_document(|d| Ok(d.skill_statistic(user_id, skill_id)))
    }

    fn put_skill_statistic(&self, statistic: &SkillStatistic) -> Result<()> {
        self.write_document(|d| {
            d.put_skill_statistic(statistic);
            Ok(())
        })
    }

    fn progress(&self, user_id: UserId, training_id: TrainingId) -> Result<Option<ProgressRecord>> {
        self.read_document(|d| Ok(d.progress(user_id, training_id)))
    }

    fn upsert_progress(&self, record: &ProgressRecord) -> Result<()> {
        self.write_document(|d| {
            d.upsert_progress(record);
            Ok(())
        })
    }

    fn roster(&self) -> Result<Roster> {
        self.read_document(|d| Ok(d.roster.clone()))
    }

    fn put_roster(&self, roster: &Roster) -> Result<()> {
        self.write_document(|d| {
            d.roster = roster.clone();
            Ok(())
        })
    }

    fn commit(&self, batch: WriteBatch) -> Result<Option<Attempt>> {
        self.write_document(|d| d.apply(batch))
    }
}

/// Test utilities for Store implementations.
#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::core::{NavigationMode, Step};
    use crate::error::PathgateError;

    /// Exercise the store contract shared by every implementation.
    pub fn test_store_contract<S: Store>(store: &S) {
        // Trainings
        assert!(store.training(1).unwrap().is_none());
        let training =
            Training::new(1, 99, NavigationMode::Free).with_step(Step::module(10, 100));
        store.put_training(&training).unwrap();
        assert_eq!(store.training(1).unwrap().unwrap(), training);

        // Roster
        let mut roster = Roster::new();
        roster.register(5, Typology::Meeting, 40);
        store.put_roster(&roster).unwrap();
        assert_eq!(store.roster().unwrap(), roster);

        // Attempt uniqueness
        let first = store.create_attempt(NewAttempt::now(5, 1)).unwrap();
        let err = store.create_attempt(NewAttempt::now(5, 1)).unwrap_err();
        assert!(matches!(
            err,
            PathgateError::ConcurrentAttempt { existing } if existing == first.id
        ));
        assert_eq!(store.open_attempt(5, 1).unwrap().unwrap().id, first.id);

        // Module attempts
        let module_attempt = store.create_module_attempt(5, 100, first.id).unwrap();
        assert_eq!(store.module_attempts(5, 100).unwrap().len(), 1);
        assert_eq!(store.module_attempts_of(first.id).unwrap()[0].id, module_attempt.id);

        // Batch: close the open attempt and create a fresh one atomically
        let mut closed = first.clone();
        closed.close(chrono::Utc::now());
        let mut closed_module = module_attempt.clone();
        closed_module.close(chrono::Utc::now());
        let created = store
            .commit(WriteBatch {
                attempts: vec![closed],
                module_attempts: vec![closed_module],
                progress: vec![ProgressRecord::zero(5, 1)],
                create: Some(NewAttempt::now(5, 1)),
            })
            .unwrap()
            .unwrap();
        assert_ne!(created.id, first.id);
        assert_eq!(store.attempts(5, 1).unwrap().len(), 2);
        assert!(store.module_attempts_of(first.id).unwrap()[0].finalized);
        assert_eq!(store.progress(5, 1).unwrap().unwrap().progress, 0);

        // A failing batch leaves nothing behind
        let mut progress = ProgressRecord::zero(5, 1);
        progress.progress = 80;
        let failed = store.commit(WriteBatch {
            progress: vec![progress],
            create: Some(NewAttempt::now(5, 1)),
            ..Default::default()
        });
        assert!(failed.is_err());
        assert_eq!(store.progress(5, 1).unwrap().unwrap().progress, 0);
        assert_eq!(store.attempts(5, 1).unwrap().len(), 2);
    }
}
