//! The data document shared by the memory and file stores.
//!
//! Every record lives in one serializable [`Dataset`]. Stores decide how the
//! document is held (behind a lock, or in a JSON file); the queries and the
//! invariant checks live here once.

use serde::{Deserialize, Serialize};

use crate::core::{
    Answer, Attempt, AttemptId, EventResult, Module, ModuleAttempt, ModuleAttemptId, ModuleId,
    NewAttempt, ProgressRecord, Skill, SkillId, SkillStatistic, Training, TrainingId, Typology,
    UserId,
};
use crate::error::{PathgateError, Result};
use crate::identity::Roster;
use crate::storage::WriteBatch;

/// Every stored record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Dataset {
    pub trainings: Vec<Training>,
    pub modules: Vec<Module>,
    pub attempts: Vec<Attempt>,
    pub module_attempts: Vec<ModuleAttempt>,
    pub answers: Vec<Answer>,
    pub event_results: Vec<EventResult>,
    pub skills: Vec<Skill>,
    pub skill_statistics: Vec<SkillStatistic>,
    pub progress: Vec<ProgressRecord>,
    pub roster: Roster,
}

fn upsert<T>(items: &mut Vec<T>, item: T, same: impl Fn(&T) -> bool) {
    match items.iter_mut().find(|existing| same(existing)) {
        Some(existing) => *existing = item,
        None => items.push(item),
    }
}

impl Dataset {
    pub fn training(&self, id: TrainingId) -> Option<Training> {
        self.trainings.iter().find(|t| t.id == id).cloned()
    }

    pub fn put_training(&mut self, training: &Training) {
        upsert(&mut self.trainings, training.clone(), |t| t.id == training.id);
    }

    pub fn module(&self, id: ModuleId) -> Option<Module> {
        self.modules.iter().find(|m| m.id == id).cloned()
    }

    pub fn put_module(&mut self, module: &Module) {
        upsert(&mut self.modules, module.clone(), |m| m.id == module.id);
    }

    /// Attempts of the pair in creation order.
    pub fn attempts(&self, user_id: UserId, training_id: TrainingId) -> Vec<Attempt> {
        let mut attempts: Vec<Attempt> = self
            .attempts
            .iter()
            .filter(|a| a.user_id == user_id && a.training_id == training_id)
            .cloned()
            .collect();
        attempts.sort_by_key(|a| a.id);
        attempts
    }

    fn open_attempt_id(&self, user_id: UserId, training_id: TrainingId) -> Option<AttemptId> {
        self.attempts
            .iter()
            .find(|a| a.user_id == user_id && a.training_id == training_id && a.is_open())
            .map(|a| a.id)
    }

    /// Create an attempt unless the pair already has an open one.
    pub fn create_attempt(&mut self, draft: NewAttempt) -> Result<Attempt> {
        if let Some(existing) = self.open_attempt_id(draft.user_id, draft.training_id) {
            return Err(PathgateError::ConcurrentAttempt { existing });
        }
        let id = self.attempts.iter().map(|a| a.id).max().unwrap_or(0) + 1;
        let attempt = draft.into_attempt(id);
        self.attempts.push(attempt.clone());
        Ok(attempt)
    }

    /// Update an attempt; reopening one next to another open attempt fails.
    pub fn put_attempt(&mut self, attempt: &Attempt) -> Result<()> {
        if attempt.is_open() {
            if let Some(existing) = self.open_attempt_id(attempt.user_id, attempt.training_id) {
                if existing != attempt.id {
                    return Err(PathgateError::ConcurrentAttempt { existing });
                }
            }
        }
        upsert(&mut self.attempts, attempt.clone(), |a| a.id == attempt.id);
        Ok(())
    }

    /// Module attempts of a user on a module, in creation order.
    pub fn module_attempts(&self, user_id: UserId, module_id: ModuleId) -> Vec<ModuleAttempt> {
        let mut found: Vec<ModuleAttempt> = self
            .module_attempts
            .iter()
            .filter(|m| m.user_id == user_id && m.module_id == module_id)
            .cloned()
            .collect();
        found.sort_by_key(|m| m.id);
        found
    }

    pub fn module_attempts_of(&self, training_attempt_id: AttemptId) -> Vec<ModuleAttempt> {
        let mut found: Vec<ModuleAttempt> = self
            .module_attempts
            .iter()
            .filter(|m| m.training_attempt_id == training_attempt_id)
            .cloned()
            .collect();
        found.sort_by_key(|m| m.id);
        found
    }

    pub fn create_module_attempt(
        &mut self,
        user_id: UserId,
        module_id: ModuleId,
        training_attempt_id: AttemptId,
    ) -> ModuleAttempt {
        let id = self.module_attempts.iter().map(|m| m.id).max().unwrap_or(0) + 1;
        let attempt = ModuleAttempt {
            id,
            user_id,
            module_id,
            training_attempt_id,
            started: chrono::Utc::now(),
            finished: None,
            finalized: false,
            score: 0,
            last_activity_id: None,
        };
        self.module_attempts.push(attempt.clone());
        attempt
    }

    pub fn put_module_attempt(&mut self, attempt: &ModuleAttempt) {
        upsert(&mut self.module_attempts, attempt.clone(), |m| {
            m.id == attempt.id
        });
    }

    pub fn answers_for(&self, module_attempt_id: ModuleAttemptId) -> Vec<Answer> {
        let mut found: Vec<Answer> = self
            .answers
            .iter()
            .filter(|a| a.module_attempt_id == module_attempt_id)
            .cloned()
            .collect();
        found.sort_by_key(|a| a.id);
        found
    }

    pub fn answers_by_skill(&self, user_id: UserId, skill_id: SkillId) -> Vec<Answer> {
        let mut found: Vec<Answer> = self
            .answers
            .iter()
            .filter(|a| {
                a.user_id == user_id && a.skill.map(|s| s.skill_id) == Some(skill_id)
            })
            .cloned()
            .collect();
        found.sort_by_key(|a| a.id);
        found
    }

    pub fn put_answer(&mut self, answer: &Answer) {
        upsert(&mut self.answers, answer.clone(), |a| a.id == answer.id);
    }

    pub fn event_result(
        &self,
        user_id: UserId,
        typology: Typology,
        entity_id: u64,
    ) -> Option<EventResult> {
        self.event_results
            .iter()
            .find(|r| r.user_id == user_id && r.typology == typology && r.entity_id == entity_id)
            .cloned()
    }

    pub fn put_event_result(&mut self, result: &EventResult) {
        upsert(&mut self.event_results, result.clone(), |r| {
            r.user_id == result.user_id
                && r.typology == result.typology
                && r.entity_id == result.entity_id
        });
    }

    pub fn skill(&self, id: SkillId) -> Option<Skill> {
        self.skills.iter().find(|s| s.id == id).cloned()
    }

    pub fn put_skill(&mut self, skill: &Skill) {
        upsert(&mut self.skills, skill.clone(), |s| s.id == skill.id);
    }

    /// The skill and all of its descendants, depth-first, root first.
    pub fn skill_tree(&self, root: SkillId) -> Vec<Skill> {
        let mut tree = Vec::new();
        let mut pending = vec![root];
        while let Some(id) = pending.pop() {
            if tree.iter().any(|s: &Skill| s.id == id) {
                continue;
            }
            if let Some(skill) = self.skill(id) {
                let mut children: Vec<SkillId> = self
                    .skills
                    .iter()
                    .filter(|s| s.parent == Some(id))
                    .map(|s| s.id)
                    .collect();
                children.sort_unstable();
                pending.extend(children.into_iter().rev());
                tree.push(skill);
            }
        }
        tree
    }

    pub fn skill_statistic(&self, user_id: UserId, skill_id: SkillId) -> Option<SkillStatistic> {
        self.skill_statistics
            .iter()
            .find(|s| s.user_id == user_id && s.skill_id == skill_id)
            .cloned()
    }

    pub fn put_skill_statistic(&mut self, statistic: &SkillStatistic) {
        upsert(&mut self.skill_statistics, statistic.clone(), |s| {
            s.user_id == statistic.user_id && s.skill_id == statistic.skill_id
        });
    }

    pub fn progress(&self, user_id: UserId, training_id: TrainingId) -> Option<ProgressRecord> {
        self.progress
            .iter()
            .find(|p| p.user_id == user_id && p.training_id == training_id)
            .cloned()
    }

    pub fn upsert_progress(&mut self, record: &ProgressRecord) {
        upsert(&mut self.progress, record.clone(), |p| {
            p.user_id == record.user_id && p.training_id == record.training_id
        });
    }

    /// Apply a batch. Callers hold the document exclusively and discard it
    /// on error, so a failed batch leaves nothing behind.
    pub fn apply(&mut self, batch: WriteBatch) -> Result<Option<Attempt>> {
        for attempt in &batch.attempts {
            self.put_attempt(attempt)?;
        }
        for module_attempt in &batch.module_attempts {
            self.put_module_attempt(module_attempt);
        }
        for record in &batch.progress {
            self.upsert_progress(record);
        }
        batch
            .create
            .map(|draft| self.create_attempt(draft))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skill(id: SkillId, parent: Option<SkillId>) -> Skill {
        Skill {
            id,
            parent,
            level_names: vec!["a".into(), "b".into()],
            minimum_score: 50,
            minimum_answers: 1,
        }
    }

    #[test]
    fn test_create_attempt_rejects_second_open() {
        let mut data = Dataset::default();
        let first = data.create_attempt(NewAttempt::now(1, 1)).unwrap();
        let err = data.create_attempt(NewAttempt::now(1, 1)).unwrap_err();

        assert!(matches!(
            err,
            PathgateError::ConcurrentAttempt { existing } if existing == first.id
        ));
        // Other pairs are unaffected.
        assert!(data.create_attempt(NewAttempt::now(2, 1)).is_ok());
        assert!(data.create_attempt(NewAttempt::now(1, 2)).is_ok());
    }

    #[test]
    fn test_put_attempt_cannot_reopen_next_to_open() {
        let mut data = Dataset::default();
        let mut first = data.create_attempt(NewAttempt::now(1, 1)).unwrap();
        first.close(chrono::Utc::now());
        data.put_attempt(&first).unwrap();
        data.create_attempt(NewAttempt::now(1, 1)).unwrap();

        first.finalized = false;
        assert!(data.put_attempt(&first).is_err());
    }

    #[test]
    fn test_apply_failure_surfaces_error() {
        let mut data = Dataset::default();
        data.create_attempt(NewAttempt::now(1, 1)).unwrap();

        let batch = WriteBatch {
            create: Some(NewAttempt::now(1, 1)),
            ..Default::default()
        };
        assert!(data.apply(batch).is_err());
    }

    #[test]
    fn test_skill_tree_depth_first() {
        let mut data = Dataset::default();
        data.put_skill(&skill(1, None));
        data.put_skill(&skill(3, Some(1)));
        data.put_skill(&skill(2, Some(1)));
        data.put_skill(&skill(4, Some(2)));
        data.put_skill(&skill(9, None));

        let ids: Vec<SkillId> = data.skill_tree(1).iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 2, 4, 3]);
    }

    #[test]
    fn test_upsert_progress_replaces() {
        let mut data = Dataset::default();
        let mut record = ProgressRecord::zero(1, 1);
        data.upsert_progress(&record);
        record.progress = 50;
        data.upsert_progress(&record);

        assert_eq!(data.progress.len(), 1);
        assert_eq!(data.progress(1, 1).unwrap().progress, 50);
    }
}
