//! Score and progress aggregation.
//!
//! Pure arithmetic lives in free functions; [`ScoreAggregator`] loads what
//! they need from storage. Every division is guarded: an empty denominator
//! yields 0, never an error.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use serde::Serialize;

use crate::config::ScoringConfig;
use crate::core::{
    ActivityId, Answer, KeepResults, Module, ModuleAttempt, ModuleAttemptId, ModuleId,
    ProgressRecord, Training, Typology, UserId,
};
use crate::engine::{LearnerView, StepGraphResolver};
use crate::error::{FailOpen, PathgateError, Result};
use crate::identity::Membership;
use crate::storage::Store;

/// `num / den` rounded half up; 0 when `den` is 0.
pub fn round_ratio(num: u64, den: u64) -> u32 {
    if den == 0 {
        return 0;
    }
    ((num + den / 2) / den).min(u64::from(u32::MAX)) as u32
}

/// `100 * part / whole` rounded; 0 when `whole` is 0.
pub fn percent(part: u64, whole: u64) -> u32 {
    round_ratio(part.saturating_mul(100), whole)
}

/// Pick the module attempt that is authoritative for scoring.
///
/// An unfinished most recent attempt always wins. Otherwise `Newest` takes
/// the most recent attempt and `Best` the highest scoring finished one,
/// ties going to the most recent.
pub fn target_attempt(attempts: &[ModuleAttempt], keep: KeepResults) -> Option<&ModuleAttempt> {
    let latest = attempts.iter().max_by_key(|a| a.id)?;
    if !latest.is_finished() {
        return Some(latest);
    }

    match keep {
        KeepResults::Newest => Some(latest),
        KeepResults::Best => attempts
            .iter()
            .filter(|a| a.is_finished())
            .max_by_key(|a| (a.score, a.id)),
    }
}

/// The newest answer per activity, oldest activity first.
pub fn latest_answers(answers: &[Answer]) -> Vec<&Answer> {
    let mut latest: HashMap<ActivityId, &Answer> = HashMap::new();
    for answer in answers {
        match latest.get(&answer.activity_id) {
            Some(existing) if existing.id >= answer.id => {}
            _ => {
                latest.insert(answer.activity_id, answer);
            }
        }
    }
    let mut out: Vec<&Answer> = latest.into_values().collect();
    out.sort_by_key(|a| a.id);
    out
}

/// Max score of an answered activity.
///
/// The answer's own max wins, then the activity's; zero or unset falls back
/// to the configured default.
pub fn effective_max_score(answer: &Answer, module: Option<&Module>, default_max: u32) -> u32 {
    if answer.max_score > 0 {
        return answer.max_score;
    }
    module
        .and_then(|m| m.activity(answer.activity_id))
        .and_then(|a| a.max_score)
        .filter(|&max| max > 0)
        .unwrap_or(default_max)
}

/// Sum of the max scores of the answered activities.
///
/// Saturates at `u32::MAX`; the configured default stands in when nothing
/// was answered.
pub fn module_max_score(answers: &[Answer], module: Option<&Module>, default_max: u32) -> u32 {
    let total: u64 = latest_answers(answers)
        .iter()
        .map(|a| u64::from(effective_max_score(a, module, default_max)))
        .sum();
    if total == 0 {
        return default_max;
    }
    u32::try_from(total).unwrap_or(u32::MAX)
}

/// Points of a module: `round(score_percent * max_score / 100)`.
pub fn module_points(score_percent: u32, max_score: u32) -> u32 {
    round_ratio(u64::from(score_percent) * u64::from(max_score), 100)
}

/// Percent scored over the latest answer of each activity.
pub fn attempt_percent(answers: &[Answer], module: Option<&Module>, default_max: u32) -> u32 {
    let latest = latest_answers(answers);
    let scored: u64 = latest.iter().map(|a| u64::from(a.score)).sum();
    let max: u64 = latest
        .iter()
        .map(|a| u64::from(effective_max_score(a, module, default_max)))
        .sum();
    percent(scored, max).min(100)
}

/// Training progress in percent; 0 for a training without activities.
pub fn training_progress(attempted: usize, total: usize) -> u32 {
    percent(attempted as u64, total as u64).min(100)
}

/// Training score from `(mandatory, score)` pairs of its steps.
///
/// Averages the mandatory steps, or every step when none is mandatory.
/// Unscored steps count as 0.
pub fn training_score(steps: &[(bool, Option<u32>)]) -> u32 {
    let mandatory: Vec<_> = steps.iter().filter(|(m, _)| *m).collect();
    let counted: Vec<_> = if mandatory.is_empty() {
        steps.iter().collect()
    } else {
        mandatory
    };
    let sum: u64 = counted
        .iter()
        .map(|(_, s)| u64::from(s.unwrap_or(0)))
        .sum();
    round_ratio(sum, counted.len() as u64)
}

/// Authoritative score of a module for one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModuleScore {
    pub module_attempt_id: ModuleAttemptId,
    /// Score in percent.
    pub percent: u32,
    pub points: u32,
    pub max_score: u32,
    pub finished: bool,
}

/// Loads what the score functions need and keeps the progress cache fresh.
pub struct ScoreAggregator<'a, S: Store + ?Sized> {
    store: &'a S,
    membership: &'a dyn Membership,
    scoring: &'a ScoringConfig,
}

impl<'a, S: Store + ?Sized> ScoreAggregator<'a, S> {
    pub fn new(store: &'a S, membership: &'a dyn Membership, scoring: &'a ScoringConfig) -> Self {
        Self {
            store,
            membership,
            scoring,
        }
    }

    /// Recompute progress and score of the pair and upsert the cache.
    ///
    /// A failing cache write is logged; the computed record is still
    /// returned.
    pub fn refresh(&self, training: &Training, user_id: UserId) -> Result<ProgressRecord> {
        let sequence = StepGraphResolver::new(self.membership).visible(training, user_id);
        let view = LearnerView::load(self.store, training, user_id)?;

        let mut activities: HashSet<ActivityId> = HashSet::new();
        let mut seen_modules: HashSet<ModuleId> = HashSet::new();
        for step in sequence.iter().filter(|s| s.typology() == Typology::Module) {
            if !seen_modules.insert(step.entity_id()) {
                continue;
            }
            if let Some(module) = self.store.module(step.entity_id())? {
                activities.extend(module.activities.iter().map(|a| a.id));
            }
        }

        let mut attempted: HashSet<ActivityId> = HashSet::new();
        if let Some(attempt) = view.attempt() {
            for module_attempt in self.store.module_attempts_of(attempt.id)? {
                for answer in self.store.answers_for(module_attempt.id)? {
                    if activities.contains(&answer.activity_id) {
                        attempted.insert(answer.activity_id);
                    }
                }
            }
        }

        let top_level: Vec<(bool, Option<u32>)> = sequence
            .iter()
            .filter(|s| s.is_top_level())
            .map(|s| (s.step.mandatory, view.record(s.id()).score))
            .collect();

        let record = ProgressRecord {
            user_id,
            training_id: training.id,
            progress: training_progress(attempted.len(), activities.len()),
            score: training_score(&top_level),
            updated: Utc::now(),
        };

        tracing::debug!(
            training_id = training.id,
            user_id,
            attempted = attempted.len(),
            total = activities.len(),
            progress = record.progress,
            score = record.score,
            "progress refreshed"
        );
        self.store
            .upsert_progress(&record)
            .fail_open_default("updating progress cache");
        Ok(record)
    }

    /// Training progress in percent.
    pub fn get_progress(&self, training: &Training, user_id: UserId) -> Result<u32> {
        Ok(self.refresh(training, user_id)?.progress)
    }

    /// Training score in percent.
    pub fn get_score(&self, training: &Training, user_id: UserId) -> Result<u32> {
        Ok(self.refresh(training, user_id)?.score)
    }

    /// Score of a module across all of the user's attempts on it.
    pub fn module_score(
        &self,
        user_id: UserId,
        module_id: ModuleId,
    ) -> Result<Option<ModuleScore>> {
        let module = self.store.module(module_id)?;
        let attempts = self.store.module_attempts(user_id, module_id)?;
        let keep = module.as_ref().map(|m| m.keep_results).unwrap_or_default();

        let Some(target) = target_attempt(&attempts, keep) else {
            return Ok(None);
        };
        let answers = self.store.answers_for(target.id)?;
        let max_score = module_max_score(
            &answers,
            module.as_ref(),
            self.scoring.default_activity_max_score,
        );

        Ok(Some(ModuleScore {
            module_attempt_id: target.id,
            percent: target.score,
            points: module_points(target.score, max_score),
            max_score,
            finished: target.is_finished(),
        }))
    }

    /// Finish a module attempt of the open training attempt.
    ///
    /// Scores it from its answers, stamps `finished` and refreshes the
    /// progress cache.
    pub fn record_module_attempt_finish(
        &self,
        training: &Training,
        user_id: UserId,
        module_attempt_id: ModuleAttemptId,
    ) -> Result<ModuleAttempt> {
        let attempt = self.store.open_attempt(user_id, training.id)?.ok_or(
            PathgateError::NoOpenAttempt {
                training_id: training.id,
                user_id,
            },
        )?;
        let mut module_attempt = self
            .store
            .module_attempts_of(attempt.id)?
            .into_iter()
            .find(|m| m.id == module_attempt_id)
            .ok_or(PathgateError::ModuleAttemptNotFound { module_attempt_id })?;

        let module = self.store.module(module_attempt.module_id)?;
        let answers = self.store.answers_for(module_attempt.id)?;

        module_attempt.score = attempt_percent(
            &answers,
            module.as_ref(),
            self.scoring.default_activity_max_score,
        );
        module_attempt.last_activity_id =
            answers.iter().max_by_key(|a| a.id).map(|a| a.activity_id);
        if module_attempt.finished.is_none() {
            module_attempt.finished = Some(Utc::now());
        }
        self.store.put_module_attempt(&module_attempt)?;

        tracing::info!(
            training_id = training.id,
            user_id,
            module_attempt_id,
            score = module_attempt.score,
            "module attempt finished"
        );

        self.refresh(training, user_id)?;
        Ok(module_attempt)
    }
}
