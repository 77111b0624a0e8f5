//! Skill-stage progression.
//!
//! A skill has one stage per level name. Learners start at the highest
//! stage and move down one stage at a time by answering enough activities of
//! the current stage well enough; stage 0 is full mastery.

use crate::core::{Answer, Skill, SkillId, SkillStatistic, UserId};
use crate::error::{PathgateError, Result};
use crate::events::{emit, EventSink, PathEventType};
use crate::stats::scoring::{effective_max_score, latest_answers};
use crate::storage::Store;

/// Result of walking a skill's stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkillProgression {
    pub stage: u32,
    /// Mastery in percent.
    pub progress: u32,
    pub score: u32,
}

/// Mastery percent of a stage: `100 - stage * 100 / initial_level`.
///
/// Integer division, so stage 2 of 3 is 34.
pub fn stage_progress(stage: u32, initial_level: u32) -> u32 {
    if initial_level == 0 {
        return 100;
    }
    100u32.saturating_sub(stage.min(initial_level) * 100 / initial_level)
}

/// Walk the stages of `skill` down from the recorded stage.
///
/// At each stage the newest `minimum_answers` answers tagged with it are
/// averaged; an average at or above `minimum_score` passes the stage. The
/// walk stops at the first stage without enough answers or with too low an
/// average. `score` is the average of the last evaluated stage, or the
/// previous score when no stage could be evaluated.
pub fn progress_skill(
    skill: &Skill,
    answers: &[Answer],
    previous: Option<&SkillStatistic>,
    default_max: u32,
) -> SkillProgression {
    let initial = skill.initial_level();
    let mut stage = previous.map(|p| p.stage).unwrap_or(initial).min(initial);
    let mut score = previous.map(|p| p.score).unwrap_or(0);
    let needed = skill.minimum_answers as usize;

    let latest: Vec<&Answer> = latest_answers(answers)
        .into_iter()
        .filter(|a| a.skill.is_some_and(|s| s.skill_id == skill.id))
        .collect();

    while stage > 0 {
        let mut at_stage: Vec<&&Answer> = latest
            .iter()
            .filter(|a| a.skill.is_some_and(|s| s.level == stage))
            .collect();
        if at_stage.len() < needed {
            break;
        }

        at_stage.sort_by(|a, b| b.id.cmp(&a.id));
        let average = if needed == 0 {
            100
        } else {
            let total: f64 = at_stage
                .iter()
                .take(needed)
                .map(|a| normalized(a, default_max))
                .sum();
            (total / needed as f64 * 100.0).round() as u32
        };
        score = average;

        if average < skill.minimum_score {
            break;
        }
        stage -= 1;
    }

    SkillProgression {
        stage,
        progress: stage_progress(stage, initial),
        score,
    }
}

fn normalized(answer: &Answer, default_max: u32) -> f64 {
    let max = effective_max_score(answer, None, default_max);
    if max == 0 {
        return 1.0;
    }
    f64::from(answer.score) / f64::from(max)
}

/// Whether every node of a skill tree is mastered.
///
/// Nodes are checked leaf-most first; a missing statistic, progress below
/// 100 or a score below the node's minimum fails the whole tree. An empty
/// tree is not finished.
pub fn tree_finished(
    tree: &[Skill],
    statistic: impl Fn(SkillId) -> Option<SkillStatistic>,
) -> bool {
    !tree.is_empty()
        && tree.iter().rev().all(|skill| {
            statistic(skill.id)
                .is_some_and(|s| s.progress == 100 && s.score >= skill.minimum_score)
        })
}

/// Loads answers and persists skill statistics.
pub struct SkillTracker<'a, S: Store + ?Sized> {
    store: &'a S,
    events: &'a dyn EventSink,
    default_max: u32,
}

impl<'a, S: Store + ?Sized> SkillTracker<'a, S> {
    pub fn new(store: &'a S, events: &'a dyn EventSink, default_max: u32) -> Self {
        Self {
            store,
            events,
            default_max,
        }
    }

    /// Recompute and store a user's statistic for one skill.
    pub fn compute(&self, user_id: UserId, skill_id: SkillId) -> Result<SkillStatistic> {
        let skill = self
            .store
            .skill(skill_id)?
            .ok_or(PathgateError::SkillNotFound { skill_id })?;
        let previous = self.store.skill_statistic(user_id, skill_id)?;
        let answers = self.store.answers_by_skill(user_id, skill_id)?;

        let result = progress_skill(&skill, &answers, previous.as_ref(), self.default_max);
        let statistic = SkillStatistic {
            user_id,
            skill_id,
            score: result.score,
            progress: result.progress,
            stage: result.stage,
        };
        self.store.put_skill_statistic(&statistic)?;

        let from_stage = previous
            .map(|p| p.stage)
            .unwrap_or_else(|| skill.initial_level());
        if from_stage != statistic.stage {
            tracing::info!(
                user_id,
                skill_id,
                from_stage,
                to_stage = statistic.stage,
                "skill stage changed"
            );
            emit(
                self.events,
                PathEventType::SkillStageChanged {
                    user_id,
                    skill_id,
                    from_stage,
                    to_stage: statistic.stage,
                },
            );
        }
        Ok(statistic)
    }

    /// Whether the user mastered the skill and all of its descendants.
    pub fn tree_finished(&self, user_id: UserId, root: SkillId) -> Result<bool> {
        let tree = self.store.skill_tree(root)?;
        let mut statistics = Vec::with_capacity(tree.len());
        for skill in &tree {
            statistics.push(self.store.skill_statistic(user_id, skill.id)?);
        }
        Ok(tree_finished(&tree, |id| {
            statistics
                .iter()
                .flatten()
                .find(|s| s.skill_id == id)
                .cloned()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SkillTag;
    use crate::events::MemoryEventSink;
    use crate::storage::MemoryStore;
    use chrono::Utc;

    fn skill(levels: usize, minimum_score: u32, minimum_answers: u32) -> Skill {
        Skill {
            id: 1,
            parent: None,
            level_names: (0..levels).map(|i| format!("level {}", i + 1)).collect(),
            minimum_score,
            minimum_answers,
        }
    }

    fn answer(id: u64, activity_id: u64, level: u32, score: u32) -> Answer {
        Answer {
            id,
            user_id: 5,
            activity_id,
            module_attempt_id: 1,
            score,
            max_score: 10,
            evaluated: true,
            skill: Some(SkillTag { skill_id: 1, level }),
            created: Utc::now(),
        }
    }

    #[test]
    fn test_two_good_answers_pass_one_stage() {
        let skill = skill(3, 60, 2);
        let answers = vec![answer(1, 1, 3, 6), answer(2, 2, 3, 8)];

        let result = progress_skill(&skill, &answers, None, 10);
        assert_eq!(result.stage, 2);
        assert_eq!(result.progress, 34);
        assert_eq!(result.score, 70);
    }

    #[test]
    fn test_not_enough_answers_stays() {
        let skill = skill(3, 60, 2);
        let answers = vec![answer(1, 1, 3, 10)];

        let result = progress_skill(&skill, &answers, None, 10);
        assert_eq!(result.stage, 3);
        assert_eq!(result.progress, 0);
        assert_eq!(result.score, 0);
    }

    #[test]
    fn test_low_average_stops() {
        let skill = skill(2, 60, 1);
        let answers = vec![answer(1, 1, 2, 3)];

        let result = progress_skill(&skill, &answers, None, 10);
        assert_eq!(result.stage, 2);
        assert_eq!(result.score, 30);
    }

    #[test]
    fn test_walks_down_to_mastery() {
        let skill = skill(2, 50, 1);
        let answers = vec![answer(1, 1, 2, 9), answer(2, 2, 1, 5)];

        let result = progress_skill(&skill, &answers, None, 10);
        assert_eq!(result.stage, 0);
        assert_eq!(result.progress, 100);
        assert_eq!(result.score, 50);
    }

    #[test]
    fn test_newest_answer_per_activity_counts() {
        let skill = skill(1, 60, 1);
        let answers = vec![answer(1, 1, 1, 10), answer(2, 1, 1, 2)];

        let result = progress_skill(&skill, &answers, None, 10);
        assert_eq!(result.stage, 1);
        assert_eq!(result.score, 20);
    }

    #[test]
    fn test_recorded_stage_is_clamped_and_kept() {
        let skill = skill(3, 60, 2);
        let previous = SkillStatistic {
            user_id: 5,
            skill_id: 1,
            score: 80,
            progress: 67,
            stage: 1,
        };

        let result = progress_skill(&skill, &[], Some(&previous), 10);
        assert_eq!(result.stage, 1);
        assert_eq!(result.progress, 67);
        assert_eq!(result.score, 80);

        let beyond = SkillStatistic {
            stage: 9,
            ..previous
        };
        assert_eq!(progress_skill(&skill, &[], Some(&beyond), 10).stage, 3);
    }

    #[test]
    fn test_zero_minimum_answers_is_neutral() {
        let skill = skill(2, 60, 0);
        let result = progress_skill(&skill, &[], None, 10);
        assert_eq!(result.stage, 0);
        assert_eq!(result.score, 100);
    }

    #[test]
    fn test_stage_progress() {
        assert_eq!(stage_progress(0, 3), 100);
        assert_eq!(stage_progress(3, 3), 0);
        assert_eq!(stage_progress(1, 3), 67);
        assert_eq!(stage_progress(1, 0), 100);
    }

    #[test]
    fn test_tree_finished() {
        let mut root = skill(1, 60, 1);
        root.id = 1;
        let mut child = skill(1, 80, 1);
        child.id = 2;
        child.parent = Some(1);
        let tree = vec![root, child];

        let mastered = |score: u32| {
            move |id: SkillId| {
                Some(SkillStatistic {
                    user_id: 5,
                    skill_id: id,
                    score,
                    progress: 100,
                    stage: 0,
                })
            }
        };

        assert!(tree_finished(&tree, mastered(90)));
        assert!(!tree_finished(&tree, mastered(70)));
        assert!(!tree_finished(&tree, |_| None));
        assert!(!tree_finished(&[], mastered(100)));
    }

    #[test]
    fn test_tracker_persists_and_emits() {
        let store = MemoryStore::new();
        store.put_skill(&skill(3, 60, 2)).unwrap();
        store.put_answer(&answer(1, 1, 3, 7)).unwrap();
        store.put_answer(&answer(2, 2, 3, 7)).unwrap();
        let events = MemoryEventSink::new();
        let tracker = SkillTracker::new(&store, &events, 10);

        let statistic = tracker.compute(5, 1).unwrap();
        assert_eq!(statistic.stage, 2);
        assert_eq!(statistic.progress, 34);
        assert_eq!(store.skill_statistic(5, 1).unwrap().unwrap(), statistic);
        assert_eq!(events.names(), vec!["skill_stage_changed"]);

        // Unchanged stage emits nothing.
        tracker.compute(5, 1).unwrap();
        assert_eq!(events.names().len(), 1);

        assert!(!tracker.tree_finished(5, 1).unwrap());
        assert!(matches!(
            tracker.compute(5, 99),
            Err(PathgateError::SkillNotFound { skill_id: 99 })
        ));
    }
}
