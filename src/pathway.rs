//! The public operations of pathgate.
//!
//! [`Pathway`] owns a store and the collaborators every operation needs
//! (membership, navigation targets, an event sink and the configuration) and
//! wires the resolver, gate, lifecycle manager and aggregators together.

use crate::config::Config;
use crate::core::{
    Attempt, AttemptStatus, ModuleAttempt, ModuleAttemptId, ModuleId, NavigationContext,
    NavigationMode, SkillId, SkillStatistic, Training, TrainingId, UserId,
};
use crate::engine::{
    AttemptLifecycleManager, GatingEngine, LearnerView, NextStep, ResolvedStep, StepGraphResolver,
    StepTarget,
};
use crate::error::{GateBlock, PathgateError, Result};
use crate::events::{emit, EventSink, NullEventSink, PathEventType};
use crate::identity::{Membership, OpenMembership};
use crate::navigation::{DefaultTargets, NavigationTargets};
use crate::stats::scoring::training_score;
use crate::stats::{ModuleScore, ScoreAggregator, SkillTracker};
use crate::storage::Store;

/// Progression engine bound to a store.
pub struct Pathway<S: Store> {
    store: S,
    membership: Box<dyn Membership>,
    targets: Box<dyn NavigationTargets>,
    events: Box<dyn EventSink>,
    config: Config,
}

impl<S: Store> Pathway<S> {
    /// Create a pathway with open membership, default targets and no event
    /// delivery.
    pub fn new(store: S, config: Config) -> Self {
        Self {
            store,
            membership: Box::new(OpenMembership),
            targets: Box::new(DefaultTargets),
            events: Box::new(NullEventSink),
            config,
        }
    }

    pub fn with_membership(mut self, membership: impl Membership + 'static) -> Self {
        self.membership = Box::new(membership);
        self
    }

    pub fn with_targets(mut self, targets: impl NavigationTargets + 'static) -> Self {
        self.targets = Box::new(targets);
        self
    }

    pub fn with_events(mut self, events: impl EventSink + 'static) -> Self {
        self.events = Box::new(events);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // =========================================================================
    // Steps
    // =========================================================================

    /// Ordered, visible steps of a training.
    ///
    /// `mode` defaults to the training's own navigation mode.
    pub fn resolve_steps(
        &self,
        training_id: TrainingId,
        user_id: UserId,
        mode: Option<NavigationMode>,
    ) -> Result<Vec<ResolvedStep>> {
        let training = self.training(training_id)?;
        let view = LearnerView::load(&self.store, &training, user_id)?;
        let gate = GatingEngine::new(&view, self.targets.as_ref());
        self.resolver().resolve(
            &training,
            user_id,
            mode.unwrap_or(training.navigation),
            &gate,
        )
    }

    /// Where the learner lands when entering the training.
    pub fn first_step(&self, training_id: TrainingId, user_id: UserId) -> Result<StepTarget> {
        let training = self.training(training_id)?;
        let view = LearnerView::load(&self.store, &training, user_id)?;
        let gate = GatingEngine::new(&view, self.targets.as_ref());
        let step = self.resolver().first_step(
            &training,
            user_id,
            training.navigation,
            &gate,
            view.attempt(),
        )?;
        Ok(StepTarget {
            destination: self.targets.step_target(training.id, &step),
            step,
        })
    }

    /// Advance past the step in `context`.
    ///
    /// Refuses with `StructuralDrift` while a stale completion is recorded
    /// and with `Blocked` when the step's rule is not met. Otherwise records
    /// the next step on the open attempt and returns it, or completes the
    /// training when `context` names the last step.
    pub fn get_next_step(&self, context: NavigationContext, user_id: UserId) -> Result<NextStep> {
        let training = self.training(context.training_id)?;
        self.lifecycle().check_drift(&training, user_id)?;

        let view = LearnerView::load(&self.store, &training, user_id)?;
        let gate = GatingEngine::new(&view, self.targets.as_ref());
        let sequence = self.resolver().visible(&training, user_id);
        if sequence.is_empty() {
            return Err(PathgateError::NoSteps {
                training_id: training.id,
            });
        }

        let index = sequence
            .iter()
            .position(|s| s.id() == context.current_step_id)
            .ok_or(PathgateError::StepNotFound {
                training_id: training.id,
                step_id: context.current_step_id,
            })?;
        let step = &sequence[index];

        if let Err(block) = gate.can_proceed(&sequence, step, training.navigation) {
            self.report_block(&training, user_id, step, &block);
            return Err(block.into());
        }

        if let Some(next) = sequence.get(index + 1) {
            if let Some(attempt) = view.attempt() {
                let mut attempt = attempt.clone();
                attempt.current_step = Some(next.id());
                self.store.put_attempt(&attempt)?;
            }
            tracing::debug!(
                training_id = training.id,
                user_id,
                step_id = step.id(),
                next_step_id = next.id(),
                "advancing"
            );
            return Ok(NextStep::Step(StepTarget {
                destination: self.targets.step_target(training.id, next),
                step: next.clone(),
            }));
        }

        let passed = sequence
            .iter()
            .filter(|s| s.step.mandatory)
            .all(|s| gate.satisfies(s));
        let status = if passed {
            AttemptStatus::Passed
        } else {
            AttemptStatus::Failed
        };
        let top_level: Vec<(bool, Option<u32>)> = sequence
            .iter()
            .filter(|s| s.is_top_level())
            .map(|s| (s.step.mandatory, view.record(s.id()).score))
            .collect();

        let lifecycle = self.lifecycle();
        if view.attempt().is_none() {
            lifecycle.start(training.id, user_id)?;
        }
        let attempt = lifecycle.complete(&training, user_id, status, training_score(&top_level))?;
        self.scores().refresh(&training, user_id)?;

        Ok(NextStep::Completed {
            attempt,
            destination: self.targets.landing_target(training.id),
        })
    }

    fn report_block(
        &self,
        training: &Training,
        user_id: UserId,
        step: &ResolvedStep,
        block: &GateBlock,
    ) {
        tracing::info!(
            training_id = training.id,
            user_id,
            step_id = step.id(),
            reason = block.kind(),
            remediation = block.remediation().step_id,
            "gate blocked"
        );
        emit(
            self.events.as_ref(),
            PathEventType::GateBlocked {
                training_id: training.id,
                user_id,
                step_id: step.id(),
                reason: block.kind().to_string(),
            },
        );
        if matches!(block, GateBlock::ManualGradingPending { .. }) {
            emit(
                self.events.as_ref(),
                PathEventType::ManualGradingPending {
                    training_id: training.id,
                    user_id,
                    step_id: step.id(),
                },
            );
        }
    }

    // =========================================================================
    // Attempts
    // =========================================================================

    /// Start an attempt, or return the open one.
    pub fn start_attempt(&self, training_id: TrainingId, user_id: UserId) -> Result<Attempt> {
        let training = self.training(training_id)?;
        self.lifecycle().start(training.id, user_id)
    }

    /// Finalize a completed attempt and start a fresh one.
    pub fn restart_attempt(&self, training_id: TrainingId, user_id: UserId) -> Result<Attempt> {
        let training = self.training(training_id)?;
        self.lifecycle().restart(training.id, user_id)
    }

    /// Differences between the recorded completion and the live training.
    pub fn check_drift(&self, training_id: TrainingId, user_id: UserId) -> Result<Vec<String>> {
        let training = self.training(training_id)?;
        self.lifecycle().drift(&training, user_id)
    }

    /// Drop a completion recorded against an older training structure.
    pub fn discard_stale_completion(
        &self,
        training_id: TrainingId,
        user_id: UserId,
    ) -> Result<Attempt> {
        let training = self.training(training_id)?;
        self.lifecycle()
            .discard_stale_completion(training.id, user_id)
    }

    // =========================================================================
    // Scores
    // =========================================================================

    /// Training progress in percent.
    pub fn get_progress(&self, training_id: TrainingId, user_id: UserId) -> Result<u32> {
        let training = self.training(training_id)?;
        self.scores().get_progress(&training, user_id)
    }

    /// Training score in percent.
    pub fn get_score(&self, training_id: TrainingId, user_id: UserId) -> Result<u32> {
        let training = self.training(training_id)?;
        self.scores().get_score(&training, user_id)
    }

    pub fn get_module_score(
        &self,
        user_id: UserId,
        module_id: ModuleId,
    ) -> Result<Option<ModuleScore>> {
        self.scores().module_score(user_id, module_id)
    }

    /// Score and finish a module attempt of the open training attempt.
    pub fn record_module_attempt_finish(
        &self,
        training_id: TrainingId,
        user_id: UserId,
        module_attempt_id: ModuleAttemptId,
    ) -> Result<ModuleAttempt> {
        let training = self.training(training_id)?;
        self.scores()
            .record_module_attempt_finish(&training, user_id, module_attempt_id)
    }

    // =========================================================================
    // Skills
    // =========================================================================

    pub fn compute_skill_progression(
        &self,
        user_id: UserId,
        skill_id: SkillId,
    ) -> Result<SkillStatistic> {
        self.skills().compute(user_id, skill_id)
    }

    pub fn skills_tree_finished(&self, user_id: UserId, root: SkillId) -> Result<bool> {
        self.skills().tree_finished(user_id, root)
    }

    // =========================================================================
    // Wiring
    // =========================================================================

    fn training(&self, training_id: TrainingId) -> Result<Training> {
        self.store
            .training(training_id)?
            .ok_or(PathgateError::TrainingNotFound { training_id })
    }

    fn resolver(&self) -> StepGraphResolver<'_> {
        StepGraphResolver::new(self.membership.as_ref())
    }

    fn lifecycle(&self) -> AttemptLifecycleManager<'_, S> {
        AttemptLifecycleManager::new(&self.store, self.events.as_ref())
    }

    fn scores(&self) -> ScoreAggregator<'_, S> {
        ScoreAggregator::new(&self.store, self.membership.as_ref(), &self.config.scoring)
    }

    fn skills(&self) -> SkillTracker<'_, S> {
        SkillTracker::new(
            &self.store,
            self.events.as_ref(),
            self.config.scoring.default_activity_max_score,
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::core::{Activity, Answer, Module, Position, Skill, SkillTag, Step, Typology};
    use crate::events::MemoryEventSink;
    use crate::storage::MemoryStore;
    use chrono::Utc;

    const USER: UserId = 5;
    const OWNER: UserId = 99;

    fn guided_modules() -> Training {
        (0..3u64).fold(Training::new(1, OWNER, NavigationMode::Guided), |t, i| {
            t.with_step(
                Step::module(i + 1, (i + 1) * 10)
                    .mandatory()
                    .with_required_score(70)
                    .at(Position::index(i as i32)),
            )
        })
    }

    fn pathway(training: Training) -> (Pathway<MemoryStore>, Arc<MemoryEventSink>) {
        let store = MemoryStore::new();
        for module_id in training.module_ids() {
            store
                .put_module(&Module::new(
                    module_id,
                    vec![Activity::new(module_id + 1, Some(100))],
                ))
                .unwrap();
        }
        store.put_training(&training).unwrap();
        let sink = Arc::new(MemoryEventSink::new());
        let pathway = Pathway::new(store, Config::default()).with_events(sink.clone());
        (pathway, sink)
    }

    /// Answer the module's single activity and finish the module attempt.
    fn take_module(pathway: &Pathway<MemoryStore>, module_id: ModuleId, score: u32) {
        let attempt = pathway.start_attempt(1, USER).unwrap();
        let store = pathway.store();
        let module_attempt = store
            .create_module_attempt(USER, module_id, attempt.id)
            .unwrap();
        let id = store
            .module_attempts(USER, module_id)
            .unwrap()
            .len() as u64
            + module_id * 100;
        store
            .put_answer(&Answer {
                id,
                user_id: USER,
                activity_id: module_id + 1,
                module_attempt_id: module_attempt.id,
                score,
                max_score: 100,
                evaluated: true,
                skill: None,
                created: Utc::now(),
            })
            .unwrap();
        pathway
            .record_module_attempt_finish(1, USER, module_attempt.id)
            .unwrap();
    }

    fn next(pathway: &Pathway<MemoryStore>, step_id: u64) -> Result<NextStep> {
        pathway.get_next_step(NavigationContext::new(1, step_id), USER)
    }

    #[test]
    fn test_guided_remediation_then_pass() {
        let (pathway, sink) = pathway(guided_modules());
        take_module(&pathway, 10, 80);
        take_module(&pathway, 20, 60);
        take_module(&pathway, 30, 90);

        match next(&pathway, 1).unwrap() {
            NextStep::Step(target) => {
                assert_eq!(target.step.id(), 2);
                assert_eq!(target.destination.as_str(), "step:1:module:20");
            }
            other => panic!("expected step, got {:?}", other),
        }

        match next(&pathway, 2) {
            Err(PathgateError::Blocked(GateBlock::InsufficientScore {
                required,
                best_score,
                remediation,
            })) => {
                assert_eq!(required, 70);
                assert_eq!(best_score, Some(60));
                assert_eq!(remediation.step_id, 2);
            }
            other => panic!("expected insufficient score, got {:?}", other),
        }
        assert!(sink.names().contains(&"gate_blocked"));

        take_module(&pathway, 20, 75);
        assert!(matches!(next(&pathway, 2).unwrap(), NextStep::Step(t) if t.step.id() == 3));

        match next(&pathway, 3).unwrap() {
            NextStep::Completed {
                attempt,
                destination,
            } => {
                assert_eq!(attempt.status, AttemptStatus::Passed);
                assert_eq!(attempt.score, 82);
                assert!(attempt.completed_structure.is_some());
                assert_eq!(destination.as_str(), "training:1");
            }
            other => panic!("expected completion, got {:?}", other),
        }
        assert_eq!(pathway.get_score(1, USER).unwrap(), 82);
        assert_eq!(pathway.get_progress(1, USER).unwrap(), 100);
    }

    #[test]
    fn test_skill_stage_progression() {
        let (pathway, sink) = pathway(guided_modules());
        pathway
            .store()
            .put_skill(&Skill {
                id: 4,
                parent: None,
                level_names: vec!["novice".into(), "adept".into(), "expert".into()],
                minimum_score: 60,
                minimum_answers: 2,
            })
            .unwrap();
        for (id, score) in [(1u64, 6u32), (2, 8)] {
            pathway
                .store()
                .put_answer(&Answer {
                    id,
                    user_id: USER,
                    activity_id: id,
                    module_attempt_id: 1,
                    score,
                    max_score: 10,
                    evaluated: true,
                    skill: Some(SkillTag {
                        skill_id: 4,
                        level: 3,
                    }),
                    created: Utc::now(),
                })
                .unwrap();
        }

        let statistic = pathway.compute_skill_progression(USER, 4).unwrap();
        assert_eq!(statistic.stage, 2);
        assert_eq!(statistic.progress, 34);
        assert!(!pathway.skills_tree_finished(USER, 4).unwrap());
        assert_eq!(sink.names(), vec!["skill_stage_changed"]);
    }

    #[test]
    fn test_restart_refused_while_in_progress() {
        let (pathway, _) = pathway(guided_modules());
        let attempt = pathway.start_attempt(1, USER).unwrap();
        let mut module_attempt = pathway
            .store()
            .create_module_attempt(USER, 10, attempt.id)
            .unwrap();
        module_attempt.score = 40;
        pathway.store().put_module_attempt(&module_attempt).unwrap();

        assert!(matches!(
            pathway.restart_attempt(1, USER),
            Err(PathgateError::AttemptInProgress { attempt_id }) if attempt_id == attempt.id
        ));
        assert!(pathway.store().open_attempt(USER, 1).unwrap().is_some());
    }

    #[test]
    fn test_removed_course_raises_drift() {
        let training = Training::new(1, OWNER, NavigationMode::Guided)
            .with_step(Step::module(1, 10).mandatory().at(Position::index(0)))
            .with_step(
                Step::course(2, 200, vec![Step::module(3, 30).mandatory()])
                    .mandatory()
                    .at(Position::index(1)),
            );
        let (pathway, sink) = pathway(training.clone());
        take_module(&pathway, 10, 100);
        take_module(&pathway, 30, 100);

        assert!(matches!(next(&pathway, 1).unwrap(), NextStep::Step(_)));
        assert!(matches!(next(&pathway, 2).unwrap(), NextStep::Step(_)));
        assert!(matches!(
            next(&pathway, 3).unwrap(),
            NextStep::Completed { attempt, .. } if attempt.status == AttemptStatus::Passed
        ));

        let mut edited = training;
        edited.steps.retain(|s| s.typology() != Typology::Course);
        pathway.store().put_training(&edited).unwrap();

        match next(&pathway, 1) {
            Err(PathgateError::StructuralDrift { differences, .. }) => {
                assert!(!differences.is_empty());
            }
            other => panic!("expected drift, got {:?}", other),
        }
        assert!(sink.names().contains(&"structural_drift"));
        assert!(!pathway.check_drift(1, USER).unwrap().is_empty());

        let fresh = pathway.discard_stale_completion(1, USER).unwrap();
        assert_eq!(fresh.status, AttemptStatus::InProgress);
        assert!(pathway.check_drift(1, USER).unwrap().is_empty());
        assert!(matches!(
            next(&pathway, 1),
            Err(PathgateError::Blocked(GateBlock::AttemptRequired { .. }))
        ));
    }

    #[test]
    fn test_start_is_idempotent() {
        let (pathway, sink) = pathway(guided_modules());
        let first = pathway.start_attempt(1, USER).unwrap();
        let second = pathway.start_attempt(1, USER).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(sink.names(), vec!["attempt_started"]);
    }

    #[test]
    fn test_restart_leaves_one_open_attempt() {
        let (pathway, _) = pathway(guided_modules());
        take_module(&pathway, 10, 90);
        take_module(&pathway, 20, 90);
        take_module(&pathway, 30, 90);
        let old = pathway.start_attempt(1, USER).unwrap();
        pathway
            .store()
            .create_module_attempt(USER, 10, old.id)
            .unwrap();
        assert!(matches!(next(&pathway, 3).unwrap(), NextStep::Completed { .. }));

        let before = pathway
            .resolve_steps(1, USER, Some(NavigationMode::Free))
            .unwrap();
        let fresh = pathway.restart_attempt(1, USER).unwrap();
        let after = pathway
            .resolve_steps(1, USER, Some(NavigationMode::Free))
            .unwrap();

        assert_eq!(before, after);
        assert_ne!(fresh.id, old.id);
        let open: Vec<_> = pathway
            .store()
            .attempts(USER, 1)
            .unwrap()
            .into_iter()
            .filter(|a| a.is_open())
            .collect();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].status, AttemptStatus::InProgress);
        assert!(pathway
            .store()
            .module_attempts_of(old.id)
            .unwrap()
            .iter()
            .all(|m| m.finalized));
        assert_eq!(pathway.get_progress(1, USER).unwrap(), 0);
    }

    #[test]
    fn test_progress_without_activities_is_zero() {
        let training = Training::new(1, OWNER, NavigationMode::Free).with_step(Step::meeting(1, 7));
        let (pathway, _) = pathway(training);
        pathway.start_attempt(1, USER).unwrap();

        assert_eq!(pathway.get_progress(1, USER).unwrap(), 0);
    }

    #[test]
    fn test_manual_grading_blocks_and_notifies() {
        let training = Training::new(1, OWNER, NavigationMode::Guided)
            .with_step(Step::module(1, 10).mandatory().at(Position::index(0)))
            .with_step(Step::module(2, 20).at(Position::index(1)));
        let (pathway, sink) = pathway(training);
        pathway
            .store()
            .put_module(&Module::new(10, vec![Activity::new(11, Some(10)).manually_graded()]))
            .unwrap();
        let attempt = pathway.start_attempt(1, USER).unwrap();
        let module_attempt = pathway
            .store()
            .create_module_attempt(USER, 10, attempt.id)
            .unwrap();
        pathway
            .store()
            .put_answer(&Answer {
                id: 1,
                user_id: USER,
                activity_id: 11,
                module_attempt_id: module_attempt.id,
                score: 0,
                max_score: 10,
                evaluated: false,
                skill: None,
                created: Utc::now(),
            })
            .unwrap();
        pathway
            .record_module_attempt_finish(1, USER, module_attempt.id)
            .unwrap();

        let err = next(&pathway, 1).unwrap_err();
        assert!(matches!(
            err,
            PathgateError::Blocked(ref block) if block.clears_by_itself()
        ));
        assert_eq!(
            sink.names(),
            vec!["attempt_started", "gate_blocked", "manual_grading_pending"]
        );
    }

    #[test]
    fn test_first_step_resumes_recorded_step() {
        let (pathway, _) = pathway(guided_modules());
        assert_eq!(pathway.first_step(1, USER).unwrap().step.id(), 1);

        take_module(&pathway, 10, 90);
        next(&pathway, 1).unwrap();

        let target = pathway.first_step(1, USER).unwrap();
        assert_eq!(target.step.id(), 2);
        assert_eq!(target.destination.as_str(), "step:1:module:20");
    }

    #[test]
    fn test_unknown_training_and_step() {
        let (pathway, _) = pathway(guided_modules());

        assert!(matches!(
            pathway.start_attempt(7, USER),
            Err(PathgateError::TrainingNotFound { training_id: 7 })
        ));
        assert!(matches!(
            next(&pathway, 42),
            Err(PathgateError::StepNotFound { step_id: 42, .. })
        ));
    }

    #[test]
    fn test_empty_training_has_no_steps() {
        let (pathway, _) = pathway(Training::new(1, OWNER, NavigationMode::Free));

        assert!(matches!(
            pathway.resolve_steps(1, USER, None),
            Err(PathgateError::NoSteps { training_id: 1 })
        ));
        assert_eq!(pathway.get_progress(1, USER).unwrap(), 0);
    }

    #[test]
    fn test_nested_course_gates_outer_course() {
        let training = Training::new(1, OWNER, NavigationMode::Guided).with_step(
            Step::course(
                1,
                100,
                vec![
                    Step::module(2, 20).at(Position::index(0)),
                    Step::course(3, 300, vec![Step::module(4, 40)]).at(Position::index(1)),
                ],
            )
            .mandatory()
            .with_required_score(70),
        );
        let (pathway, _) = pathway(training);
        take_module(&pathway, 20, 10);
        take_module(&pathway, 40, 10);

        match next(&pathway, 4) {
            Err(PathgateError::Blocked(GateBlock::InsufficientScore {
                required,
                best_score,
                remediation,
            })) => {
                assert_eq!(required, 70);
                assert_eq!(best_score, Some(10));
                assert_eq!(remediation.step_id, 2);
            }
            other => panic!("expected insufficient score, got {:?}", other),
        }

        take_module(&pathway, 20, 90);
        take_module(&pathway, 40, 80);
        match next(&pathway, 4).unwrap() {
            NextStep::Completed { attempt, .. } => {
                assert_eq!(attempt.status, AttemptStatus::Passed);
                assert_eq!(attempt.score, 85);
            }
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[test]
    fn test_optional_training_completes_without_started_attempt() {
        let training = Training::new(1, OWNER, NavigationMode::Guided)
            .with_step(Step::module(1, 10).at(Position::index(0)))
            .with_step(Step::module(2, 20).at(Position::index(1)));
        let (pathway, sink) = pathway(training);

        assert!(matches!(next(&pathway, 1).unwrap(), NextStep::Step(t) if t.step.id() == 2));
        match next(&pathway, 2).unwrap() {
            NextStep::Completed { attempt, .. } => {
                assert_eq!(attempt.status, AttemptStatus::Passed);
                assert_eq!(attempt.score, 0);
            }
            other => panic!("expected completion, got {:?}", other),
        }
        assert_eq!(sink.names(), vec!["attempt_started", "attempt_completed"]);
        assert!(pathway.store().open_attempt(USER, 1).unwrap().is_some());
    }
}
