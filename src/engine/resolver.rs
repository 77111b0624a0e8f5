//! Step graph resolution.
//!
//! Flattens a training's step tree into the ordered sequence a learner walks
//! through. A course contributes its own entry followed by its sub-steps;
//! every sub-step remembers the chain of courses enclosing it so gating can
//! apply each course rule at the course's last step.

use serde::{Deserialize, Serialize};

use crate::core::{
    Attempt, CourseId, NavigationMode, Step, StepFingerprint, StepId, Training, Typology, UserId,
};
use crate::engine::GatingEngine;
use crate::error::{PathgateError, Result};
use crate::identity::Membership;

/// A course enclosing a flattened sub-step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentCourse {
    /// Step id of the course entry.
    pub step_id: StepId,
    pub course_id: CourseId,
    pub mandatory: bool,
    pub required_score: Option<u32>,
    /// First sub-step in order, where a blocked learner is sent back to.
    pub first_child: StepId,
}

/// A step as it appears in a resolved sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedStep {
    /// The step, without nested sub-steps.
    pub step: Step,
    /// Position in the resolved sequence.
    pub index: usize,
    /// Enclosing courses, innermost first.
    #[serde(default)]
    pub courses: Vec<ParentCourse>,
}

impl ResolvedStep {
    /// A top-level step at a sequence index.
    pub fn top_level(step: Step, index: usize) -> Self {
        Self {
            step: step.shallow(),
            index,
            courses: Vec::new(),
        }
    }

    /// The course directly owning this step.
    pub fn parent(&self) -> Option<&ParentCourse> {
        self.courses.first()
    }

    /// Whether this step sits anywhere inside the course entry `course_step`.
    pub fn is_within(&self, course_step: StepId) -> bool {
        self.courses.iter().any(|c| c.step_id == course_step)
    }

    pub fn id(&self) -> StepId {
        self.step.id
    }

    pub fn typology(&self) -> Typology {
        self.step.typology()
    }

    pub fn entity_id(&self) -> u64 {
        self.step.entity_id()
    }

    pub fn is_course(&self) -> bool {
        self.typology() == Typology::Course
    }

    pub fn is_top_level(&self) -> bool {
        self.courses.is_empty()
    }

    /// Fingerprint recorded on completion.
    pub fn fingerprint(&self) -> StepFingerprint {
        StepFingerprint::of(&self.step, self.parent().map(|p| p.course_id))
    }
}

/// Builds ordered, access-filtered step sequences.
pub struct StepGraphResolver<'a> {
    membership: &'a dyn Membership,
}

impl<'a> StepGraphResolver<'a> {
    /// Create a resolver checking visibility through `membership`.
    pub fn new(membership: &'a dyn Membership) -> Self {
        Self { membership }
    }

    /// The full flattened structure of a training, ignoring visibility.
    pub fn structure(training: &Training) -> Vec<ResolvedStep> {
        let mut out = Vec::new();
        flatten(&training.steps, &[], &|_| true, &mut out);
        out
    }

    /// Fingerprints of the training's current structure.
    pub fn fingerprints(training: &Training) -> Vec<StepFingerprint> {
        Self::structure(training)
            .iter()
            .map(ResolvedStep::fingerprint)
            .collect()
    }

    /// Every step visible to the user, in order.
    ///
    /// Meetings and ILTs disappear when the user may not view that typology
    /// or is not a participant of the instance.
    pub fn visible(&self, training: &Training, user_id: UserId) -> Vec<ResolvedStep> {
        let keep = |step: &Step| {
            let typology = step.typology();
            !typology.is_live_session()
                || (self.membership.can_view(user_id, typology)
                    && self
                        .membership
                        .is_participant(user_id, typology, step.entity_id()))
        };
        let mut out = Vec::new();
        flatten(&training.steps, &[], &keep, &mut out);
        out
    }

    /// Resolve the sequence for a navigation mode.
    ///
    /// Free navigation returns every visible step. Guided navigation stops
    /// after the first step the gate would not let the learner leave.
    pub fn resolve(
        &self,
        training: &Training,
        user_id: UserId,
        mode: NavigationMode,
        gate: &GatingEngine<'_>,
    ) -> Result<Vec<ResolvedStep>> {
        let visible = self.visible(training, user_id);
        if visible.is_empty() {
            return Err(PathgateError::NoSteps {
                training_id: training.id,
            });
        }

        if !mode.is_guided() {
            return Ok(visible);
        }

        let mut reachable = Vec::with_capacity(visible.len());
        for step in &visible {
            reachable.push(step.clone());
            if let Err(block) = gate.can_proceed(&visible, step, mode) {
                tracing::debug!(
                    training_id = training.id,
                    user_id,
                    step_id = step.id(),
                    reason = block.kind(),
                    "guided resolution stops at blocking step"
                );
                break;
            }
        }
        Ok(reachable)
    }

    /// The step a learner lands on when entering the training.
    ///
    /// Without an open attempt, or without a recorded step that is still
    /// part of the sequence, this is the first step. A recorded meeting or
    /// ILT cannot be resumed into, so the step after it is returned.
    pub fn first_step(
        &self,
        training: &Training,
        user_id: UserId,
        mode: NavigationMode,
        gate: &GatingEngine<'_>,
        attempt: Option<&Attempt>,
    ) -> Result<ResolvedStep> {
        let sequence = self.resolve(training, user_id, mode, gate)?;
        let first = sequence.first().cloned().ok_or(PathgateError::NoSteps {
            training_id: training.id,
        })?;

        let Some(current) = attempt.filter(|a| a.is_open()).and_then(|a| a.current_step) else {
            return Ok(first);
        };

        let Some(index) = sequence.iter().position(|s| s.id() == current) else {
            tracing::debug!(
                training_id = training.id,
                user_id,
                step_id = current,
                "recorded step left the sequence, starting over"
            );
            return Ok(first);
        };

        let recorded = &sequence[index];
        if recorded.typology().is_live_session() {
            return Ok(sequence.get(index + 1).unwrap_or(recorded).clone());
        }
        Ok(recorded.clone())
    }
}

/// Append `steps` in position order, descending into courses.
///
/// `courses` is the chain enclosing `steps`, innermost first.
fn flatten(
    steps: &[Step],
    courses: &[ParentCourse],
    keep: &dyn Fn(&Step) -> bool,
    out: &mut Vec<ResolvedStep>,
) {
    let mut ordered: Vec<&Step> = steps.iter().filter(|s| keep(s)).collect();
    ordered.sort_by_key(|s| s.position);

    for step in &ordered {
        out.push(ResolvedStep {
            step: step.shallow(),
            index: out.len(),
            courses: courses.to_vec(),
        });

        let mut children: Vec<&Step> = step.children().iter().filter(|s| keep(s)).collect();
        children.sort_by_key(|s| s.position);
        if let Some(first) = children.first() {
            let mut chain = Vec::with_capacity(courses.len() + 1);
            chain.push(ParentCourse {
                step_id: step.id,
                course_id: step.entity_id(),
                mandatory: step.mandatory,
                required_score: step.required_score,
                first_child: first.id,
            });
            chain.extend_from_slice(courses);
            flatten(step.children(), &chain, keep, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Position;
    use crate::engine::LearnerView;
    use crate::identity::{OpenMembership, Roster};
    use crate::navigation::DefaultTargets;
    use std::collections::HashMap;

    fn training() -> Training {
        Training::new(1, 99, NavigationMode::Free)
            .with_step(Step::module(2, 20).at(Position::index(1)))
            .with_step(
                Step::course(
                    3,
                    300,
                    vec![
                        Step::module(5, 50).at(Position::index(1)),
                        Step::module(4, 40).at(Position::index(0)),
                    ],
                )
                .mandatory()
                .at(Position::index(2)),
            )
            .with_step(Step::module(1, 10).at(Position::index(0)))
            .with_step(Step::meeting(6, 60).at(Position::index(3)))
    }

    fn ids(steps: &[ResolvedStep]) -> Vec<StepId> {
        steps.iter().map(|s| s.id()).collect()
    }

    #[test]
    fn test_structure_orders_and_flattens() {
        let steps = StepGraphResolver::structure(&training());
        assert_eq!(ids(&steps), vec![1, 2, 3, 4, 5, 6]);

        let indexes: Vec<usize> = steps.iter().map(|s| s.index).collect();
        assert_eq!(indexes, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_sub_steps_carry_parent() {
        let steps = StepGraphResolver::structure(&training());

        assert!(steps[2].parent().is_none());
        assert!(steps[2].step.children().is_empty());

        let first = steps[3].parent().unwrap();
        assert_eq!(first.step_id, 3);
        assert_eq!(first.course_id, 300);
        assert_eq!(first.first_child, 4);
        assert!(first.mandatory);

        assert!(steps[4].is_within(3));
        assert!(!steps[5].is_within(3));
    }

    #[test]
    fn test_nested_course_carries_enclosing_chain() {
        let training = Training::new(1, 99, NavigationMode::Guided).with_step(
            Step::course(
                1,
                100,
                vec![
                    Step::module(2, 20).at(Position::index(0)),
                    Step::course(3, 300, vec![Step::module(4, 40)])
                        .mandatory()
                        .at(Position::index(1)),
                ],
            )
            .mandatory()
            .with_required_score(70),
        );
        let steps = StepGraphResolver::structure(&training);
        assert_eq!(ids(&steps), vec![1, 2, 3, 4]);

        let chain: Vec<StepId> = steps[3].courses.iter().map(|c| c.step_id).collect();
        assert_eq!(chain, vec![3, 1]);
        assert_eq!(steps[3].courses[1].first_child, 2);
        assert_eq!(steps[3].courses[1].required_score, Some(70));
        assert_eq!(steps[2].parent().map(|p| p.step_id), Some(1));

        // Only the innermost course feeds the fingerprint.
        assert_eq!(steps[3].fingerprint().parent_entity_id, Some(300));
    }

    #[test]
    fn test_visible_drops_unregistered_meetings() {
        let training = training();
        let mut roster = Roster::new();
        let resolver = StepGraphResolver::new(&roster);
        assert_eq!(ids(&resolver.visible(&training, 7)), vec![1, 2, 3, 4, 5]);

        roster.grant(7, Typology::Meeting);
        let resolver = StepGraphResolver::new(&roster);
        assert_eq!(resolver.visible(&training, 7).len(), 5);

        roster.register(7, Typology::Meeting, 60);
        let resolver = StepGraphResolver::new(&roster);
        assert_eq!(resolver.visible(&training, 7).len(), 6);
    }

    #[test]
    fn test_empty_training_has_no_steps() {
        let training = Training::new(4, 1, NavigationMode::Free);
        let view = LearnerView::from_records(4, 1, false, None, HashMap::new());
        let gate = GatingEngine::new(&view, &DefaultTargets);

        let err = StepGraphResolver::new(&OpenMembership)
            .resolve(&training, 1, NavigationMode::Free, &gate)
            .unwrap_err();
        assert!(matches!(err, PathgateError::NoSteps { training_id: 4 }));
    }

    #[test]
    fn test_guided_stops_at_first_blocking_step() {
        let training = Training::new(1, 99, NavigationMode::Guided)
            .with_step(Step::module(1, 10).at(Position::index(0)))
            .with_step(Step::module(2, 20).mandatory().at(Position::index(1)))
            .with_step(Step::module(3, 30).at(Position::index(2)));
        let view = LearnerView::from_records(1, 5, false, None, HashMap::new());
        let gate = GatingEngine::new(&view, &DefaultTargets);

        let steps = StepGraphResolver::new(&OpenMembership)
            .resolve(&training, 5, NavigationMode::Guided, &gate)
            .unwrap();
        assert_eq!(ids(&steps), vec![1, 2]);

        let free = StepGraphResolver::new(&OpenMembership)
            .resolve(&training, 5, NavigationMode::Free, &gate)
            .unwrap();
        assert_eq!(ids(&free), vec![1, 2, 3]);
    }

    #[test]
    fn test_first_step_resumes_and_skips_live_sessions() {
        let training = training();
        let view = LearnerView::from_records(1, 5, false, None, HashMap::new());
        let gate = GatingEngine::new(&view, &DefaultTargets);
        let resolver = StepGraphResolver::new(&OpenMembership);
        let mut attempt = crate::core::NewAttempt::now(5, 1).into_attempt(1);

        let first = resolver
            .first_step(&training, 5, NavigationMode::Free, &gate, None)
            .unwrap();
        assert_eq!(first.id(), 1);

        attempt.current_step = Some(4);
        let resumed = resolver
            .first_step(&training, 5, NavigationMode::Free, &gate, Some(&attempt))
            .unwrap();
        assert_eq!(resumed.id(), 4);

        // Meeting is the last step; nothing follows so it is returned as is.
        attempt.current_step = Some(6);
        let live = resolver
            .first_step(&training, 5, NavigationMode::Free, &gate, Some(&attempt))
            .unwrap();
        assert_eq!(live.id(), 6);

        attempt.current_step = Some(404);
        let missing = resolver
            .first_step(&training, 5, NavigationMode::Free, &gate, Some(&attempt))
            .unwrap();
        assert_eq!(missing.id(), 1);
    }

    #[test]
    fn test_first_step_moves_past_meeting() {
        let training = Training::new(1, 99, NavigationMode::Free)
            .with_step(Step::meeting(1, 10).at(Position::index(0)))
            .with_step(Step::module(2, 20).at(Position::index(1)));
        let view = LearnerView::from_records(1, 5, false, None, HashMap::new());
        let gate = GatingEngine::new(&view, &DefaultTargets);
        let mut attempt = crate::core::NewAttempt::now(5, 1).into_attempt(1);
        attempt.current_step = Some(1);

        let step = StepGraphResolver::new(&OpenMembership)
            .first_step(&training, 5, NavigationMode::Free, &gate, Some(&attempt))
            .unwrap();
        assert_eq!(step.id(), 2);
    }

    #[test]
    fn test_fingerprints_include_parent() {
        let fingerprints = StepGraphResolver::fingerprints(&training());
        assert_eq!(fingerprints.len(), 6);
        assert_eq!(fingerprints[3].parent_entity_id, Some(300));
        assert_eq!(fingerprints[0].parent_entity_id, None);
    }
}
