//! Gating decisions.
//!
//! Decides whether a learner may move past a step. The decision reads only
//! the batch-loaded [`LearnerView`]; a refusal is a [`GateBlock`] naming the
//! step the learner has to go back to.

use crate::core::{NavigationMode, Typology};
use crate::engine::{LearnerView, ResolvedStep, StepRecord};
use crate::error::{GateBlock, Remediation};
use crate::navigation::NavigationTargets;

/// Why a step's rule is not satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RuleFailure {
    NoScore,
    PendingManual,
    BelowRequired { required: u32, score: Option<u32> },
    NotAttended,
    NoAttempt,
}

/// Evaluates the gating rules against a learner view.
pub struct GatingEngine<'a> {
    view: &'a LearnerView,
    targets: &'a dyn NavigationTargets,
}

impl<'a> GatingEngine<'a> {
    /// Create a gate over a learner view.
    pub fn new(view: &'a LearnerView, targets: &'a dyn NavigationTargets) -> Self {
        Self { view, targets }
    }

    /// Decide whether the learner may proceed past `step`.
    ///
    /// `sequence` is the visible sequence `step` belongs to. A mandatory
    /// course is checked at its last step in that sequence, innermost course
    /// first, and a failing course sends the learner back to its first
    /// sub-step.
    pub fn can_proceed(
        &self,
        sequence: &[ResolvedStep],
        step: &ResolvedStep,
        mode: NavigationMode,
    ) -> Result<(), GateBlock> {
        if !step.is_course() {
            let record = self.view.record(step.id());
            if step.step.mandatory && record.score.is_none() {
                return Err(self.block(RuleFailure::NoScore, step));
            }

            if mode.is_guided() && step.step.mandatory {
                if let Some(failure) =
                    self.evaluate(step.typology(), step.step.required_score, record)
                {
                    return Err(self.block(failure, step));
                }
            }
        }

        if !mode.is_guided() {
            return Ok(());
        }

        let after = sequence
            .iter()
            .position(|s| s.id() == step.id())
            .map_or(&[][..], |i| &sequence[i + 1..]);
        for course in step.courses.iter().filter(|c| c.mandatory) {
            if after.iter().any(|s| s.is_within(course.step_id)) {
                continue;
            }
            let record = self.view.record(course.step_id);
            let failure = if record.score.is_none() {
                Some(RuleFailure::NoScore)
            } else {
                self.evaluate(Typology::Course, course.required_score, record)
            };
            if let Some(failure) = failure {
                let first = sequence
                    .iter()
                    .find(|s| s.id() == course.first_child)
                    .unwrap_or(step);
                return Err(self.block(failure, first));
            }
        }

        Ok(())
    }

    /// Whether a step satisfies its completion rule.
    ///
    /// Optional steps always do; mandatory ones need a score and must pass
    /// their required-score, attendance or attempt rule.
    pub fn satisfies(&self, step: &ResolvedStep) -> bool {
        if !step.step.mandatory {
            return true;
        }
        let record = self.view.record(step.id());
        record.score.is_some()
            && self
                .evaluate(step.typology(), step.step.required_score, record)
                .is_none()
    }

    /// Mandatory-step rule shared by steps and their owning courses.
    fn evaluate(
        &self,
        typology: Typology,
        required: Option<u32>,
        record: StepRecord,
    ) -> Option<RuleFailure> {
        if typology == Typology::Module && record.pending_manual {
            return Some(RuleFailure::PendingManual);
        }

        if required.is_some() || typology == Typology::Meeting {
            let required = required.unwrap_or(0);
            if !record.score.is_some_and(|score| score >= required) {
                return Some(RuleFailure::BelowRequired {
                    required,
                    score: record.score,
                });
            }
            if typology == Typology::Meeting && !self.view.is_owner() && !record.attended {
                return Some(RuleFailure::NotAttended);
            }
            return None;
        }

        if record.attempts == 0 {
            return Some(RuleFailure::NoAttempt);
        }
        None
    }

    fn remediation(&self, step: &ResolvedStep) -> Remediation {
        Remediation {
            step_id: step.id(),
            destination: self.targets.step_target(self.view.training_id(), step),
        }
    }

    fn block(&self, failure: RuleFailure, target: &ResolvedStep) -> GateBlock {
        let remediation = self.remediation(target);
        match failure {
            RuleFailure::NoScore => GateBlock::AttemptRequired {
                reason: "no score yet".to_string(),
                remediation,
            },
            RuleFailure::PendingManual => GateBlock::ManualGradingPending { remediation },
            RuleFailure::BelowRequired { required, score } => GateBlock::InsufficientScore {
                required,
                best_score: score,
                remediation,
            },
            RuleFailure::NotAttended => GateBlock::AttemptRequired {
                reason: "meeting not attended".to_string(),
                remediation,
            },
            RuleFailure::NoAttempt => GateBlock::AttemptRequired {
                reason: "no attempt yet".to_string(),
                remediation,
            },
        }
    }
}
