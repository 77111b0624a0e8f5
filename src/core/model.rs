//! Training graph types.
//!
//! A training is a tree of steps: top-level steps ordered by position, with
//! course steps holding their own ordered sub-steps. These are immutable
//! descriptions edited by authors out of band; they are never owned by an
//! attempt.

use serde::{Deserialize, Serialize};

use super::{ActivityId, CourseId, IltId, MeetingId, ModuleId, SkillId, StepId, TrainingId, UserId};

/// How a learner may move through a training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NavigationMode {
    /// Mandatory steps must be passed in order.
    #[default]
    Guided,
    /// Every step is reachable; only the no-score rule applies.
    Free,
}

impl NavigationMode {
    /// Check if mandatory gating applies.
    pub fn is_guided(&self) -> bool {
        matches!(self, NavigationMode::Guided)
    }
}

impl std::str::FromStr for NavigationMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "guided" => Ok(Self::Guided),
            "free" => Ok(Self::Free),
            other => Err(format!("invalid navigation mode '{other}'")),
        }
    }
}

/// Declared position of a step inside its container.
///
/// Orders by row, then column. A plain sequence index is `row = index`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct Position {
    pub row: i32,
    pub column: i32,
}

impl Position {
    /// Create a grid position.
    pub fn new(row: i32, column: i32) -> Self {
        Self { row, column }
    }

    /// Create a position from a sequence index.
    pub fn index(index: i32) -> Self {
        Self {
            row: index,
            column: 0,
        }
    }
}

/// Kind of content a step points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Typology {
    Module,
    Course,
    Meeting,
    Ilt,
}

impl Typology {
    /// Meetings and ILTs are live sessions: visibility-filtered and never
    /// resumed into.
    pub fn is_live_session(&self) -> bool {
        matches!(self, Typology::Meeting | Typology::Ilt)
    }

    /// Lowercase name used in fingerprints and output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Typology::Module => "module",
            Typology::Course => "course",
            Typology::Meeting => "meeting",
            Typology::Ilt => "ilt",
        }
    }
}

/// A module step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleStep {
    pub module_id: ModuleId,
}

/// A course step and its own ordered sub-steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseStep {
    pub course_id: CourseId,
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// A meeting step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingStep {
    pub meeting_id: MeetingId,
}

/// An instructor-led training step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IltStep {
    pub ilt_id: IltId,
}

/// Variant payload of a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "typology", rename_all = "snake_case")]
pub enum StepKind {
    Module(ModuleStep),
    Course(CourseStep),
    Meeting(MeetingStep),
    Ilt(IltStep),
}

/// One unit of a training.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    #[serde(default)]
    pub mandatory: bool,
    /// Minimum best score to pass. `None` means attempt-only gating.
    #[serde(default)]
    pub required_score: Option<u32>,
    #[serde(default)]
    pub position: Position,
    #[serde(flatten)]
    pub kind: StepKind,
}

impl Step {
    /// Create a module step.
    pub fn module(id: StepId, module_id: ModuleId) -> Self {
        Self::with_kind(id, StepKind::Module(ModuleStep { module_id }))
    }

    /// Create a course step with its sub-steps.
    pub fn course(id: StepId, course_id: CourseId, steps: Vec<Step>) -> Self {
        Self::with_kind(id, StepKind::Course(CourseStep { course_id, steps }))
    }

    /// Create a meeting step.
    pub fn meeting(id: StepId, meeting_id: MeetingId) -> Self {
        Self::with_kind(id, StepKind::Meeting(MeetingStep { meeting_id }))
    }

    /// Create an ILT step.
    pub fn ilt(id: StepId, ilt_id: IltId) -> Self {
        Self::with_kind(id, StepKind::Ilt(IltStep { ilt_id }))
    }

    fn with_kind(id: StepId, kind: StepKind) -> Self {
        Self {
            id,
            mandatory: false,
            required_score: None,
            position: Position::default(),
            kind,
        }
    }

    /// Mark the step mandatory.
    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    /// Set the required score (implies nothing about mandatory).
    pub fn with_required_score(mut self, score: u32) -> Self {
        self.required_score = Some(score);
        self
    }

    /// Set the declared position.
    pub fn at(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    /// The step's typology.
    pub fn typology(&self) -> Typology {
        match self.kind {
            StepKind::Module(_) => Typology::Module,
            StepKind::Course(_) => Typology::Course,
            StepKind::Meeting(_) => Typology::Meeting,
            StepKind::Ilt(_) => Typology::Ilt,
        }
    }

    /// Id of the entity the step points at.
    pub fn entity_id(&self) -> u64 {
        match &self.kind {
            StepKind::Module(m) => m.module_id,
            StepKind::Course(c) => c.course_id,
            StepKind::Meeting(m) => m.meeting_id,
            StepKind::Ilt(i) => i.ilt_id,
        }
    }

    /// Sub-steps of a course, empty for every other kind.
    pub fn children(&self) -> &[Step] {
        match &self.kind {
            StepKind::Course(c) => &c.steps,
            _ => &[],
        }
    }

    /// Copy of this step without nested sub-steps.
    pub fn shallow(&self) -> Step {
        let kind = match &self.kind {
            StepKind::Course(c) => StepKind::Course(CourseStep {
                course_id: c.course_id,
                steps: Vec::new(),
            }),
            other => other.clone(),
        };
        Step {
            id: self.id,
            mandatory: self.mandatory,
            required_score: self.required_score,
            position: self.position,
            kind,
        }
    }
}

/// The top-level learning path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Training {
    pub id: TrainingId,
    /// Owner of the training (bypasses meeting attendance).
    pub owner_id: UserId,
    #[serde(default)]
    pub navigation: NavigationMode,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Training {
    /// Create an empty training.
    pub fn new(id: TrainingId, owner_id: UserId, navigation: NavigationMode) -> Self {
        Self {
            id,
            owner_id,
            navigation,
            steps: Vec::new(),
        }
    }

    /// Append a top-level step.
    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Module ids referenced anywhere in the step tree.
    pub fn module_ids(&self) -> Vec<ModuleId> {
        fn collect(steps: &[Step], out: &mut Vec<ModuleId>) {
            for step in steps {
                match &step.kind {
                    StepKind::Module(m) => out.push(m.module_id),
                    StepKind::Course(c) => collect(&c.steps, out),
                    _ => {}
                }
            }
        }
        let mut ids = Vec::new();
        collect(&self.steps, &mut ids);
        ids
    }
}

/// Which module attempt is authoritative for scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum KeepResults {
    /// Highest scoring finished attempt.
    #[default]
    Best,
    /// Most recently created attempt.
    Newest,
}

/// Skill level an activity trains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SkillTag {
    pub skill_id: SkillId,
    /// Stage the activity belongs to (1 = hardest).
    pub level: u32,
}

/// One activity of a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub id: ActivityId,
    /// Max score; `None` or zero falls back to the configured default.
    #[serde(default)]
    pub max_score: Option<u32>,
    #[serde(default)]
    pub manual_grading: bool,
    #[serde(default)]
    pub skill: Option<SkillTag>,
}

impl Activity {
    /// Create an auto-graded activity.
    pub fn new(id: ActivityId, max_score: Option<u32>) -> Self {
        Self {
            id,
            max_score,
            manual_grading: false,
            skill: None,
        }
    }

    /// Mark as manually graded.
    pub fn manually_graded(mut self) -> Self {
        self.manual_grading = true;
        self
    }

    /// Tag with a skill level.
    pub fn for_skill(mut self, skill_id: SkillId, level: u32) -> Self {
        self.skill = Some(SkillTag { skill_id, level });
        self
    }
}

/// A module and its activities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub id: ModuleId,
    #[serde(default)]
    pub keep_results: KeepResults,
    #[serde(default)]
    pub activities: Vec<Activity>,
}

impl Module {
    /// Create a module with the best-score policy.
    pub fn new(id: ModuleId, activities: Vec<Activity>) -> Self {
        Self {
            id,
            keep_results: KeepResults::Best,
            activities,
        }
    }

    /// Set the keep-results policy.
    pub fn keeping(mut self, keep_results: KeepResults) -> Self {
        self.keep_results = keep_results;
        self
    }

    /// Look up an activity.
    pub fn activity(&self, id: ActivityId) -> Option<&Activity> {
        self.activities.iter().find(|a| a.id == id)
    }
}

/// A node of a skill hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    pub id: SkillId,
    #[serde(default)]
    pub parent: Option<SkillId>,
    /// One name per stage; its length is the initial level.
    #[serde(default)]
    pub level_names: Vec<String>,
    pub minimum_score: u32,
    pub minimum_answers: u32,
}

impl Skill {
    /// Number of stages, at least 1.
    pub fn initial_level(&self) -> u32 {
        (self.level_names.len() as u32).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_orders_by_row_then_column() {
        let mut positions = vec![
            Position::new(1, 0),
            Position::new(0, 2),
            Position::new(0, 1),
        ];
        positions.sort();
        assert_eq!(
            positions,
            vec![Position::new(0, 1), Position::new(0, 2), Position::new(1, 0)]
        );
    }

    #[test]
    fn test_step_builders() {
        let step = Step::module(1, 10)
            .mandatory()
            .with_required_score(70)
            .at(Position::index(3));

        assert!(step.mandatory);
        assert_eq!(step.required_score, Some(70));
        assert_eq!(step.typology(), Typology::Module);
        assert_eq!(step.entity_id(), 10);
        assert_eq!(step.position.row, 3);
    }

    #[test]
    fn test_shallow_drops_course_children() {
        let course = Step::course(1, 100, vec![Step::module(2, 20), Step::module(3, 30)]);
        assert_eq!(course.children().len(), 2);
        assert!(course.shallow().children().is_empty());
        assert_eq!(course.shallow().entity_id(), 100);
    }

    #[test]
    fn test_module_ids_walks_courses() {
        let training = Training::new(1, 9, NavigationMode::Guided)
            .with_step(Step::module(1, 10))
            .with_step(Step::course(2, 200, vec![Step::module(3, 30)]))
            .with_step(Step::meeting(4, 40));

        assert_eq!(training.module_ids(), vec![10, 30]);
    }

    #[test]
    fn test_step_json_is_tagged_by_typology() {
        let step = Step::meeting(5, 50).mandatory();
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json["typology"], "meeting");
        assert_eq!(json["meeting_id"], 50);

        let back: Step = serde_json::from_value(json).unwrap();
        assert_eq!(back, step);
    }

    #[test]
    fn test_initial_level_minimum_one() {
        let skill = Skill {
            id: 1,
            parent: None,
            level_names: vec![],
            minimum_score: 50,
            minimum_answers: 1,
        };
        assert_eq!(skill.initial_level(), 1);
    }

    #[test]
    fn test_navigation_mode_parse() {
        assert_eq!("free".parse::<NavigationMode>(), Ok(NavigationMode::Free));
        assert!("sideways".parse::<NavigationMode>().is_err());
    }
}
