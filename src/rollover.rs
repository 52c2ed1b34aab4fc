use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use crate::backend::{BackendError, ClassRecord, GradeEntry, NewClass, SchoolBackend, TeacherRecord};
use crate::curriculum::Curriculum;

pub const DEFAULT_SECTION: &str = "A";
pub const DEFAULT_CAPACITY: i64 = 30;

#[derive(Debug, Clone, Serialize)]
pub struct RolloverError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl RolloverError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }
}

impl From<BackendError> for RolloverError {
    fn from(e: BackendError) -> Self {
        RolloverError::new("preview_failed", e.message)
    }
}

/// Mean of a student's per-subject totals in one class.
///
/// A student with no grade entries in the class scores 0, which routes them
/// to repeat. Absence of grades is treated as academic failure for
/// promotion purposes; this is deliberate policy, not a fallback.
pub fn aggregate_score(entries: &[GradeEntry], class_id: &str, student_id: &str) -> f64 {
    let totals: Vec<f64> = entries
        .iter()
        .filter(|e| e.class_id == class_id && e.student_id == student_id)
        .map(|e| e.homework + e.quiz + e.midterm + e.final_exam)
        .collect();
    if totals.is_empty() {
        return 0.0;
    }
    totals.iter().sum::<f64>() / (totals.len() as f64)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Promote,
    Repeat,
    Graduate,
}

/// Promotion decision table. Without a successor grade a student can
/// graduate or repeat, never promote.
pub fn classify(score: f64, has_successor: bool, threshold: f64) -> Outcome {
    match (has_successor, score >= threshold) {
        (true, true) => Outcome::Promote,
        (true, false) => Outcome::Repeat,
        (false, true) => Outcome::Graduate,
        (false, false) => Outcome::Repeat,
    }
}

/// Per-class preview of a rollover run. Ephemeral: recomputed from scratch
/// on every preview, discarded after commit. The three id sets partition
/// the class roster as of preview time.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewItem {
    pub class_id: String,
    pub class_name: String,
    pub next_grade: Option<String>,
    pub promote_ids: BTreeSet<String>,
    pub repeat_ids: BTreeSet<String>,
    pub graduate_ids: BTreeSet<String>,
    pub target_class_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewRun {
    pub threshold: f64,
    pub computed_at: String,
    pub items: Vec<PreviewItem>,
}

/// Section/capacity policy for provisioned destination classes, loaded
/// from workspace settings with `"A"`/30 defaults.
#[derive(Debug, Clone)]
pub struct ProvisionDefaults {
    pub section: String,
    pub capacity: i64,
}

impl Default for ProvisionDefaults {
    fn default() -> Self {
        Self {
            section: DEFAULT_SECTION.to_string(),
            capacity: DEFAULT_CAPACITY,
        }
    }
}

/// Homeroom policy for provisioned classes: first teacher in the school's
/// list. Kept as a single named function so the policy can be swapped
/// without touching the provisioner.
pub fn default_homeroom_teacher(teachers: &[TeacherRecord]) -> Option<String> {
    teachers.first().map(|t| t.id.clone())
}

fn find_existing_target(classes: &[ClassRecord], grade_level: &str) -> Option<String> {
    // Section is not a discriminator: classes arrive ordered by
    // (section, name, id), so the default-section class wins when several
    // sections exist for the grade.
    classes
        .iter()
        .find(|c| c.grade_level == grade_level)
        .map(|c| c.id.clone())
}

/// Compute the rollover preview for the selected classes.
///
/// Strictly read-only: target classes are looked up but never created here,
/// so `targetClassId` stays null for a successor grade that has no class
/// yet. Creation is deferred to commit.
pub fn compute_preview(
    backend: &dyn SchoolBackend,
    curriculum: &Curriculum,
    class_ids: &[String],
    threshold: f64,
) -> Result<Vec<PreviewItem>, RolloverError> {
    let grades = backend.fetch_all_grades()?;
    let known_classes = backend.fetch_classes()?;

    let mut items = Vec::with_capacity(class_ids.len());
    for class_id in class_ids {
        let Some(class) = backend.fetch_class(class_id)? else {
            return Err(RolloverError::new(
                "preview_failed",
                format!("class not found: {}", class_id),
            ));
        };
        let roster = backend.fetch_class_roster(class_id)?;
        let next_grade = curriculum
            .next_grade(&class.grade_level)
            .map(|g| g.to_string());

        let mut promote_ids = BTreeSet::new();
        let mut repeat_ids = BTreeSet::new();
        let mut graduate_ids = BTreeSet::new();
        for student_id in &roster {
            let score = aggregate_score(&grades, class_id, student_id);
            match classify(score, next_grade.is_some(), threshold) {
                Outcome::Promote => promote_ids.insert(student_id.clone()),
                Outcome::Repeat => repeat_ids.insert(student_id.clone()),
                Outcome::Graduate => graduate_ids.insert(student_id.clone()),
            };
        }

        let target_class_id = match &next_grade {
            Some(g) if !promote_ids.is_empty() => find_existing_target(&known_classes, g),
            _ => None,
        };

        items.push(PreviewItem {
            class_id: class_id.clone(),
            class_name: class.name,
            next_grade,
            promote_ids,
            repeat_ids,
            graduate_ids,
            target_class_id,
        });
    }
    Ok(items)
}

/// Find-or-create resolver for destination classes, with a per-run cache:
/// every class promoting into grade G within one run shares one target.
pub struct TargetResolver {
    defaults: ProvisionDefaults,
    cache: HashMap<String, String>,
}

impl TargetResolver {
    pub fn new(defaults: ProvisionDefaults) -> Self {
        Self {
            defaults,
            cache: HashMap::new(),
        }
    }

    pub fn resolve(
        &mut self,
        backend: &mut dyn SchoolBackend,
        grade_level: &str,
    ) -> Result<String, RolloverError> {
        if let Some(id) = self.cache.get(grade_level) {
            return Ok(id.clone());
        }

        let classes = backend.fetch_classes().map_err(provisioning_err)?;
        let id = match find_existing_target(&classes, grade_level) {
            Some(id) => id,
            None => {
                let teachers = backend.fetch_teachers().map_err(provisioning_err)?;
                let created = backend
                    .create_class(&NewClass {
                        name: format!("{} ({})", grade_level, self.defaults.section),
                        grade_level: grade_level.to_string(),
                        section: self.defaults.section.clone(),
                        capacity: self.defaults.capacity,
                        homeroom_teacher_id: default_homeroom_teacher(&teachers),
                    })
                    .map_err(provisioning_err)?;
                created.id
            }
        };
        self.cache.insert(grade_level.to_string(), id.clone());
        Ok(id)
    }
}

fn provisioning_err(e: BackendError) -> RolloverError {
    RolloverError::new("target_provisioning_failed", e.message)
}

/// Pure set arithmetic over one class's rosters. Repeating students stay in
/// the source; promoted and graduating students leave it; promoted students
/// join the target (set union, so re-application cannot duplicate).
pub fn merge_rosters(
    source: &BTreeSet<String>,
    target: Option<&BTreeSet<String>>,
    item: &PreviewItem,
) -> (BTreeSet<String>, Option<BTreeSet<String>>) {
    let leaving: BTreeSet<&String> = item.promote_ids.union(&item.graduate_ids).collect();
    let new_source: BTreeSet<String> = source
        .iter()
        .filter(|s| !leaving.contains(s))
        .cloned()
        .collect();
    let new_target = match target {
        Some(t) if !item.promote_ids.is_empty() => {
            Some(t.union(&item.promote_ids).cloned().collect())
        }
        _ => None,
    };
    (new_source, new_target)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitFailure {
    pub class_id: String,
    pub code: String,
    pub message: String,
}

/// Itemized commit result. Fail-fast and no rollback: classes committed
/// before `failure.class_id` keep their new rosters, later ones are
/// untouched, so callers can retry just the remainder.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitOutcome {
    pub succeeded: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<CommitFailure>,
}

/// Apply previewed roster changes, one class at a time in preview order.
///
/// Per item: resolve (or create) the target class when anyone promotes,
/// fetch fresh rosters, merge, write source, write target. Rosters are
/// re-fetched here rather than taken from the preview to keep the
/// staleness window small; there is still no optimistic concurrency check
/// (see `SchoolBackend`).
pub fn commit(backend: &mut dyn SchoolBackend, items: &[PreviewItem], defaults: ProvisionDefaults) -> CommitOutcome {
    let mut resolver = TargetResolver::new(defaults);
    let mut succeeded = Vec::new();

    for item in items {
        match commit_one(backend, &mut resolver, item) {
            Ok(()) => succeeded.push(item.class_id.clone()),
            Err(e) => {
                return CommitOutcome {
                    succeeded,
                    failure: Some(CommitFailure {
                        class_id: item.class_id.clone(),
                        code: e.code,
                        message: e.message,
                    }),
                };
            }
        }
    }
    CommitOutcome {
        succeeded,
        failure: None,
    }
}

fn commit_one(
    backend: &mut dyn SchoolBackend,
    resolver: &mut TargetResolver,
    item: &PreviewItem,
) -> Result<(), RolloverError> {
    let target_id = match (&item.next_grade, item.promote_ids.is_empty()) {
        (Some(grade), false) => Some(resolver.resolve(backend, grade)?),
        _ => None,
    };

    let write_err = |e: BackendError| RolloverError::new("commit_write_failed", e.message);

    let source = backend
        .fetch_class_roster(&item.class_id)
        .map_err(write_err)?;
    let target = match &target_id {
        Some(id) => Some(backend.fetch_class_roster(id).map_err(write_err)?),
        None => None,
    };

    let (new_source, new_target) = merge_rosters(&source, target.as_ref(), item);

    backend
        .replace_class_roster(&item.class_id, &new_source)
        .map_err(write_err)?;
    if let (Some(id), Some(roster)) = (&target_id, &new_target) {
        backend.replace_class_roster(id, roster).map_err(write_err)?;
    }
    Ok(())
}
