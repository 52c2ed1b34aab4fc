use serde::{Deserialize, Serialize};

/// One schooling phase and its ordered grade levels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    pub name: String,
    pub grades: Vec<String>,
}

/// Ordered stage -> grade curriculum, fixed per deployment.
///
/// The flattened sequence (stages in declaration order, grades in list
/// order) gives every grade level a unique position; the successor of a
/// grade is simply the next element.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Curriculum {
    stages: Vec<Stage>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CurriculumError {
    pub message: String,
}

impl CurriculumError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Curriculum {
    pub fn new(stages: Vec<Stage>) -> Result<Self, CurriculumError> {
        if stages.is_empty() {
            return Err(CurriculumError::new("curriculum must have at least one stage"));
        }
        let mut seen: Vec<&str> = Vec::new();
        for stage in &stages {
            if stage.grades.is_empty() {
                return Err(CurriculumError::new(format!(
                    "stage '{}' has no grade levels",
                    stage.name
                )));
            }
            for g in &stage.grades {
                if g.trim().is_empty() {
                    return Err(CurriculumError::new(format!(
                        "stage '{}' has an empty grade level name",
                        stage.name
                    )));
                }
                if seen.contains(&g.as_str()) {
                    return Err(CurriculumError::new(format!(
                        "duplicate grade level '{}' in curriculum",
                        g
                    )));
                }
                seen.push(g);
            }
        }
        Ok(Self { stages })
    }

    /// The deployment default: KG through Secondary 3.
    pub fn default_k12() -> Self {
        let stage = |name: &str, grades: &[&str]| Stage {
            name: name.to_string(),
            grades: grades.iter().map(|g| g.to_string()).collect(),
        };
        Self {
            stages: vec![
                stage("Kindergarten", &["KG 1", "KG 2"]),
                stage(
                    "Primary",
                    &[
                        "First Primary",
                        "Second Primary",
                        "Third Primary",
                        "Fourth Primary",
                        "Fifth Primary",
                        "Sixth Primary",
                    ],
                ),
                stage(
                    "Preparatory",
                    &[
                        "First Preparatory",
                        "Second Preparatory",
                        "Third Preparatory",
                    ],
                ),
                stage(
                    "Secondary",
                    &["First Secondary", "Second Secondary", "Third Secondary"],
                ),
            ],
        }
    }

    /// Parse the `rollover.curriculum` settings value: `[{name, grades}, ...]`.
    pub fn from_value(v: &serde_json::Value) -> Result<Self, CurriculumError> {
        let stages: Vec<Stage> = serde_json::from_value(v.clone())
            .map_err(|e| CurriculumError::new(format!("bad curriculum value: {}", e)))?;
        Self::new(stages)
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// All grade levels, stages flattened in declaration order.
    pub fn flattened(&self) -> Vec<&str> {
        self.stages
            .iter()
            .flat_map(|s| s.grades.iter().map(|g| g.as_str()))
            .collect()
    }

    pub fn position(&self, grade_level: &str) -> Option<usize> {
        self.flattened().iter().position(|g| *g == grade_level)
    }

    pub fn contains(&self, grade_level: &str) -> bool {
        self.position(grade_level).is_some()
    }

    /// Successor grade level, or None when `grade_level` is terminal.
    ///
    /// A grade level missing from the curriculum is treated the same as the
    /// last one: no successor, so its students can only graduate or repeat.
    pub fn next_grade(&self, grade_level: &str) -> Option<&str> {
        let flat = self.flattened();
        let idx = flat.iter().position(|g| *g == grade_level)?;
        flat.get(idx + 1).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flatten_preserves_stage_declaration_order() {
        let c = Curriculum::default_k12();
        let flat = c.flattened();
        assert_eq!(flat.first(), Some(&"KG 1"));
        assert_eq!(flat[2], "First Primary");
        assert_eq!(flat.last(), Some(&"Third Secondary"));
        assert_eq!(flat.len(), 14);
    }

    #[test]
    fn next_grade_crosses_stage_boundaries() {
        let c = Curriculum::default_k12();
        assert_eq!(c.next_grade("KG 2"), Some("First Primary"));
        assert_eq!(c.next_grade("Sixth Primary"), Some("First Preparatory"));
        assert_eq!(c.next_grade("Second Secondary"), Some("Third Secondary"));
    }

    #[test]
    fn terminal_and_unknown_grades_have_no_successor() {
        let c = Curriculum::default_k12();
        assert_eq!(c.next_grade("Third Secondary"), None);
        assert_eq!(c.next_grade("Fourth Secondary"), None);
        assert_eq!(c.next_grade(""), None);
    }

    #[test]
    fn position_is_total_over_valid_grades() {
        let c = Curriculum::default_k12();
        for (i, g) in c.flattened().iter().enumerate() {
            assert_eq!(c.position(g), Some(i));
        }
        assert_eq!(c.position("not a grade"), None);
    }

    #[test]
    fn from_value_rejects_duplicates_and_empty_stages() {
        let dup = json!([
            { "name": "A", "grades": ["G1", "G2"] },
            { "name": "B", "grades": ["G2"] }
        ]);
        assert!(Curriculum::from_value(&dup).is_err());

        let empty = json!([{ "name": "A", "grades": [] }]);
        assert!(Curriculum::from_value(&empty).is_err());

        let ok = json!([{ "name": "A", "grades": ["G1", "G2"] }]);
        let c = Curriculum::from_value(&ok).expect("valid curriculum");
        assert_eq!(c.next_grade("G1"), Some("G2"));
        assert_eq!(c.next_grade("G2"), None);
    }
}
