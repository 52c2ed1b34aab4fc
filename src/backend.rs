use std::collections::BTreeSet;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use uuid::Uuid;

/// One subject's grade components for a student in a class. Components are
/// already normalized to a comparable scale upstream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeEntry {
    pub class_id: String,
    pub student_id: String,
    pub subject: String,
    pub homework: f64,
    pub quiz: f64,
    pub midterm: f64,
    #[serde(rename = "final")]
    pub final_exam: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRecord {
    pub id: String,
    pub name: String,
    pub grade_level: String,
    pub section: String,
    pub capacity: i64,
    pub homeroom_teacher_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherRecord {
    pub id: String,
    pub name: String,
}

/// Parameters for provisioning a destination class.
#[derive(Debug, Clone)]
pub struct NewClass {
    pub name: String,
    pub grade_level: String,
    pub section: String,
    pub capacity: i64,
    pub homeroom_teacher_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackendError {
    pub message: String,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<rusqlite::Error> for BackendError {
    fn from(e: rusqlite::Error) -> Self {
        BackendError::new(e.to_string())
    }
}

/// The school-management collaborator the rollover engine runs against.
///
/// Roster reads and writes deliberately go through this seam with no
/// version token: the engine reads-then-writes with no optimistic
/// concurrency check, an accepted race at this scale. A future conditional
/// write belongs here, not in the classification logic.
pub trait SchoolBackend {
    fn fetch_all_grades(&self) -> Result<Vec<GradeEntry>, BackendError>;
    fn fetch_classes(&self) -> Result<Vec<ClassRecord>, BackendError>;
    fn fetch_class(&self, class_id: &str) -> Result<Option<ClassRecord>, BackendError>;
    fn fetch_class_roster(&self, class_id: &str) -> Result<BTreeSet<String>, BackendError>;
    fn fetch_teachers(&self) -> Result<Vec<TeacherRecord>, BackendError>;
    fn create_class(&mut self, def: &NewClass) -> Result<ClassRecord, BackendError>;
    /// Full-replace semantics: the roster becomes exactly `student_ids`.
    fn replace_class_roster(
        &mut self,
        class_id: &str,
        student_ids: &BTreeSet<String>,
    ) -> Result<(), BackendError>;
}

/// Workspace-database implementation of the collaborator contract.
pub struct SqliteBackend<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteBackend<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

fn class_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ClassRecord> {
    Ok(ClassRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        grade_level: row.get(2)?,
        section: row.get(3)?,
        capacity: row.get(4)?,
        homeroom_teacher_id: row.get(5)?,
    })
}

const CLASS_COLUMNS: &str = "id, name, grade_level, section, capacity, homeroom_teacher_id";

impl SchoolBackend for SqliteBackend<'_> {
    fn fetch_all_grades(&self) -> Result<Vec<GradeEntry>, BackendError> {
        let mut stmt = self.conn.prepare(
            "SELECT class_id, student_id, subject, homework, quiz, midterm, final_exam
             FROM grade_entries
             ORDER BY class_id, student_id, subject",
        )?;
        let rows = stmt.query_map([], |r| {
            Ok(GradeEntry {
                class_id: r.get(0)?,
                student_id: r.get(1)?,
                subject: r.get(2)?,
                homework: r.get(3)?,
                quiz: r.get(4)?,
                midterm: r.get(5)?,
                final_exam: r.get(6)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn fetch_classes(&self) -> Result<Vec<ClassRecord>, BackendError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM classes ORDER BY section, name, id",
            CLASS_COLUMNS
        ))?;
        let rows = stmt.query_map([], class_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn fetch_class(&self, class_id: &str) -> Result<Option<ClassRecord>, BackendError> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {} FROM classes WHERE id = ?", CLASS_COLUMNS),
                [class_id],
                class_from_row,
            )
            .optional()?)
    }

    fn fetch_class_roster(&self, class_id: &str) -> Result<BTreeSet<String>, BackendError> {
        let mut stmt = self
            .conn
            .prepare("SELECT student_id FROM rosters WHERE class_id = ?")?;
        let rows = stmt.query_map([class_id], |r| r.get::<_, String>(0))?;
        Ok(rows.collect::<Result<BTreeSet<_>, _>>()?)
    }

    fn fetch_teachers(&self) -> Result<Vec<TeacherRecord>, BackendError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM teachers ORDER BY sort_order, id")?;
        let rows = stmt.query_map([], |r| {
            Ok(TeacherRecord {
                id: r.get(0)?,
                name: r.get(1)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn create_class(&mut self, def: &NewClass) -> Result<ClassRecord, BackendError> {
        let id = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO classes(id, name, grade_level, section, capacity, homeroom_teacher_id, subjects, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, '[]', ?)",
            (
                &id,
                &def.name,
                &def.grade_level,
                &def.section,
                def.capacity,
                &def.homeroom_teacher_id,
                Utc::now().to_rfc3339(),
            ),
        )?;
        Ok(ClassRecord {
            id,
            name: def.name.clone(),
            grade_level: def.grade_level.clone(),
            section: def.section.clone(),
            capacity: def.capacity,
            homeroom_teacher_id: def.homeroom_teacher_id.clone(),
        })
    }

    fn replace_class_roster(
        &mut self,
        class_id: &str,
        student_ids: &BTreeSet<String>,
    ) -> Result<(), BackendError> {
        let exists: Option<i64> = self
            .conn
            .query_row("SELECT 1 FROM classes WHERE id = ?", [class_id], |r| {
                r.get(0)
            })
            .optional()?;
        if exists.is_none() {
            return Err(BackendError::new(format!("class not found: {}", class_id)));
        }

        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM rosters WHERE class_id = ?", [class_id])?;
        for student_id in student_ids {
            tx.execute(
                "INSERT INTO rosters(class_id, student_id) VALUES(?, ?)",
                (class_id, student_id),
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}
