use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use chrono::Utc;
use rusqlite::OptionalExtension;
use serde_json::json;

fn component(req: &Request, key: &str) -> Result<f64, serde_json::Value> {
    match req.params.get(key) {
        None => Ok(0.0),
        Some(v) => match v.as_f64() {
            Some(n) if n >= 0.0 => Ok(n),
            _ => Err(err(
                &req.id,
                "bad_params",
                format!("{} must be a non-negative number", key),
                None,
            )),
        },
    }
}

/// Upsert one subject's grade components for a student in a class.
/// Components default to 0 when omitted; they are assumed normalized to a
/// comparable scale upstream.
fn handle_grades_record(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let class_id = match req.params.get("classId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing classId", None),
    };
    let student_id = match req.params.get("studentId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing studentId", None),
    };
    let subject = match req.params.get("subject").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing subject", None),
    };

    let homework = match component(req, "homework") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let quiz = match component(req, "quiz") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let midterm = match component(req, "midterm") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let final_exam = match component(req, "final") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let on_roster: Option<i64> = match conn
        .query_row(
            "SELECT 1 FROM rosters WHERE class_id = ? AND student_id = ?",
            (&class_id, &student_id),
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if on_roster.is_none() {
        return err(&req.id, "not_found", "student is not on the class roster", None);
    }

    if let Err(e) = conn.execute(
        "INSERT INTO grade_entries(class_id, student_id, subject, homework, quiz, midterm, final_exam, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(class_id, student_id, subject) DO UPDATE SET
           homework = excluded.homework,
           quiz = excluded.quiz,
           midterm = excluded.midterm,
           final_exam = excluded.final_exam,
           updated_at = excluded.updated_at",
        (
            &class_id,
            &student_id,
            &subject,
            homework,
            quiz,
            midterm,
            final_exam,
            Utc::now().to_rfc3339(),
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "grade_entries" })),
        );
    }

    ok(
        &req.id,
        json!({
            "classId": class_id,
            "studentId": student_id,
            "subject": subject,
            "total": homework + quiz + midterm + final_exam
        }),
    )
}

fn handle_grades_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let class_id = match req.params.get("classId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing classId", None),
    };
    let student_id = req
        .params
        .get("studentId")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    let sql = match student_id {
        Some(_) => {
            "SELECT class_id, student_id, subject, homework, quiz, midterm, final_exam
             FROM grade_entries
             WHERE class_id = ? AND student_id = ?
             ORDER BY subject"
        }
        None => {
            "SELECT class_id, student_id, subject, homework, quiz, midterm, final_exam
             FROM grade_entries
             WHERE class_id = ?
             ORDER BY student_id, subject"
        }
    };
    let mut stmt = match conn.prepare(sql) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let map_row = |r: &rusqlite::Row<'_>| -> rusqlite::Result<serde_json::Value> {
        let homework: f64 = r.get(3)?;
        let quiz: f64 = r.get(4)?;
        let midterm: f64 = r.get(5)?;
        let final_exam: f64 = r.get(6)?;
        Ok(json!({
            "classId": r.get::<_, String>(0)?,
            "studentId": r.get::<_, String>(1)?,
            "subject": r.get::<_, String>(2)?,
            "homework": homework,
            "quiz": quiz,
            "midterm": midterm,
            "final": final_exam,
            "total": homework + quiz + midterm + final_exam
        }))
    };

    let rows = match &student_id {
        Some(sid) => stmt
            .query_map((&class_id, sid), map_row)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>()),
        None => stmt
            .query_map([&class_id], map_row)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>()),
    };

    match rows {
        Ok(entries) => ok(&req.id, json!({ "entries": entries })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.record" => Some(handle_grades_record(state, req)),
        "grades.list" => Some(handle_grades_list(state, req)),
        _ => None,
    }
}
