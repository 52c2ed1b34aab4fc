use crate::ipc::error::{err, ok};
use crate::ipc::handlers::rollover::load_curriculum;
use crate::ipc::types::{AppState, Request};
use crate::rollover::{DEFAULT_CAPACITY, DEFAULT_SECTION};
use chrono::Utc;
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn handle_classes_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "classes": [] }));
    };

    // Roster counts come from a correlated subquery so empty classes still
    // show up.
    let mut stmt = match conn.prepare(
        "SELECT
           c.id,
           c.name,
           c.grade_level,
           c.section,
           c.capacity,
           c.homeroom_teacher_id,
           (SELECT COUNT(*) FROM rosters r WHERE r.class_id = c.id) AS roster_count
         FROM classes c
         ORDER BY c.grade_level, c.section, c.name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "name": row.get::<_, String>(1)?,
                "gradeLevel": row.get::<_, String>(2)?,
                "section": row.get::<_, String>(3)?,
                "capacity": row.get::<_, i64>(4)?,
                "homeroomTeacherId": row.get::<_, Option<String>>(5)?,
                "rosterCount": row.get::<_, i64>(6)?
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(classes) => ok(&req.id, json!({ "classes": classes })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_classes_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let grade_level = match req.params.get("gradeLevel").and_then(|v| v.as_str()) {
        Some(v) => v.trim().to_string(),
        None => return err(&req.id, "bad_params", "missing gradeLevel", None),
    };
    let curriculum = match load_curriculum(conn) {
        Ok(c) => c,
        Err(e) => return err(&req.id, "bad_settings", e.to_string(), None),
    };
    if !curriculum.contains(&grade_level) {
        return err(
            &req.id,
            "bad_params",
            "gradeLevel is not in the curriculum order",
            Some(json!({ "gradeLevel": grade_level })),
        );
    }

    let section = req
        .params
        .get("section")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_SECTION.to_string());
    let capacity = match req.params.get("capacity") {
        None => DEFAULT_CAPACITY,
        Some(v) => match v.as_i64() {
            Some(n) if n >= 0 => n,
            _ => return err(&req.id, "bad_params", "capacity must be an integer >= 0", None),
        },
    };
    let name = req
        .params
        .get("name")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| format!("{} ({})", grade_level, section));
    let homeroom_teacher_id = req
        .params
        .get("homeroomTeacherId")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    let class_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO classes(id, name, grade_level, section, capacity, homeroom_teacher_id, subjects, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, '[]', ?)",
        (
            &class_id,
            &name,
            &grade_level,
            &section,
            capacity,
            &homeroom_teacher_id,
            Utc::now().to_rfc3339(),
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "classes" })),
        );
    }

    ok(
        &req.id,
        json!({
            "classId": class_id,
            "name": name,
            "gradeLevel": grade_level,
            "section": section,
            "capacity": capacity
        }),
    )
}

fn handle_classes_roster(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let class_id = match req.params.get("classId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing classId", None),
    };

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM classes WHERE id = ?", [&class_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "class not found", None);
    }

    let mut stmt = match conn.prepare(
        "SELECT student_id FROM rosters WHERE class_id = ? ORDER BY student_id",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let ids = stmt
        .query_map([&class_id], |r| r.get::<_, String>(0))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match ids {
        Ok(student_ids) => ok(
            &req.id,
            json!({ "classId": class_id, "studentIds": student_ids }),
        ),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.list" => Some(handle_classes_list(state, req)),
        "classes.create" => Some(handle_classes_create(state, req)),
        "classes.roster" => Some(handle_classes_roster(state, req)),
        _ => None,
    }
}
