use crate::backend::SqliteBackend;
use crate::curriculum::Curriculum;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::rollover::{commit, compute_preview, PreviewRun, ProvisionDefaults};
use chrono::Utc;
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

const CURRICULUM_KEY: &str = "rollover.curriculum";
const DEFAULTS_KEY: &str = "rollover.defaults";

/// Deployment curriculum: the `rollover.curriculum` setting when present,
/// otherwise the built-in K-12 order.
pub fn load_curriculum(conn: &Connection) -> anyhow::Result<Curriculum> {
    match db::settings_get_json(conn, CURRICULUM_KEY)? {
        Some(v) => {
            Curriculum::from_value(&v).map_err(|e| anyhow::anyhow!("{}: {}", CURRICULUM_KEY, e.message))
        }
        None => Ok(Curriculum::default_k12()),
    }
}

fn load_defaults(conn: &Connection) -> anyhow::Result<ProvisionDefaults> {
    let mut defaults = ProvisionDefaults::default();
    if let Some(v) = db::settings_get_json(conn, DEFAULTS_KEY)? {
        if let Some(section) = v.get("section").and_then(|s| s.as_str()) {
            if !section.trim().is_empty() {
                defaults.section = section.trim().to_string();
            }
        }
        if let Some(capacity) = v.get("capacity").and_then(|c| c.as_i64()) {
            if capacity >= 0 {
                defaults.capacity = capacity;
            }
        }
    }
    Ok(defaults)
}

fn parse_threshold(req: &Request) -> Result<f64, serde_json::Value> {
    match req.params.get("threshold").and_then(|v| v.as_f64()) {
        Some(t) if (0.0..=100.0).contains(&t) => Ok(t),
        Some(t) => Err(err(
            &req.id,
            "bad_params",
            "threshold must be between 0 and 100",
            Some(json!({ "threshold": t })),
        )),
        None => Err(err(&req.id, "bad_params", "missing threshold", None)),
    }
}

fn parse_class_ids(req: &Request) -> Result<Vec<String>, serde_json::Value> {
    let Some(raw) = req.params.get("classIds").and_then(|v| v.as_array()) else {
        return Err(err(&req.id, "bad_params", "missing classIds", None));
    };
    let mut ids = Vec::with_capacity(raw.len());
    for v in raw {
        match v.as_str() {
            Some(s) if !s.is_empty() => ids.push(s.to_string()),
            _ => {
                return Err(err(
                    &req.id,
                    "bad_params",
                    "classIds must be non-empty strings",
                    None,
                ))
            }
        }
    }
    if ids.is_empty() {
        return Err(err(&req.id, "bad_params", "classIds must not be empty", None));
    }
    Ok(ids)
}

/// Compute a fresh preview, replacing any prior one. Read-only against the
/// school data: target classes are looked up, never created here.
fn handle_rollover_preview(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let class_ids = match parse_class_ids(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let threshold = match parse_threshold(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let curriculum = match load_curriculum(conn) {
        Ok(c) => c,
        Err(e) => return err(&req.id, "bad_settings", e.to_string(), None),
    };

    let backend = SqliteBackend::new(conn);
    match compute_preview(&backend, &curriculum, &class_ids, threshold) {
        Ok(items) => {
            let run = PreviewRun {
                threshold,
                computed_at: Utc::now().to_rfc3339(),
                items,
            };
            let body = serde_json::to_value(&run).unwrap_or_else(|_| json!({}));
            state.preview = Some(run);
            ok(&req.id, body)
        }
        Err(e) => {
            // No partial preview is ever retained.
            state.preview = None;
            err(&req.id, &e.code, e.message, e.details)
        }
    }
}

/// Apply the pending preview's roster changes. Fail-fast, no rollback; the
/// itemized outcome is returned and recorded in the audit trail either way.
fn handle_rollover_commit(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(run) = state.preview.take() else {
        return err(&req.id, "no_preview", "compute a preview first", None);
    };

    let defaults = match load_defaults(conn) {
        Ok(d) => d,
        Err(e) => return err(&req.id, "bad_settings", e.to_string(), None),
    };

    let mut backend = SqliteBackend::new(conn);
    let outcome = commit(&mut backend, &run.items, defaults);

    let run_id = Uuid::new_v4().to_string();
    let failed_at = outcome.failure.as_ref().map(|f| f.class_id.clone());
    // Audit write is best-effort: the roster changes above are already
    // applied and must still be reported to the operator.
    let _ = conn.execute(
        "INSERT INTO rollover_runs(id, committed_at, threshold, succeeded, failed_at)
         VALUES(?, ?, ?, ?, ?)",
        (
            &run_id,
            Utc::now().to_rfc3339(),
            run.threshold,
            serde_json::to_string(&outcome.succeeded).unwrap_or_else(|_| "[]".to_string()),
            &failed_at,
        ),
    );

    let mut body = json!({
        "runId": run_id,
        "succeeded": outcome.succeeded,
    });
    if let Some(f) = &outcome.failure {
        body["failedAt"] = json!(f.class_id);
        body["failure"] = json!({ "code": f.code, "message": f.message });
    }
    ok(&req.id, body)
}

fn handle_rollover_discard(state: &mut AppState, req: &Request) -> serde_json::Value {
    let had_preview = state.preview.take().is_some();
    ok(&req.id, json!({ "discarded": had_preview }))
}

fn handle_rollover_curriculum(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let curriculum = match load_curriculum(conn) {
        Ok(c) => c,
        Err(e) => return err(&req.id, "bad_settings", e.to_string(), None),
    };
    ok(
        &req.id,
        json!({
            "stages": curriculum.stages(),
            "flattened": curriculum.flattened()
        }),
    )
}

fn handle_rollover_runs(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let mut stmt = match conn.prepare(
        "SELECT id, committed_at, threshold, succeeded, failed_at
         FROM rollover_runs
         ORDER BY committed_at DESC",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([], |r| {
            let succeeded_raw: String = r.get(3)?;
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "committedAt": r.get::<_, String>(1)?,
                "threshold": r.get::<_, f64>(2)?,
                "succeeded": serde_json::from_str::<serde_json::Value>(&succeeded_raw)
                    .unwrap_or_else(|_| json!([])),
                "failedAt": r.get::<_, Option<String>>(4)?
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());
    match rows {
        Ok(runs) => ok(&req.id, json!({ "runs": runs })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "rollover.preview" => Some(handle_rollover_preview(state, req)),
        "rollover.commit" => Some(handle_rollover_commit(state, req)),
        "rollover.discard" => Some(handle_rollover_discard(state, req)),
        "rollover.curriculum" => Some(handle_rollover_curriculum(state, req)),
        "rollover.runs" => Some(handle_rollover_runs(state, req)),
        _ => None,
    }
}
