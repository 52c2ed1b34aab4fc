use crate::curriculum::Curriculum;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::rollover::{DEFAULT_CAPACITY, DEFAULT_SECTION};
use serde_json::json;

#[derive(Clone, Copy)]
enum SetupSection {
    Curriculum,
    Defaults,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "curriculum" => Some(Self::Curriculum),
            "defaults" => Some(Self::Defaults),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Curriculum => "rollover.curriculum",
            Self::Defaults => "rollover.defaults",
        }
    }
}

fn default_section_value(section: SetupSection) -> serde_json::Value {
    match section {
        SetupSection::Curriculum => {
            serde_json::to_value(Curriculum::default_k12().stages()).unwrap_or_else(|_| json!([]))
        }
        SetupSection::Defaults => json!({
            "section": DEFAULT_SECTION,
            "capacity": DEFAULT_CAPACITY
        }),
    }
}

fn validate(section: SetupSection, values: &serde_json::Value) -> Result<(), String> {
    match section {
        SetupSection::Curriculum => Curriculum::from_value(values)
            .map(|_| ())
            .map_err(|e| e.message),
        SetupSection::Defaults => {
            let Some(obj) = values.as_object() else {
                return Err("defaults must be an object".to_string());
            };
            if let Some(s) = obj.get("section") {
                if s.as_str().map(|v| v.trim().is_empty()).unwrap_or(true) {
                    return Err("defaults.section must be a non-empty string".to_string());
                }
            }
            if let Some(c) = obj.get("capacity") {
                if c.as_i64().map(|v| v < 0).unwrap_or(true) {
                    return Err("defaults.capacity must be an integer >= 0".to_string());
                }
            }
            Ok(())
        }
    }
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section) = req
        .params
        .get("section")
        .and_then(|v| v.as_str())
        .and_then(SetupSection::parse)
    else {
        return err(
            &req.id,
            "bad_params",
            "section must be one of: curriculum, defaults",
            None,
        );
    };

    match db::settings_get_json(conn, section.key()) {
        Ok(Some(saved)) => ok(&req.id, json!({ "values": saved, "isDefault": false })),
        Ok(None) => ok(
            &req.id,
            json!({ "values": default_section_value(section), "isDefault": true }),
        ),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_setup_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section) = req
        .params
        .get("section")
        .and_then(|v| v.as_str())
        .and_then(SetupSection::parse)
    else {
        return err(
            &req.id,
            "bad_params",
            "section must be one of: curriculum, defaults",
            None,
        );
    };
    let Some(values) = req.params.get("values") else {
        return err(&req.id, "bad_params", "missing values", None);
    };

    if let Err(msg) = validate(section, values) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), values) {
        return err(&req.id, "db_insert_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "values": values }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.set" => Some(handle_setup_set(state, req)),
        _ => None,
    }
}
