use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::rollover::PreviewRun;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    /// Pending rollover preview: set by `rollover.preview`, consumed by
    /// `rollover.commit`, dropped by `rollover.discard`. Never persisted.
    pub preview: Option<PreviewRun>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            workspace: None,
            db: None,
            preview: None,
        }
    }
}
