use std::path::PathBuf;

use crate::store::Gradebook;
use rusqlite::Connection;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// `book` mirrors what is committed in `db`. It is only replaced or edited
/// after the matching write has committed.
#[derive(Default)]
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub book: Option<Gradebook>,
}
