use crate::db;
use crate::ipc::error::{err, from_error, ok};
use crate::ipc::helpers::{required_str, workspace};
use crate::ipc::types::{AppState, Request};
use crate::store::Gradebook;
use anyhow::Context;
use serde_json::json;
use std::path::{Path, PathBuf};

/// Open (creating if needed) the workspace at `path` and load its gradebook.
/// The previous workspace stays selected if anything fails.
pub fn open_workspace(state: &mut AppState, path: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(path)
        .with_context(|| format!("failed to create workspace {}", path.to_string_lossy()))?;
    let conn = db::open_db(path)?;
    let book = db::load_gradebook(&conn).context("failed to load gradebook")?;
    tracing::info!(
        workspace = %path.display(),
        students = book.students.len(),
        subjects = book.subjects.len(),
        "workspace opened"
    );
    state.workspace = Some(path.to_path_buf());
    state.db = Some(conn);
    state.book = Some(book);
    Ok(())
}

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let path = match required_str(req, "path") {
        Ok(v) => PathBuf::from(v),
        Err(resp) => return resp,
    };
    if let Err(e) = open_workspace(state, &path) {
        return err(
            &req.id,
            "db_open_failed",
            format!("{:#}", e),
            Some(json!({ "path": path.to_string_lossy() })),
        );
    }
    let (students, subjects) = state
        .book
        .as_ref()
        .map(|b| (b.students.len(), b.subjects.len()))
        .unwrap_or_default();
    ok(
        &req.id,
        json!({
            "workspacePath": path.to_string_lossy(),
            "students": students,
            "subjects": subjects,
        }),
    )
}

fn handle_workspace_reset(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (conn, book) = match workspace(state, req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if let Err(e) = db::reset_workspace(conn) {
        return from_error(&req.id, &e);
    }
    *book = Gradebook::default();
    tracing::info!("workspace reset");
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "workspace.reset" => Some(handle_workspace_reset(state, req)),
        _ => None,
    }
}
