use crate::backup;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::core::open_workspace;
use crate::ipc::helpers::required_str;
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn handle_backup_export_workspace_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(workspace) = state.workspace.clone() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let out_path = match required_str(req, "outPath") {
        Ok(v) => PathBuf::from(v),
        Err(resp) => return resp,
    };

    match backup::export_workspace_bundle(&workspace, &out_path) {
        Ok(summary) => {
            tracing::info!(out = %out_path.display(), sha256 = %summary.db_sha256, "workspace exported");
            ok(
                &req.id,
                json!({
                    "ok": true,
                    "path": out_path.to_string_lossy(),
                    "bundleFormat": summary.bundle_format,
                    "entryCount": summary.entry_count,
                    "dbSha256": summary.db_sha256,
                }),
            )
        }
        Err(e) => err(&req.id, "backup_failed", format!("{:#}", e), None),
    }
}

/// The connection is closed while the database file is swapped, then the
/// workspace is reopened. A refused bundle leaves the old database in place
/// and it is reopened as it was.
fn handle_backup_import_workspace_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(workspace) = state.workspace.clone() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let in_path = match required_str(req, "inPath") {
        Ok(v) => PathBuf::from(v),
        Err(resp) => return resp,
    };
    if !in_path.is_file() {
        return err(
            &req.id,
            "not_found",
            "bundle not found",
            Some(json!({ "path": in_path.to_string_lossy() })),
        );
    }

    state.db = None;
    let imported = backup::import_workspace_bundle(&in_path, &workspace);
    let reopened = open_workspace(state, &workspace);

    if let Err(e) = reopened {
        state.book = None;
        return err(&req.id, "db_open_failed", format!("{:#}", e), None);
    }
    let summary = match imported {
        Ok(s) => s,
        Err(e) => return err(&req.id, "backup_failed", format!("{:#}", e), None),
    };
    tracing::info!(
        bundle = %in_path.display(),
        format = %summary.bundle_format_detected,
        "workspace imported"
    );
    let (students, subjects) = state
        .book
        .as_ref()
        .map(|b| (b.students.len(), b.subjects.len()))
        .unwrap_or_default();
    ok(
        &req.id,
        json!({
            "ok": true,
            "workspacePath": workspace.to_string_lossy(),
            "bundleFormatDetected": summary.bundle_format_detected,
            "students": students,
            "subjects": subjects,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backup.exportWorkspaceBundle" => Some(handle_backup_export_workspace_bundle(state, req)),
        "backup.importWorkspaceBundle" => Some(handle_backup_import_workspace_bundle(state, req)),
        _ => None,
    }
}
