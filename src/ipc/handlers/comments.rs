use crate::calc::View;
use crate::db;
use crate::ipc::error::{err, from_error, ok};
use crate::ipc::helpers::{required_str, workspace};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_comments_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let (conn, book) = match workspace(state, req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if book.student(&student_id).is_none() {
        return err(&req.id, "not_found", "student not found", None);
    }
    match db::get_comments(conn, &student_id) {
        Ok(comments) => ok(
            &req.id,
            json!({ "studentId": student_id, "comments": comments }),
        ),
        Err(e) => from_error(&req.id, &e),
    }
}

/// Comments are keyed by view (`firstSequence` .. `annual`). Empty text
/// clears the entry.
fn handle_comments_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let view_key = match required_str(req, "viewKey") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(view) = View::parse(&view_key, None) else {
        return err(
            &req.id,
            "bad_params",
            format!("unknown viewKey: {}", view_key),
            None,
        );
    };
    let text = match req.params.get("text") {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s.trim().to_string(),
        Some(_) => return err(&req.id, "bad_params", "text must be a string", None),
    };
    let (conn, book) = match workspace(state, req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if book.student(&student_id).is_none() {
        return err(&req.id, "not_found", "student not found", None);
    }

    let mut comments = book.marks.comments_for(&student_id);
    if text.is_empty() {
        comments.remove(view.key());
    } else {
        comments.insert(view.key().to_string(), text);
    }
    if let Err(e) = db::set_comments(conn, &student_id, &comments) {
        return from_error(&req.id, &e);
    }
    book.marks.set_comments(&student_id, comments);
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "comments.get" => Some(handle_comments_get(state, req)),
        "comments.set" => Some(handle_comments_set(state, req)),
        _ => None,
    }
}
