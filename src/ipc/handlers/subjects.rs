use crate::db;
use crate::ipc::error::{err, from_error, ok};
use crate::ipc::helpers::{book, required_name, required_str, workspace, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::store::validate_total;
use serde_json::json;

fn parse_total(req: &Request, raw: &serde_json::Value) -> HandlerResult<f64> {
    let total = raw.as_f64().unwrap_or(f64::NAN);
    validate_total(total).map_err(|e| from_error(&req.id, &e))
}

fn handle_subjects_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    match book(state, req) {
        Ok(b) => ok(&req.id, json!({ "subjects": b.subjects })),
        Err(resp) => resp,
    }
}

fn handle_subjects_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let name = match required_name(req, "name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let total = match req.params.get("total") {
        Some(raw) => match parse_total(req, raw) {
            Ok(t) => t,
            Err(resp) => return resp,
        },
        None => return err(&req.id, "bad_params", "missing total", None),
    };
    let (conn, book) = match workspace(state, req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if let Err(e) = book.check_subject_name(&name, None) {
        return from_error(&req.id, &e);
    }
    let subject = match db::insert_subject(conn, &name, total) {
        Ok(s) => s,
        Err(e) => return from_error(&req.id, &e),
    };
    tracing::info!(subject_id = %subject.id, name = %subject.name, "subject created");
    let result = json!({ "subjectId": subject.id, "name": subject.name, "total": subject.total });
    book.add_subject(subject);
    ok(&req.id, result)
}

/// Renames carry every stored mark over to the new name. Lowering the total
/// does not touch stored marks; the ones now out of range are reported back
/// as `staleMarks`.
fn handle_subjects_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let subject_id = match required_str(req, "subjectId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let new_name = match req.params.get("name") {
        Some(_) => match required_name(req, "name") {
            Ok(v) => Some(v),
            Err(resp) => return resp,
        },
        None => None,
    };
    let new_total = match req.params.get("total") {
        Some(raw) => match parse_total(req, raw) {
            Ok(t) => Some(t),
            Err(resp) => return resp,
        },
        None => None,
    };
    let (conn, book) = match workspace(state, req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(current) = book.subject(&subject_id).cloned() else {
        return err(&req.id, "not_found", "subject not found", None);
    };
    let name = new_name.unwrap_or_else(|| current.name.clone());
    let total = new_total.unwrap_or(current.total);
    if let Err(e) = book.check_subject_name(&name, Some(&subject_id)) {
        return from_error(&req.id, &e);
    }

    let mut next = book.clone();
    next.update_subject(&subject_id, &name, total);
    let Some(updated) = next.subject(&subject_id).cloned() else {
        return err(&req.id, "not_found", "subject not found", None);
    };
    let renamed = current.name != name;
    // Mark records only change when the name does.
    let records = next.marks.records().filter(|_| renamed);
    if let Err(e) = db::update_subject(conn, &updated, records) {
        return from_error(&req.id, &e);
    }

    let stale: Vec<serde_json::Value> = next
        .marks
        .marks_above(&name, total)
        .into_iter()
        .map(|(student_id, seq, value)| {
            json!({ "studentId": student_id, "sequence": seq, "value": value })
        })
        .collect();
    if !stale.is_empty() {
        tracing::warn!(
            subject_id = %subject_id,
            total,
            count = stale.len(),
            "stored marks exceed the new subject total"
        );
    }
    tracing::info!(subject_id = %subject_id, renamed, "subject updated");
    *book = next;
    ok(
        &req.id,
        json!({
            "subjectId": subject_id,
            "name": name,
            "total": total,
            "staleMarks": stale,
        }),
    )
}

fn handle_subjects_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let subject_id = match required_str(req, "subjectId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let (conn, book) = match workspace(state, req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let mut next = book.clone();
    let Some(removed) = next.remove_subject(&subject_id) else {
        return err(&req.id, "not_found", "subject not found", None);
    };
    if let Err(e) = db::delete_subject(conn, &subject_id, next.marks.records()) {
        return from_error(&req.id, &e);
    }
    tracing::info!(subject_id = %subject_id, name = %removed.name, "subject deleted");
    *book = next;
    ok(&req.id, json!({ "subjectId": subject_id, "name": removed.name }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "subjects.list" => Some(handle_subjects_list(state, req)),
        "subjects.create" => Some(handle_subjects_create(state, req)),
        "subjects.update" => Some(handle_subjects_update(state, req)),
        "subjects.delete" => Some(handle_subjects_delete(state, req)),
        _ => None,
    }
}
