use crate::db;
use crate::error::GradebookError;
use crate::ipc::error::{err, from_error, ok};
use crate::ipc::helpers::{required_sequence, required_str, workspace, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::store::{parse_mark, Gradebook, Sequence};
use rusqlite::Connection;
use serde_json::json;

const BULK_SET_MAX_ENTRIES: usize = 5000;

/// Validate, apply and persist one entry. The in-memory record is put back
/// if the write fails, so the book never runs ahead of the database.
fn apply_mark(
    conn: &Connection,
    book: &mut Gradebook,
    student_id: &str,
    seq: Sequence,
    subject_name: &str,
    raw: Option<&serde_json::Value>,
) -> Result<Option<f64>, GradebookError> {
    let max = book
        .subject_by_name(subject_name)
        .map(|s| s.total)
        .ok_or(GradebookError::NotFound("subject"))?;
    let Some(previous) = book.marks.record(student_id).cloned() else {
        return Err(GradebookError::NotFound("student"));
    };
    let value = parse_mark(raw)?;
    let accepted = book
        .marks
        .set_mark(student_id, seq, subject_name, value, max)?;
    let written = match book.marks.record(student_id) {
        Some(record) => db::set_marks(conn, student_id, record),
        None => Err(GradebookError::NotFound("student")),
    };
    if let Err(e) = written {
        book.marks.insert_record(student_id, previous);
        return Err(e);
    }
    Ok(accepted)
}

fn handle_marks_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let (conn, _) = match workspace(state, req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match db::get_marks(conn, &student_id) {
        Ok(record) => ok(&req.id, json!({ "studentId": student_id, "marks": record })),
        Err(e) => from_error(&req.id, &e),
    }
}

fn subject_param(req: &Request) -> HandlerResult<(Sequence, String)> {
    Ok((required_sequence(req)?, required_str(req, "subjectName")?))
}

fn handle_marks_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let (seq, subject_name) = match subject_param(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let (conn, book) = match workspace(state, req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match apply_mark(
        conn,
        book,
        &student_id,
        seq,
        &subject_name,
        req.params.get("value"),
    ) {
        Ok(value) => ok(&req.id, json!({ "accepted": true, "value": value })),
        Err(GradebookError::Rejected(r)) => {
            tracing::debug!(student_id = %student_id, subject = %subject_name, reason = r.code(), "mark rejected");
            ok(
                &req.id,
                json!({ "accepted": false, "rejection": r.details() }),
            )
        }
        Err(e) => from_error(&req.id, &e),
    }
}

/// One sequence, one subject, many students. Each entry stands alone: a bad
/// or failed entry is reported in `errors` and the rest still go through.
fn handle_marks_bulk_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (seq, subject_name) = match subject_param(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(entries) = req.params.get("entries").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing entries", None);
    };
    if entries.len() > BULK_SET_MAX_ENTRIES {
        return err(
            &req.id,
            "bad_params",
            format!("too many entries (max {})", BULK_SET_MAX_ENTRIES),
            Some(json!({ "count": entries.len() })),
        );
    }
    let (conn, book) = match workspace(state, req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if book.subject_by_name(&subject_name).is_none() {
        return err(&req.id, "not_found", "subject not found", None);
    }

    let mut updated = 0usize;
    let mut rejected = 0usize;
    let mut errors = Vec::new();
    for (index, entry) in entries.iter().enumerate() {
        let Some(student_id) = entry.get("studentId").and_then(|v| v.as_str()) else {
            errors.push(json!({
                "index": index,
                "code": "bad_params",
                "message": "missing studentId",
            }));
            continue;
        };
        match apply_mark(conn, book, student_id, seq, &subject_name, entry.get("value")) {
            Ok(_) => updated += 1,
            Err(e) => {
                if matches!(e, GradebookError::Rejected(_)) {
                    rejected += 1;
                }
                let mut item = json!({
                    "index": index,
                    "studentId": student_id,
                    "code": e.code(),
                    "message": e.to_string(),
                });
                if let Some(d) = e.details() {
                    item["details"] = d;
                }
                errors.push(item);
            }
        }
    }
    tracing::info!(
        sequence = seq.key(),
        subject = %subject_name,
        updated,
        rejected,
        failed = errors.len(),
        "bulk marks applied"
    );
    ok(
        &req.id,
        json!({ "updated": updated, "rejected": rejected, "errors": errors }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "marks.get" => Some(handle_marks_get(state, req)),
        "marks.set" => Some(handle_marks_set(state, req)),
        "marks.bulkSet" => Some(handle_marks_bulk_set(state, req)),
        _ => None,
    }
}
