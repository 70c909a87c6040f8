use crate::calc::View;
use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::store::{Gradebook, Sequence};
use rusqlite::Connection;

pub type HandlerResult<T> = Result<T, serde_json::Value>;

pub fn required_str(req: &Request, key: &str) -> HandlerResult<String> {
    match req.params.get(key).and_then(|v| v.as_str()) {
        Some(v) => Ok(v.to_string()),
        None => Err(err(&req.id, "bad_params", format!("missing {}", key), None)),
    }
}

/// A trimmed, non-empty name.
pub fn required_name(req: &Request, key: &str) -> HandlerResult<String> {
    let name = required_str(req, key)?.trim().to_string();
    if name.is_empty() {
        return Err(err(
            &req.id,
            "bad_params",
            format!("{} must not be empty", key),
            None,
        ));
    }
    Ok(name)
}

/// `sequence` as a slot key (`"thirdSequence"`), a numeric string (`"3"`) or
/// a JSON integer (`3`).
pub fn required_sequence(req: &Request) -> HandlerResult<Sequence> {
    let raw = match req.params.get("sequence") {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => return Err(err(&req.id, "bad_params", "missing sequence", None)),
    };
    Sequence::parse(&raw).ok_or_else(|| {
        err(
            &req.id,
            "bad_params",
            format!("unknown sequence: {}", raw),
            None,
        )
    })
}

pub fn required_view(req: &Request) -> HandlerResult<View> {
    let raw = required_str(req, "view")?;
    let sequence = req.params.get("sequence").and_then(|v| v.as_str());
    View::parse(&raw, sequence)
        .ok_or_else(|| err(&req.id, "bad_params", format!("unknown view: {}", raw), None))
}

pub fn book<'a>(state: &'a AppState, req: &Request) -> HandlerResult<&'a Gradebook> {
    state
        .book
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn workspace<'a>(
    state: &'a mut AppState,
    req: &Request,
) -> HandlerResult<(&'a Connection, &'a mut Gradebook)> {
    match (state.db.as_ref(), state.book.as_mut()) {
        (Some(conn), Some(book)) => Ok((conn, book)),
        _ => Err(err(&req.id, "no_workspace", "select a workspace first", None)),
    }
}
