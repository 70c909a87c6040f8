use crate::error::GradebookError;
use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

pub fn from_error(id: &str, e: &GradebookError) -> serde_json::Value {
    if e.is_storage() {
        tracing::error!(error = %e, "storage call failed");
    }
    err(id, e.code(), e.to_string(), e.details())
}

pub fn from_result<T: serde::Serialize>(
    id: &str,
    computed: crate::error::Result<T>,
) -> serde_json::Value {
    match computed {
        Ok(v) => match serde_json::to_value(v) {
            Ok(result) => ok(id, result),
            Err(e) => err(id, "serialize_failed", e.to_string(), None),
        },
        Err(e) => from_error(id, &e),
    }
}
