use serde_json::json;

use crate::engine::RolloverError;

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

/// Error object for an engine failure, including the aborted step if any.
pub fn rollover_error_body(e: &RolloverError) -> serde_json::Value {
    let mut body = json!({
        "code": e.code(),
        "message": e.to_string(),
    });
    if let Some(step) = e.step() {
        body["details"] = json!({ "step": step.as_str() });
    }
    body
}

pub fn rollover_err(id: &str, e: &RolloverError) -> serde_json::Value {
    json!({
        "id": id,
        "ok": false,
        "error": rollover_error_body(e),
    })
}
