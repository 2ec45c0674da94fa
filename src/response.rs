//! Standard response envelope helpers.

use axum::{http::StatusCode, Json};
use serde::Serialize;
use serde_json::Value;

/// Listing envelope: total over the filtered set plus one page of records.
#[derive(Serialize)]
pub struct ListBody {
    pub total: i64,
    pub items: Vec<Value>,
}

/// Mutation envelope for inserts.
#[derive(Serialize)]
pub struct InsertBody {
    pub inserted: u64,
}

pub fn list_body(total: i64, items: Vec<Value>) -> (StatusCode, Json<ListBody>) {
    (StatusCode::OK, Json(ListBody { total, items }))
}

pub fn inserted_body(inserted: u64) -> (StatusCode, Json<InsertBody>) {
    (StatusCode::OK, Json(InsertBody { inserted }))
}

/// Raw error envelope for boundaries that bypass `ApiError` (unknown routes,
/// panics): same shape, explicit status.
pub fn error_envelope(code: u32, msg: &str) -> Value {
    serde_json::json!({
        "code": code,
        "msg": msg,
        "request": null,
        "detail": null
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_shapes() {
        let body = serde_json::to_value(ListBody {
            total: 3,
            items: vec![serde_json::json!({"id": 1})],
        })
        .unwrap();
        assert_eq!(body["total"], 3);
        assert_eq!(body["items"][0]["id"], 1);

        let env = error_envelope(10000, "unknown server error");
        assert_eq!(env["code"], 10000);
        assert!(env["request"].is_null());
    }
}
