use axum::Json;
use serde::Serialize;
use serde_json::{Value, json};

/// Normalized success envelope `{success, data, meta}` shared by every
/// HTTP endpoint. Errors use the mirror shape in `error.rs`.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: T,
    pub meta: Value,
}

/// Wrap `data` in the success envelope.
pub fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        data,
        meta: json!({}),
    })
}

/// Wrap `data` with additional metadata fields.
pub fn ok_with_meta<T: Serialize>(data: T, meta: Value) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        data,
        meta,
    })
}
