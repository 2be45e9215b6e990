//! Liveness endpoint.

use axum::Json;
use serde_json::{json, Value};

/// Report the process as alive.
pub async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}
