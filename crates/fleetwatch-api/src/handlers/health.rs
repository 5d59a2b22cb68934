use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};

/// `GET /health` — liveness probe.
pub async fn health() -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "UP",
            "service": "fleetwatch-api",
            "timestamp": Utc::now(),
        })),
    )
}
