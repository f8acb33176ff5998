//! Liveness and readiness probes.

use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use rushgate_core::ZoneId;
use serde_json::json;

/// Process liveness; always succeeds while the server runs.
pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Readiness: both backing stores must answer a cheap read.
pub async fn readiness_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let probe_zone = ZoneId::from("readiness-probe");
    if state.engine.availability(&probe_zone).await.is_err() {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }
    if state
        .bookings
        .get_by_idempotency_key("readiness-probe")
        .await
        .is_err()
    {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }
    Ok(Json(json!({ "status": "ready" })))
}
