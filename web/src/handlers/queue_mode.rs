//! Queue-mode operations endpoints.

use crate::dto::{ok, ApiResponse, QueueModeResponse, SetQueueModeRequest};
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use chrono::Utc;

/// `GET /api/v1/queue-mode`
pub async fn get_queue_mode(State(state): State<AppState>) -> Json<ApiResponse<QueueModeResponse>> {
    Json(ok(QueueModeResponse {
        queue_mode_enabled: state.queue_mode.is_enabled(),
        timestamp: Utc::now().timestamp(),
    }))
}

/// `PUT /api/v1/queue-mode`
pub async fn set_queue_mode(
    State(state): State<AppState>,
    Json(body): Json<SetQueueModeRequest>,
) -> Json<ApiResponse<QueueModeResponse>> {
    state.queue_mode.set_enabled(body.enabled);
    Json(ok(QueueModeResponse {
        queue_mode_enabled: state.queue_mode.is_enabled(),
        timestamp: Utc::now().timestamp(),
    }))
}
