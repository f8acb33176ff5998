//! Virtual waiting-room endpoints.

use crate::dto::{
    ok, ApiResponse, QueueJoinRequest, QueueJoinResponse, QueueMemberRequest,
    QueuePositionQuery, QueuePositionResponse,
};
use crate::error::AppError;
use crate::extractors::AuthedUser;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::Json;

/// `POST /api/v1/queue/join`
pub async fn join(
    State(state): State<AppState>,
    user: AuthedUser,
    Json(body): Json<QueueJoinRequest>,
) -> Result<Json<ApiResponse<QueueJoinResponse>>, AppError> {
    let outcome = state.queue.join(&body.event_id, user.0).await?;
    Ok(Json(ok(QueueJoinResponse {
        position: outcome.position,
        token: outcome.token,
        rejoined: outcome.rejoined,
    })))
}

/// `GET /api/v1/queue/position`
pub async fn position(
    State(state): State<AppState>,
    user: AuthedUser,
    Query(query): Query<QueuePositionQuery>,
) -> Result<Json<ApiResponse<QueuePositionResponse>>, AppError> {
    let position = state.queue.position(&query.event_id, user.0).await?;
    Ok(Json(ok(QueuePositionResponse { position })))
}

/// `POST /api/v1/queue/heartbeat`
pub async fn heartbeat(
    State(state): State<AppState>,
    user: AuthedUser,
    Json(body): Json<QueueMemberRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    state
        .queue
        .heartbeat(&body.event_id, user.0, &body.token)
        .await?;
    Ok(Json(ok(serde_json::json!({ "alive": true }))))
}

/// `POST /api/v1/queue/leave`
pub async fn leave(
    State(state): State<AppState>,
    user: AuthedUser,
    Json(body): Json<QueueMemberRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    state
        .queue
        .leave(&body.event_id, user.0, &body.token)
        .await?;
    Ok(Json(ok(serde_json::json!({ "left": true }))))
}
