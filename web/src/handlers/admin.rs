//! Admin and debug endpoints over the raw zone counters.

use crate::dto::{ok, ApiResponse, AvailabilityResponse, PublishZoneRequest};
use crate::error::AppError;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::Json;
use rushgate_core::ZoneId;

/// `GET /api/v1/admin/zones/{zone_id}/availability`
pub async fn get_availability(
    State(state): State<AppState>,
    Path(zone_id): Path<String>,
) -> Result<Json<ApiResponse<AvailabilityResponse>>, AppError> {
    let zone_id = ZoneId(zone_id);
    let available = state.engine.availability(&zone_id).await?;
    Ok(Json(ok(AvailabilityResponse { zone_id, available })))
}

/// `PUT /api/v1/admin/zones/{zone_id}/availability`
///
/// Seeds the live counter when a show is published. Catalogue rows are
/// owned by the external catalogue service; only the counter lives here.
pub async fn set_availability(
    State(state): State<AppState>,
    Path(zone_id): Path<String>,
    Json(body): Json<PublishZoneRequest>,
) -> Result<Json<ApiResponse<AvailabilityResponse>>, AppError> {
    if body.seats < 0 {
        return Err(AppError::validation("seats must not be negative"));
    }
    let zone_id = ZoneId(zone_id);
    state.engine.set_availability(&zone_id, body.seats).await?;
    Ok(Json(ok(AvailabilityResponse {
        zone_id,
        available: body.seats,
    })))
}
