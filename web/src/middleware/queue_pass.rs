//! Queue-pass validation and the queue-mode gate.
//!
//! A valid pass marks the request as rate-limit-bypass whether or not
//! queue mode is on. When queue mode is on, protected paths without a
//! valid pass are answered with 503 `QUEUE_REQUIRED`; the rejection
//! message is the pass failure reason verbatim (`missing queue pass`,
//! `invalid queue pass`, `expired queue pass`).

use crate::error::AppError;
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use rushgate_admission::PassError;
use rushgate_core::{ErrorCode, EventId, UserId};

/// Header carrying the signed queue pass.
pub const QUEUE_PASS_HEADER: &str = "x-queue-pass";

/// Marker extension: a valid pass bypasses rate limiting.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitBypass;

/// Identity claimed by a validated pass.
#[derive(Debug, Clone)]
pub struct QueuePassIdentity {
    /// Released user.
    pub user_id: UserId,
    /// Event the pass admits to.
    pub event_id: EventId,
}

/// Validate any presented pass, then enforce the queue-mode gate.
pub async fn queue_pass_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get(QUEUE_PASS_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string);

    let mut failure: Option<PassError> = None;
    if let Some(token) = token.as_deref() {
        match state.pass_validator.validate(token) {
            Ok(claims) => {
                let mut valid = true;
                if state.admission.queue_pass_check_store {
                    // The mirror entry must hold the exact token; a
                    // deleted entry means the pass was revoked.
                    match state.passes.get(&claims.event_id, claims.user_id).await {
                        Ok(Some(stored)) if stored == token => {}
                        Ok(_) => valid = false,
                        Err(error) => {
                            tracing::warn!(%error, "queue pass store check failed; rejecting pass");
                            valid = false;
                        }
                    }
                }
                if valid {
                    request.extensions_mut().insert(RateLimitBypass);
                    request.extensions_mut().insert(QueuePassIdentity {
                        user_id: claims.user_id,
                        event_id: claims.event_id,
                    });
                } else {
                    failure = Some(PassError::Invalid);
                }
            }
            Err(error) => failure = Some(error),
        }
    }

    let method = request.method().as_str().to_string();
    let path = request.uri().path().to_string();
    let has_valid_pass = request.extensions().get::<RateLimitBypass>().is_some();

    if state.queue_mode.is_enabled()
        && state.queue_mode.is_protected(&method, &path)
        && !has_valid_pass
    {
        let reason = failure.unwrap_or(PassError::Missing);
        tracing::debug!(path = %path, reason = %reason, "queue mode gate rejected request");
        return AppError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::QueueRequired.as_str(),
            reason.to_string(),
        )
        .into_response();
    }

    next.run(request).await
}
