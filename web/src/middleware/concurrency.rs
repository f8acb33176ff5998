//! Global in-flight request cap.

use crate::error::AppError;
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use rushgate_core::Error;
use std::time::Duration;

/// Shed the request when the process is already serving its cap.
pub async fn concurrency_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(_permit) = state.concurrency.try_acquire() else {
        tracing::warn!(
            in_flight = state.concurrency.current(),
            "shedding request: concurrency cap reached"
        );
        return AppError::from(Error::RateLimited {
            retry_after: Duration::from_secs(1),
        })
        .into_response();
    };
    // The permit is held for the request's whole lifetime.
    next.run(request).await
}
