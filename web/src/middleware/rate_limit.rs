//! Two-tier per-endpoint rate limiting.
//!
//! The local tier answers from this process's buckets; requests it admits
//! are then charged against the shared Redis bucket so all replicas draw
//! from one budget. A valid queue pass bypasses both tiers and the
//! response says so via `X-RateLimit-Bypass: queue-pass`. An unreachable
//! shared tier sheds load; it never opens the gate.

use crate::error::AppError;
use crate::extractors::client_key;
use crate::middleware::queue_pass::RateLimitBypass;
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use rushgate_admission::{Allowance, Limit};
use rushgate_core::Error;

/// Enforce the endpoint policy for this request.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if request.extensions().get::<RateLimitBypass>().is_some() {
        let mut response = next.run(request).await;
        response.headers_mut().insert(
            "x-ratelimit-bypass",
            HeaderValue::from_static("queue-pass"),
        );
        return response;
    }

    let method = request.method().as_str().to_string();
    let path = request.uri().path().to_string();
    let key = client_key(request.headers());

    let mut allowance = state.limiters.check(&method, &path, &key);
    if !allowance.allowed {
        let retry_after = state.limiters.retry_after(&method, &path);
        let mut response =
            AppError::from(Error::RateLimited { retry_after }).into_response();
        set_rate_limit_headers(&mut response, &allowance);
        return response;
    }

    if let Some(shared) = &state.shared_limiter {
        match shared.allow(&key).await {
            Ok(decision) if decision.allowed => {
                allowance.remaining = allowance.remaining.min(decision.remaining);
            }
            Ok(decision) => {
                let retry_after = state.limiters.retry_after(&method, &path);
                let mut response =
                    AppError::from(Error::RateLimited { retry_after }).into_response();
                set_rate_limit_headers(&mut response, &decision);
                return response;
            }
            Err(error) => {
                // Fail fast rather than relax admission during a store
                // outage.
                tracing::warn!(%error, "shared rate limiter unreachable; shedding request");
                return AppError::from(error).into_response();
            }
        }
    }

    let mut response = next.run(request).await;
    set_rate_limit_headers(&mut response, &allowance);
    response
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn set_rate_limit_headers(response: &mut Response, allowance: &Allowance) {
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&(allowance.limit.max(0.0) as u64).to_string()) {
        headers.insert("x-ratelimit-limit", value);
    }
    if let Ok(value) = HeaderValue::from_str(&(allowance.remaining.max(0.0) as u64).to_string()) {
        headers.insert("x-ratelimit-remaining", value);
    }
    if let Ok(value) = HeaderValue::from_str(&allowance.reset_at.timestamp().to_string()) {
        headers.insert("x-ratelimit-reset", value);
    }
}
