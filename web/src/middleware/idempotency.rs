//! Idempotency capture and replay.
//!
//! Mutating requests must carry `Idempotency-Key`. The first request with
//! a key claims an in-flight record, runs the handler with its body
//! buffered, and stamps the captured response into the record; retries
//! with the same key and fingerprint replay those bytes verbatim. A
//! retry while the original is still running gets 409; the same key with
//! a different fingerprint gets the distinct key-reused failure. If the
//! handler dies before a response is captured, a drop guard removes the
//! in-flight record so a later retry can run.

use crate::error::AppError;
use crate::extractors::USER_ID_HEADER;
use crate::state::AppState;
use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use rushgate_admission::policy::match_path;
use rushgate_store::{BeginOutcome, IdempotencyRecord, IdempotencyStatus, IdempotencyStore};

/// Header carrying the client-chosen idempotency key.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Key and fingerprint of the guarded request, exposed to handlers via
/// request extensions.
#[derive(Debug, Clone)]
pub struct IdempotencyContext {
    /// Client-supplied key.
    pub key: String,
    /// Keyed request fingerprint.
    pub request_hash: String,
}

/// Guard the request with the idempotency record protocol.
pub async fn idempotency_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if matches!(
        *request.method(),
        Method::GET | Method::HEAD | Method::OPTIONS
    ) {
        return next.run(request).await;
    }
    let path = request.uri().path().to_string();
    if state
        .idempotency_skip
        .iter()
        .any(|pattern| match_path(pattern, &path))
    {
        return next.run(request).await;
    }

    let Some(key) = request
        .headers()
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string)
    else {
        return AppError::validation("missing Idempotency-Key header").into_response();
    };
    if key.len() < 16 || key.len() > 128 {
        return AppError::validation("Idempotency-Key must be between 16 and 128 characters")
            .into_response();
    }

    let method = request.method().as_str().to_string();
    let user = request
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("anonymous")
        .to_string();

    let (mut parts, body) = request.into_parts();
    let body_bytes = match to_bytes(body, state.admission.idempotency_max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return AppError::validation("request body exceeds the idempotency buffer limit")
                .into_response()
        }
    };

    let request_hash = state
        .fingerprint
        .fingerprint(&method, &path, &user, &body_bytes);

    match state.idempotency.begin(&key, &request_hash).await {
        Err(error) => AppError::from(error).into_response(),
        Ok(BeginOutcome::Existing(record)) => existing_response(&record, &request_hash),
        Ok(BeginOutcome::Started) => {
            parts.extensions.insert(IdempotencyContext {
                key: key.clone(),
                request_hash: request_hash.clone(),
            });
            let request = Request::from_parts(parts, Body::from(body_bytes));

            let guard = CleanupGuard::new(state.idempotency.clone(), key.clone());
            let response = next.run(request).await;

            let (response_parts, response_body) = response.into_parts();
            let response_bytes =
                match to_bytes(response_body, state.admission.idempotency_max_body_bytes).await {
                    Ok(bytes) => bytes,
                    Err(_) => {
                        // Guard stays armed: the record is removed and a
                        // retry may run the handler again.
                        return AppError::new(
                            StatusCode::INTERNAL_SERVER_ERROR,
                            "INTERNAL",
                            "response too large to capture",
                        )
                        .into_response();
                    }
                };

            let body_text = String::from_utf8_lossy(&response_bytes).into_owned();
            match state
                .idempotency
                .complete(&key, &request_hash, response_parts.status.as_u16(), body_text)
                .await
            {
                Ok(()) => guard.defuse(),
                Err(error) => {
                    // Leave the guard armed so the stale in-flight record
                    // does not wedge future retries.
                    tracing::warn!(%error, key = %key, "failed to complete idempotency record");
                }
            }

            Response::from_parts(response_parts, Body::from(response_bytes))
        }
    }
}

fn existing_response(record: &IdempotencyRecord, request_hash: &str) -> Response {
    if record.request_hash != request_hash {
        return AppError::key_reused(
            "idempotency key was already used with a different request",
        )
        .into_response();
    }
    match record.status {
        IdempotencyStatus::Inflight => AppError::new(
            StatusCode::CONFLICT,
            "CONFLICT",
            "a request with this idempotency key is still in progress",
        )
        .into_response(),
        IdempotencyStatus::Completed => {
            let status = record
                .response_code
                .and_then(|code| StatusCode::from_u16(code).ok())
                .unwrap_or(StatusCode::OK);
            let body = record.response_body.clone().unwrap_or_default();
            let mut response = Response::new(Body::from(body));
            *response.status_mut() = status;
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
            response
                .headers_mut()
                .insert("x-idempotency-replayed", HeaderValue::from_static("true"));
            response
        }
    }
}

/// Removes the in-flight record unless defused; handles handler panics
/// and cancellation as well as capture failures.
struct CleanupGuard {
    store: IdempotencyStore,
    key: String,
    armed: bool,
}

impl CleanupGuard {
    fn new(store: IdempotencyStore, key: String) -> Self {
        Self {
            store,
            key,
            armed: true,
        }
    }

    fn defuse(mut self) {
        self.armed = false;
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if self.armed {
            let store = self.store.clone();
            let key = std::mem::take(&mut self.key);
            tokio::spawn(async move {
                if let Err(error) = store.remove(&key).await {
                    tracing::warn!(%error, key = %key, "failed to clean up idempotency record");
                }
            });
        }
    }
}
