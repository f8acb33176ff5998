//! Bridge from domain errors to HTTP responses.
//!
//! Response bodies follow the `{success, error: {code, message}}` shape;
//! rate-limit rejections additionally carry `Retry-After`.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use rushgate_core::{Error, ErrorCode};
use serde_json::json;
use std::time::Duration;

/// HTTP-facing error with its structured code.
#[derive(Debug)]
pub struct AppError {
    /// Status sent to the client.
    pub status: StatusCode,
    /// Stable error code string.
    pub code: String,
    /// User-facing message.
    pub message: String,
    /// Optional `Retry-After` hint.
    pub retry_after: Option<Duration>,
}

impl AppError {
    /// Build an error with an explicit status.
    #[must_use]
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            retry_after: None,
        }
    }

    /// 400 with code `VALIDATION`.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ErrorCode::Validation.as_str(), message)
    }

    /// 422 with code `CONFLICT`; used for idempotency-key reuse.
    #[must_use]
    pub fn key_reused(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::Conflict.as_str(),
            message,
        )
    }

    /// Attach a `Retry-After` hint.
    #[must_use]
    pub const fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let code = err.code();
        let status =
            StatusCode::from_u16(code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let retry_after = match &err {
            Error::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        };
        let message = match &err {
            // Internal detail stays in the logs.
            Error::Internal { message } => {
                tracing::error!(error = %message, "internal error reached the http boundary");
                "internal error".to_string()
            }
            other => other.to_string(),
        };
        Self {
            status,
            code: code.as_str().to_string(),
            message,
            retry_after,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "success": false,
            "error": {
                "code": self.code,
                "message": self.message,
            }
        }));
        let mut response = (self.status, body).into_response();
        if let Some(retry_after) = self.retry_after {
            let secs = retry_after.as_secs().max(1);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
