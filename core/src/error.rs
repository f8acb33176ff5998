//! Error taxonomy shared across the control plane.
//!
//! Every failure that can cross a crate boundary is one of the variants of
//! [`Error`]. Storage crates convert transport- and script-level failures
//! into these; the web crate maps them onto HTTP statuses via
//! [`ErrorCode::http_status`]. Codes are a closed enum, never free-form
//! strings.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for control-plane operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Structured error code surfaced to clients and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Field-level request validation failure.
    Validation,
    /// Requested entity does not exist.
    NotFound,
    /// State conflict: already confirmed, already released, idempotency-key
    /// reuse, booking already exists.
    Conflict,
    /// Reservation or booking past its TTL.
    Expired,
    /// Zone has fewer seats than requested.
    InsufficientStock,
    /// Per-user reservation cap would be exceeded.
    UserLimitExceeded,
    /// Admission control rejected the request.
    RateLimited,
    /// Queue mode is active and no valid queue pass was presented.
    QueueRequired,
    /// A dependency did not answer within the deadline.
    UpstreamTimeout,
    /// A dependency is unreachable.
    UpstreamUnavailable,
    /// Unclassified server-side failure.
    Internal,
}

impl ErrorCode {
    /// Wire representation of the code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::Expired => "EXPIRED",
            Self::InsufficientStock => "INSUFFICIENT_STOCK",
            Self::UserLimitExceeded => "USER_LIMIT_EXCEEDED",
            Self::RateLimited => "RATE_LIMITED",
            Self::QueueRequired => "QUEUE_REQUIRED",
            Self::UpstreamTimeout => "UPSTREAM_TIMEOUT",
            Self::UpstreamUnavailable => "UPSTREAM_UNAVAILABLE",
            Self::Internal => "INTERNAL",
        }
    }

    /// HTTP status this code maps to at the request boundary.
    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            Self::Validation => 400,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::Expired => 410,
            Self::InsufficientStock | Self::UserLimitExceeded => 422,
            Self::RateLimited => 429,
            Self::QueueRequired | Self::UpstreamUnavailable => 503,
            Self::UpstreamTimeout => 504,
            Self::Internal => 500,
        }
    }
}

/// Control-plane error with its structured code and context.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    /// A request field failed validation.
    #[error("validation failed on {field}: {message}")]
    Validation {
        /// Offending field.
        field: &'static str,
        /// What was wrong with it.
        message: String,
    },

    /// Entity not found.
    #[error("{resource} not found")]
    NotFound {
        /// Kind of entity looked up.
        resource: &'static str,
    },

    /// State conflict (already confirmed/released, duplicate booking,
    /// idempotency-key reuse).
    #[error("conflict: {message}")]
    Conflict {
        /// Human-readable conflict description.
        message: String,
    },

    /// Reservation or booking past its TTL.
    #[error("expired: {message}")]
    Expired {
        /// What expired.
        message: String,
    },

    /// The zone cannot cover the requested quantity.
    #[error("insufficient stock: {available} seats available")]
    InsufficientStock {
        /// Seats remaining at the time of the attempt.
        available: i64,
    },

    /// The user's reservation set would exceed the per-user cap.
    #[error("user limit exceeded: at most {limit} seats per user")]
    UserLimitExceeded {
        /// Configured per-user cap.
        limit: i64,
    },

    /// Admission control rejected the request.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited {
        /// Hint for the `Retry-After` header.
        retry_after: Duration,
    },

    /// Queue mode is on and the request carried no valid pass.
    #[error("queue mode active, queue pass required")]
    QueueRequired,

    /// A dependency timed out.
    #[error("upstream timeout during {operation}")]
    UpstreamTimeout {
        /// Operation that hit the deadline.
        operation: &'static str,
    },

    /// A dependency is unreachable.
    #[error("upstream unavailable: {message}")]
    UpstreamUnavailable {
        /// Transport-level detail.
        message: String,
    },

    /// Unclassified server-side failure.
    #[error("internal error: {message}")]
    Internal {
        /// Detail for the logs; not shown verbatim to clients.
        message: String,
    },
}

impl Error {
    /// Structured code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { .. } => ErrorCode::Validation,
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::Conflict { .. } => ErrorCode::Conflict,
            Self::Expired { .. } => ErrorCode::Expired,
            Self::InsufficientStock { .. } => ErrorCode::InsufficientStock,
            Self::UserLimitExceeded { .. } => ErrorCode::UserLimitExceeded,
            Self::RateLimited { .. } => ErrorCode::RateLimited,
            Self::QueueRequired => ErrorCode::QueueRequired,
            Self::UpstreamTimeout { .. } => ErrorCode::UpstreamTimeout,
            Self::UpstreamUnavailable { .. } => ErrorCode::UpstreamUnavailable,
            Self::Internal { .. } => ErrorCode::Internal,
        }
    }

    /// Shorthand for an [`Error::Internal`] from any displayable source.
    #[must_use]
    pub fn internal(message: impl std::fmt::Display) -> Self {
        Self::Internal {
            message: message.to_string(),
        }
    }

    /// Whether a transport retry may succeed. Only transient upstream
    /// failures qualify, and callers must additionally hold an idempotency
    /// guarantee before retrying.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::UpstreamTimeout { .. } | Self::UpstreamUnavailable { .. }
        )
    }
}
