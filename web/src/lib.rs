//! HTTP boundary of the rushgate control plane.
//!
//! Request flow on the booking hot path:
//!
//! 1. global concurrency cap (shed when saturated)
//! 2. queue-pass validation (sets the rate-limit bypass marker) and the
//!    queue-mode gate
//! 3. per-endpoint rate limiting, local tier then shared tier
//! 4. idempotency capture/replay
//! 5. the booking orchestrator
//!
//! Handlers know their collaborators only as the trait objects from
//! `rushgate_core::providers`.

#![forbid(unsafe_code)]

pub mod dto;
pub mod error;
pub mod extractors;
pub mod fingerprint;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

pub use error::AppError;
pub use routes::build_router;
pub use state::AppState;
