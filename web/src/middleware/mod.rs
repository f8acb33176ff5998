//! Admission and idempotency middleware.
//!
//! Execution order on the hot path: concurrency cap, queue-pass
//! validation and gate, rate limiting, idempotency. Each stage is an
//! `axum::middleware::from_fn_with_state` function; the queue-pass stage
//! communicates with the rate limiter through request extensions.

pub mod concurrency;
pub mod idempotency;
pub mod rate_limit;
pub mod queue_pass;

pub use concurrency::concurrency_middleware;
pub use idempotency::{idempotency_middleware, IdempotencyContext};
pub use queue_pass::{queue_pass_middleware, QueuePassIdentity, RateLimitBypass};
pub use rate_limit::rate_limit_middleware;
