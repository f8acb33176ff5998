//! Admission control for the booking surface.
//!
//! Two-tier rate limiting (an in-process token bucket per gateway plus a
//! Redis-backed bucket shared across replicas), a per-endpoint policy
//! table with path-pattern matching, a non-blocking global concurrency
//! cap, and the queue-pass machinery that lets released waiting-room
//! users bypass the limiter while queue mode gates everyone else.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bucket;
pub mod limiter;
pub mod pass;
pub mod policy;
pub mod queue_mode;
pub mod semaphore;

pub use bucket::{BucketStats, LocalTokenBucket};
pub use limiter::{Allowance, EndpointLimiters, Limit, SharedLimiter};
pub use pass::{PassError, QueuePassClaims, QueuePassIssuer, QueuePassValidator};
pub use policy::{PolicyTable, RatePolicy};
pub use queue_mode::QueueModeController;
pub use semaphore::{ConcurrencyLimiter, ConcurrencyPermit};
