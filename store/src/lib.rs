//! Redis layer of the rushgate control plane.
//!
//! Everything that must be atomic under rush load lives here as a Lua
//! script executed server-side: reserving and releasing inventory,
//! joining and draining the virtual queue, and the shared token bucket.
//! The store clients in this crate load the scripts, invoke them by SHA
//! (falling back to a full reload on `NOSCRIPT`), and convert the
//! structured tuples the scripts return into typed domain errors.
//!
//! Key namespaces are stable and documented for operational debugging:
//!
//! - `zone:availability:{zone_id}` -- integer seat counter
//! - `user:reservations:{user_id}:{event_id}` -- set of booking ids
//! - `reservation:{booking_id}` -- JSON record with TTL
//! - `queue:event:{event_id}` -- ordered set, `queue:events` -- registry
//! - `queue:user:{event_id}:{user_id}` -- per-user hash
//! - `queue:pass:{event_id}:{user_id}` -- issued pass mirror
//! - `idem:{key}` -- idempotency record
//! - `ratelimit:{scope}:{key}` -- shared token bucket hash

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod idempotency;
pub mod inventory;
pub mod keys;
pub mod passes;
pub mod queue;
pub mod rate_limit;
pub mod scripts;

pub use client::RedisClient;
pub use idempotency::{BeginOutcome, IdempotencyRecord, IdempotencyStatus, IdempotencyStore};
pub use inventory::{InventoryOptions, ReservationStore};
pub use passes::QueuePassStore;
pub use queue::{JoinOutcome, VirtualQueue};
pub use rate_limit::SharedTokenBucket;
