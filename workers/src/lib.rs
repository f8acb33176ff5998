//! Background workers of the rushgate control plane.
//!
//! Four loops run in the worker binary: the inventory settlement
//! consumer, the queue release worker, the outbox relay and the
//! reservation expiry sweeper. A fifth consumer folds payment events
//! into the same confirm/cancel orchestration the HTTP surface uses.
//! All loops drain their current batch, flush and commit before exiting
//! on shutdown.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod expiry;
pub mod outbox_relay;
pub mod payments;
pub mod queue_release;
pub mod settlement;

pub use expiry::ExpirySweeper;
pub use outbox_relay::OutboxRelay;
pub use payments::PaymentConsumer;
pub use queue_release::{QueueReleaseWorker, ReleaseMetrics, ReleasedUser};
pub use settlement::SettlementWorker;
