//! Event log I/O for the rushgate control plane.
//!
//! A thin client over a Kafka-compatible partitioned log. Producers send
//! synchronously with delivery acknowledgement and inject the current
//! trace context into record headers; consumers poll with auto-commit
//! disabled and commit offsets explicitly once processing (and any
//! database transaction) has finished. Startup waits for broker
//! connectivity and treats exhausted retries as fatal.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod consumer;
pub mod error;
pub mod producer;
pub mod propagation;

pub use consumer::{ConsumedRecord, LogConsumer};
pub use error::EventLogError;
pub use producer::LogProducer;
