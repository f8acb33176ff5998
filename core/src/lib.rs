//! Core domain model for the rushgate booking control plane.
//!
//! This crate defines the shared vocabulary of the system: identifiers,
//! the [`Reservation`] held in Redis, the authoritative [`Booking`] row and
//! its state machine, the [`BookingEvent`] envelope carried on the event
//! log, the error taxonomy, and configuration loading.
//!
//! Nothing in here performs I/O; the storage, messaging and HTTP crates all
//! depend on this one and never on each other's transports.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod booking;
pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod providers;
pub mod reservation;

pub use booking::{Booking, BookingStatus};
pub use config::Config;
pub use error::{Error, ErrorCode, Result};
pub use events::{BookingEvent, BookingEventData, BookingEventType, PaymentEvent, PaymentEventType};
pub use ids::{BookingId, EventId, ShowId, UserId, ZoneId};
pub use providers::{BookingStore, ReservationEngine, ReserveOutcome, ReserveRequest, ZoneInfo};
pub use reservation::{Reservation, ReservationStatus};
