//! Collaborator interfaces for the booking orchestrator.
//!
//! The orchestrator coordinates the reservation engine and the
//! authoritative store without knowing their transports; each collaborator
//! is injected as a trait object at construction. Events reach the log
//! through the outbox rows the store writes, so the orchestrator never
//! talks to the log directly.

use crate::booking::Booking;
use crate::error::Result;
use crate::events::BookingEvent;
use crate::ids::{BookingId, EventId, ShowId, UserId, ZoneId};
use crate::reservation::Reservation;
use async_trait::async_trait;

/// Arguments for taking a hold.
#[derive(Debug, Clone)]
pub struct ReserveRequest {
    /// Pre-generated booking id (the orchestrator owns id generation).
    pub booking_id: BookingId,
    /// Requesting user.
    pub user_id: UserId,
    /// Event being booked.
    pub event_id: EventId,
    /// Show within the event.
    pub show_id: ShowId,
    /// Zone to draw seats from.
    pub zone_id: ZoneId,
    /// Seats requested.
    pub quantity: i64,
    /// Price per seat in minor units.
    pub unit_price_minor: i64,
}

/// Successful reservation plus the post-decrement availability.
#[derive(Debug, Clone)]
pub struct ReserveOutcome {
    /// The hold as written to the reservation store.
    pub reservation: Reservation,
    /// Seats left in the zone after this hold.
    pub remaining: i64,
}

/// Atomic seat-hold engine (Redis scripts in production).
#[async_trait]
pub trait ReservationEngine: Send + Sync {
    /// Take an atomic hold on seats.
    async fn reserve(&self, request: ReserveRequest) -> Result<ReserveOutcome>;

    /// Release a still-reserved hold; returns the released quantity.
    async fn release(
        &self,
        booking_id: BookingId,
        user_id: UserId,
        event_id: &EventId,
        zone_id: &ZoneId,
    ) -> Result<i64>;

    /// Confirm a hold, recording the payment and removing the expiry.
    async fn confirm(&self, booking_id: BookingId, user_id: UserId, payment_id: &str)
        -> Result<()>;

    /// Extend a hold's TTL; returns the new TTL in seconds.
    async fn extend(&self, booking_id: BookingId, additional_secs: i64) -> Result<i64>;

    /// Fetch a hold if it still exists.
    async fn get(&self, booking_id: BookingId) -> Result<Option<Reservation>>;

    /// Raw zone counter read for admin and debugging.
    async fn availability(&self, zone_id: &ZoneId) -> Result<i64>;

    /// Initialize a zone counter when a show is published.
    async fn set_availability(&self, zone_id: &ZoneId, seats: i64) -> Result<()>;
}

/// Catalogue facts the orchestrator needs about a zone.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneInfo {
    /// Event the zone belongs to.
    pub event_id: EventId,
    /// Price per seat in minor units.
    pub unit_price_minor: i64,
    /// Seats the zone was published with.
    pub total_seats: i64,
}

/// Authoritative booking persistence (Postgres in production). Writes
/// enqueue the matching outbox event in the same transaction.
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Persist a fresh `reserved` booking with its created event.
    async fn create_reserved(
        &self,
        booking: &Booking,
        request_hash: &str,
        event: &BookingEvent,
    ) -> Result<()>;

    /// Apply a validated state transition with its event.
    async fn apply_transition(&self, booking: &Booking, event: &BookingEvent) -> Result<()>;

    /// Fetch a booking by id.
    async fn get(&self, id: BookingId) -> Result<Option<Booking>>;

    /// Fetch a booking by its idempotency key.
    async fn get_by_idempotency_key(&self, key: &str) -> Result<Option<Booking>>;

    /// Recent bookings for a user, newest first.
    async fn list_for_user(&self, user_id: UserId, limit: i64) -> Result<Vec<Booking>>;

    /// Catalogue lookup validating that a zone exists for a show.
    async fn zone_info(&self, zone_id: &ZoneId, show_id: &ShowId) -> Result<Option<ZoneInfo>>;
}
