//! The authoritative booking row and its state machine.
//!
//! Postgres owns this record after settlement; the Redis reservation is the
//! admission-time mirror. Transitions are
//! `reserved -> confirmed | cancelled | expired`, all three terminal.

use crate::error::{Error, Result};
use crate::ids::{BookingId, EventId, ShowId, UserId, ZoneId};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    /// Seats held, payment pending.
    Reserved,
    /// Paid; terminal within the core.
    Confirmed,
    /// Explicitly cancelled; terminal.
    Cancelled,
    /// TTL lapsed before payment; terminal.
    Expired,
}

impl BookingStatus {
    /// Whether a transition from `self` to `next` is legal.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Reserved, Self::Confirmed)
                | (Self::Reserved, Self::Cancelled)
                | (Self::Reserved, Self::Expired)
        )
    }

    /// Whether this state accepts no further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Reserved)
    }

    /// Wire representation used in rows and event payloads.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Reserved => "reserved",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }
}

/// Durable booking record mirroring the reservation plus settlement fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    /// Booking id, shared with the Redis reservation key.
    pub id: BookingId,
    /// Owning user.
    pub user_id: UserId,
    /// Event being booked.
    pub event_id: EventId,
    /// Show within the event.
    pub show_id: ShowId,
    /// Zone the seats come from.
    pub zone_id: ZoneId,
    /// Number of seats.
    pub quantity: i64,
    /// Price per seat in minor units.
    pub unit_price_minor: i64,
    /// Total price in minor units.
    pub total_price_minor: i64,
    /// Current state.
    pub status: BookingStatus,
    /// Client-supplied idempotency key; UNIQUE in the table.
    pub idempotency_key: String,
    /// Present once confirmed.
    pub confirmation_code: Option<String>,
    /// Payment reference once confirmed.
    pub payment_id: Option<String>,
    /// When the hold was taken.
    pub reserved_at: DateTime<Utc>,
    /// When payment landed.
    pub confirmed_at: Option<DateTime<Utc>>,
    /// When the booking was cancelled or expired.
    pub cancelled_at: Option<DateTime<Utc>>,
    /// Hold deadline.
    pub expires_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Transition to `Confirmed`, recording payment id and stamping a
    /// confirmation code.
    ///
    /// # Errors
    ///
    /// [`Error::Conflict`] when the booking is already terminal,
    /// [`Error::Expired`] when the hold deadline has passed.
    pub fn confirm(&mut self, payment_id: String, now: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(BookingStatus::Confirmed) {
            return Err(Error::Conflict {
                message: format!("booking is {}", self.status.as_str()),
            });
        }
        if now > self.expires_at {
            return Err(Error::Expired {
                message: "reservation lapsed before confirmation".into(),
            });
        }
        self.status = BookingStatus::Confirmed;
        self.payment_id = Some(payment_id);
        self.confirmation_code = Some(generate_confirmation_code());
        self.confirmed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Transition to `Cancelled`.
    ///
    /// # Errors
    ///
    /// [`Error::Conflict`] when the booking is already terminal.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(BookingStatus::Cancelled) {
            return Err(Error::Conflict {
                message: format!("booking is {}", self.status.as_str()),
            });
        }
        self.status = BookingStatus::Cancelled;
        self.cancelled_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Transition to `Expired`. Used by the expiry sweeper, never by
    /// clients.
    ///
    /// # Errors
    ///
    /// [`Error::Conflict`] when the booking is already terminal.
    pub fn expire(&mut self, now: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(BookingStatus::Expired) {
            return Err(Error::Conflict {
                message: format!("booking is {}", self.status.as_str()),
            });
        }
        self.status = BookingStatus::Expired;
        self.cancelled_at = Some(now);
        self.updated_at = now;
        Ok(())
    }
}

/// `CONF-` plus eight crockford-ish characters, enough entropy for a human
/// facing receipt code; uniqueness is not load-bearing.
fn generate_confirmation_code() -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTVWXYZ0123456789";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..8)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("CONF-{suffix}")
}
