//! The short-lived seat hold stored in Redis.
//!
//! A [`Reservation`] is written by the atomic reserve script together with
//! its TTL, so the record never exists without an expiry. Confirmation
//! removes the TTL; release or expiry deletes the record. The authoritative
//! [`Booking`](crate::Booking) row mirrors this data durably.

use crate::booking::{Booking, BookingStatus};
use crate::error::{Error, Result};
use crate::ids::{BookingId, EventId, ShowId, UserId, ZoneId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    /// Seats held, TTL running.
    Reserved,
    /// Payment landed; hold is permanent until settlement.
    Confirmed,
    /// Hold returned to inventory.
    Released,
}

/// A temporary hold on `quantity` seats in one zone.
///
/// Serialized as JSON at `reservation:{booking_id}` with an absolute TTL of
/// `expires_at - now`. Prices are integer minor units; there is no
/// floating-point money anywhere in the system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    /// Booking this hold belongs to.
    pub booking_id: BookingId,
    /// Owning user.
    pub user_id: UserId,
    /// Event being booked.
    pub event_id: EventId,
    /// Show within the event.
    pub show_id: ShowId,
    /// Zone the seats come from.
    pub zone_id: ZoneId,
    /// Number of seats held.
    pub quantity: i64,
    /// Price per seat in minor units.
    pub unit_price_minor: i64,
    /// `quantity * unit_price_minor`.
    pub total_price_minor: i64,
    /// Current lifecycle state.
    pub status: ReservationStatus,
    /// Payment reference, written by the confirm script.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    /// When the hold was taken.
    pub created_at: DateTime<Utc>,
    /// When the hold lapses unless confirmed.
    pub expires_at: DateTime<Utc>,
}

impl Reservation {
    /// Build a fresh `Reserved` hold expiring `ttl` from `now`.
    #[must_use]
    pub fn new(
        booking_id: BookingId,
        user_id: UserId,
        event_id: EventId,
        show_id: ShowId,
        zone_id: ZoneId,
        quantity: i64,
        unit_price_minor: i64,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            booking_id,
            user_id,
            event_id,
            show_id,
            zone_id,
            quantity,
            unit_price_minor,
            total_price_minor: unit_price_minor * quantity,
            status: ReservationStatus::Reserved,
            payment_id: None,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    /// Validate every field a client can influence.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.event_id.as_str().trim().is_empty() {
            return Err(Error::Validation {
                field: "event_id",
                message: "must not be empty".into(),
            });
        }
        if self.show_id.as_str().trim().is_empty() {
            return Err(Error::Validation {
                field: "show_id",
                message: "must not be empty".into(),
            });
        }
        if self.zone_id.as_str().trim().is_empty() {
            return Err(Error::Validation {
                field: "zone_id",
                message: "must not be empty".into(),
            });
        }
        if self.quantity <= 0 {
            return Err(Error::Validation {
                field: "quantity",
                message: "must be positive".into(),
            });
        }
        if self.unit_price_minor < 0 {
            return Err(Error::Validation {
                field: "unit_price_minor",
                message: "must not be negative".into(),
            });
        }
        Ok(())
    }

    /// Whether the hold has lapsed at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// A hold can be confirmed while still reserved and unexpired.
    #[must_use]
    pub fn can_confirm(&self, now: DateTime<Utc>) -> bool {
        self.status == ReservationStatus::Reserved && !self.is_expired_at(now)
    }

    /// A hold can be released only while reserved.
    #[must_use]
    pub fn can_release(&self) -> bool {
        self.status == ReservationStatus::Reserved
    }

    /// Whether `user` owns this hold.
    #[must_use]
    pub fn belongs_to(&self, user: UserId) -> bool {
        self.user_id == user
    }

    /// Remaining lifetime in whole seconds, clamped at zero.
    #[must_use]
    pub fn remaining_ttl_secs(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }

    /// Project this hold into its authoritative booking row.
    #[must_use]
    pub fn to_booking(&self, idempotency_key: String) -> Booking {
        Booking {
            id: self.booking_id,
            user_id: self.user_id,
            event_id: self.event_id.clone(),
            show_id: self.show_id.clone(),
            zone_id: self.zone_id.clone(),
            quantity: self.quantity,
            unit_price_minor: self.unit_price_minor,
            total_price_minor: self.total_price_minor,
            status: BookingStatus::Reserved,
            idempotency_key,
            confirmation_code: None,
            payment_id: self.payment_id.clone(),
            reserved_at: self.created_at,
            confirmed_at: None,
            cancelled_at: None,
            expires_at: self.expires_at,
            updated_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn hold(quantity: i64) -> Reservation {
        Reservation::new(
            BookingId::generate(),
            UserId(Uuid::new_v4()),
            EventId::from("ev-1"),
            ShowId::from("show-1"),
            ZoneId::from("zone-a"),
            quantity,
            2_500,
            Duration::seconds(300),
            Utc::now(),
        )
    }

    #[test]
    fn total_price_is_quantity_times_unit() {
        let r = hold(4);
        assert_eq!(r.total_price_minor, 10_000);
    }

    #[test]
    fn zero_quantity_fails_validation() {
        let r = hold(0);
        let err = r.validate().unwrap_err();
        assert!(matches!(err, Error::Validation { field: "quantity", .. }));
    }

    #[test]
    fn expired_hold_cannot_confirm() {
        let r = hold(1);
        let later = r.expires_at + Duration::seconds(1);
        assert!(!r.can_confirm(later));
        assert!(r.can_confirm(r.created_at));
    }

    #[test]
    fn remaining_ttl_clamps_at_zero() {
        let r = hold(1);
        let later = r.expires_at + Duration::seconds(30);
        assert_eq!(r.remaining_ttl_secs(later), 0);
        assert!(r.remaining_ttl_secs(r.created_at) > 290);
    }

    #[test]
    fn booking_projection_keeps_money_and_expiry() {
        let r = hold(2);
        let b = r.to_booking("idem-key".into());
        assert_eq!(b.id, r.booking_id);
        assert_eq!(b.total_price_minor, r.total_price_minor);
        assert_eq!(b.expires_at, r.expires_at);
        assert_eq!(b.status, BookingStatus::Reserved);
    }

    #[test]
    fn json_round_trip_preserves_status() {
        let r = hold(1);
        let json = serde_json::to_string(&r).unwrap();
        assert!(json.contains("\"reserved\""));
        let back: Reservation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
    }
}
