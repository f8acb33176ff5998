//! Domain events carried on the partitioned log.
//!
//! Booking events are partitioned by booking id so each booking's state
//! transitions arrive in order; across bookings no order is assumed.
//! Payment events flow the other way: the payment service emits them and
//! the worker binary folds them back into confirm/cancel orchestration.

use crate::booking::{Booking, BookingStatus};
use crate::ids::{BookingId, EventId, ShowId, UserId, ZoneId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Topic carrying [`BookingEvent`] records, partition key = booking id.
pub const TOPIC_BOOKING_EVENTS: &str = "booking-events";

/// Topic carrying [`PaymentEvent`] records emitted by the payment service.
pub const TOPIC_PAYMENT_EVENTS: &str = "payment-events";

/// Envelope schema version.
pub const EVENT_SCHEMA_VERSION: u32 = 1;

/// Booking state-transition event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingEventType {
    /// A reservation was taken and the booking row written.
    #[serde(rename = "booking.created")]
    Created,
    /// Payment landed; the hold became a sale.
    #[serde(rename = "booking.confirmed")]
    Confirmed,
    /// The user or the payment flow cancelled the hold.
    #[serde(rename = "booking.cancelled")]
    Cancelled,
    /// The hold's TTL lapsed before payment.
    #[serde(rename = "booking.expired")]
    Expired,
}

impl BookingEventType {
    /// Wire name of the event type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "booking.created",
            Self::Confirmed => "booking.confirmed",
            Self::Cancelled => "booking.cancelled",
            Self::Expired => "booking.expired",
        }
    }
}

/// Booking snapshot carried inside every booking event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingEventData {
    /// Booking id; also the record's partition key.
    pub booking_id: BookingId,
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
    /// Price per seat, integer minor units.
    #[serde(rename = "unit_price")]
    pub unit_price_minor: i64,
    /// Total price, integer minor units.
    #[serde(rename = "total_price")]
    pub total_price_minor: i64,
    /// Booking state after the transition.
    pub status: BookingStatus,
    /// Payment reference, present from confirmation on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    /// Receipt code, present from confirmation on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation_code: Option<String>,
    /// When the hold was taken.
    pub reserved_at: DateTime<Utc>,
    /// When payment landed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<DateTime<Utc>>,
    /// When the booking was cancelled or expired.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
    /// Hold deadline.
    pub expires_at: DateTime<Utc>,
}

/// Versioned envelope for one booking state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingEvent {
    /// Unique id of this event instance.
    pub event_id: Uuid,
    /// What happened.
    pub event_type: BookingEventType,
    /// When it happened.
    pub occurred_at: DateTime<Utc>,
    /// Envelope schema version.
    pub version: u32,
    /// Booking snapshot after the transition.
    pub data: BookingEventData,
}

impl BookingEvent {
    /// Build an event from the booking's post-transition state.
    #[must_use]
    pub fn from_booking(event_type: BookingEventType, booking: &Booking, now: DateTime<Utc>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type,
            occurred_at: now,
            version: EVENT_SCHEMA_VERSION,
            data: BookingEventData {
                booking_id: booking.id,
                user_id: booking.user_id,
                event_id: booking.event_id.clone(),
                show_id: booking.show_id.clone(),
                zone_id: booking.zone_id.clone(),
                quantity: booking.quantity,
                unit_price_minor: booking.unit_price_minor,
                total_price_minor: booking.total_price_minor,
                status: booking.status,
                payment_id: booking.payment_id.clone(),
                confirmation_code: booking.confirmation_code.clone(),
                reserved_at: booking.reserved_at,
                confirmed_at: booking.confirmed_at,
                cancelled_at: booking.cancelled_at,
                expires_at: booking.expires_at,
            },
        }
    }

    /// Partition key guaranteeing per-booking ordering on the log.
    #[must_use]
    pub fn partition_key(&self) -> String {
        self.data.booking_id.to_string()
    }
}

/// Event types emitted by the payment service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentEventType {
    /// Payment cleared; the booking should confirm.
    #[serde(rename = "payment.succeeded")]
    Succeeded,
    /// Payment failed; the booking should cancel.
    #[serde(rename = "payment.failed")]
    Failed,
    /// Operator-driven seat release; the booking should cancel.
    #[serde(rename = "seat-release")]
    SeatRelease,
}

/// Payload of a payment-side event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentEventData {
    /// Booking the payment refers to.
    pub booking_id: BookingId,
    /// Owning user.
    pub user_id: UserId,
    /// Payment reference.
    pub payment_id: String,
    /// Amount in minor units, when the gateway reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_minor: Option<i64>,
    /// Failure or release reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Versioned envelope for a payment-side event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentEvent {
    /// Unique id of this event instance.
    pub event_id: Uuid,
    /// What happened.
    pub event_type: PaymentEventType,
    /// When it happened.
    pub occurred_at: DateTime<Utc>,
    /// Envelope schema version.
    pub version: u32,
    /// Payment payload.
    pub data: PaymentEventData,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn booking() -> Booking {
        let now = Utc::now();
        Booking {
            id: BookingId::generate(),
            user_id: UserId(Uuid::new_v4()),
            event_id: EventId::from("ev-1"),
            show_id: ShowId::from("show-1"),
            zone_id: ZoneId::from("zone-a"),
            quantity: 3,
            unit_price_minor: 2_000,
            total_price_minor: 6_000,
            status: BookingStatus::Reserved,
            idempotency_key: "key".into(),
            confirmation_code: None,
            payment_id: None,
            reserved_at: now,
            confirmed_at: None,
            cancelled_at: None,
            expires_at: now + Duration::seconds(300),
            updated_at: now,
        }
    }

    #[test]
    fn event_types_serialize_to_dotted_names() {
        let json = serde_json::to_string(&BookingEventType::Created).unwrap();
        assert_eq!(json, "\"booking.created\"");
        let json = serde_json::to_string(&PaymentEventType::SeatRelease).unwrap();
        assert_eq!(json, "\"seat-release\"");
    }

    #[test]
    fn envelope_carries_minor_unit_prices_under_wire_names() {
        let event = BookingEvent::from_booking(BookingEventType::Created, &booking(), Utc::now());
        let value: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["data"]["unit_price"], 2_000);
        assert_eq!(value["data"]["total_price"], 6_000);
        assert_eq!(value["version"], 1);
        assert_eq!(value["event_type"], "booking.created");
    }

    #[test]
    fn partition_key_is_booking_id() {
        let b = booking();
        let event = BookingEvent::from_booking(BookingEventType::Created, &b, Utc::now());
        assert_eq!(event.partition_key(), b.id.to_string());
    }

    #[test]
    fn optional_fields_are_omitted_until_set() {
        let event = BookingEvent::from_booking(BookingEventType::Created, &booking(), Utc::now());
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("payment_id"));
        assert!(!json.contains("confirmation_code"));
    }
}
