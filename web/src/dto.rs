//! Request and response shapes for the HTTP surface.

use chrono::{DateTime, Utc};
use rushgate_core::{Booking, BookingId, EventId, ShowId, UserId, ZoneId};
use serde::{Deserialize, Serialize};

/// Uniform success envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    /// Always `true` on this envelope.
    pub success: bool,
    /// Operation payload.
    pub data: T,
}

/// Wrap a payload in the success envelope.
pub fn ok<T>(data: T) -> ApiResponse<T> {
    ApiResponse {
        success: true,
        data,
    }
}

/// Body of `POST /api/v1/bookings`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateBookingRequest {
    /// Event being booked.
    pub event_id: EventId,
    /// Show within the event.
    pub show_id: ShowId,
    /// Zone to draw seats from.
    pub zone_id: ZoneId,
    /// Seats requested; must be positive.
    pub quantity: i64,
}

/// Body of `POST /api/v1/bookings/{id}/confirm`.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfirmBookingRequest {
    /// Payment reference from the payment collaborator.
    pub payment_id: String,
}

/// Booking representation returned to clients.
#[derive(Debug, Serialize)]
pub struct BookingResponse {
    /// Booking id.
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
    /// Price per seat, minor units.
    pub unit_price: i64,
    /// Total price, minor units.
    pub total_price: i64,
    /// Current state.
    pub status: String,
    /// Receipt code, present once confirmed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation_code: Option<String>,
    /// Hold deadline.
    pub expires_at: DateTime<Utc>,
    /// Remaining hold lifetime in whole seconds, present while the live
    /// reservation record still exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in_secs: Option<i64>,
    /// When the hold was taken.
    pub reserved_at: DateTime<Utc>,
}

impl From<&Booking> for BookingResponse {
    fn from(booking: &Booking) -> Self {
        Self {
            booking_id: booking.id,
            user_id: booking.user_id,
            event_id: booking.event_id.clone(),
            show_id: booking.show_id.clone(),
            zone_id: booking.zone_id.clone(),
            quantity: booking.quantity,
            unit_price: booking.unit_price_minor,
            total_price: booking.total_price_minor,
            status: booking.status.as_str().to_string(),
            confirmation_code: booking.confirmation_code.clone(),
            expires_at: booking.expires_at,
            expires_in_secs: None,
            reserved_at: booking.reserved_at,
        }
    }
}

/// Body of `POST /api/v1/queue/join`.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueJoinRequest {
    /// Event whose queue to join.
    pub event_id: EventId,
}

/// Response of `POST /api/v1/queue/join`.
#[derive(Debug, Serialize)]
pub struct QueueJoinResponse {
    /// 1-based position.
    pub position: i64,
    /// Session token for heartbeat/leave.
    pub token: String,
    /// Whether the user was already queued.
    pub rejoined: bool,
}

/// Query of `GET /api/v1/queue/position`.
#[derive(Debug, Deserialize)]
pub struct QueuePositionQuery {
    /// Event whose queue to inspect.
    pub event_id: EventId,
}

/// Response of `GET /api/v1/queue/position`.
#[derive(Debug, Serialize)]
pub struct QueuePositionResponse {
    /// 1-based position, `null` when not queued.
    pub position: Option<i64>,
}

/// Body of `POST /api/v1/queue/leave` and `POST /api/v1/queue/heartbeat`.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueMemberRequest {
    /// Event whose queue the user is in.
    pub event_id: EventId,
    /// Session token from the join response.
    pub token: String,
}

/// Body of `PUT /api/v1/queue-mode`.
#[derive(Debug, Clone, Deserialize)]
pub struct SetQueueModeRequest {
    /// Desired queue-mode state.
    pub enabled: bool,
}

/// Response of queue-mode reads and writes.
#[derive(Debug, Serialize)]
pub struct QueueModeResponse {
    /// Current queue-mode state.
    pub queue_mode_enabled: bool,
    /// Server time, seconds since epoch.
    pub timestamp: i64,
}

/// Body of the admin zone-publication endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct PublishZoneRequest {
    /// Seats to open the zone with.
    pub seats: i64,
}

/// Response of zone availability reads.
#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    /// Zone inspected.
    pub zone_id: ZoneId,
    /// Live counter value.
    pub available: i64,
}
