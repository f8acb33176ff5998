//! The booking orchestrator.
//!
//! `POST /bookings` runs the hot path: validate, generate a booking id,
//! take the atomic hold, persist the reserved row together with its
//! `booking.created` outbox event, answer 201. Confirm and cancel
//! pre-flight the live hold through the reservation predicates for
//! precise error mapping, then run the script (the atomic authority)
//! and the row transition with its event. The orchestrator sees its
//! collaborators only through the provider traits.

use crate::dto::{
    ok, ApiResponse, BookingResponse, ConfirmBookingRequest, CreateBookingRequest,
};
use crate::error::AppError;
use crate::extractors::AuthedUser;
use crate::middleware::IdempotencyContext;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::Utc;
use rushgate_core::{
    Booking, BookingEvent, BookingEventType, BookingId, BookingStatus, Error, ReserveRequest,
    UserId,
};
use uuid::Uuid;

/// `POST /api/v1/bookings`
pub async fn create_booking(
    State(state): State<AppState>,
    user: AuthedUser,
    idempotency: Option<Extension<IdempotencyContext>>,
    Json(body): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<ApiResponse<BookingResponse>>), AppError> {
    if body.quantity <= 0 {
        return Err(AppError::validation("quantity must be positive"));
    }
    let Some(Extension(idempotency)) = idempotency else {
        return Err(AppError::validation("missing Idempotency-Key header"));
    };

    let zone = state
        .bookings
        .zone_info(&body.zone_id, &body.show_id)
        .await?
        .ok_or(Error::NotFound { resource: "zone" })?;
    if zone.event_id != body.event_id {
        return Err(AppError::validation("zone does not belong to the event"));
    }

    let booking_id = BookingId::generate();
    let outcome = state
        .engine
        .reserve(ReserveRequest {
            booking_id,
            user_id: user.0,
            event_id: body.event_id,
            show_id: body.show_id,
            zone_id: body.zone_id,
            quantity: body.quantity,
            unit_price_minor: zone.unit_price_minor,
        })
        .await?;

    let booking = outcome.reservation.to_booking(idempotency.key.clone());
    let event = BookingEvent::from_booking(BookingEventType::Created, &booking, Utc::now());

    // A failure past this point leaves the hold to lapse on its TTL.
    state
        .bookings
        .create_reserved(&booking, &idempotency.request_hash, &event)
        .await?;

    tracing::info!(
        booking_id = %booking.id,
        user_id = %booking.user_id,
        zone_id = %booking.zone_id,
        quantity = booking.quantity,
        remaining = outcome.remaining,
        "booking reserved"
    );
    let mut response = BookingResponse::from(&booking);
    response.expires_in_secs = Some(outcome.reservation.remaining_ttl_secs(Utc::now()));
    Ok((StatusCode::CREATED, Json(ok(response))))
}

/// `POST /api/v1/bookings/{id}/confirm`
pub async fn confirm_booking(
    State(state): State<AppState>,
    user: AuthedUser,
    Path(id): Path<Uuid>,
    Json(body): Json<ConfirmBookingRequest>,
) -> Result<Json<ApiResponse<BookingResponse>>, AppError> {
    if body.payment_id.trim().is_empty() {
        return Err(AppError::validation("payment_id must not be empty"));
    }
    let booking_id = BookingId(id);
    let mut booking = fetch_owned(&state, booking_id, user.0).await?;
    let now = Utc::now();

    // Pre-flight on the live hold; the confirm script re-checks these
    // atomically and stays authoritative under race.
    match state.engine.get(booking_id).await? {
        Some(reservation) => {
            if !reservation.belongs_to(user.0) {
                return Err(Error::NotFound { resource: "booking" }.into());
            }
            if !reservation.can_confirm(now) {
                if reservation.is_expired_at(now) {
                    return Err(Error::Expired {
                        message: "reservation lapsed before confirmation".into(),
                    }
                    .into());
                }
                return Err(Error::Conflict {
                    message: "reservation already confirmed".into(),
                }
                .into());
            }
        }
        None => {
            // The hold vanished: expired if its deadline passed, gone
            // otherwise.
            if now > booking.expires_at {
                return Err(Error::Expired {
                    message: "reservation lapsed before confirmation".into(),
                }
                .into());
            }
            return Err(Error::NotFound { resource: "reservation" }.into());
        }
    }

    match state.engine.confirm(booking_id, user.0, &body.payment_id).await {
        Ok(()) => {}
        Err(Error::NotFound { .. }) => {
            // Lost the race against the TTL between pre-flight and script.
            return Err(Error::Expired {
                message: "reservation lapsed before confirmation".into(),
            }
            .into());
        }
        Err(other) => return Err(other.into()),
    }

    booking.confirm(body.payment_id, Utc::now())?;
    let event = BookingEvent::from_booking(BookingEventType::Confirmed, &booking, Utc::now());
    state.bookings.apply_transition(&booking, &event).await?;

    tracing::info!(booking_id = %booking.id, "booking confirmed");
    Ok(Json(ok(BookingResponse::from(&booking))))
}

/// `POST /api/v1/bookings/{id}/cancel`
pub async fn cancel_booking(
    State(state): State<AppState>,
    user: AuthedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<BookingResponse>>, AppError> {
    let booking_id = BookingId(id);
    let mut booking = fetch_owned(&state, booking_id, user.0).await?;
    let now = Utc::now();

    // Pre-flight on the live hold; the release script re-checks these
    // atomically and stays authoritative under race.
    match state.engine.get(booking_id).await? {
        Some(reservation) => {
            if !reservation.belongs_to(user.0) {
                return Err(Error::NotFound { resource: "booking" }.into());
            }
            if !reservation.can_release() {
                return Err(Error::Conflict {
                    message: "confirmed reservations are settled, not released".into(),
                }
                .into());
            }
        }
        None => {
            if now > booking.expires_at {
                return Err(Error::Expired {
                    message: "reservation already lapsed".into(),
                }
                .into());
            }
            return Err(Error::NotFound { resource: "reservation" }.into());
        }
    }

    match state
        .engine
        .release(booking_id, user.0, &booking.event_id, &booking.zone_id)
        .await
    {
        Ok(_released) => {}
        Err(Error::NotFound { .. }) => {
            // Lost the race against the TTL between pre-flight and script.
            return Err(Error::Expired {
                message: "reservation already lapsed".into(),
            }
            .into());
        }
        Err(other) => return Err(other.into()),
    }

    booking.cancel(Utc::now())?;
    let event = BookingEvent::from_booking(BookingEventType::Cancelled, &booking, Utc::now());
    state.bookings.apply_transition(&booking, &event).await?;

    tracing::info!(booking_id = %booking.id, "booking cancelled");
    Ok(Json(ok(BookingResponse::from(&booking))))
}

/// `GET /api/v1/bookings/{id}`
pub async fn get_booking(
    State(state): State<AppState>,
    user: AuthedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<BookingResponse>>, AppError> {
    let booking = fetch_owned(&state, BookingId(id), user.0).await?;
    let mut response = BookingResponse::from(&booking);
    if booking.status == BookingStatus::Reserved {
        if let Some(reservation) = state.engine.get(booking.id).await? {
            response.expires_in_secs = Some(reservation.remaining_ttl_secs(Utc::now()));
        }
    }
    Ok(Json(ok(response)))
}

/// `GET /api/v1/users/{id}/bookings`
pub async fn list_user_bookings(
    State(state): State<AppState>,
    user: AuthedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<BookingResponse>>>, AppError> {
    if user.0 != UserId(id) {
        return Err(Error::NotFound { resource: "user" }.into());
    }
    let bookings = state.bookings.list_for_user(user.0, 50).await?;
    Ok(Json(ok(bookings.iter().map(BookingResponse::from).collect())))
}

/// Fetch a booking, answering 404 for both absence and foreign ownership.
async fn fetch_owned(
    state: &AppState,
    booking_id: BookingId,
    user_id: UserId,
) -> Result<Booking, AppError> {
    let booking = state
        .bookings
        .get(booking_id)
        .await?
        .ok_or(Error::NotFound { resource: "booking" })?;
    if booking.user_id != user_id {
        return Err(Error::NotFound { resource: "booking" }.into());
    }
    Ok(booking)
}
