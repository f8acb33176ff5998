//! Typed client for the atomic inventory scripts.
//!
//! Wraps each Lua script in a method returning domain errors, applies the
//! per-call deadline, and owns the reservation-record serialization so the
//! script writes exactly the JSON the rest of the system reads back.

use crate::client::{with_deadline, RedisClient};
use crate::keys;
use crate::scripts::{ScriptReply, ScriptSet};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use rushgate_core::providers::ReservationEngine;
use rushgate_core::{
    BookingId, Error, EventId, Reservation, ReserveOutcome, ReserveRequest, Result, UserId, ZoneId,
};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Tunables for the reservation engine.
#[derive(Debug, Clone)]
pub struct InventoryOptions {
    /// Hard deadline for every Redis call.
    pub call_timeout: Duration,
    /// Per-user seat cap per event.
    pub max_seats_per_user: i64,
    /// Hold lifetime in seconds.
    pub reservation_ttl_secs: i64,
    /// Ceiling for TTL extensions in seconds.
    pub reservation_max_ttl_secs: i64,
}

/// Client for reserve/release/confirm/extend and the raw counter reads.
#[derive(Clone)]
pub struct ReservationStore {
    conn: ConnectionManager,
    scripts: Arc<ScriptSet>,
    options: InventoryOptions,
}

impl ReservationStore {
    /// Build a store over an established connection.
    #[must_use]
    pub fn new(client: &RedisClient, scripts: Arc<ScriptSet>, options: InventoryOptions) -> Self {
        Self {
            conn: client.conn(),
            scripts,
            options,
        }
    }

    /// Take an atomic hold on seats.
    ///
    /// # Errors
    ///
    /// [`Error::Conflict`] when the booking id already holds a reservation,
    /// [`Error::InsufficientStock`] / [`Error::UserLimitExceeded`] per the
    /// admission rules, [`Error::Validation`] for bad request fields, and
    /// upstream variants for transport failures.
    pub async fn reserve(&self, request: ReserveRequest) -> Result<ReserveOutcome> {
        let now = Utc::now();
        let reservation = Reservation::new(
            request.booking_id,
            request.user_id,
            request.event_id.clone(),
            request.show_id,
            request.zone_id.clone(),
            request.quantity,
            request.unit_price_minor,
            ChronoDuration::seconds(self.options.reservation_ttl_secs),
            now,
        );
        reservation.validate()?;

        let record = serde_json::to_string(&reservation).map_err(Error::internal)?;
        let mut conn = self.conn.clone();
        let reply: (i64, i64, String, String) = with_deadline(
            "reserve",
            self.options.call_timeout,
            self.scripts
                .reserve
                .key(keys::zone_availability(&request.zone_id))
                .key(keys::user_reservations(request.user_id, &request.event_id))
                .key(keys::reservation(request.booking_id))
                .arg(request.quantity)
                .arg(self.options.max_seats_per_user)
                .arg(request.booking_id.to_string())
                .arg(self.options.reservation_ttl_secs)
                .arg(record)
                .invoke_async(&mut conn),
        )
        .await?;

        let reply = ScriptReply::from_tuple(reply);
        if reply.ok {
            tracing::debug!(
                booking_id = %request.booking_id,
                zone_id = %request.zone_id,
                quantity = request.quantity,
                remaining = reply.value,
                "reserved seats"
            );
            return Ok(ReserveOutcome {
                reservation,
                remaining: reply.value,
            });
        }
        Err(self.reserve_error(reply))
    }

    fn reserve_error(&self, reply: ScriptReply) -> Error {
        match reply.code.as_str() {
            "ALREADY_EXISTS" => Error::Conflict {
                message: "a reservation already exists for this booking id".into(),
            },
            "INSUFFICIENT_STOCK" => Error::InsufficientStock {
                available: reply.value,
            },
            "USER_LIMIT_EXCEEDED" => Error::UserLimitExceeded {
                limit: self.options.max_seats_per_user,
            },
            _ => Error::Internal {
                message: format!("reserve script: {} {}", reply.code, reply.message),
            },
        }
    }

    /// Release a still-reserved hold back to inventory.
    ///
    /// Returns the released quantity. A second release of the same booking
    /// finds nothing and reports [`Error::NotFound`]; seats are never
    /// credited twice.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when no reservation exists (already released or
    /// expired), [`Error::Conflict`] for wrong-user or already-confirmed
    /// holds.
    pub async fn release(
        &self,
        booking_id: BookingId,
        user_id: UserId,
        event_id: &EventId,
        zone_id: &ZoneId,
    ) -> Result<i64> {
        let mut conn = self.conn.clone();
        let reply: (i64, i64, String, String) = with_deadline(
            "release",
            self.options.call_timeout,
            self.scripts
                .release
                .key(keys::zone_availability(zone_id))
                .key(keys::user_reservations(user_id, event_id))
                .key(keys::reservation(booking_id))
                .arg(booking_id.to_string())
                .arg(user_id.to_string())
                .invoke_async(&mut conn),
        )
        .await?;

        let reply = ScriptReply::from_tuple(reply);
        if reply.ok {
            tracing::debug!(
                booking_id = %booking_id,
                zone_id = %zone_id,
                quantity = reply.value,
                "released seats"
            );
            return Ok(reply.value);
        }
        Err(release_confirm_error(reply))
    }

    /// Confirm a hold: flips status, records the payment and removes the
    /// TTL without touching the zone counter.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when the hold already expired,
    /// [`Error::Conflict`] for wrong-user or repeated confirmation.
    pub async fn confirm(
        &self,
        booking_id: BookingId,
        user_id: UserId,
        payment_id: &str,
    ) -> Result<()> {
        let mut conn = self.conn.clone();
        let reply: (i64, i64, String, String) = with_deadline(
            "confirm",
            self.options.call_timeout,
            self.scripts
                .confirm
                .key(keys::reservation(booking_id))
                .arg(booking_id.to_string())
                .arg(user_id.to_string())
                .arg(payment_id)
                .invoke_async(&mut conn),
        )
        .await?;

        let reply = ScriptReply::from_tuple(reply);
        if reply.ok {
            tracing::debug!(booking_id = %booking_id, "confirmed reservation");
            return Ok(());
        }
        Err(release_confirm_error(reply))
    }

    /// Extend a hold's TTL, refusing to pass the configured ceiling.
    /// Returns the new TTL in seconds.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when the hold is gone, [`Error::Conflict`] when
    /// it is confirmed or the extension would pass the ceiling.
    pub async fn extend(&self, booking_id: BookingId, additional_secs: i64) -> Result<i64> {
        let mut conn = self.conn.clone();
        let reply: (i64, i64, String, String) = with_deadline(
            "extend",
            self.options.call_timeout,
            self.scripts
                .extend
                .key(keys::reservation(booking_id))
                .arg(additional_secs)
                .arg(self.options.reservation_max_ttl_secs)
                .invoke_async(&mut conn),
        )
        .await?;

        let reply = ScriptReply::from_tuple(reply);
        if reply.ok {
            return Ok(reply.value);
        }
        Err(match reply.code.as_str() {
            "MAX_TTL_EXCEEDED" => Error::Conflict {
                message: format!(
                    "extension refused: ttl may not exceed {}s",
                    self.options.reservation_max_ttl_secs
                ),
            },
            _ => release_confirm_error(reply),
        })
    }

    /// Fetch a reservation record, if it still exists.
    ///
    /// # Errors
    ///
    /// Upstream variants for transport failures; a malformed record is
    /// [`Error::Internal`].
    pub async fn get(&self, booking_id: BookingId) -> Result<Option<Reservation>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = with_deadline(
            "get reservation",
            self.options.call_timeout,
            conn.get(keys::reservation(booking_id)),
        )
        .await?;
        raw.map(|json| serde_json::from_str(&json).map_err(Error::internal))
            .transpose()
    }

    /// Booking ids from `ids` whose reservation records no longer exist.
    /// Used by the expiry sweeper to detect lapsed holds.
    ///
    /// # Errors
    ///
    /// Upstream variants for transport failures.
    pub async fn filter_missing(&self, ids: &[BookingId]) -> Result<Vec<BookingId>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        for id in ids {
            pipe.exists(keys::reservation(*id));
        }
        let found: Vec<bool> = with_deadline(
            "filter missing reservations",
            self.options.call_timeout,
            pipe.query_async(&mut conn),
        )
        .await?;
        Ok(ids
            .iter()
            .zip(found)
            .filter_map(|(id, exists)| (!exists).then_some(*id))
            .collect())
    }

    /// Current availability counter for a zone; absent counters read as 0.
    ///
    /// # Errors
    ///
    /// Upstream variants for transport failures.
    pub async fn availability(&self, zone_id: &ZoneId) -> Result<i64> {
        let mut conn = self.conn.clone();
        let value: Option<i64> = with_deadline(
            "read availability",
            self.options.call_timeout,
            conn.get(keys::zone_availability(zone_id)),
        )
        .await?;
        Ok(value.unwrap_or(0))
    }

    /// Initialize a zone counter when a show is published. Admin path.
    ///
    /// # Errors
    ///
    /// Upstream variants for transport failures.
    pub async fn set_availability(&self, zone_id: &ZoneId, seats: i64) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = with_deadline(
            "set availability",
            self.options.call_timeout,
            conn.set(keys::zone_availability(zone_id), seats),
        )
        .await?;
        tracing::info!(zone_id = %zone_id, seats, "initialized zone availability");
        Ok(())
    }

    /// Drop a zone counter when its show closes. Admin path.
    ///
    /// # Errors
    ///
    /// Upstream variants for transport failures.
    pub async fn clear_availability(&self, zone_id: &ZoneId) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = with_deadline(
            "clear availability",
            self.options.call_timeout,
            conn.del(keys::zone_availability(zone_id)),
        )
        .await?;
        Ok(())
    }

    /// Active booking ids a user holds for an event.
    ///
    /// # Errors
    ///
    /// Upstream variants for transport failures.
    pub async fn user_reservations(
        &self,
        user_id: UserId,
        event_id: &EventId,
    ) -> Result<Vec<BookingId>> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = with_deadline(
            "read user reservations",
            self.options.call_timeout,
            conn.smembers(keys::user_reservations(user_id, event_id)),
        )
        .await?;
        Ok(members
            .iter()
            .filter_map(|raw| Uuid::parse_str(raw).ok().map(BookingId))
            .collect())
    }
}

#[async_trait]
impl ReservationEngine for ReservationStore {
    async fn reserve(&self, request: ReserveRequest) -> Result<ReserveOutcome> {
        Self::reserve(self, request).await
    }

    async fn release(
        &self,
        booking_id: BookingId,
        user_id: UserId,
        event_id: &EventId,
        zone_id: &ZoneId,
    ) -> Result<i64> {
        Self::release(self, booking_id, user_id, event_id, zone_id).await
    }

    async fn confirm(
        &self,
        booking_id: BookingId,
        user_id: UserId,
        payment_id: &str,
    ) -> Result<()> {
        Self::confirm(self, booking_id, user_id, payment_id).await
    }

    async fn extend(&self, booking_id: BookingId, additional_secs: i64) -> Result<i64> {
        Self::extend(self, booking_id, additional_secs).await
    }

    async fn get(&self, booking_id: BookingId) -> Result<Option<Reservation>> {
        Self::get(self, booking_id).await
    }

    async fn availability(&self, zone_id: &ZoneId) -> Result<i64> {
        Self::availability(self, zone_id).await
    }

    async fn set_availability(&self, zone_id: &ZoneId, seats: i64) -> Result<()> {
        Self::set_availability(self, zone_id, seats).await
    }
}

fn release_confirm_error(reply: ScriptReply) -> Error {
    match reply.code.as_str() {
        "RESERVATION_NOT_FOUND" => Error::NotFound {
            resource: "reservation",
        },
        "FORBIDDEN" => Error::Conflict {
            message: "reservation belongs to another user".into(),
        },
        "ALREADY_CONFIRMED" => Error::Conflict {
            message: "reservation already confirmed".into(),
        },
        _ => Error::Internal {
            message: format!("inventory script: {} {}", reply.code, reply.message),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_error_codes_map_to_taxonomy() {
        let not_found = release_confirm_error(ScriptReply::from_tuple((
            0,
            0,
            "RESERVATION_NOT_FOUND".into(),
            String::new(),
        )));
        assert!(matches!(not_found, Error::NotFound { resource: "reservation" }));

        let forbidden = release_confirm_error(ScriptReply::from_tuple((
            0,
            0,
            "FORBIDDEN".into(),
            String::new(),
        )));
        assert!(matches!(forbidden, Error::Conflict { .. }));

        let confirmed = release_confirm_error(ScriptReply::from_tuple((
            0,
            0,
            "ALREADY_CONFIRMED".into(),
            String::new(),
        )));
        assert!(matches!(confirmed, Error::Conflict { .. }));
    }
}
