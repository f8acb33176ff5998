//! Booking rows and their transactional state transitions.
//!
//! Every write that changes booking state also enqueues the matching
//! outbox row in the same transaction, so an event is emitted if and only
//! if the business write committed.

use crate::outbox::insert_outbox;
use crate::{db_error, Database};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rushgate_core::events::TOPIC_BOOKING_EVENTS;
use rushgate_core::providers::BookingStore;
use rushgate_core::{
    Booking, BookingEvent, BookingId, BookingStatus, Error, EventId, Result, ShowId, UserId, ZoneId,
};
use sqlx::postgres::PgPool;
use uuid::Uuid;

/// Repository over the `bookings` table.
#[derive(Clone)]
pub struct BookingRepository {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    user_id: Uuid,
    event_id: String,
    show_id: String,
    zone_id: String,
    quantity: i64,
    unit_price_minor: i64,
    total_price_minor: i64,
    status: String,
    idempotency_key: String,
    confirmation_code: Option<String>,
    payment_id: Option<String>,
    reserved_at: DateTime<Utc>,
    confirmed_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    expires_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl BookingRow {
    fn into_booking(self) -> Result<Booking> {
        let status = match self.status.as_str() {
            "reserved" => BookingStatus::Reserved,
            "confirmed" => BookingStatus::Confirmed,
            "cancelled" => BookingStatus::Cancelled,
            "expired" => BookingStatus::Expired,
            other => {
                return Err(Error::Internal {
                    message: format!("unknown booking status in row: {other}"),
                })
            }
        };
        Ok(Booking {
            id: BookingId(self.id),
            user_id: UserId(self.user_id),
            event_id: EventId(self.event_id),
            show_id: ShowId(self.show_id),
            zone_id: ZoneId(self.zone_id),
            quantity: self.quantity,
            unit_price_minor: self.unit_price_minor,
            total_price_minor: self.total_price_minor,
            status,
            idempotency_key: self.idempotency_key,
            confirmation_code: self.confirmation_code,
            payment_id: self.payment_id,
            reserved_at: self.reserved_at,
            confirmed_at: self.confirmed_at,
            cancelled_at: self.cancelled_at,
            expires_at: self.expires_at,
            updated_at: self.updated_at,
        })
    }
}

const SELECT_COLUMNS: &str = "id, user_id, event_id, show_id, zone_id, quantity, \
     unit_price_minor, total_price_minor, status, idempotency_key, confirmation_code, \
     payment_id, reserved_at, confirmed_at, cancelled_at, expires_at, updated_at";

impl BookingRepository {
    /// Build a repository over the shared pool.
    #[must_use]
    pub fn new(database: &Database) -> Self {
        Self {
            pool: database.pool().clone(),
        }
    }

    /// Persist a fresh `reserved` booking, its `booking.created` outbox
    /// row, the audit trail entry and the idempotency-key audit record in
    /// one transaction.
    ///
    /// # Errors
    ///
    /// [`Error::Conflict`] when the booking id or idempotency key already
    /// exists; upstream variants for transport failures.
    pub async fn create_reserved(
        &self,
        booking: &Booking,
        request_hash: &str,
        event: &BookingEvent,
    ) -> Result<()> {
        let payload = serde_json::to_value(event).map_err(Error::internal)?;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("begin create booking", e))?;

        sqlx::query(
            "INSERT INTO bookings (id, user_id, event_id, show_id, zone_id, quantity, \
             unit_price_minor, total_price_minor, status, idempotency_key, reserved_at, \
             expires_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(booking.id.0)
        .bind(booking.user_id.0)
        .bind(booking.event_id.as_str())
        .bind(booking.show_id.as_str())
        .bind(booking.zone_id.as_str())
        .bind(booking.quantity)
        .bind(booking.unit_price_minor)
        .bind(booking.total_price_minor)
        .bind(booking.status.as_str())
        .bind(&booking.idempotency_key)
        .bind(booking.reserved_at)
        .bind(booking.expires_at)
        .bind(booking.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("insert booking", e))?;

        sqlx::query(
            "INSERT INTO idempotency_keys (key, request_hash, booking_id) \
             VALUES ($1, $2, $3) ON CONFLICT (key) DO NOTHING",
        )
        .bind(&booking.idempotency_key)
        .bind(request_hash)
        .bind(booking.id.0)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("insert idempotency audit", e))?;

        insert_audit(&mut tx, booking, "reserved").await?;
        insert_outbox(&mut tx, TOPIC_BOOKING_EVENTS, &event.partition_key(), &payload).await?;

        tx.commit()
            .await
            .map_err(|e| db_error("commit create booking", e))?;
        tracing::debug!(booking_id = %booking.id, "persisted reserved booking");
        Ok(())
    }

    /// Apply a state transition that was already validated on the domain
    /// object, writing the row update, audit entry and outbox row in one
    /// transaction.
    ///
    /// The `WHERE status = 'reserved'` guard makes the update a compare
    /// and swap; losing the race surfaces as [`Error::Conflict`].
    ///
    /// # Errors
    ///
    /// [`Error::Conflict`] when the row is no longer `reserved`; upstream
    /// variants for transport failures.
    pub async fn apply_transition(&self, booking: &Booking, event: &BookingEvent) -> Result<()> {
        let payload = serde_json::to_value(event).map_err(Error::internal)?;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("begin transition", e))?;

        let result = sqlx::query(
            "UPDATE bookings SET status = $2, confirmation_code = $3, payment_id = $4, \
             confirmed_at = $5, cancelled_at = $6, updated_at = $7 \
             WHERE id = $1 AND status = 'reserved'",
        )
        .bind(booking.id.0)
        .bind(booking.status.as_str())
        .bind(&booking.confirmation_code)
        .bind(&booking.payment_id)
        .bind(booking.confirmed_at)
        .bind(booking.cancelled_at)
        .bind(booking.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("update booking", e))?;

        if result.rows_affected() == 0 {
            return Err(Error::Conflict {
                message: "booking is no longer in reserved state".into(),
            });
        }

        insert_audit(&mut tx, booking, booking.status.as_str()).await?;
        insert_outbox(&mut tx, TOPIC_BOOKING_EVENTS, &event.partition_key(), &payload).await?;

        tx.commit()
            .await
            .map_err(|e| db_error("commit transition", e))?;
        tracing::debug!(
            booking_id = %booking.id,
            status = booking.status.as_str(),
            "applied booking transition"
        );
        Ok(())
    }

    /// Fetch a booking by id.
    ///
    /// # Errors
    ///
    /// Upstream variants for transport failures.
    pub async fn get(&self, id: BookingId) -> Result<Option<Booking>> {
        let row: Option<BookingRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM bookings WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("get booking", e))?;
        row.map(BookingRow::into_booking).transpose()
    }

    /// Fetch a booking by its idempotency key.
    ///
    /// # Errors
    ///
    /// Upstream variants for transport failures.
    pub async fn get_by_idempotency_key(&self, key: &str) -> Result<Option<Booking>> {
        let row: Option<BookingRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM bookings WHERE idempotency_key = $1"
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("get booking by key", e))?;
        row.map(BookingRow::into_booking).transpose()
    }

    /// Recent bookings for a user, newest first.
    ///
    /// # Errors
    ///
    /// Upstream variants for transport failures.
    pub async fn list_for_user(&self, user_id: UserId, limit: i64) -> Result<Vec<Booking>> {
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM bookings WHERE user_id = $1 \
             ORDER BY reserved_at DESC LIMIT $2"
        ))
        .bind(user_id.0)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list bookings", e))?;
        rows.into_iter().map(BookingRow::into_booking).collect()
    }

    /// Catalogue lookup for a zone's price and capacity.
    ///
    /// # Errors
    ///
    /// Upstream variants for transport failures.
    pub async fn zone_info(
        &self,
        zone_id: &ZoneId,
        show_id: &ShowId,
    ) -> Result<Option<rushgate_core::ZoneInfo>> {
        let row: Option<(String, i64, i64)> = sqlx::query_as(
            "SELECT event_id, unit_price_minor, total_seats FROM show_zones \
             WHERE zone_id = $1 AND show_id = $2",
        )
        .bind(zone_id.as_str())
        .bind(show_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("zone info", e))?;
        Ok(row.map(|(event_id, unit_price_minor, total_seats)| rushgate_core::ZoneInfo {
            event_id: EventId(event_id),
            unit_price_minor,
            total_seats,
        }))
    }

    /// Reserved bookings whose hold deadline has passed; candidates for
    /// the expiry sweeper.
    ///
    /// # Errors
    ///
    /// Upstream variants for transport failures.
    pub async fn expired_open_bookings(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Booking>> {
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM bookings \
             WHERE status = 'reserved' AND expires_at < $1 \
             ORDER BY expires_at LIMIT $2"
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list expired holds", e))?;
        rows.into_iter().map(BookingRow::into_booking).collect()
    }
}

#[async_trait]
impl BookingStore for BookingRepository {
    async fn create_reserved(
        &self,
        booking: &Booking,
        request_hash: &str,
        event: &BookingEvent,
    ) -> Result<()> {
        Self::create_reserved(self, booking, request_hash, event).await
    }

    async fn apply_transition(&self, booking: &Booking, event: &BookingEvent) -> Result<()> {
        Self::apply_transition(self, booking, event).await
    }

    async fn get(&self, id: BookingId) -> Result<Option<Booking>> {
        Self::get(self, id).await
    }

    async fn get_by_idempotency_key(&self, key: &str) -> Result<Option<Booking>> {
        Self::get_by_idempotency_key(self, key).await
    }

    async fn list_for_user(&self, user_id: UserId, limit: i64) -> Result<Vec<Booking>> {
        Self::list_for_user(self, user_id, limit).await
    }

    async fn zone_info(
        &self,
        zone_id: &ZoneId,
        show_id: &ShowId,
    ) -> Result<Option<rushgate_core::ZoneInfo>> {
        Self::zone_info(self, zone_id, show_id).await
    }
}

async fn insert_audit(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    booking: &Booking,
    transition: &str,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO reservations_audit (booking_id, user_id, zone_id, show_id, quantity, transition) \
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(booking.id.0)
    .bind(booking.user_id.0)
    .bind(booking.zone_id.as_str())
    .bind(booking.show_id.as_str())
    .bind(booking.quantity)
    .bind(transition)
    .execute(&mut **tx)
    .await
    .map_err(|e| db_error("insert audit", e))?;
    Ok(())
}
