//! Batched inventory settlement.
//!
//! The settlement worker folds booking events into per-zone deltas and
//! applies them here as one transaction, one UPDATE per zone:
//!
//! ```text
//! available_seats := available_seats - reserved + cancelled
//! reserved_seats  := reserved_seats + reserved - confirmed - cancelled
//! sold_seats      := sold_seats + confirmed
//! ```
//!
//! The worker commits its consumer offsets only after this transaction
//! commits.

use crate::{db_error, Database};
use rushgate_core::{BookingId, Error, Result, ShowId, ZoneId};
use sqlx::postgres::PgPool;
use std::collections::HashMap;

/// The seat-accounting effect of one booking event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettlementKind {
    /// `booking.created`: seats moved from available to reserved.
    Reserved,
    /// `booking.confirmed`: seats moved from reserved to sold.
    Confirmed,
    /// `booking.cancelled` / `booking.expired`: seats returned.
    Cancelled,
}

impl SettlementKind {
    /// Ledger key for dedup; cancelled and expired share one key so a
    /// booking can never credit seats back twice.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Reserved => "reserved",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// One booking event flattened to its settlement effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementEntry {
    /// Booking the event belongs to.
    pub booking_id: BookingId,
    /// Effect kind.
    pub kind: SettlementKind,
    /// Zone the seats come from.
    pub zone_id: ZoneId,
    /// Show within the event.
    pub show_id: ShowId,
    /// Seats affected.
    pub quantity: i64,
}

/// Fold entries into per-(zone, show) deltas. Pure; exercised directly
/// by tests.
#[must_use]
pub fn aggregate(entries: &[SettlementEntry]) -> Vec<(ZoneId, ShowId, ZoneDelta)> {
    let mut map: HashMap<(ZoneId, ShowId), ZoneDelta> = HashMap::new();
    for entry in entries {
        let delta = map
            .entry((entry.zone_id.clone(), entry.show_id.clone()))
            .or_default();
        match entry.kind {
            SettlementKind::Reserved => delta.reserved += entry.quantity,
            SettlementKind::Confirmed => delta.confirmed += entry.quantity,
            SettlementKind::Cancelled => delta.cancelled += entry.quantity,
        }
    }
    map.into_iter()
        .map(|((zone, show), delta)| (zone, show, delta))
        .collect()
}

/// Accumulated seat-count deltas for one (zone, show).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ZoneDelta {
    /// Seats newly reserved.
    pub reserved: i64,
    /// Seats confirmed into sales.
    pub confirmed: i64,
    /// Seats released by cancellation or expiry.
    pub cancelled: i64,
}

impl ZoneDelta {
    /// Whether applying this delta would change anything.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.reserved == 0 && self.confirmed == 0 && self.cancelled == 0
    }
}

/// Repository applying settlement batches to `show_zones`.
#[derive(Clone)]
pub struct SettlementRepository {
    pool: PgPool,
}

impl SettlementRepository {
    /// Build a repository over the shared pool.
    #[must_use]
    pub fn new(database: &Database) -> Self {
        Self {
            pool: database.pool().clone(),
        }
    }

    /// Settle a batch of booking events in one transaction.
    ///
    /// Each entry is first recorded in the settlement ledger; entries the
    /// ledger already holds are replays and contribute zero delta. The
    /// surviving entries are aggregated and applied as one UPDATE per
    /// zone. The caller commits its consumer offsets only after this
    /// returns.
    ///
    /// # Errors
    ///
    /// [`Error::Conflict`] when a zone row is missing (events for an
    /// unpublished show); upstream variants for transport failures. Any
    /// failure rolls the whole batch back so offsets stay uncommitted.
    pub async fn settle(&self, entries: &[SettlementEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("begin settlement", e))?;

        let mut fresh = Vec::with_capacity(entries.len());
        for entry in entries {
            let inserted = sqlx::query(
                "INSERT INTO settlement_ledger (booking_id, transition) VALUES ($1, $2) \
                 ON CONFLICT (booking_id, transition) DO NOTHING",
            )
            .bind(entry.booking_id.0)
            .bind(entry.kind.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("record settlement ledger", e))?;
            if inserted.rows_affected() == 1 {
                fresh.push(entry.clone());
            } else {
                tracing::debug!(
                    booking_id = %entry.booking_id,
                    transition = entry.kind.as_str(),
                    "replayed settlement entry skipped"
                );
            }
        }

        for (zone_id, show_id, delta) in aggregate(&fresh) {
            if delta.is_zero() {
                continue;
            }
            let result = sqlx::query(
                "UPDATE show_zones SET \
                 available_seats = available_seats - $3 + $5, \
                 reserved_seats  = reserved_seats + $3 - $4 - $5, \
                 sold_seats      = sold_seats + $4, \
                 updated_at      = now() \
                 WHERE zone_id = $1 AND show_id = $2",
            )
            .bind(zone_id.as_str())
            .bind(show_id.as_str())
            .bind(delta.reserved)
            .bind(delta.confirmed)
            .bind(delta.cancelled)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("apply zone delta", e))?;

            if result.rows_affected() == 0 {
                return Err(Error::Conflict {
                    message: format!("no show_zones row for zone {zone_id} show {show_id}"),
                });
            }
            tracing::debug!(
                zone_id = %zone_id,
                show_id = %show_id,
                reserved = delta.reserved,
                confirmed = delta.confirmed,
                cancelled = delta.cancelled,
                "settled zone delta"
            );
        }

        tx.commit()
            .await
            .map_err(|e| db_error("commit settlement", e))
    }

    /// Seed a zone row when a show is published. Admin path, also used by
    /// integration tests.
    ///
    /// # Errors
    ///
    /// Upstream variants for transport failures.
    pub async fn publish_zone(
        &self,
        zone_id: &ZoneId,
        show_id: &ShowId,
        event_id: &str,
        total_seats: i64,
        unit_price_minor: i64,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO show_zones (zone_id, show_id, event_id, total_seats, available_seats, \
             unit_price_minor) \
             VALUES ($1, $2, $3, $4, $4, $5) \
             ON CONFLICT (zone_id, show_id) DO NOTHING",
        )
        .bind(zone_id.as_str())
        .bind(show_id.as_str())
        .bind(event_id)
        .bind(total_seats)
        .bind(unit_price_minor)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("publish zone", e))?;
        Ok(())
    }
}
