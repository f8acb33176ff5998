//! Reservation expiry sweeper.
//!
//! Redis TTL expiry deletes the reservation record but never restores
//! the zone counter. This sweeper finds `reserved` bookings past their
//! deadline whose reservation record is gone, transitions them to
//! `expired` and enqueues `booking.expired`; settlement then returns the
//! seats to availability.

use chrono::{Duration as ChronoDuration, Utc};
use rushgate_core::{BookingEvent, BookingEventType, Error};
use rushgate_postgres::BookingRepository;
use rushgate_store::ReservationStore;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Grace period past the hold deadline before a booking is swept, to
/// absorb clock skew between the gateway and the stores.
const EXPIRY_GRACE_SECS: i64 = 2;

/// The expiry sweep loop.
pub struct ExpirySweeper {
    bookings: BookingRepository,
    reservations: ReservationStore,
    batch_size: i64,
}

impl ExpirySweeper {
    /// Wire the sweeper to the booking table and the reservation store.
    #[must_use]
    pub fn new(
        bookings: BookingRepository,
        reservations: ReservationStore,
        batch_size: i64,
    ) -> Self {
        Self {
            bookings,
            reservations,
            batch_size,
        }
    }

    /// Run until cancelled.
    pub async fn run(self, interval: Duration, cancel: CancellationToken) {
        tracing::info!(batch_size = self.batch_size, "expiry sweeper started");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::info!("expiry sweeper stopping");
                    return;
                }
                _ = ticker.tick() => {
                    match self.sweep_once().await {
                        Ok(expired) if expired > 0 => {
                            tracing::info!(expired, "expired lapsed reservations");
                        }
                        Ok(_) => {}
                        Err(error) => tracing::error!(%error, "expiry sweep failed"),
                    }
                }
            }
        }
    }

    /// One sweep pass; returns how many bookings were expired.
    ///
    /// # Errors
    ///
    /// Propagates store failures; partially swept batches are safe to
    /// retry because the transition is a compare-and-swap.
    pub async fn sweep_once(&self) -> rushgate_core::Result<u64> {
        let cutoff = Utc::now() - ChronoDuration::seconds(EXPIRY_GRACE_SECS);
        let candidates = self
            .bookings
            .expired_open_bookings(cutoff, self.batch_size)
            .await?;
        if candidates.is_empty() {
            return Ok(0);
        }

        let ids: Vec<_> = candidates.iter().map(|b| b.id).collect();
        // Only bookings whose Redis record is actually gone are expired;
        // a record that still exists keeps its TTL as the single truth.
        let lapsed = self.reservations.filter_missing(&ids).await?;

        let mut expired = 0u64;
        for mut booking in candidates {
            if !lapsed.contains(&booking.id) {
                continue;
            }
            let now = Utc::now();
            if booking.expire(now).is_err() {
                continue;
            }
            let event = BookingEvent::from_booking(BookingEventType::Expired, &booking, now);
            match self.bookings.apply_transition(&booking, &event).await {
                Ok(()) => expired += 1,
                // Lost the race against a concurrent confirm or cancel.
                Err(Error::Conflict { .. }) => {}
                Err(other) => return Err(other),
            }
        }
        Ok(expired)
    }
}
