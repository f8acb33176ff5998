//! Payment-event consumer.
//!
//! Folds `payment-events` into the same confirm/cancel orchestration the
//! HTTP surface runs: script call first, then the row transition with
//! its outbox event. Offsets commit only after the batch is processed.

use chrono::Utc;
use rushgate_core::providers::{BookingStore, ReservationEngine};
use rushgate_core::{
    BookingEvent, BookingEventType, Error, PaymentEvent, PaymentEventType,
};
use rushgate_eventlog::{ConsumedRecord, LogConsumer};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// The payment consumer loop.
pub struct PaymentConsumer {
    consumer: LogConsumer,
    engine: Arc<dyn ReservationEngine>,
    bookings: Arc<dyn BookingStore>,
}

impl PaymentConsumer {
    /// Wire the consumer to its collaborators.
    #[must_use]
    pub fn new(
        consumer: LogConsumer,
        engine: Arc<dyn ReservationEngine>,
        bookings: Arc<dyn BookingStore>,
    ) -> Self {
        Self {
            consumer,
            engine,
            bookings,
        }
    }

    /// Run until cancelled.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!("payment consumer started");
        loop {
            let batch = tokio::select! {
                () = cancel.cancelled() => {
                    tracing::info!("payment consumer stopping");
                    return;
                }
                batch = self.consumer.poll_batch(100, Duration::from_millis(500)) => batch,
            };
            let records = match batch {
                Ok(records) => records,
                Err(error) => {
                    tracing::error!(%error, "payment poll failed");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };
            if records.is_empty() {
                continue;
            }
            self.process_batch(&records).await;
            if let Err(error) = self.consumer.commit(&records) {
                tracing::error!(%error, "payment offset commit failed");
            }
        }
    }

    async fn process_batch(&self, records: &[ConsumedRecord]) {
        use tracing::Instrument;

        for record in records {
            let event = match record.json::<PaymentEvent>() {
                Ok(event) => event,
                Err(error) => {
                    tracing::error!(
                        %error,
                        offset = record.offset,
                        "skipping undecodable payment event"
                    );
                    continue;
                }
            };
            let span = record.processing_span();
            if let Err(error) = self.apply(&event).instrument(span).await {
                // Terminal-state and not-found failures are settled
                // outcomes for a payment event, not retryable work.
                tracing::warn!(
                    %error,
                    booking_id = %event.data.booking_id,
                    event_type = ?event.event_type,
                    "payment event did not apply"
                );
            }
        }
    }

    /// Apply one payment event to its booking.
    ///
    /// # Errors
    ///
    /// Propagates orchestration failures for logging; the event is not
    /// replayed (the booking's TTL and the sweeper bound the damage).
    pub async fn apply(&self, event: &PaymentEvent) -> rushgate_core::Result<()> {
        let booking_id = event.data.booking_id;
        let mut booking = self
            .bookings
            .get(booking_id)
            .await?
            .ok_or(Error::NotFound { resource: "booking" })?;

        match event.event_type {
            PaymentEventType::Succeeded => {
                self.engine
                    .confirm(booking_id, booking.user_id, &event.data.payment_id)
                    .await?;
                booking.confirm(event.data.payment_id.clone(), Utc::now())?;
                let booking_event =
                    BookingEvent::from_booking(BookingEventType::Confirmed, &booking, Utc::now());
                self.bookings.apply_transition(&booking, &booking_event).await?;
                tracing::info!(booking_id = %booking_id, "booking confirmed by payment");
            }
            PaymentEventType::Failed | PaymentEventType::SeatRelease => {
                self.engine
                    .release(
                        booking_id,
                        booking.user_id,
                        &booking.event_id,
                        &booking.zone_id,
                    )
                    .await?;
                booking.cancel(Utc::now())?;
                let booking_event =
                    BookingEvent::from_booking(BookingEventType::Cancelled, &booking, Utc::now());
                self.bookings.apply_transition(&booking, &booking_event).await?;
                tracing::info!(
                    booking_id = %booking_id,
                    reason = event.data.reason.as_deref().unwrap_or("payment failed"),
                    "booking cancelled by payment"
                );
            }
        }
        Ok(())
    }
}
