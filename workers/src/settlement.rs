//! Inventory settlement worker.
//!
//! Consumes `booking-events`, flattens each event to its settlement
//! effect, and applies batches bounded by count or elapsed time.
//! Consumer offsets are committed strictly after the database
//! transaction commits; replays are absorbed by the settlement ledger.

use rushgate_core::{BookingEvent, BookingEventType};
use rushgate_eventlog::{ConsumedRecord, LogConsumer};
use rushgate_postgres::{SettlementEntry, SettlementKind, SettlementRepository};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// The settlement consumer loop.
pub struct SettlementWorker {
    consumer: LogConsumer,
    repository: SettlementRepository,
    batch_size: usize,
    flush_interval: Duration,
}

impl SettlementWorker {
    /// Wire the worker to its consumer and repository.
    #[must_use]
    pub fn new(
        consumer: LogConsumer,
        repository: SettlementRepository,
        batch_size: usize,
        flush_interval: Duration,
    ) -> Self {
        Self {
            consumer,
            repository,
            batch_size,
            flush_interval,
        }
    }

    /// Flatten one booking event to its settlement effect.
    #[must_use]
    pub fn entry_for(event: &BookingEvent) -> SettlementEntry {
        let kind = match event.event_type {
            BookingEventType::Created => SettlementKind::Reserved,
            BookingEventType::Confirmed => SettlementKind::Confirmed,
            BookingEventType::Cancelled | BookingEventType::Expired => SettlementKind::Cancelled,
        };
        SettlementEntry {
            booking_id: event.data.booking_id,
            kind,
            zone_id: event.data.zone_id.clone(),
            show_id: event.data.show_id.clone(),
            quantity: event.data.quantity,
        }
    }

    /// Run until cancelled, draining the in-flight batch on shutdown.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(
            batch_size = self.batch_size,
            flush_ms = u64::try_from(self.flush_interval.as_millis()).unwrap_or(u64::MAX),
            "settlement worker started"
        );
        loop {
            let batch = tokio::select! {
                () = cancel.cancelled() => {
                    tracing::info!("settlement worker stopping");
                    return;
                }
                batch = self.consumer.poll_batch(self.batch_size, self.flush_interval) => batch,
            };

            let records = match batch {
                Ok(records) => records,
                Err(error) => {
                    tracing::error!(%error, "settlement poll failed");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };
            if records.is_empty() {
                continue;
            }
            if let Err(error) = self.process_batch(&records).await {
                // Offsets stay uncommitted; the batch replays.
                tracing::error!(%error, "settlement batch failed, will replay");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }

    /// Settle one batch and commit its offsets.
    ///
    /// # Errors
    ///
    /// Propagates repository and commit failures; the caller leaves
    /// offsets uncommitted so the batch replays.
    pub async fn process_batch(&self, records: &[ConsumedRecord]) -> anyhow::Result<()> {
        let mut entries = Vec::with_capacity(records.len());
        for record in records {
            let span = record.processing_span();
            let _guard = span.enter();
            match record.json::<BookingEvent>() {
                Ok(event) => entries.push(Self::entry_for(&event)),
                Err(error) => {
                    // A malformed record would wedge the partition if we
                    // refused to commit past it; log and move on.
                    tracing::error!(
                        %error,
                        topic = %record.topic,
                        partition = record.partition,
                        offset = record.offset,
                        "skipping undecodable booking event"
                    );
                }
            }
        }

        self.repository.settle(&entries).await?;
        self.consumer.commit(records)?;
        tracing::debug!(events = entries.len(), "settled batch");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rushgate_core::{Booking, BookingId, BookingStatus, EventId, ShowId, UserId, ZoneId};
    use uuid::Uuid;

    fn booking(status: BookingStatus) -> Booking {
        let now = Utc::now();
        Booking {
            id: BookingId::generate(),
            user_id: UserId(Uuid::new_v4()),
            event_id: EventId::from("ev-1"),
            show_id: ShowId::from("show-1"),
            zone_id: ZoneId::from("zone-a"),
            quantity: 4,
            unit_price_minor: 1_000,
            total_price_minor: 4_000,
            status,
            idempotency_key: "key".into(),
            confirmation_code: None,
            payment_id: None,
            reserved_at: now,
            confirmed_at: None,
            cancelled_at: None,
            expires_at: now + chrono::Duration::seconds(300),
            updated_at: now,
        }
    }

    #[test]
    fn event_types_map_to_settlement_kinds() {
        let b = booking(BookingStatus::Reserved);
        let created = BookingEvent::from_booking(BookingEventType::Created, &b, Utc::now());
        assert_eq!(SettlementWorker::entry_for(&created).kind, SettlementKind::Reserved);

        let confirmed = BookingEvent::from_booking(BookingEventType::Confirmed, &b, Utc::now());
        assert_eq!(SettlementWorker::entry_for(&confirmed).kind, SettlementKind::Confirmed);

        let cancelled = BookingEvent::from_booking(BookingEventType::Cancelled, &b, Utc::now());
        assert_eq!(SettlementWorker::entry_for(&cancelled).kind, SettlementKind::Cancelled);

        let expired = BookingEvent::from_booking(BookingEventType::Expired, &b, Utc::now());
        assert_eq!(SettlementWorker::entry_for(&expired).kind, SettlementKind::Cancelled);
    }

    #[test]
    fn entry_carries_zone_show_and_quantity() {
        let b = booking(BookingStatus::Reserved);
        let event = BookingEvent::from_booking(BookingEventType::Created, &b, Utc::now());
        let entry = SettlementWorker::entry_for(&event);
        assert_eq!(entry.booking_id, b.id);
        assert_eq!(entry.zone_id, b.zone_id);
        assert_eq!(entry.show_id, b.show_id);
        assert_eq!(entry.quantity, 4);
    }
}
