//! Outbox relay.
//!
//! Polls the outbox table and ships pending rows to the log with the
//! booking id as partition key. Rows are marked published only after the
//! broker acknowledged them, so emission is at-least-once; consumers
//! absorb duplicates.

use rushgate_eventlog::LogProducer;
use rushgate_postgres::OutboxRepository;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// The relay loop.
pub struct OutboxRelay {
    outbox: OutboxRepository,
    producer: LogProducer,
    batch_size: i64,
    poll_interval: Duration,
}

impl OutboxRelay {
    /// Wire the relay to its table and producer.
    #[must_use]
    pub fn new(
        outbox: OutboxRepository,
        producer: LogProducer,
        batch_size: i64,
        poll_interval: Duration,
    ) -> Self {
        Self {
            outbox,
            producer,
            batch_size,
            poll_interval,
        }
    }

    /// Run until cancelled, then flush the producer.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(batch_size = self.batch_size, "outbox relay started");
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    if let Err(error) = self.producer.flush(Duration::from_secs(5)) {
                        tracing::warn!(%error, "outbox producer flush failed on shutdown");
                    }
                    tracing::info!("outbox relay stopping");
                    return;
                }
                shipped = self.relay_once() => {
                    if shipped == 0 {
                        tokio::time::sleep(self.poll_interval).await;
                    }
                }
            }
        }
    }

    /// Ship one batch; returns how many rows were published.
    pub async fn relay_once(&self) -> usize {
        let rows = match self.outbox.fetch_unpublished(self.batch_size).await {
            Ok(rows) => rows,
            Err(error) => {
                tracing::error!(%error, "failed to fetch outbox rows");
                return 0;
            }
        };
        if rows.is_empty() {
            return 0;
        }

        let mut published = Vec::with_capacity(rows.len());
        for row in &rows {
            let payload = match serde_json::to_vec(&row.payload) {
                Ok(bytes) => bytes,
                Err(error) => {
                    tracing::error!(%error, row_id = row.id, "unserializable outbox payload");
                    continue;
                }
            };
            match self
                .producer
                .produce(&row.topic, &row.partition_key, &payload, HashMap::new())
                .await
            {
                Ok(_) => published.push(row.id),
                Err(error) => {
                    // Preserve per-booking ordering: stop the batch at
                    // the first failure and retry from here next poll.
                    tracing::error!(%error, row_id = row.id, "outbox publish failed");
                    break;
                }
            }
        }

        if let Err(error) = self.outbox.mark_published(&published).await {
            tracing::error!(%error, "failed to mark outbox rows published");
        }
        published.len()
    }
}
