//! Explicit-commit consumer.
//!
//! Auto-commit is disabled: the worker processes a batch, commits its
//! database transaction, then commits offsets. A crash between the two
//! replays the batch, which downstream consumers absorb through the
//! unique booking-id constraint.

use crate::error::EventLogError;
use crate::producer::wait_for_metadata_client;
use crate::propagation;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::{Headers, Message};
use rdkafka::topic_partition_list::{Offset, TopicPartitionList};
use rushgate_core::config::KafkaConfig;
use std::collections::HashMap;
use std::time::Duration;

/// One record lifted out of the log.
#[derive(Debug, Clone)]
pub struct ConsumedRecord {
    /// Source topic.
    pub topic: String,
    /// Source partition.
    pub partition: i32,
    /// Record offset within the partition.
    pub offset: i64,
    /// Partition key, when present and valid UTF-8.
    pub key: Option<String>,
    /// Raw payload bytes.
    pub payload: Vec<u8>,
    /// Record headers (trace context travels here).
    pub headers: HashMap<String, String>,
}

impl ConsumedRecord {
    /// Deserialize the JSON payload.
    ///
    /// # Errors
    ///
    /// [`EventLogError::Codec`] when the payload is not valid JSON for `T`.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, EventLogError> {
        serde_json::from_slice(&self.payload).map_err(|e| EventLogError::Codec(e.to_string()))
    }

    /// Start a processing span parented on the propagated trace context.
    #[must_use]
    pub fn processing_span(&self) -> tracing::Span {
        use tracing_opentelemetry::OpenTelemetrySpanExt;

        let span = tracing::info_span!(
            "log.process",
            topic = %self.topic,
            partition = self.partition,
            offset = self.offset,
            key = self.key.as_deref().unwrap_or(""),
        );
        span.set_parent(propagation::extract(&self.headers));
        span
    }
}

/// Consumer wrapper with explicit offset commits.
pub struct LogConsumer {
    consumer: StreamConsumer,
}

impl LogConsumer {
    /// Create a consumer in `group`, subscribe to `topics`, and wait for
    /// broker connectivity.
    ///
    /// # Errors
    ///
    /// [`EventLogError::ConnectionFailed`] when the brokers stay
    /// unreachable, [`EventLogError::SubscribeFailed`] when the
    /// subscription is rejected.
    pub async fn connect(
        config: &KafkaConfig,
        group: &str,
        topics: &[&str],
    ) -> Result<Self, EventLogError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("client.id", &config.client_id)
            .set("group.id", group)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "6000")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| EventLogError::ConnectionFailed(format!("create consumer: {e}")))?;

        wait_for_metadata_client(
            consumer.client(),
            config.connect_retries,
            Duration::from_millis(config.connect_retry_delay_ms),
        )
        .await?;

        consumer
            .subscribe(topics)
            .map_err(|e| EventLogError::SubscribeFailed {
                topics: topics.iter().map(ToString::to_string).collect(),
                reason: e.to_string(),
            })?;

        tracing::info!(group, ?topics, "event log consumer subscribed");
        Ok(Self { consumer })
    }

    /// Poll up to `max_records`, waiting at most `max_wait` for the first
    /// record and draining whatever arrives promptly after it.
    ///
    /// # Errors
    ///
    /// [`EventLogError::PollFailed`] on transport errors; an empty batch
    /// is not an error.
    pub async fn poll_batch(
        &self,
        max_records: usize,
        max_wait: Duration,
    ) -> Result<Vec<ConsumedRecord>, EventLogError> {
        let mut records = Vec::new();
        let deadline = tokio::time::Instant::now() + max_wait;

        while records.len() < max_records {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                break;
            }
            match tokio::time::timeout(remaining, self.consumer.recv()).await {
                Err(_) => break,
                Ok(Err(e)) => return Err(EventLogError::PollFailed(e.to_string())),
                Ok(Ok(message)) => {
                    let mut headers = HashMap::new();
                    if let Some(borrowed) = message.headers() {
                        for header in borrowed.iter() {
                            if let Some(value) = header.value {
                                if let Ok(text) = std::str::from_utf8(value) {
                                    headers.insert(header.key.to_string(), text.to_string());
                                }
                            }
                        }
                    }
                    records.push(ConsumedRecord {
                        topic: message.topic().to_string(),
                        partition: message.partition(),
                        offset: message.offset(),
                        key: message
                            .key()
                            .and_then(|k| std::str::from_utf8(k).ok())
                            .map(ToString::to_string),
                        payload: message.payload().unwrap_or_default().to_vec(),
                        headers,
                    });
                }
            }
        }
        Ok(records)
    }

    /// Commit the highest offset per partition in `records`. Called only
    /// after the batch's effects are durable.
    ///
    /// # Errors
    ///
    /// [`EventLogError::CommitFailed`] when the broker rejects the commit.
    pub fn commit(&self, records: &[ConsumedRecord]) -> Result<(), EventLogError> {
        if records.is_empty() {
            return Ok(());
        }
        let mut highest: HashMap<(String, i32), i64> = HashMap::new();
        for record in records {
            let entry = highest
                .entry((record.topic.clone(), record.partition))
                .or_insert(record.offset);
            *entry = (*entry).max(record.offset);
        }

        let mut list = TopicPartitionList::new();
        for ((topic, partition), offset) in highest {
            list.add_partition_offset(&topic, partition, Offset::Offset(offset + 1))
                .map_err(|e| EventLogError::CommitFailed(e.to_string()))?;
        }
        self.consumer
            .commit(&list, rdkafka::consumer::CommitMode::Sync)
            .map_err(|e| EventLogError::CommitFailed(e.to_string()))
    }
}
