//! Synchronous-acknowledgement producer.

use crate::error::EventLogError;
use crate::propagation;
use rdkafka::config::ClientConfig;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use rushgate_core::config::KafkaConfig;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

/// Producer wrapper: delivery-acknowledged sends with trace headers.
pub struct LogProducer {
    producer: FutureProducer,
    delivery_timeout: Duration,
}

impl LogProducer {
    /// Create the producer and wait for broker connectivity.
    ///
    /// Connectivity is probed by fetching cluster metadata, retried
    /// `connect_retries` times with `connect_retry_delay_ms` between
    /// attempts. Exhausting the retries is fatal for the process.
    ///
    /// # Errors
    ///
    /// [`EventLogError::ConnectionFailed`] when configuration is invalid
    /// or the brokers stay unreachable.
    pub async fn connect(config: &KafkaConfig) -> Result<Self, EventLogError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("client.id", &config.client_id)
            .set("acks", "all")
            .set("message.timeout.ms", config.delivery_timeout_ms.to_string())
            .create()
            .map_err(|e| EventLogError::ConnectionFailed(format!("create producer: {e}")))?;

        wait_for_metadata_client(
            producer.client(),
            config.connect_retries,
            Duration::from_millis(config.connect_retry_delay_ms),
        )
        .await?;

        tracing::info!(brokers = %config.brokers, "event log producer connected");
        Ok(Self {
            producer,
            delivery_timeout: Duration::from_millis(config.delivery_timeout_ms),
        })
    }

    /// Produce one record and wait for the broker acknowledgement.
    ///
    /// The current span's trace context is injected into the record
    /// headers alongside any caller-supplied headers. Returns the
    /// assigned `(partition, offset)`.
    ///
    /// # Errors
    ///
    /// [`EventLogError::PublishFailed`] when delivery is not acknowledged
    /// within the delivery timeout.
    pub async fn produce(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
        extra_headers: HashMap<String, String>,
    ) -> Result<(i32, i64), EventLogError> {
        let mut headers = extra_headers;
        propagation::inject_current(&mut headers);

        let mut record_headers = OwnedHeaders::new();
        for (name, value) in &headers {
            record_headers = record_headers.insert(Header {
                key: name,
                value: Some(value.as_bytes()),
            });
        }

        let record = FutureRecord::to(topic)
            .key(key)
            .payload(payload)
            .headers(record_headers);

        match self
            .producer
            .send(record, Timeout::After(self.delivery_timeout))
            .await
        {
            Ok((partition, offset)) => {
                tracing::debug!(topic, partition, offset, key, "produced record");
                Ok((partition, offset))
            }
            Err((err, _)) => Err(EventLogError::PublishFailed {
                topic: topic.to_string(),
                reason: err.to_string(),
            }),
        }
    }

    /// Serialize `value` as JSON and produce it.
    ///
    /// # Errors
    ///
    /// [`EventLogError::Codec`] on serialization failure, otherwise as
    /// [`Self::produce`].
    pub async fn produce_json<T: Serialize>(
        &self,
        topic: &str,
        key: &str,
        value: &T,
    ) -> Result<(i32, i64), EventLogError> {
        let payload = serde_json::to_vec(value).map_err(|e| EventLogError::Codec(e.to_string()))?;
        self.produce(topic, key, &payload, HashMap::new()).await
    }

    /// Flush buffered records, bounded by `timeout`. Called on shutdown.
    ///
    /// # Errors
    ///
    /// [`EventLogError::PublishFailed`] when records remain unflushed.
    pub fn flush(&self, timeout: Duration) -> Result<(), EventLogError> {
        self.producer
            .flush(Timeout::After(timeout))
            .map_err(|e| EventLogError::PublishFailed {
                topic: "<flush>".to_string(),
                reason: e.to_string(),
            })
    }
}

/// Probe broker metadata until it answers or retries run out.
pub(crate) async fn wait_for_metadata_client<C: rdkafka::client::ClientContext>(
    client: &rdkafka::client::Client<C>,
    retries: u32,
    delay: Duration,
) -> Result<(), EventLogError> {
    let attempts = retries.max(1);
    let mut last_error = String::new();
    for attempt in 1..=attempts {
        match client.fetch_metadata(None, Duration::from_secs(5)) {
            Ok(_) => return Ok(()),
            Err(e) => {
                last_error = e.to_string();
                tracing::warn!(attempt, attempts, error = %last_error, "event log not reachable yet");
            }
        }
        if attempt < attempts {
            tokio::time::sleep(delay).await;
        }
    }
    Err(EventLogError::ConnectionFailed(format!(
        "brokers unreachable after {attempts} attempts: {last_error}"
    )))
}
