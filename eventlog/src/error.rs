//! Event log error types.

use thiserror::Error;

/// Failures raised by the log client.
#[derive(Debug, Error)]
pub enum EventLogError {
    /// Could not reach the brokers within the configured retries.
    #[error("event log connection failed: {0}")]
    ConnectionFailed(String),

    /// A record could not be delivered.
    #[error("failed to publish to {topic}: {reason}")]
    PublishFailed {
        /// Destination topic.
        topic: String,
        /// Broker-reported reason.
        reason: String,
    },

    /// Subscribing to topics failed.
    #[error("failed to subscribe to {topics:?}: {reason}")]
    SubscribeFailed {
        /// Requested topics.
        topics: Vec<String>,
        /// Broker-reported reason.
        reason: String,
    },

    /// Polling the log failed.
    #[error("poll failed: {0}")]
    PollFailed(String),

    /// Committing offsets failed.
    #[error("offset commit failed: {0}")]
    CommitFailed(String),

    /// A record payload could not be serialized or deserialized.
    #[error("payload codec error: {0}")]
    Codec(String),
}

impl From<EventLogError> for rushgate_core::Error {
    fn from(err: EventLogError) -> Self {
        match err {
            EventLogError::ConnectionFailed(message)
            | EventLogError::PollFailed(message)
            | EventLogError::CommitFailed(message) => {
                rushgate_core::Error::UpstreamUnavailable { message }
            }
            EventLogError::PublishFailed { topic, reason } => {
                rushgate_core::Error::UpstreamUnavailable {
                    message: format!("publish to {topic}: {reason}"),
                }
            }
            EventLogError::SubscribeFailed { topics, reason } => {
                rushgate_core::Error::UpstreamUnavailable {
                    message: format!("subscribe to {topics:?}: {reason}"),
                }
            }
            EventLogError::Codec(message) => rushgate_core::Error::Internal { message },
        }
    }
}
