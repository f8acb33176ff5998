//! Shared Redis connection handling.

use redis::aio::ConnectionManager;
use redis::Client;
use rushgate_core::{Error, Result};
use std::time::Duration;

/// Thin wrapper owning the Redis [`ConnectionManager`].
///
/// The manager multiplexes one reconnecting connection; clones are cheap
/// and every store in this crate holds one. Per-call deadlines are applied
/// by the stores themselves via [`with_deadline`].
#[derive(Clone)]
pub struct RedisClient {
    manager: ConnectionManager,
}

impl RedisClient {
    /// Connect to Redis and verify the connection with a `PING`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UpstreamUnavailable`] if the URL is invalid or the
    /// server is unreachable within `connect_timeout`.
    pub async fn connect(url: &str, connect_timeout: Duration) -> Result<Self> {
        let client = Client::open(url).map_err(|e| Error::UpstreamUnavailable {
            message: format!("invalid redis url: {e}"),
        })?;

        let manager = tokio::time::timeout(connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| Error::UpstreamTimeout {
                operation: "redis connect",
            })?
            .map_err(|e| Error::UpstreamUnavailable {
                message: format!("redis connection failed: {e}"),
            })?;

        let mut conn = manager.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::UpstreamUnavailable {
                message: format!("redis ping failed: {e}"),
            })?;

        tracing::info!(url = %url, "connected to redis");
        Ok(Self { manager })
    }

    /// Clone the underlying connection manager.
    #[must_use]
    pub fn conn(&self) -> ConnectionManager {
        self.manager.clone()
    }

    /// Liveness probe used by the readiness endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UpstreamUnavailable`] when the server does not
    /// answer `PING`.
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.conn();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::UpstreamUnavailable {
                message: format!("redis ping failed: {e}"),
            })?;
        Ok(())
    }
}

/// Run `fut` under `deadline`, mapping both elapsed time and transport
/// errors into the domain taxonomy.
///
/// # Errors
///
/// [`Error::UpstreamTimeout`] when the deadline elapses,
/// [`Error::UpstreamUnavailable`] for connection-level failures, and
/// [`Error::Internal`] for anything else Redis reports.
pub async fn with_deadline<T>(
    operation: &'static str,
    deadline: Duration,
    fut: impl std::future::Future<Output = redis::RedisResult<T>>,
) -> Result<T> {
    match tokio::time::timeout(deadline, fut).await {
        Err(_) => Err(Error::UpstreamTimeout { operation }),
        Ok(Err(e)) if e.is_connection_refusal() || e.is_io_error() || e.is_timeout() => {
            Err(Error::UpstreamUnavailable {
                message: format!("{operation}: {e}"),
            })
        }
        Ok(Err(e)) => Err(Error::Internal {
            message: format!("{operation}: {e}"),
        }),
        Ok(Ok(value)) => Ok(value),
    }
}
