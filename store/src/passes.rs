//! Mirror entries for issued queue passes.
//!
//! The signed token is self-contained; the mirror exists so an issued pass
//! can be revoked before its natural expiry by deleting the entry. When
//! cross-checking is enabled, validation accepts a pass only if the stored
//! value matches the presented token exactly.

use crate::client::{with_deadline, RedisClient};
use crate::keys;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use rushgate_core::{EventId, Result, UserId};
use std::time::Duration;

/// Store for `queue:pass:{event_id}:{user_id}` entries.
#[derive(Clone)]
pub struct QueuePassStore {
    conn: ConnectionManager,
    call_timeout: Duration,
}

impl QueuePassStore {
    /// Build a pass store over an established connection.
    #[must_use]
    pub fn new(client: &RedisClient, call_timeout: Duration) -> Self {
        Self {
            conn: client.conn(),
            call_timeout,
        }
    }

    /// Record an issued pass with TTL equal to its remaining lifetime.
    ///
    /// # Errors
    ///
    /// Upstream variants for transport failures.
    pub async fn store(
        &self,
        event_id: &EventId,
        user_id: UserId,
        token: &str,
        ttl: Duration,
    ) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = with_deadline(
            "store queue pass",
            self.call_timeout,
            conn.set_ex(
                keys::queue_pass(event_id, user_id),
                token,
                ttl.as_secs().max(1),
            ),
        )
        .await?;
        Ok(())
    }

    /// Fetch the stored pass for cross-checking, `None` when revoked or
    /// expired.
    ///
    /// # Errors
    ///
    /// Upstream variants for transport failures.
    pub async fn get(&self, event_id: &EventId, user_id: UserId) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        with_deadline(
            "get queue pass",
            self.call_timeout,
            conn.get(keys::queue_pass(event_id, user_id)),
        )
        .await
    }

    /// Revoke a pass before its natural expiry.
    ///
    /// # Errors
    ///
    /// Upstream variants for transport failures.
    pub async fn revoke(&self, event_id: &EventId, user_id: UserId) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = with_deadline(
            "revoke queue pass",
            self.call_timeout,
            conn.del(keys::queue_pass(event_id, user_id)),
        )
        .await?;
        tracing::info!(event_id = %event_id, user_id = %user_id, "revoked queue pass");
        Ok(())
    }
}
