//! Per-event virtual waiting room.
//!
//! FIFO order comes from a monotonically increasing join sequence used as
//! the sorted-set score; the sequence counter never decreases, so ranks
//! are stable under churn. Each queued user also owns a hash carrying the
//! session token and liveness timestamps; the sweeper evicts entries whose
//! `last_seen` goes stale so abandoned clients cannot poison the queue.

use crate::client::{with_deadline, RedisClient};
use crate::keys;
use crate::scripts::{ScriptReply, ScriptSet};
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use rushgate_core::{Error, EventId, Result, UserId};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Result of a join call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    /// 1-based position in the queue.
    pub position: i64,
    /// Session token proving ownership of the entry.
    pub token: String,
    /// Whether the user was already queued (token is the original one).
    pub rejoined: bool,
}

/// Redis-backed virtual queue client.
#[derive(Clone)]
pub struct VirtualQueue {
    conn: ConnectionManager,
    scripts: Arc<ScriptSet>,
    call_timeout: Duration,
}

impl VirtualQueue {
    /// Build a queue client over an established connection.
    #[must_use]
    pub fn new(client: &RedisClient, scripts: Arc<ScriptSet>, call_timeout: Duration) -> Self {
        Self {
            conn: client.conn(),
            scripts,
            call_timeout,
        }
    }

    /// Join the queue for `event_id`.
    ///
    /// Atomically assigns the next sequence number and writes the user
    /// hash. Joining twice is not an error: the original position and
    /// token come back with `rejoined = true`.
    ///
    /// # Errors
    ///
    /// Upstream variants for transport failures.
    pub async fn join(&self, event_id: &EventId, user_id: UserId) -> Result<JoinOutcome> {
        let token = Uuid::new_v4().to_string();
        let mut conn = self.conn.clone();
        let reply: (i64, i64, String, String) = with_deadline(
            "queue join",
            self.call_timeout,
            self.scripts
                .queue_join
                .key(keys::queue_event(event_id))
                .key(keys::queue_seq(event_id))
                .key(keys::queue_user(event_id, user_id))
                .key(keys::queue_registry())
                .arg(user_id.to_string())
                .arg(&token)
                .arg(Utc::now().timestamp())
                .arg(event_id.as_str())
                .invoke_async(&mut conn),
        )
        .await?;

        let reply = ScriptReply::from_tuple(reply);
        if reply.ok {
            tracing::debug!(
                event_id = %event_id,
                user_id = %user_id,
                position = reply.value,
                "joined queue"
            );
            return Ok(JoinOutcome {
                position: reply.value,
                token,
                rejoined: false,
            });
        }
        match reply.code.as_str() {
            "ALREADY_IN_QUEUE" => Ok(JoinOutcome {
                position: reply.value,
                token: reply.message,
                rejoined: true,
            }),
            _ => Err(Error::Internal {
                message: format!("queue_join script: {} {}", reply.code, reply.message),
            }),
        }
    }

    /// 1-based queue position, `None` when the user is not queued.
    ///
    /// # Errors
    ///
    /// Upstream variants for transport failures.
    pub async fn position(&self, event_id: &EventId, user_id: UserId) -> Result<Option<i64>> {
        let mut conn = self.conn.clone();
        let rank: Option<i64> = with_deadline(
            "queue position",
            self.call_timeout,
            conn.zrank(keys::queue_event(event_id), user_id.to_string()),
        )
        .await?;
        Ok(rank.map(|r| r + 1))
    }

    /// Refresh `last_seen` for a queued user.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when the user is not queued, [`Error::Conflict`]
    /// on token mismatch.
    pub async fn heartbeat(&self, event_id: &EventId, user_id: UserId, token: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let reply: (i64, i64, String, String) = with_deadline(
            "queue heartbeat",
            self.call_timeout,
            self.scripts
                .queue_heartbeat
                .key(keys::queue_user(event_id, user_id))
                .arg(token)
                .arg(Utc::now().timestamp())
                .invoke_async(&mut conn),
        )
        .await?;
        queue_member_result(ScriptReply::from_tuple(reply))
    }

    /// Leave the queue, validating the session token first.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when the user is not queued, [`Error::Conflict`]
    /// on token mismatch.
    pub async fn leave(&self, event_id: &EventId, user_id: UserId, token: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let reply: (i64, i64, String, String) = with_deadline(
            "queue leave",
            self.call_timeout,
            self.scripts
                .queue_leave
                .key(keys::queue_event(event_id))
                .key(keys::queue_user(event_id, user_id))
                .arg(user_id.to_string())
                .arg(token)
                .invoke_async(&mut conn),
        )
        .await?;
        queue_member_result(ScriptReply::from_tuple(reply))
    }

    /// Atomically pop and return up to `count` users from the queue head.
    ///
    /// # Errors
    ///
    /// Upstream variants for transport failures.
    pub async fn pop_batch(&self, event_id: &EventId, count: usize) -> Result<Vec<UserId>> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = with_deadline(
            "queue pop",
            self.call_timeout,
            self.scripts
                .queue_pop
                .key(keys::queue_event(event_id))
                .key(keys::queue_registry())
                .arg(count)
                .arg(keys::queue_user_prefix(event_id))
                .arg(event_id.as_str())
                .invoke_async(&mut conn),
        )
        .await?;
        Ok(members
            .iter()
            .filter_map(|raw| Uuid::parse_str(raw).ok().map(UserId))
            .collect())
    }

    /// Events that currently have a queue.
    ///
    /// # Errors
    ///
    /// Upstream variants for transport failures.
    pub async fn active_events(&self) -> Result<Vec<EventId>> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = with_deadline(
            "queue registry",
            self.call_timeout,
            conn.smembers(keys::queue_registry()),
        )
        .await?;
        Ok(members.into_iter().map(EventId::from).collect())
    }

    /// Evict queue-head entries idle since before `idle_timeout` ago,
    /// scanning at most `scan_limit` members. Returns the eviction count.
    ///
    /// # Errors
    ///
    /// Upstream variants for transport failures.
    pub async fn sweep_idle(
        &self,
        event_id: &EventId,
        scan_limit: usize,
        idle_timeout: Duration,
    ) -> Result<u64> {
        let cutoff = Utc::now().timestamp() - i64::try_from(idle_timeout.as_secs()).unwrap_or(86_400);
        let mut conn = self.conn.clone();
        let evicted: u64 = with_deadline(
            "queue sweep",
            self.call_timeout,
            self.scripts
                .queue_sweep
                .key(keys::queue_event(event_id))
                .arg(scan_limit)
                .arg(cutoff)
                .arg(keys::queue_user_prefix(event_id))
                .invoke_async(&mut conn),
        )
        .await?;
        if evicted > 0 {
            tracing::info!(event_id = %event_id, evicted, "evicted idle queue entries");
        }
        Ok(evicted)
    }

    /// Number of users currently queued for `event_id`.
    ///
    /// # Errors
    ///
    /// Upstream variants for transport failures.
    pub async fn depth(&self, event_id: &EventId) -> Result<u64> {
        let mut conn = self.conn.clone();
        with_deadline(
            "queue depth",
            self.call_timeout,
            conn.zcard(keys::queue_event(event_id)),
        )
        .await
    }
}

fn queue_member_result(reply: ScriptReply) -> Result<()> {
    if reply.ok {
        return Ok(());
    }
    Err(match reply.code.as_str() {
        "NOT_IN_QUEUE" => Error::NotFound {
            resource: "queue entry",
        },
        "FORBIDDEN" => Error::Conflict {
            message: "queue session token mismatch".into(),
        },
        _ => Error::Internal {
            message: format!("queue script: {} {}", reply.code, reply.message),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_errors_map_to_taxonomy() {
        let gone = queue_member_result(ScriptReply::from_tuple((
            0,
            0,
            "NOT_IN_QUEUE".into(),
            String::new(),
        )))
        .unwrap_err();
        assert!(matches!(gone, Error::NotFound { resource: "queue entry" }));

        let mismatch = queue_member_result(ScriptReply::from_tuple((
            0,
            0,
            "FORBIDDEN".into(),
            String::new(),
        )))
        .unwrap_err();
        assert!(matches!(mismatch, Error::Conflict { .. }));
    }
}
