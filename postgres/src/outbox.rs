//! Outbox rows: events written with the business transaction, relayed to
//! the log by the worker binary.

use crate::{db_error, Database};
use chrono::{DateTime, Utc};
use rushgate_core::Result;
use sqlx::postgres::PgPool;

/// One pending or published outbox row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OutboxRow {
    /// Monotonic row id; relay order.
    pub id: i64,
    /// Destination topic.
    pub topic: String,
    /// Record partition key (booking id).
    pub partition_key: String,
    /// Event payload as stored.
    pub payload: serde_json::Value,
    /// When the business transaction wrote the row.
    pub created_at: DateTime<Utc>,
    /// When the relay shipped it, if it has.
    pub published_at: Option<DateTime<Utc>>,
}

/// Repository over the `outbox` table.
#[derive(Clone)]
pub struct OutboxRepository {
    pool: PgPool,
}

impl OutboxRepository {
    /// Build a repository over the shared pool.
    #[must_use]
    pub fn new(database: &Database) -> Self {
        Self {
            pool: database.pool().clone(),
        }
    }

    /// Oldest unpublished rows. Emission is at-least-once: a relay crash
    /// between publish and mark re-ships the row on the next poll.
    ///
    /// # Errors
    ///
    /// Upstream variants for transport failures.
    pub async fn fetch_unpublished(&self, limit: i64) -> Result<Vec<OutboxRow>> {
        sqlx::query_as(
            "SELECT id, topic, partition_key, payload, created_at, published_at \
             FROM outbox WHERE published_at IS NULL \
             ORDER BY id LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("fetch outbox", e))
    }

    /// Stamp rows as published after the log acknowledged them.
    ///
    /// # Errors
    ///
    /// Upstream variants for transport failures.
    pub async fn mark_published(&self, ids: &[i64]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        sqlx::query("UPDATE outbox SET published_at = now() WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("mark outbox published", e))?;
        Ok(())
    }
}

/// Enqueue one outbox row inside an open transaction.
pub(crate) async fn insert_outbox(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    topic: &str,
    partition_key: &str,
    payload: &serde_json::Value,
) -> Result<()> {
    sqlx::query("INSERT INTO outbox (topic, partition_key, payload) VALUES ($1, $2, $3)")
        .bind(topic)
        .bind(partition_key)
        .bind(payload)
        .execute(&mut **tx)
        .await
        .map_err(|e| db_error("insert outbox", e))?;
    Ok(())
}
