//! Fingerprinted idempotency records.
//!
//! One record per client-supplied `Idempotency-Key`, created with an
//! atomic `SET NX` so exactly one request wins the in-flight slot. The
//! winner later overwrites the record with the captured response; every
//! retry replays those bytes verbatim. Records expire after a bounded TTL.

use crate::client::{with_deadline, RedisClient};
use crate::keys;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use rushgate_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Progress of the guarded request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdempotencyStatus {
    /// The first request is still executing.
    Inflight,
    /// A response has been captured and can be replayed.
    Completed,
}

/// Stored record for one idempotency key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    /// Client-supplied key.
    pub key: String,
    /// Keyed hash of (method, path, user, body).
    pub request_hash: String,
    /// Whether the original request finished.
    pub status: IdempotencyStatus,
    /// Captured status code, present once completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_code: Option<u16>,
    /// Captured body, present once completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the response was captured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl IdempotencyRecord {
    /// Fresh in-flight record for a first-seen key.
    #[must_use]
    pub fn inflight(key: String, request_hash: String, now: DateTime<Utc>) -> Self {
        Self {
            key,
            request_hash,
            status: IdempotencyStatus::Inflight,
            response_code: None,
            response_body: None,
            created_at: now,
            completed_at: None,
        }
    }
}

/// Result of attempting to claim the in-flight slot.
#[derive(Debug, Clone, PartialEq)]
pub enum BeginOutcome {
    /// This request won the slot; run the handler and complete the record.
    Started,
    /// A record already exists; the caller decides between replay,
    /// in-progress and key-reuse based on its hash and status.
    Existing(IdempotencyRecord),
}

/// Redis-backed idempotency store.
#[derive(Clone)]
pub struct IdempotencyStore {
    conn: ConnectionManager,
    call_timeout: Duration,
    record_ttl_secs: u64,
}

impl IdempotencyStore {
    /// Build a store over an established connection.
    #[must_use]
    pub fn new(client: &RedisClient, call_timeout: Duration, record_ttl_secs: u64) -> Self {
        Self {
            conn: client.conn(),
            call_timeout,
            record_ttl_secs,
        }
    }

    /// Claim the in-flight slot for `key`, or fetch whoever holds it.
    ///
    /// The claim is `SET NX EX`; losing the race reads the winner's
    /// record. A record that expires between the failed claim and the
    /// read is treated as a fresh claim on one retry.
    ///
    /// # Errors
    ///
    /// Upstream variants for transport failures.
    pub async fn begin(&self, key: &str, request_hash: &str) -> Result<BeginOutcome> {
        let redis_key = keys::idempotency(key);
        for _ in 0..2 {
            let record =
                IdempotencyRecord::inflight(key.to_string(), request_hash.to_string(), Utc::now());
            let payload = serde_json::to_string(&record).map_err(Error::internal)?;

            let mut conn = self.conn.clone();
            let claimed: bool = with_deadline(
                "idempotency begin",
                self.call_timeout,
                redis::cmd("SET")
                    .arg(&redis_key)
                    .arg(&payload)
                    .arg("NX")
                    .arg("EX")
                    .arg(self.record_ttl_secs)
                    .query_async(&mut conn),
            )
            .await
            .map(|v: Option<String>| v.is_some())?;

            if claimed {
                return Ok(BeginOutcome::Started);
            }
            if let Some(existing) = self.get(key).await? {
                return Ok(BeginOutcome::Existing(existing));
            }
            // The holder expired between SET NX and GET; claim again.
        }
        Err(Error::Internal {
            message: "idempotency record vanished twice during claim".into(),
        })
    }

    /// Fetch the record for `key`, if any.
    ///
    /// # Errors
    ///
    /// Upstream variants for transport failures; malformed records are
    /// [`Error::Internal`].
    pub async fn get(&self, key: &str) -> Result<Option<IdempotencyRecord>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = with_deadline(
            "idempotency get",
            self.call_timeout,
            conn.get(keys::idempotency(key)),
        )
        .await?;
        raw.map(|json| serde_json::from_str(&json).map_err(Error::internal))
            .transpose()
    }

    /// Stamp the record completed with the captured response, refreshing
    /// its TTL.
    ///
    /// # Errors
    ///
    /// Upstream variants for transport failures.
    pub async fn complete(
        &self,
        key: &str,
        request_hash: &str,
        response_code: u16,
        response_body: String,
    ) -> Result<()> {
        let now = Utc::now();
        let record = IdempotencyRecord {
            key: key.to_string(),
            request_hash: request_hash.to_string(),
            status: IdempotencyStatus::Completed,
            response_code: Some(response_code),
            response_body: Some(response_body),
            created_at: now,
            completed_at: Some(now),
        };
        let payload = serde_json::to_string(&record).map_err(Error::internal)?;
        let mut conn = self.conn.clone();
        let _: () = with_deadline(
            "idempotency complete",
            self.call_timeout,
            conn.set_ex(keys::idempotency(key), payload, self.record_ttl_secs),
        )
        .await?;
        Ok(())
    }

    /// Drop the record so a retry can run the handler again. Used when the
    /// handler dies before producing any response.
    ///
    /// # Errors
    ///
    /// Upstream variants for transport failures.
    pub async fn remove(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = with_deadline(
            "idempotency remove",
            self.call_timeout,
            conn.del(keys::idempotency(key)),
        )
        .await?;
        Ok(())
    }
}
