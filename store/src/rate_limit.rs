//! Shared token bucket state.
//!
//! Same arithmetic as the in-process bucket, but the `{tokens,
//! last_refill}` pair lives in Redis and is updated by one atomic script,
//! so every gateway replica draws from the same budget. Tokens are integer
//! milli-tokens; the script never touches floating point.

use crate::client::{with_deadline, RedisClient};
use crate::keys;
use crate::scripts::ScriptSet;
use chrono::Utc;
use redis::aio::ConnectionManager;
use rushgate_core::Result;
use std::sync::Arc;
use std::time::Duration;

/// Milli-tokens charged per request.
const COST_MILLI: i64 = 1_000;

/// Decision from the shared bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharedAllowance {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Whole tokens remaining after the decision.
    pub remaining: i64,
}

/// Redis-backed token bucket shared across gateway processes.
#[derive(Clone)]
pub struct SharedTokenBucket {
    conn: ConnectionManager,
    scripts: Arc<ScriptSet>,
    call_timeout: Duration,
    /// Namespace segment in `ratelimit:{scope}:{key}`.
    scope: String,
    rate_milli_per_sec: i64,
    burst_milli: i64,
    idle_ttl: Duration,
}

impl SharedTokenBucket {
    /// Build a shared bucket.
    ///
    /// `rate_per_sec` and `burst` are whole tokens; they are converted to
    /// milli-tokens for the script.
    #[must_use]
    pub fn new(
        client: &RedisClient,
        scripts: Arc<ScriptSet>,
        call_timeout: Duration,
        scope: impl Into<String>,
        rate_per_sec: f64,
        burst: f64,
    ) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let rate_milli_per_sec = (rate_per_sec * 1_000.0) as i64;
        #[allow(clippy::cast_possible_truncation)]
        let burst_milli = (burst * 1_000.0) as i64;
        Self {
            conn: client.conn(),
            scripts,
            call_timeout,
            scope: scope.into(),
            rate_milli_per_sec,
            burst_milli,
            idle_ttl: Duration::from_secs(3_600),
        }
    }

    /// Charge one request against `key`'s shared budget.
    ///
    /// # Errors
    ///
    /// Upstream variants for transport failures. Callers treat transport
    /// failure as deny; an unreachable bucket must not open the gate.
    pub async fn allow(&self, key: &str) -> Result<SharedAllowance> {
        let mut conn = self.conn.clone();
        let now_ms = Utc::now().timestamp_millis();
        let idle_ms = i64::try_from(self.idle_ttl.as_millis()).unwrap_or(i64::MAX);
        let (allowed, remaining_milli): (i64, i64) = with_deadline(
            "shared rate limit",
            self.call_timeout,
            self.scripts
                .token_bucket
                .key(keys::rate_limit(&self.scope, key))
                .arg(self.rate_milli_per_sec)
                .arg(self.burst_milli)
                .arg(now_ms)
                .arg(COST_MILLI)
                .arg(idle_ms)
                .invoke_async(&mut conn),
        )
        .await?;

        Ok(SharedAllowance {
            allowed: allowed == 1,
            remaining: remaining_milli / COST_MILLI,
        })
    }

    /// Time until one whole token refills, for `Retry-After` hints.
    #[must_use]
    pub fn retry_after(&self) -> Duration {
        if self.rate_milli_per_sec <= 0 {
            return Duration::from_secs(1);
        }
        #[allow(clippy::cast_precision_loss)]
        let secs = COST_MILLI as f64 / self.rate_milli_per_sec as f64;
        Duration::from_secs_f64(secs.max(0.001))
    }
}
