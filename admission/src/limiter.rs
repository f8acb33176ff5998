//! The shared limiter interface and its two implementations.
//!
//! `Allow(key)` answers `(allowed, remaining, reset_at)`. The local
//! variant is this process's token bucket; the shared variant charges the
//! Redis bucket so all gateway replicas draw from one budget. The
//! endpoint layer picks the policy, then consults local first (cheap) and
//! the shared tier only for requests the local tier admitted.

use crate::bucket::LocalTokenBucket;
use crate::policy::PolicyTable;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rushgate_core::Result;
use rushgate_store::SharedTokenBucket;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Decision from a limiter tier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Allowance {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Policy limit (burst) for the `X-RateLimit-Limit` header.
    pub limit: f64,
    /// Tokens remaining after the decision.
    pub remaining: f64,
    /// When a rejected client should retry.
    pub reset_at: DateTime<Utc>,
}

/// Common limiter interface.
#[async_trait]
pub trait Limit: Send + Sync {
    /// Charge one request against `key`.
    async fn allow(&self, key: &str) -> Result<Allowance>;
}

#[async_trait]
impl Limit for LocalTokenBucket {
    async fn allow(&self, key: &str) -> Result<Allowance> {
        let (allowed, remaining) = self.allow(key);
        Ok(Allowance {
            allowed,
            limit: self.burst(),
            remaining,
            reset_at: Utc::now()
                + chrono::Duration::from_std(self.retry_after())
                    .unwrap_or_else(|_| chrono::Duration::seconds(1)),
        })
    }
}

/// Redis-backed tier implementing the same interface.
pub struct SharedLimiter {
    bucket: SharedTokenBucket,
    burst: f64,
}

impl SharedLimiter {
    /// Wrap a shared bucket, remembering the burst for header reporting.
    #[must_use]
    pub const fn new(bucket: SharedTokenBucket, burst: f64) -> Self {
        Self { bucket, burst }
    }
}

#[async_trait]
impl Limit for SharedLimiter {
    async fn allow(&self, key: &str) -> Result<Allowance> {
        let decision = self.bucket.allow(key).await?;
        #[allow(clippy::cast_precision_loss)]
        Ok(Allowance {
            allowed: decision.allowed,
            limit: self.burst,
            remaining: decision.remaining as f64,
            reset_at: Utc::now()
                + chrono::Duration::from_std(self.bucket.retry_after())
                    .unwrap_or_else(|_| chrono::Duration::seconds(1)),
        })
    }
}

/// Policy-driven set of local buckets: one per rule plus the default.
///
/// Keys are client identities (user id or peer address); each rule owns
/// its own bucket so a burst on the booking endpoint cannot starve
/// catalogue reads.
pub struct EndpointLimiters {
    table: PolicyTable,
    rule_buckets: Vec<Arc<LocalTokenBucket>>,
    default_bucket: Arc<LocalTokenBucket>,
}

impl EndpointLimiters {
    /// Build buckets for every rule in `table`.
    #[must_use]
    pub fn new(table: PolicyTable) -> Self {
        let rule_buckets = table
            .rules
            .iter()
            .map(|rule| Arc::new(LocalTokenBucket::new(rule.rate_per_sec, rule.burst)))
            .collect();
        let default_bucket = Arc::new(LocalTokenBucket::new(
            table.default_rate_per_sec,
            table.default_burst,
        ));
        Self {
            table,
            rule_buckets,
            default_bucket,
        }
    }

    /// Charge `client_key` against the policy for `(method, path)`.
    pub fn check(&self, method: &str, path: &str, client_key: &str) -> Allowance {
        let bucket = match self.table.find(method, path) {
            Some(index) => &self.rule_buckets[index],
            None => &self.default_bucket,
        };
        let (allowed, remaining) = bucket.allow(client_key);
        Allowance {
            allowed,
            limit: bucket.burst(),
            remaining,
            reset_at: Utc::now()
                + chrono::Duration::from_std(bucket.retry_after())
                    .unwrap_or_else(|_| chrono::Duration::seconds(1)),
        }
    }

    /// Retry hint for the policy governing `(method, path)`.
    #[must_use]
    pub fn retry_after(&self, method: &str, path: &str) -> Duration {
        match self.table.find(method, path) {
            Some(index) => self.rule_buckets[index].retry_after(),
            None => self.default_bucket.retry_after(),
        }
    }

    /// Spawn idle-entry sweepers for every bucket; abort the handles on
    /// shutdown.
    #[must_use]
    pub fn spawn_sweepers(
        &self,
        interval: Duration,
        entry_ttl: Duration,
    ) -> Vec<tokio::task::JoinHandle<()>> {
        self.rule_buckets
            .iter()
            .chain(std::iter::once(&self.default_bucket))
            .map(|bucket| Arc::clone(bucket).spawn_sweeper(interval, entry_ttl))
            .collect()
    }

    /// Allowed/rejected counters per rule pattern plus the default.
    #[must_use]
    pub fn stats(&self) -> HashMap<String, crate::bucket::BucketStats> {
        let mut out = HashMap::new();
        for (rule, bucket) in self.table.rules.iter().zip(&self.rule_buckets) {
            out.insert(rule.pattern.clone(), bucket.stats());
        }
        out.insert("<default>".to_string(), self.default_bucket.stats());
        out
    }
}
