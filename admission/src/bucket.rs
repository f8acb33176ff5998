//! In-process token bucket.
//!
//! Per-key state lives in a map sharded by key hash so hot keys on
//! different shards never contend on one mutex. Refill happens lazily on
//! access: `tokens = min(burst, tokens + elapsed * rate)`. A background
//! sweeper evicts keys idle past their TTL.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const SHARDS: usize = 16;

#[derive(Debug, Clone, Copy)]
struct Entry {
    tokens: f64,
    last_refill: Instant,
}

/// Allowed/rejected counters, updated atomically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketStats {
    /// Requests that received a token.
    pub allowed: u64,
    /// Requests refused for lack of tokens.
    pub rejected: u64,
}

/// Sharded-mutex token bucket for one rate policy.
pub struct LocalTokenBucket {
    shards: Vec<Mutex<HashMap<String, Entry>>>,
    rate_per_sec: f64,
    burst: f64,
    allowed: AtomicU64,
    rejected: AtomicU64,
}

impl LocalTokenBucket {
    /// Build a bucket refilling `rate_per_sec` tokens up to `burst`.
    #[must_use]
    pub fn new(rate_per_sec: f64, burst: f64) -> Self {
        Self {
            shards: (0..SHARDS).map(|_| Mutex::new(HashMap::new())).collect(),
            rate_per_sec,
            burst,
            allowed: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    fn shard(&self, key: &str) -> &Mutex<HashMap<String, Entry>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        #[allow(clippy::cast_possible_truncation)]
        let index = (hasher.finish() as usize) % SHARDS;
        &self.shards[index]
    }

    /// Take one token for `key` if available. Returns `(allowed,
    /// remaining)` where `remaining` reflects the post-decision balance.
    pub fn allow(&self, key: &str) -> (bool, f64) {
        let now = Instant::now();
        let mut shard = self.shard(key).lock().unwrap_or_else(|poisoned| {
            // A panic while holding the lock cannot corrupt an Entry;
            // continue with the inner state.
            poisoned.into_inner()
        });
        let entry = shard.entry(key.to_string()).or_insert(Entry {
            tokens: self.burst,
            last_refill: now,
        });

        let elapsed = now.duration_since(entry.last_refill).as_secs_f64();
        entry.tokens = self.burst.min(entry.tokens + elapsed * self.rate_per_sec);
        entry.last_refill = now;

        if entry.tokens >= 1.0 {
            entry.tokens -= 1.0;
            let remaining = entry.tokens;
            drop(shard);
            self.allowed.fetch_add(1, Ordering::Relaxed);
            (true, remaining)
        } else {
            let remaining = entry.tokens;
            drop(shard);
            self.rejected.fetch_add(1, Ordering::Relaxed);
            (false, remaining)
        }
    }

    /// Configured steady-state rate.
    #[must_use]
    pub const fn rate_per_sec(&self) -> f64 {
        self.rate_per_sec
    }

    /// Configured burst capacity.
    #[must_use]
    pub const fn burst(&self) -> f64 {
        self.burst
    }

    /// Time until the next whole token refills, for `Retry-After`.
    #[must_use]
    pub fn retry_after(&self) -> Duration {
        if self.rate_per_sec <= 0.0 {
            return Duration::from_secs(1);
        }
        Duration::from_secs_f64((1.0 / self.rate_per_sec).max(0.001))
    }

    /// Current allowed/rejected counters.
    #[must_use]
    pub fn stats(&self) -> BucketStats {
        BucketStats {
            allowed: self.allowed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }

    /// Drop entries idle longer than `entry_ttl`. Returns evictions.
    pub fn evict_idle(&self, entry_ttl: Duration) -> usize {
        let now = Instant::now();
        let mut evicted = 0;
        for shard in &self.shards {
            let mut map = shard.lock().unwrap_or_else(|p| p.into_inner());
            let before = map.len();
            map.retain(|_, entry| now.duration_since(entry.last_refill) < entry_ttl);
            evicted += before - map.len();
        }
        evicted
    }

    /// Spawn the background sweeper; abort the handle on shutdown.
    #[must_use]
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        entry_ttl: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let bucket = self;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let evicted = bucket.evict_idle(entry_ttl);
                if evicted > 0 {
                    tracing::debug!(evicted, "evicted idle rate-limit entries");
                }
            }
        })
    }
}
