//! Queue release worker.
//!
//! On a fixed interval, enumerates active event queues, pops up to the
//! configured batch of users from each, issues a signed queue pass per
//! user and mirrors it into Redis with TTL equal to the pass lifetime.
//! A failure between popping and storing simply delays that user; the
//! user is not silently re-added and re-joins if impacted.

use chrono::{DateTime, Utc};
use rushgate_admission::QueuePassIssuer;
use rushgate_core::{EventId, UserId};
use rushgate_store::{QueuePassStore, VirtualQueue};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A user admitted out of the waiting room.
#[derive(Debug, Clone)]
pub struct ReleasedUser {
    /// Released user.
    pub user_id: UserId,
    /// Event the pass admits to.
    pub event_id: EventId,
    /// The signed pass.
    pub queue_pass: String,
    /// Pass expiry.
    pub expires_at: DateTime<Utc>,
}

/// Snapshot of the worker's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseMetrics {
    /// Users released since startup.
    pub total_released: u64,
    /// When the last batch released anyone.
    pub last_release_time: Option<DateTime<Utc>>,
    /// Size of the last release.
    pub last_release_count: usize,
}

struct MetricsState {
    total_released: u64,
    last_release_time: Option<DateTime<Utc>>,
    last_release_count: usize,
}

/// Runtime-adjustable batch size; non-positive updates are ignored and
/// construction clamps to at least one.
pub(crate) struct BatchSize(AtomicUsize);

impl BatchSize {
    fn new(size: usize) -> Self {
        Self(AtomicUsize::new(size.max(1)))
    }

    fn set(&self, size: usize) -> bool {
        if size > 0 {
            self.0.store(size, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    fn get(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }
}

/// Paces admission by releasing queue batches.
pub struct QueueReleaseWorker {
    queue: VirtualQueue,
    passes: QueuePassStore,
    issuer: Arc<QueuePassIssuer>,
    batch_size: BatchSize,
    sweep_idle_timeout: Duration,
    metrics: Mutex<MetricsState>,
}

impl QueueReleaseWorker {
    /// Wire the worker to its stores and pass issuer.
    #[must_use]
    pub fn new(
        queue: VirtualQueue,
        passes: QueuePassStore,
        issuer: Arc<QueuePassIssuer>,
        batch_size: usize,
        sweep_idle_timeout: Duration,
    ) -> Self {
        Self {
            queue,
            passes,
            issuer,
            batch_size: BatchSize::new(batch_size),
            sweep_idle_timeout,
            metrics: Mutex::new(MetricsState {
                total_released: 0,
                last_release_time: None,
                last_release_count: 0,
            }),
        }
    }

    /// Change the batch size at runtime; non-positive values are ignored.
    pub fn set_batch_size(&self, size: usize) {
        if self.batch_size.set(size) {
            tracing::info!(size, "queue release batch size updated");
        }
    }

    /// Current batch size.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size.get()
    }

    /// Current counters.
    #[must_use]
    pub fn metrics(&self) -> ReleaseMetrics {
        let state = self.metrics.lock().unwrap_or_else(|p| p.into_inner());
        ReleaseMetrics {
            total_released: state.total_released,
            last_release_time: state.last_release_time,
            last_release_count: state.last_release_count,
        }
    }

    /// Run until cancelled, releasing on every tick.
    pub async fn run(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        tracing::info!(
            batch_size = self.batch_size(),
            interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
            "queue release worker started"
        );
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::info!("queue release worker stopping");
                    return;
                }
                _ = ticker.tick() => self.process_all_queues().await,
            }
        }
    }

    /// One release pass over every active queue, including the idle-entry
    /// sweep.
    pub async fn process_all_queues(&self) {
        let events = match self.queue.active_events().await {
            Ok(events) => events,
            Err(error) => {
                tracing::error!(%error, "failed to enumerate active queues");
                return;
            }
        };
        for event_id in events {
            if let Err(error) = self
                .queue
                .sweep_idle(&event_id, 1_000, self.sweep_idle_timeout)
                .await
            {
                tracing::warn!(%error, event_id = %event_id, "queue sweep failed");
            }
            match self.release_once(&event_id).await {
                Ok(released) if !released.is_empty() => {
                    tracing::info!(
                        event_id = %event_id,
                        released = released.len(),
                        "released users from queue"
                    );
                }
                Ok(_) => {}
                Err(error) => {
                    tracing::error!(%error, event_id = %event_id, "queue release failed");
                }
            }
        }
    }

    /// Release a single batch from one queue. Also the test hook.
    ///
    /// # Errors
    ///
    /// Propagates the pop failure; per-user pass failures are logged and
    /// that user is skipped, not re-queued.
    pub async fn release_once(
        &self,
        event_id: &EventId,
    ) -> rushgate_core::Result<Vec<ReleasedUser>> {
        let batch = self.batch_size();
        let users = self.queue.pop_batch(event_id, batch).await?;
        if users.is_empty() {
            return Ok(Vec::new());
        }

        let mut released = Vec::with_capacity(users.len());
        for user_id in users {
            let (token, expires_at) = match self.issuer.issue(user_id, event_id) {
                Ok(pass) => pass,
                Err(error) => {
                    tracing::error!(%error, user_id = %user_id, "failed to sign queue pass");
                    continue;
                }
            };
            if let Err(error) = self
                .passes
                .store(event_id, user_id, &token, self.issuer.ttl())
                .await
            {
                tracing::error!(%error, user_id = %user_id, "failed to store queue pass");
                continue;
            }
            released.push(ReleasedUser {
                user_id,
                event_id: event_id.clone(),
                queue_pass: token,
                expires_at,
            });
        }

        let mut state = self.metrics.lock().unwrap_or_else(|p| p.into_inner());
        state.total_released += released.len() as u64;
        state.last_release_time = Some(Utc::now());
        state.last_release_count = released.len();
        drop(state);

        Ok(released)
    }
}
