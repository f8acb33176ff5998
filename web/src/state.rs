//! Shared application state.

use crate::fingerprint::Fingerprinter;
use rushgate_admission::{
    ConcurrencyLimiter, EndpointLimiters, PolicyTable, QueueModeController, QueuePassIssuer,
    QueuePassValidator, SharedLimiter,
};
use rushgate_core::config::AdmissionConfig;
use rushgate_core::providers::{BookingStore, ReservationEngine};
use rushgate_store::{IdempotencyStore, QueuePassStore, VirtualQueue};
use std::sync::Arc;

/// Everything the handlers and middleware need, cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Atomic seat-hold engine (trait object; Redis in production).
    pub engine: Arc<dyn ReservationEngine>,
    /// Authoritative booking store (trait object; Postgres in production).
    pub bookings: Arc<dyn BookingStore>,
    /// Virtual waiting room.
    pub queue: VirtualQueue,
    /// Issued-pass mirror entries.
    pub passes: QueuePassStore,
    /// Idempotency records.
    pub idempotency: IdempotencyStore,
    /// Per-endpoint local rate limiting.
    pub limiters: Arc<EndpointLimiters>,
    /// Cross-replica rate limiting; `None` for single-replica deployments.
    pub shared_limiter: Option<Arc<SharedLimiter>>,
    /// Global in-flight request cap.
    pub concurrency: ConcurrencyLimiter,
    /// Queue-mode flag and protected-path policy.
    pub queue_mode: QueueModeController,
    /// Signs passes for the admin release endpoint.
    pub pass_issuer: Arc<QueuePassIssuer>,
    /// Verifies presented passes.
    pub pass_validator: Arc<QueuePassValidator>,
    /// Request fingerprinting for the idempotency layer.
    pub fingerprint: Arc<Fingerprinter>,
    /// Path patterns exempt from idempotency protection.
    pub idempotency_skip: Arc<Vec<String>>,
    /// Admission tunables (body cap, store cross-check flag, queue idle
    /// timeout).
    pub admission: Arc<AdmissionConfig>,
}

impl AppState {
    /// Wire up state from collaborators and configuration.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        engine: Arc<dyn ReservationEngine>,
        bookings: Arc<dyn BookingStore>,
        queue: VirtualQueue,
        passes: QueuePassStore,
        idempotency: IdempotencyStore,
        shared_limiter: Option<SharedLimiter>,
        admission: AdmissionConfig,
        max_in_flight: usize,
    ) -> Self {
        let table = PolicyTable::booking_defaults(
            admission.default_rate_per_sec,
            admission.default_burst,
        );
        Self {
            engine,
            bookings,
            queue,
            passes,
            idempotency,
            limiters: Arc::new(EndpointLimiters::new(table)),
            shared_limiter: shared_limiter.map(Arc::new),
            concurrency: ConcurrencyLimiter::new(max_in_flight),
            queue_mode: QueueModeController::booking_defaults(),
            pass_issuer: Arc::new(QueuePassIssuer::new(
                &admission.queue_pass_secret,
                admission.queue_pass_ttl_secs,
            )),
            pass_validator: Arc::new(QueuePassValidator::new(&admission.queue_pass_secret)),
            fingerprint: Arc::new(Fingerprinter::new(&admission.fingerprint_key)),
            idempotency_skip: Arc::new(vec![
                "/health".to_string(),
                "/ready".to_string(),
                "/api/v1/queue/**".to_string(),
                "/api/v1/queue-mode".to_string(),
                "/api/v1/admin/**".to_string(),
            ]),
            admission: Arc::new(admission),
        }
    }
}
