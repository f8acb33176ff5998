//! Process-wide queue-mode switch.
//!
//! When enabled, mutating requests under the protected prefixes require a
//! valid queue pass; the operations API flips the flag at runtime. The
//! flag is read once per request.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Owner of the queue-mode flag and the protected-path policy.
#[derive(Clone)]
pub struct QueueModeController {
    enabled: Arc<AtomicBool>,
    protected_prefixes: Arc<Vec<String>>,
}

impl QueueModeController {
    /// Start with queue mode off, protecting `prefixes`.
    #[must_use]
    pub fn new(prefixes: Vec<String>) -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(false)),
            protected_prefixes: Arc::new(prefixes),
        }
    }

    /// Default protection: the booking write surface.
    #[must_use]
    pub fn booking_defaults() -> Self {
        Self::new(vec!["/api/v1/bookings".to_string()])
    }

    /// Whether queue mode is currently active.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Flip queue mode.
    pub fn set_enabled(&self, enabled: bool) {
        let was = self.enabled.swap(enabled, Ordering::Relaxed);
        if was != enabled {
            tracing::info!(enabled, "queue mode toggled");
        }
    }

    /// Whether `(method, path)` is gated while queue mode is on. Only
    /// POST/PUT under the protected prefixes are gated.
    #[must_use]
    pub fn is_protected(&self, method: &str, path: &str) -> bool {
        if !method.eq_ignore_ascii_case("POST") && !method.eq_ignore_ascii_case("PUT") {
            return false;
        }
        self.protected_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }
}
