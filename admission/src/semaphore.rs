//! Non-blocking global concurrency cap.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Counting semaphore over in-flight requests. `try_acquire` never
/// blocks; saturation is reported to the caller, which sheds the request.
#[derive(Clone)]
pub struct ConcurrencyLimiter {
    inner: Arc<Inner>,
}

struct Inner {
    count: AtomicUsize,
    cap: usize,
}

/// RAII permit; dropping it releases the slot.
pub struct ConcurrencyPermit {
    inner: Arc<Inner>,
}

impl ConcurrencyLimiter {
    /// Cap concurrent requests at `cap`.
    #[must_use]
    pub fn new(cap: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                count: AtomicUsize::new(0),
                cap,
            }),
        }
    }

    /// Try to take a slot; `None` when saturated.
    #[must_use]
    pub fn try_acquire(&self) -> Option<ConcurrencyPermit> {
        let mut current = self.inner.count.load(Ordering::Relaxed);
        loop {
            if current >= self.inner.cap {
                return None;
            }
            match self.inner.count.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    return Some(ConcurrencyPermit {
                        inner: Arc::clone(&self.inner),
                    })
                }
                Err(observed) => current = observed,
            }
        }
    }

    /// Requests currently holding a slot.
    #[must_use]
    pub fn current(&self) -> usize {
        self.inner.count.load(Ordering::Relaxed)
    }
}

impl Drop for ConcurrencyPermit {
    fn drop(&mut self) {
        self.inner.count.fetch_sub(1, Ordering::AcqRel);
    }
}
