//! Cross-thread signalling primitives.
//!
//! [`UpdateSignal`] is the pending-update flag raised by client callbacks
//! and consumed by the pump. [`Latch`] is a one-way boolean used for stop
//! requests, the session-ending flag and the fatal-connection flag.
//!
//! Both pair a lock-protected (or atomic) predicate with a
//! [`tokio::sync::Notify`] that only serves to wake sleepers early.
//! Waiters always re-check the predicate after waking.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Notify;

/// Coalescing "something changed" flag.
///
/// Any number of [`UpdateSignal::raise`] calls before a consumer wakes
/// result in exactly one [`UpdateSignal::wait`] returning; the flag is
/// reset by the consumer that observed it.
#[derive(Debug, Default)]
pub struct UpdateSignal {
    pending: Mutex<bool>,
    wake: Notify,
    raised: AtomicU64,
}

impl UpdateSignal {
    /// Creates a lowered signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the flag and wakes the consumer. Safe from any thread.
    pub fn raise(&self) {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.raised.fetch_add(1, Ordering::Relaxed);
        self.wake.notify_one();
    }

    /// Returns and clears the flag.
    pub fn take(&self) -> bool {
        std::mem::take(&mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Returns the flag without clearing it.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Total number of [`UpdateSignal::raise`] calls.
    #[must_use]
    pub fn raised(&self) -> u64 {
        self.raised.load(Ordering::Relaxed)
    }

    /// Waits until the flag is set, then clears it.
    pub async fn wait(&self) {
        loop {
            if self.take() {
                return;
            }
            self.wake.notified().await;
        }
    }
}

#[derive(Debug, Default)]
struct LatchInner {
    set: AtomicBool,
    wake: Notify,
}

/// One-way boolean that can be polled or awaited. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct Latch {
    inner: Arc<LatchInner>,
}

impl Latch {
    /// Creates an unset latch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the latch and wakes every waiter.
    pub fn set(&self) {
        self.inner.set.store(true, Ordering::Release);
        self.inner.wake.notify_waiters();
    }

    /// Returns `true` once [`Latch::set`] has been called.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.inner.set.load(Ordering::Acquire)
    }

    /// Resolves once the latch is set.
    pub async fn wait(&self) {
        loop {
            let notified = self.inner.wake.notified();
            if self.is_set() {
                return;
            }
            notified.await;
        }
    }
}
