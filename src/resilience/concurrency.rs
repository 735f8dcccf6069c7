use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;

/// Outcome of a non-blocking attempt to enter the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowResponse {
    /// A slot was taken; `current_size` includes it.
    Accepted { current_size: usize },
    /// The window was full at `current_size`.
    Rejected { current_size: usize },
}

impl WindowResponse {
    pub fn is_accepted(&self) -> bool {
        matches!(self, WindowResponse::Accepted { .. })
    }
}

/// Bounded counter of in-flight calls.
///
/// `0 <= in_flight <= max_concurrency` holds at all times. Slots are handed
/// out as [`ConcurrencySlot`] guards which release on drop, so every exit
/// path of the guarded call gives its slot back exactly once.
pub struct ConcurrencyWindow {
    max_concurrency: usize,
    in_flight: AtomicUsize,
    released: Notify,
}

impl ConcurrencyWindow {
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency,
            in_flight: AtomicUsize::new(0),
            released: Notify::new(),
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn has_capacity(&self) -> bool {
        self.in_flight() < self.max_concurrency
    }

    /// Compare-and-swap entry that fails fast instead of waiting.
    ///
    /// An accepted response must be paired with exactly one
    /// [`release`](Self::release); prefer [`try_enter`](Self::try_enter).
    pub fn try_acquire(&self) -> WindowResponse {
        let mut current = self.in_flight.load(Ordering::Acquire);
        loop {
            if current >= self.max_concurrency {
                return WindowResponse::Rejected {
                    current_size: current,
                };
            }
            match self.in_flight.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return WindowResponse::Accepted {
                        current_size: current + 1,
                    };
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Takes a slot if one is free.
    pub fn try_enter(&self) -> Option<ConcurrencySlot<'_>> {
        if self.try_acquire().is_accepted() {
            Some(ConcurrencySlot { window: self })
        } else {
            None
        }
    }

    /// Waits until a slot is free and takes it.
    pub async fn acquire(&self) -> ConcurrencySlot<'_> {
        loop {
            let released = self.released.notified();
            tokio::pin!(released);
            // Register before checking so a release in between is not missed.
            released.as_mut().enable();
            if let Some(slot) = self.try_enter() {
                return slot;
            }
            released.await;
        }
    }

    /// Gives back a slot taken by an accepted [`try_acquire`](Self::try_acquire).
    pub fn release(&self) {
        let previous = self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        match previous {
            Ok(_) => self.released.notify_one(),
            Err(_) => tracing::error!("concurrency window released more often than acquired"),
        }
    }
}

impl fmt::Debug for ConcurrencyWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrencyWindow")
            .field("max_concurrency", &self.max_concurrency)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

/// A held slot of a [`ConcurrencyWindow`], released on drop.
#[must_use = "the slot is released as soon as it is dropped"]
#[derive(Debug)]
pub struct ConcurrencySlot<'a> {
    window: &'a ConcurrencyWindow,
}

impl Drop for ConcurrencySlot<'_> {
    fn drop(&mut self) {
        self.window.release();
    }
}
