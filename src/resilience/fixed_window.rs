use super::permit::{PermitSource, Replenisher, validate_limits};
use crate::error::Result;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{Instant, MissedTickBehavior};

/// Pool of `rate` permits refilled to the cap at the start of every window.
///
/// Simple and cheap, but a caller may observe up to `2 × rate` grants across
/// a window boundary.
pub struct FixedWindowRateLimiter {
    label: String,
    rate: usize,
    window: Duration,
    permits: Arc<Semaphore>,
    _replenisher: Replenisher,
}

impl FixedWindowRateLimiter {
    pub fn new(label: impl Into<String>, rate: usize, window: Duration) -> Result<Self> {
        let label = label.into();
        validate_limits(&label, rate, window)?;

        let permits = Arc::new(Semaphore::new(rate));
        let replenisher = Replenisher::spawn(refill_every_window(
            label.clone(),
            Arc::clone(&permits),
            window,
            move || rate,
        ));

        Ok(Self {
            label,
            rate,
            window,
            permits,
            _replenisher: replenisher,
        })
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}

/// Tops `permits` up to `cap()` once per window.
///
/// Only this loop adds permits, so availability never exceeds the cap even
/// when callers race the refill.
pub(crate) async fn refill_every_window<F>(
    label: String,
    permits: Arc<Semaphore>,
    window: Duration,
    mut cap: F,
) where
    F: FnMut() -> usize + Send,
{
    let mut interval = tokio::time::interval_at(Instant::now() + window, window);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        let cap = cap();
        let missing = cap.saturating_sub(permits.available_permits());
        permits.add_permits(missing);
        tracing::trace!(permit_source = %label, released = missing, cap, "replenished permits");
    }
}

#[async_trait]
impl PermitSource for FixedWindowRateLimiter {
    fn label(&self) -> &str {
        &self.label
    }

    fn rate(&self) -> usize {
        self.rate
    }

    fn window(&self) -> Duration {
        self.window
    }

    fn has_permit(&self) -> bool {
        self.permits.available_permits() > 0
    }

    fn try_acquire(&self) -> bool {
        match self.permits.try_acquire() {
            Ok(permit) => {
                permit.forget();
                true
            }
            Err(_) => false,
        }
    }

    async fn acquire(&self) {
        if let Ok(permit) = self.permits.acquire().await {
            permit.forget();
        }
    }
}

impl fmt::Debug for FixedWindowRateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixedWindowRateLimiter")
            .field("label", &self.label)
            .field("rate", &self.rate)
            .field("window", &self.window)
            .field("available", &self.permits.available_permits())
            .finish()
    }
}
