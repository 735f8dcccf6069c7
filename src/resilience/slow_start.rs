use super::fixed_window::refill_every_window;
use super::permit::{PermitSource, Replenisher, validate_limits};
use crate::error::Result;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Fixed window whose rate starts at 1 and doubles every window until it
/// reaches the target, so a cold or just-recovered account is not flooded.
pub struct SlowStartRateLimiter {
    label: String,
    target_rate: usize,
    window: Duration,
    current_rate: Arc<AtomicUsize>,
    permits: Arc<Semaphore>,
    _replenisher: Replenisher,
}

impl SlowStartRateLimiter {
    pub fn new(label: impl Into<String>, target_rate: usize, window: Duration) -> Result<Self> {
        let label = label.into();
        validate_limits(&label, target_rate, window)?;

        let current_rate = Arc::new(AtomicUsize::new(1));
        let permits = Arc::new(Semaphore::new(1));
        let ramp = Arc::clone(&current_rate);
        let replenisher = Replenisher::spawn(refill_every_window(
            label.clone(),
            Arc::clone(&permits),
            window,
            move || {
                let previous = ramp
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |rate| {
                        Some(rate.saturating_mul(2).min(target_rate))
                    })
                    .unwrap_or(target_rate);
                previous.saturating_mul(2).min(target_rate)
            },
        ));

        Ok(Self {
            label,
            target_rate,
            window,
            current_rate,
            permits,
            _replenisher: replenisher,
        })
    }

    /// Rate in effect for the current window.
    pub fn current_rate(&self) -> usize {
        self.current_rate.load(Ordering::Acquire)
    }
}

#[async_trait]
impl PermitSource for SlowStartRateLimiter {
    fn label(&self) -> &str {
        &self.label
    }

    fn rate(&self) -> usize {
        self.target_rate
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

impl fmt::Debug for SlowStartRateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlowStartRateLimiter")
            .field("label", &self.label)
            .field("target_rate", &self.target_rate)
            .field("current_rate", &self.current_rate())
            .field("window", &self.window)
            .finish()
    }
}
