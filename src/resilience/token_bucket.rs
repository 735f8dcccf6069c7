use super::permit::{PermitSource, Replenisher, validate_limits};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};

/// Bucket receiving `rate` tokens every window, holding at most
/// `bucket_capacity`. Allows bursts up to the capacity while capping the
/// sustained rate.
pub struct TokenBucketRateLimiter {
    label: String,
    rate: usize,
    bucket_capacity: usize,
    window: Duration,
    tokens: Arc<AtomicUsize>,
    _replenisher: Replenisher,
}

impl TokenBucketRateLimiter {
    pub fn new(
        label: impl Into<String>,
        rate: usize,
        bucket_capacity: usize,
        window: Duration,
    ) -> Result<Self> {
        let label = label.into();
        validate_limits(&label, rate, window)?;
        if bucket_capacity == 0 {
            return Err(PaymentError::InvalidConfig(format!(
                "permit source {label}: bucket capacity must be positive"
            )));
        }

        let tokens = Arc::new(AtomicUsize::new(rate.min(bucket_capacity)));
        let bucket = Arc::clone(&tokens);
        let task_label = label.clone();
        let replenisher = Replenisher::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + window, window);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let before = bucket
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                        Some(current.saturating_add(rate).min(bucket_capacity))
                    })
                    .unwrap_or(bucket_capacity);
                tracing::trace!(permit_source = %task_label, before, "refilled token bucket");
            }
        });

        Ok(Self {
            label,
            rate,
            bucket_capacity,
            window,
            tokens,
            _replenisher: replenisher,
        })
    }

    pub fn tokens(&self) -> usize {
        self.tokens.load(Ordering::Acquire)
    }

    pub fn bucket_capacity(&self) -> usize {
        self.bucket_capacity
    }
}

#[async_trait]
impl PermitSource for TokenBucketRateLimiter {
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
        self.tokens() > 0
    }

    fn try_acquire(&self) -> bool {
        self.tokens
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |tokens| {
                tokens.checked_sub(1)
            })
            .is_ok()
    }
}

impl fmt::Debug for TokenBucketRateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenBucketRateLimiter")
            .field("label", &self.label)
            .field("rate", &self.rate)
            .field("bucket_capacity", &self.bucket_capacity)
            .field("tokens", &self.tokens())
            .finish()
    }
}
