use super::permit::{PermitSource, Replenisher, validate_limits};
use crate::error::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

struct Grants {
    window: Duration,
    granted_at: Mutex<VecDeque<Instant>>,
    first_grant: Notify,
}

impl Grants {
    /// Drops grants older than the window, returns how many remain.
    fn expire(&self, now: Instant) -> usize {
        let mut granted_at = self.granted_at.lock();
        while let Some(oldest) = granted_at.front() {
            if now.duration_since(*oldest) < self.window {
                break;
            }
            granted_at.pop_front();
        }
        granted_at.len()
    }

    fn next_expiry(&self) -> Option<Instant> {
        self.granted_at
            .lock()
            .front()
            .map(|oldest| *oldest + self.window)
    }
}

/// Ordered queue of grant timestamps; a permit is granted while fewer than
/// `rate` grants are younger than the window.
///
/// A background task expires grants as they leave the window. Grants are
/// also expired on access, so admission never depends on that task being
/// scheduled on time.
pub struct SlidingWindowRateLimiter {
    label: String,
    rate: usize,
    grants: Arc<Grants>,
    _replenisher: Replenisher,
}

impl SlidingWindowRateLimiter {
    pub fn new(label: impl Into<String>, rate: usize, window: Duration) -> Result<Self> {
        let label = label.into();
        validate_limits(&label, rate, window)?;

        let grants = Arc::new(Grants {
            window,
            granted_at: Mutex::new(VecDeque::with_capacity(rate)),
            first_grant: Notify::new(),
        });
        let replenisher = Replenisher::spawn(expire_loop(label.clone(), Arc::clone(&grants)));

        Ok(Self {
            label,
            rate,
            grants,
            _replenisher: replenisher,
        })
    }

    /// Number of grants currently inside the window.
    pub fn granted_in_window(&self) -> usize {
        self.grants.expire(Instant::now())
    }
}

async fn expire_loop(label: String, grants: Arc<Grants>) {
    loop {
        match grants.next_expiry() {
            Some(expiry) => tokio::time::sleep_until(expiry).await,
            None => grants.first_grant.notified().await,
        }
        let remaining = grants.expire(Instant::now());
        tracing::trace!(permit_source = %label, remaining, "expired sliding window grants");
    }
}

#[async_trait]
impl PermitSource for SlidingWindowRateLimiter {
    fn label(&self) -> &str {
        &self.label
    }

    fn rate(&self) -> usize {
        self.rate
    }

    fn window(&self) -> Duration {
        self.grants.window
    }

    fn has_permit(&self) -> bool {
        self.grants.expire(Instant::now()) < self.rate
    }

    fn try_acquire(&self) -> bool {
        let now = Instant::now();
        self.grants.expire(now);
        let mut granted_at = self.grants.granted_at.lock();
        if granted_at.len() >= self.rate {
            return false;
        }
        granted_at.push_back(now);
        if granted_at.len() == 1 {
            // notify_one stores a permit, so a loop not yet waiting still wakes.
            self.grants.first_grant.notify_one();
        }
        true
    }
}

impl fmt::Debug for SlidingWindowRateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlidingWindowRateLimiter")
            .field("label", &self.label)
            .field("rate", &self.rate)
            .field("window", &self.grants.window)
            .field("granted", &self.grants.granted_at.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_grants_leave_the_window() {
        let window = Duration::from_millis(100);
        let limiter = SlidingWindowRateLimiter::new("sliding", 3, window).unwrap();

        assert!(limiter.try_acquire());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(limiter.granted_in_window(), 2);
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_task_expires_grants() {
        let window = Duration::from_millis(100);
        let limiter = SlidingWindowRateLimiter::new("sliding", 2, window).unwrap();
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());

        tokio::time::sleep(window * 2).await;
        let queued = limiter.grants.granted_at.lock().len();
        assert_eq!(queued, 0);
    }
}
