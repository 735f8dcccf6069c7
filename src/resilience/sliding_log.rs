use super::permit::{PermitSource, validate_limits};
use crate::error::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
struct GrantLog {
    slots: Vec<Option<Instant>>,
    head: usize,
}

impl GrantLog {
    /// The slot at `head` holds the oldest of the last `rate` grants.
    fn oldest_expired(&self, now: Instant, window: Duration) -> bool {
        match self.slots[self.head] {
            None => true,
            Some(granted_at) => now.duration_since(granted_at) >= window,
        }
    }
}

/// Ring buffer of the last `rate` grant timestamps.
///
/// A permit is granted only when the oldest of those grants has left the
/// window, which bounds every sliding window of length `window` without a
/// background task.
#[derive(Debug)]
pub struct SlidingLogRateLimiter {
    label: String,
    rate: usize,
    window: Duration,
    log: RwLock<GrantLog>,
}

impl SlidingLogRateLimiter {
    pub fn new(label: impl Into<String>, rate: usize, window: Duration) -> Result<Self> {
        let label = label.into();
        validate_limits(&label, rate, window)?;
        Ok(Self {
            label,
            rate,
            window,
            log: RwLock::new(GrantLog {
                slots: vec![None; rate],
                head: 0,
            }),
        })
    }
}

#[async_trait]
impl PermitSource for SlidingLogRateLimiter {
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
        self.log.read().oldest_expired(Instant::now(), self.window)
    }

    fn try_acquire(&self) -> bool {
        let now = Instant::now();
        let mut log = self.log.write();
        if !log.oldest_expired(now, self.window) {
            return false;
        }
        let head = log.head;
        log.slots[head] = Some(now);
        log.head = (head + 1) % self.rate;
        true
    }
}
