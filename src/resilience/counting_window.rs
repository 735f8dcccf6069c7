use super::permit::{PermitSource, validate_limits};
use crate::error::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
struct CountingState {
    window_start: Instant,
    remaining: usize,
}

/// Window start and remaining count behind one lock, reset lazily on access.
#[derive(Debug)]
pub struct CountingWindowRateLimiter {
    label: String,
    rate: usize,
    window: Duration,
    state: Mutex<CountingState>,
}

impl CountingWindowRateLimiter {
    pub fn new(label: impl Into<String>, rate: usize, window: Duration) -> Result<Self> {
        let label = label.into();
        validate_limits(&label, rate, window)?;
        Ok(Self {
            label,
            rate,
            window,
            state: Mutex::new(CountingState {
                window_start: Instant::now(),
                remaining: rate,
            }),
        })
    }
}

#[async_trait]
impl PermitSource for CountingWindowRateLimiter {
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
        let state = self.state.lock();
        state.window_start.elapsed() >= self.window || state.remaining > 0
    }

    fn try_acquire(&self) -> bool {
        let now = Instant::now();
        let mut state = self.state.lock();
        if now.duration_since(state.window_start) >= self.window {
            state.window_start = now;
            state.remaining = self.rate - 1;
            return true;
        }
        if state.remaining > 0 {
            state.remaining -= 1;
            true
        } else {
            false
        }
    }
}
