use super::concurrency::{ConcurrencySlot, ConcurrencyWindow};
use super::permit::{PermitSource, poll_interval};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio::time::error::Elapsed;

/// Admission gate combining a rate permit source with a concurrency window.
///
/// A caller is admitted once it holds both a rate permit and a concurrency
/// slot. The rate permit is claimed first and is not refunded if the slot is
/// then lost to another caller: the provider's rate budget is never
/// exceeded, at the cost of an occasional wasted permit under contention.
pub struct RateAndConcurrencyLimiter {
    permits: Arc<dyn PermitSource>,
    window: ConcurrencyWindow,
    poll_interval: Duration,
}

/// Admission held by one call. Dropping it frees the concurrency slot.
#[must_use = "the lease is released as soon as it is dropped"]
#[derive(Debug)]
pub struct Lease<'a> {
    _slot: ConcurrencySlot<'a>,
}

impl RateAndConcurrencyLimiter {
    pub fn new(permits: Arc<dyn PermitSource>, concurrency_limit: usize) -> Self {
        let poll_interval = poll_interval(permits.window(), concurrency_limit);
        Self {
            permits,
            window: ConcurrencyWindow::new(concurrency_limit),
            poll_interval,
        }
    }

    pub fn permits(&self) -> &dyn PermitSource {
        self.permits.as_ref()
    }

    pub fn concurrency(&self) -> &ConcurrencyWindow {
        &self.window
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Waits until both a rate permit and a concurrency slot are available,
    /// then claims them.
    pub async fn lease(&self) -> Lease<'_> {
        loop {
            while !(self.permits.has_permit() && self.window.has_capacity()) {
                tokio::time::sleep(self.poll_interval).await;
            }
            if !self.permits.try_acquire() {
                continue;
            }
            match self.window.try_enter() {
                Some(slot) => return Lease { _slot: slot },
                None => tracing::trace!(
                    permit_source = self.permits.label(),
                    "rate permit consumed but concurrency slot was taken"
                ),
            }
        }
    }

    /// Runs `work` under a lease, releasing it however `work` ends.
    pub async fn execute<F, T>(&self, work: F) -> T
    where
        F: Future<Output = T>,
    {
        let _lease = self.lease().await;
        work.await
    }

    /// Like [`execute`](Self::execute), but gives up at `deadline`.
    ///
    /// Waiting for admission and the work itself are both abandoned when the
    /// deadline passes; the lease, if taken, is still released.
    pub async fn execute_until<F, T>(&self, deadline: Instant, work: F) -> Result<T, Elapsed>
    where
        F: Future<Output = T>,
    {
        tokio::time::timeout_at(deadline, self.execute(work)).await
    }
}

impl fmt::Debug for RateAndConcurrencyLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateAndConcurrencyLimiter")
            .field("permits", &self.permits)
            .field("window", &self.window)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}
