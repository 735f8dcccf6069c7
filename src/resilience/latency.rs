use parking_lot::RwLock;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_MIN_SAMPLES: usize = 10;
pub const DEFAULT_CAPACITY: usize = 100;

/// Rolling window of the last `capacity` call durations.
///
/// Percentiles are computed on a sorted copy taken under the read lock, so a
/// query never holds the lock while sorting.
#[derive(Debug)]
pub struct LatencyTracker {
    min_samples: usize,
    capacity: usize,
    samples: RwLock<VecDeque<Duration>>,
}

impl Default for LatencyTracker {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_SAMPLES, DEFAULT_CAPACITY)
    }
}

impl LatencyTracker {
    /// `capacity` is raised to at least `min_samples` and to at least one.
    pub fn new(min_samples: usize, capacity: usize) -> Self {
        let capacity = capacity.max(min_samples).max(1);
        Self {
            min_samples,
            capacity,
            samples: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.read().is_empty()
    }

    /// Adds a sample, evicting the oldest once the buffer is full.
    pub fn record(&self, duration: Duration) {
        let mut samples = self.samples.write();
        if samples.len() == self.capacity {
            samples.pop_front();
        }
        samples.push_back(duration);
    }

    /// Starts timing a call; the elapsed time is recorded when the guard drops.
    pub fn start(&self) -> LatencyGuard<'_> {
        LatencyGuard {
            tracker: self,
            started_at: Instant::now(),
        }
    }

    pub fn snapshot(&self) -> Vec<Duration> {
        self.samples.read().iter().copied().collect()
    }

    /// Nearest-rank percentile in milliseconds, or `default` while fewer than
    /// `min_samples` durations have been recorded.
    pub fn percentile_or(&self, percentile: f64, default: f64) -> f64 {
        let mut sorted = self.snapshot();
        if sorted.is_empty() || sorted.len() < self.min_samples {
            return default;
        }
        sorted.sort_unstable();

        let n = sorted.len();
        let rank = (percentile.clamp(0.0, 100.0) / 100.0 * n as f64).ceil() as usize;
        let index = rank.saturating_sub(1).min(n - 1);
        sorted[index].as_secs_f64() * 1000.0
    }
}

/// Records the time since [`LatencyTracker::start`] when dropped.
#[must_use = "the duration is recorded when the guard is dropped"]
#[derive(Debug)]
pub struct LatencyGuard<'a> {
    tracker: &'a LatencyTracker,
    started_at: Instant,
}

impl LatencyGuard<'_> {
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

impl Drop for LatencyGuard<'_> {
    fn drop(&mut self) {
        self.tracker.record(self.started_at.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn millis(ms: u64) -> Duration {
        Duration::from_millis(ms)
    }

    #[test]
    fn test_median_uses_nearest_rank() {
        let tracker = LatencyTracker::default();
        for ms in (10..=1000).step_by(10) {
            tracker.record(millis(ms));
        }

        assert_eq!(tracker.percentile_or(50.0, -1.0), 500.0);
        assert_eq!(tracker.percentile_or(80.0, -1.0), 800.0);
        assert_eq!(tracker.percentile_or(100.0, -1.0), 1000.0);
        assert_eq!(tracker.percentile_or(0.0, -1.0), 10.0);
    }

    #[test]
    fn test_default_below_min_samples() {
        let tracker = LatencyTracker::new(10, 100);
        assert_eq!(tracker.percentile_or(80.0, 123.0), 123.0);

        for _ in 0..9 {
            tracker.record(millis(5));
        }
        assert_eq!(tracker.percentile_or(80.0, 123.0), 123.0);

        tracker.record(millis(5));
        assert_eq!(tracker.percentile_or(80.0, 123.0), 5.0);
    }

    #[test]
    fn test_oldest_sample_evicted_at_capacity() {
        let tracker = LatencyTracker::new(1, 3);
        for ms in [100, 1, 2, 3] {
            tracker.record(millis(ms));
        }

        assert_eq!(tracker.len(), 3);
        assert_eq!(tracker.snapshot(), vec![millis(1), millis(2), millis(3)]);
        assert_eq!(tracker.percentile_or(100.0, 0.0), 3.0);
    }

    #[test]
    fn test_order_of_insertion_does_not_matter() {
        let tracker = LatencyTracker::new(1, 10);
        for ms in [40, 10, 30, 20] {
            tracker.record(millis(ms));
        }
        assert_eq!(tracker.percentile_or(50.0, 0.0), 20.0);
        // The live buffer keeps insertion order.
        assert_eq!(tracker.snapshot()[0], millis(40));
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_records_on_drop() {
        let tracker = LatencyTracker::new(1, 10);
        {
            let _guard = tracker.start();
            tokio::time::sleep(millis(250)).await;
        }
        assert_eq!(tracker.snapshot(), vec![millis(250)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_records_when_call_is_cancelled() {
        let tracker = LatencyTracker::new(1, 10);
        let timed_call = async {
            let _guard = tracker.start();
            tokio::time::sleep(millis(1000)).await;
        };

        let result = tokio::time::timeout(millis(100), timed_call).await;
        assert!(result.is_err());
        assert_eq!(tracker.snapshot(), vec![millis(100)]);
    }
}
