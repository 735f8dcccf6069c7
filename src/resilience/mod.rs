//! Admission, timing and retry primitives guarding calls to an external
//! payment provider.

pub mod concurrency;
pub mod counting_window;
pub mod fixed_window;
pub mod latency;
pub mod limiter;
pub mod permit;
pub mod retry;
pub mod sliding_log;
pub mod sliding_window;
pub mod slow_start;
pub mod token_bucket;

pub use concurrency::{ConcurrencySlot, ConcurrencyWindow, WindowResponse};
pub use counting_window::CountingWindowRateLimiter;
pub use fixed_window::FixedWindowRateLimiter;
pub use latency::{LatencyGuard, LatencyTracker};
pub use limiter::{Lease, RateAndConcurrencyLimiter};
pub use permit::{PermitSource, RateLimitStrategy};
pub use retry::{Retry, RetryOutcome, Retryer};
pub use sliding_log::SlidingLogRateLimiter;
pub use sliding_window::SlidingWindowRateLimiter;
pub use slow_start::SlowStartRateLimiter;
pub use token_bucket::TokenBucketRateLimiter;
