use super::{
    CountingWindowRateLimiter, FixedWindowRateLimiter, SlidingLogRateLimiter,
    SlidingWindowRateLimiter, SlowStartRateLimiter, TokenBucketRateLimiter,
};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Shortest pause between two admission checks of a blocked caller.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(2);
/// Longest pause between two admission checks of a blocked caller.
pub const MAX_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A source of rate permits.
///
/// Permits are consumed, never returned: a call that fails after acquiring a
/// permit still used up its share of the rate budget. Over any window the
/// strategy guarantees, the number of granted permits never exceeds
/// [`rate`](PermitSource::rate).
#[async_trait]
pub trait PermitSource: Send + Sync + fmt::Debug {
    /// Identifier given at construction, used in logs.
    fn label(&self) -> &str;

    /// Configured number of permits per window.
    fn rate(&self) -> usize;

    fn window(&self) -> Duration;

    /// Whether a permit could be granted right now, without consuming it.
    fn has_permit(&self) -> bool;

    /// Consumes a permit if one is available.
    fn try_acquire(&self) -> bool;

    fn poll_interval(&self) -> Duration {
        poll_interval(self.window(), self.rate())
    }

    /// Waits until a permit is granted.
    async fn acquire(&self) {
        while !self.try_acquire() {
            tokio::time::sleep(self.poll_interval()).await;
        }
    }
}

pub(crate) fn poll_interval(window: Duration, divisor: usize) -> Duration {
    let divisor = u32::try_from(divisor.max(1)).unwrap_or(u32::MAX);
    (window / divisor / 2).clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL)
}

pub(crate) fn validate_limits(label: &str, rate: usize, window: Duration) -> Result<()> {
    if rate == 0 {
        return Err(PaymentError::InvalidConfig(format!(
            "permit source {label}: rate must be positive"
        )));
    }
    if window.is_zero() {
        return Err(PaymentError::InvalidConfig(format!(
            "permit source {label}: window must be positive"
        )));
    }
    Ok(())
}

/// Background task that lives as long as its owner and is aborted on drop.
#[derive(Debug)]
pub(crate) struct Replenisher(JoinHandle<()>);

impl Replenisher {
    pub(crate) fn spawn<F>(task: F) -> Self
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        Self(tokio::spawn(task))
    }
}

impl Drop for Replenisher {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Selects the permit source algorithm of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RateLimitStrategy {
    /// `rate` permits, fully replenished every window.
    FixedWindow,
    /// Grant timestamps expired by a background task.
    SlidingWindow,
    /// `rate` tokens added every window, capped at the bucket capacity.
    TokenBucket {
        #[serde(default)]
        bucket_capacity: Option<usize>,
    },
    /// Fixed window whose rate starts at 1 and doubles every window.
    SlowStart,
    /// Lock-protected window start and remaining count, no background task.
    CountingWindow,
    /// Ring buffer of the last `rate` grant timestamps.
    #[default]
    SlidingLog,
}

impl RateLimitStrategy {
    /// Builds the permit source. Must be called from within a tokio runtime.
    pub fn build(
        &self,
        label: impl Into<String>,
        rate: usize,
        window: Duration,
    ) -> Result<Arc<dyn PermitSource>> {
        let label = label.into();
        let source: Arc<dyn PermitSource> = match *self {
            RateLimitStrategy::FixedWindow => {
                Arc::new(FixedWindowRateLimiter::new(label, rate, window)?)
            }
            RateLimitStrategy::SlidingWindow => {
                Arc::new(SlidingWindowRateLimiter::new(label, rate, window)?)
            }
            RateLimitStrategy::TokenBucket { bucket_capacity } => Arc::new(
                TokenBucketRateLimiter::new(label, rate, bucket_capacity.unwrap_or(rate), window)?,
            ),
            RateLimitStrategy::SlowStart => {
                Arc::new(SlowStartRateLimiter::new(label, rate, window)?)
            }
            RateLimitStrategy::CountingWindow => {
                Arc::new(CountingWindowRateLimiter::new(label, rate, window)?)
            }
            RateLimitStrategy::SlidingLog => {
                Arc::new(SlidingLogRateLimiter::new(label, rate, window)?)
            }
        };
        Ok(source)
    }
}

impl FromStr for RateLimitStrategy {
    type Err = PaymentError;

    fn from_str(value: &str) -> Result<Self> {
        let (name, argument) = match value.split_once(':') {
            Some((name, argument)) => (name, Some(argument)),
            None => (value, None),
        };
        let strategy = match (name.trim(), argument) {
            ("fixed-window", None) => RateLimitStrategy::FixedWindow,
            ("sliding-window", None) => RateLimitStrategy::SlidingWindow,
            ("token-bucket", capacity) => RateLimitStrategy::TokenBucket {
                bucket_capacity: capacity
                    .map(|c| {
                        c.trim().parse::<usize>().map_err(|e| {
                            PaymentError::InvalidConfig(format!("bucket capacity {c:?}: {e}"))
                        })
                    })
                    .transpose()?,
            },
            ("slow-start", None) => RateLimitStrategy::SlowStart,
            ("counting-window", None) => RateLimitStrategy::CountingWindow,
            ("sliding-log", None) => RateLimitStrategy::SlidingLog,
            _ => {
                return Err(PaymentError::InvalidConfig(format!(
                    "unknown rate limit strategy {value:?}"
                )));
            }
        };
        Ok(strategy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_interval_is_bounded() {
        assert_eq!(
            poll_interval(Duration::from_secs(1), 10),
            Duration::from_millis(50)
        );
        assert_eq!(
            poll_interval(Duration::from_secs(1), 100),
            Duration::from_millis(5)
        );
        assert_eq!(
            poll_interval(Duration::from_secs(1), 10_000),
            MIN_POLL_INTERVAL
        );
        assert_eq!(poll_interval(Duration::from_secs(60), 0), MAX_POLL_INTERVAL);
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!(
            "fixed-window".parse::<RateLimitStrategy>().unwrap(),
            RateLimitStrategy::FixedWindow
        );
        assert_eq!(
            "token-bucket:20".parse::<RateLimitStrategy>().unwrap(),
            RateLimitStrategy::TokenBucket {
                bucket_capacity: Some(20)
            }
        );
        assert_eq!(
            "token-bucket".parse::<RateLimitStrategy>().unwrap(),
            RateLimitStrategy::TokenBucket {
                bucket_capacity: None
            }
        );
        assert!("token-bucket:lots".parse::<RateLimitStrategy>().is_err());
        assert!("leaky-bucket".parse::<RateLimitStrategy>().is_err());
        assert!("slow-start:3".parse::<RateLimitStrategy>().is_err());
    }

    #[test]
    fn test_strategy_json() {
        let strategy: RateLimitStrategy =
            serde_json::from_str(r#"{"kind":"token_bucket","bucket_capacity":7}"#).unwrap();
        assert_eq!(
            strategy,
            RateLimitStrategy::TokenBucket {
                bucket_capacity: Some(7)
            }
        );
        assert_eq!(RateLimitStrategy::default(), RateLimitStrategy::SlidingLog);
    }

    #[tokio::test]
    async fn test_build_rejects_invalid_limits() {
        let zero_rate = RateLimitStrategy::FixedWindow.build("acc", 0, Duration::from_secs(1));
        assert!(matches!(zero_rate, Err(PaymentError::InvalidConfig(_))));

        let zero_window = RateLimitStrategy::SlidingLog.build("acc", 5, Duration::ZERO);
        assert!(matches!(zero_window, Err(PaymentError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_build_every_strategy() {
        let strategies = [
            RateLimitStrategy::FixedWindow,
            RateLimitStrategy::SlidingWindow,
            RateLimitStrategy::TokenBucket {
                bucket_capacity: Some(3),
            },
            RateLimitStrategy::SlowStart,
            RateLimitStrategy::CountingWindow,
            RateLimitStrategy::SlidingLog,
        ];
        for strategy in strategies {
            let source = strategy
                .build("acc-1", 3, Duration::from_secs(1))
                .unwrap();
            assert_eq!(source.label(), "acc-1");
            assert_eq!(source.rate(), 3);
            assert!(source.has_permit(), "{strategy:?} starts without permits");
            assert!(source.try_acquire());
        }
    }
}
