use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_MAX_ATTEMPTS: usize = 10;
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(1);

/// How a failed attempt should be treated by the [`Retryer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Retry<E> {
    /// Try again while attempts and time remain.
    Retryable(E),
    /// Stop immediately.
    Terminal(E),
}

impl<E> Retry<E> {
    pub fn into_inner(self) -> E {
        match self {
            Retry::Retryable(error) | Retry::Terminal(error) => error,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Retry::Retryable(_))
    }
}

/// Final result of a retry loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome<T, E> {
    Completed(T),
    /// An attempt failed terminally.
    Failed(E),
    /// Every allowed attempt failed with a retryable error.
    Exhausted { attempts: usize, last: Option<E> },
    /// The deadline passed before a terminal resolution.
    DeadlineExceeded { attempts: usize, last: Option<E> },
}

impl<T, E> RetryOutcome<T, E> {
    pub fn is_completed(&self) -> bool {
        matches!(self, RetryOutcome::Completed(_))
    }

    /// Number of attempts started, when known without the attempt results.
    pub fn attempts(&self) -> Option<usize> {
        match self {
            RetryOutcome::Exhausted { attempts, .. }
            | RetryOutcome::DeadlineExceeded { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }
}

/// Deadline-bounded retry loop with a hard attempt ceiling.
#[derive(Debug, Clone, Copy)]
pub struct Retryer {
    max_attempts: usize,
    backoff: Duration,
}

impl Default for Retryer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_BACKOFF)
    }
}

impl Retryer {
    pub fn new(max_attempts: usize, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Runs `attempt` until it succeeds, fails terminally, the attempt budget
    /// is spent or `deadline` passes.
    ///
    /// No attempt is started at or after `deadline`. An attempt that is
    /// already running is awaited to completion; bounding its own duration
    /// is up to the attempt. `attempt` receives the 1-based attempt number.
    pub async fn execute_until<T, E, F, Fut>(
        &self,
        deadline: Instant,
        mut attempt: F,
    ) -> RetryOutcome<T, E>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, Retry<E>>>,
    {
        let mut attempts = 0;
        let mut last = None;
        loop {
            if Instant::now() >= deadline {
                return RetryOutcome::DeadlineExceeded { attempts, last };
            }
            if attempts >= self.max_attempts {
                return RetryOutcome::Exhausted { attempts, last };
            }

            attempts += 1;
            match attempt(attempts).await {
                Ok(value) => return RetryOutcome::Completed(value),
                Err(Retry::Terminal(error)) => return RetryOutcome::Failed(error),
                Err(Retry::Retryable(error)) => {
                    tracing::trace!(attempt = attempts, "attempt failed, retrying");
                    last = Some(error);
                }
            }

            if attempts < self.max_attempts && !self.backoff.is_zero() {
                let resume_at = (Instant::now() + self.backoff).min(deadline);
                tokio::time::sleep_until(resume_at).await;
            }
        }
    }
}
