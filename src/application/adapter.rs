use crate::config::AdapterSettings;
use crate::domain::account::AccountProfile;
use crate::domain::payment::{
    PaymentEvent, ProcessingFact, SubmissionFact, TransactionId, now_millis,
};
use crate::domain::ports::{
    PaymentEventStoreRef, PaymentProviderRef, PaymentRequest, ProviderCall, ProviderReply,
};
use crate::error::{PaymentError, ProviderError, Result};
use crate::resilience::{LatencyTracker, RateAndConcurrencyLimiter, Retry, RetryOutcome, Retryer};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Reason recorded when the provider did not answer within the call timeout.
pub const REQUEST_TIMEOUT_REASON: &str = "Request timeout.";

/// Why an attempt did not end the payment successfully.
#[derive(Debug)]
pub enum AttemptFailure {
    /// The provider call finished without success; its processing fact was
    /// recorded.
    Processed(ProcessingFact),
    /// The attempt ended before a request was sent.
    NotSubmitted(PaymentError),
}

/// How one payment cycle ended. A completed outcome carries the successful
/// processing fact.
pub type PaymentOutcome = RetryOutcome<ProcessingFact, AttemptFailure>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Succeeded,
    Retryable,
    Terminal,
}

/// Maps a provider response to a verdict and the reason to record.
///
/// Timeouts, transport failures and malformed bodies are terminal since the
/// provider may already have charged the payment. A rejection is retryable
/// unless the status is in the 4xx range.
pub fn classify(
    response: &std::result::Result<ProviderReply, ProviderError>,
) -> (Verdict, Option<String>) {
    match response {
        Err(ProviderError::Timeout(_)) => (Verdict::Terminal, Some(REQUEST_TIMEOUT_REASON.to_string())),
        Err(ProviderError::Transport(reason)) => (Verdict::Terminal, Some(reason.clone())),
        Err(ProviderError::Malformed { reason, .. }) => (Verdict::Terminal, Some(reason.clone())),
        Ok(reply) if reply.body.result => (Verdict::Succeeded, reply.body.message.clone()),
        Ok(reply) if (400..500).contains(&reply.status) => {
            (Verdict::Terminal, reply.body.message.clone())
        }
        Ok(reply) => (Verdict::Retryable, reply.body.message.clone()),
    }
}

/// Sends the payments routed to one provider account.
///
/// The adapter owns the account's limiter, latency tracker and retryer; none
/// of them is shared with other accounts. Every request that reaches the
/// provider is recorded as a submission followed by a processing fact.
pub struct PaymentExternalSystemAdapter {
    profile: AccountProfile,
    settings: AdapterSettings,
    provider: PaymentProviderRef,
    store: PaymentEventStoreRef,
    limiter: RateAndConcurrencyLimiter,
    latency: LatencyTracker,
    retryer: Retryer,
}

impl PaymentExternalSystemAdapter {
    /// Builds the adapter and its permit source. Must be called from within a
    /// tokio runtime.
    pub fn new(
        profile: AccountProfile,
        settings: AdapterSettings,
        provider: PaymentProviderRef,
        store: PaymentEventStoreRef,
    ) -> Result<Self> {
        profile.validate()?;
        settings.validate()?;

        let permits = settings.strategy.build(
            profile.account_name.clone(),
            profile.rate_limit_per_sec,
            settings.rate_window,
        )?;
        let limiter = RateAndConcurrencyLimiter::new(
            permits,
            profile.parallel_requests + settings.concurrency_headroom,
        );
        let latency = LatencyTracker::new(settings.latency_min_samples, settings.latency_capacity);
        let retryer = Retryer::new(settings.max_attempts, settings.retry_backoff);

        Ok(Self {
            profile,
            settings,
            provider,
            store,
            limiter,
            latency,
            retryer,
        })
    }

    pub fn name(&self) -> &str {
        &self.profile.account_name
    }

    pub fn price(&self) -> Decimal {
        self.profile.price
    }

    pub fn is_enabled(&self) -> bool {
        self.profile.enabled
    }

    pub fn profile(&self) -> &AccountProfile {
        &self.profile
    }

    pub fn limiter(&self) -> &RateAndConcurrencyLimiter {
        &self.limiter
    }

    pub fn latency(&self) -> &LatencyTracker {
        &self.latency
    }

    /// Per-call timeout derived from recent latencies.
    ///
    /// Until enough calls were observed the account's average processing
    /// time stands in for the percentile.
    pub fn call_timeout(&self) -> Duration {
        let default_ms = self.profile.average_processing_time.as_secs_f64() * 1000.0;
        let percentile_ms = self
            .latency
            .percentile_or(self.settings.timeout_percentile, default_ms);
        let scaled = Duration::try_from_secs_f64(percentile_ms * self.settings.timeout_factor / 1000.0)
            .unwrap_or(Duration::MAX);
        scaled.max(self.settings.min_timeout)
    }

    /// Starts the payment in the background; outcomes land in the event store.
    pub fn submit_payment_async(self: &Arc<Self>, request: PaymentRequest) -> JoinHandle<()> {
        let adapter = Arc::clone(self);
        tokio::spawn(async move {
            adapter.perform_payment(request).await;
        })
    }

    /// Attempts the payment until it succeeds, fails terminally, or the
    /// attempt budget or deadline run out.
    ///
    /// The retry loop is bounded by the earlier of the caller's deadline and
    /// one call timeout from now. Running out of time records nothing beyond
    /// the attempts already made.
    pub async fn perform_payment(&self, request: PaymentRequest) -> PaymentOutcome {
        let timeout = self.call_timeout();
        let deadline = Instant::now()
            .checked_add(timeout)
            .map_or(request.deadline, |bound| bound.min(request.deadline));
        debug!(
            account = %self.profile.account_name,
            payment_id = %request.payment_id,
            timeout_ms = timeout.as_millis() as u64,
            "performing payment"
        );

        let request = &request;
        let outcome = self
            .retryer
            .execute_until(deadline, move |attempt| {
                self.attempt(request, deadline, timeout, attempt)
            })
            .await;

        match &outcome {
            RetryOutcome::Completed(fact) => info!(
                account = %self.profile.account_name,
                payment_id = %request.payment_id,
                transaction_id = %fact.transaction_id,
                "payment succeeded"
            ),
            RetryOutcome::Failed(AttemptFailure::Processed(fact)) => warn!(
                account = %self.profile.account_name,
                payment_id = %request.payment_id,
                transaction_id = %fact.transaction_id,
                reason = fact.reason.as_deref().unwrap_or_default(),
                "payment failed"
            ),
            RetryOutcome::Failed(AttemptFailure::NotSubmitted(error)) => error!(
                account = %self.profile.account_name,
                payment_id = %request.payment_id,
                %error,
                "payment could not be submitted"
            ),
            RetryOutcome::Exhausted { attempts, .. } => warn!(
                account = %self.profile.account_name,
                payment_id = %request.payment_id,
                attempts,
                "payment gave up after the last allowed attempt"
            ),
            RetryOutcome::DeadlineExceeded { attempts, .. } => warn!(
                account = %self.profile.account_name,
                payment_id = %request.payment_id,
                attempts,
                "payment deadline passed without a final outcome"
            ),
        }
        outcome
    }

    async fn attempt(
        &self,
        request: &PaymentRequest,
        deadline: Instant,
        timeout: Duration,
        attempt: usize,
    ) -> std::result::Result<ProcessingFact, Retry<AttemptFailure>> {
        let account = self.profile.account_name.as_str();
        let payment_id = request.payment_id;

        let Ok(_lease) = tokio::time::timeout_at(deadline, self.limiter.lease()).await else {
            debug!(account, %payment_id, attempt, "deadline passed while waiting for admission");
            // Retryable so the retryer reports the deadline itself.
            return Err(Retry::Retryable(AttemptFailure::NotSubmitted(
                PaymentError::DeadlineExceeded,
            )));
        };

        let transaction_id = TransactionId::new();
        let submitted_at = now_millis();
        let spent_in_queue = request.started_at.elapsed();
        let submission = SubmissionFact {
            transaction_id,
            success: true,
            started_at: submitted_at,
            spent_in_queue,
        };
        if let Err(error) = self
            .store
            .append(payment_id, PaymentEvent::Submitted(submission))
            .await
        {
            error!(account, %payment_id, %transaction_id, %error, "failed to record submission");
            return Err(Retry::Terminal(AttemptFailure::NotSubmitted(error)));
        }
        debug!(account, %payment_id, %transaction_id, attempt, "submitted");

        let call = ProviderCall {
            service_name: self.profile.service_name.clone(),
            account_name: self.profile.account_name.clone(),
            transaction_id,
            payment_id,
            amount: request.amount,
        };
        let response = {
            let _timer = self.latency.start();
            self.provider.process(&call, timeout).await
        };

        let (verdict, reason) = classify(&response);
        match (&response, verdict) {
            (Err(ProviderError::Timeout(_)), _) => {
                error!(account, %payment_id, %transaction_id, "payment timed out")
            }
            (Err(provider_error), _) => {
                error!(account, %payment_id, %transaction_id, error = %provider_error, "payment call failed")
            }
            (Ok(reply), Verdict::Retryable | Verdict::Terminal) => warn!(
                account,
                %payment_id,
                %transaction_id,
                status = reply.status,
                message = reason.as_deref().unwrap_or_default(),
                "provider rejected payment"
            ),
            (Ok(_), Verdict::Succeeded) => {}
        }

        let fact = ProcessingFact {
            transaction_id,
            success: verdict == Verdict::Succeeded,
            submitted_at,
            processed_at: now_millis(),
            reason,
            spent_in_queue,
        };
        if let Err(error) = self
            .store
            .append(payment_id, PaymentEvent::Processed(fact.clone()))
            .await
        {
            error!(account, %payment_id, %transaction_id, %error, "failed to record processing result");
        }

        match verdict {
            Verdict::Succeeded => Ok(fact),
            Verdict::Retryable => Err(Retry::Retryable(AttemptFailure::Processed(fact))),
            Verdict::Terminal => Err(Retry::Terminal(AttemptFailure::Processed(fact))),
        }
    }
}
