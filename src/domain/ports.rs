use super::account::Amount;
use super::payment::{OrderId, PaymentEvent, PaymentId, PaymentRecord, TransactionId};
use crate::error::{ProviderError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Append-only event log of the payment aggregate.
///
/// Appends must tolerate redelivery: a fact carrying a transaction id that is
/// already recorded is accepted and ignored.
#[async_trait]
pub trait PaymentEventStore: Send + Sync {
    async fn append(&self, payment_id: PaymentId, event: PaymentEvent) -> Result<()>;
    async fn events(&self, payment_id: PaymentId) -> Result<Vec<PaymentEvent>>;
    async fn payment_ids(&self) -> Result<Vec<PaymentId>>;

    /// Current aggregate state, `None` if nothing was ever recorded.
    async fn record(&self, payment_id: PaymentId) -> Result<Option<PaymentRecord>> {
        let events = self.events(payment_id).await?;
        if events.is_empty() {
            return Ok(None);
        }
        PaymentRecord::replay(payment_id, &events).map(Some)
    }
}

pub type PaymentEventStoreRef = Arc<dyn PaymentEventStore>;

/// One outgoing call to the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderCall {
    pub service_name: String,
    pub account_name: String,
    pub transaction_id: TransactionId,
    pub payment_id: PaymentId,
    pub amount: Amount,
}

/// Body returned by the provider's process endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalSysResponse {
    pub transaction_id: String,
    pub payment_id: String,
    pub result: bool,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderReply {
    pub status: u16,
    pub body: ExternalSysResponse,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Performs one call, giving up after `timeout`.
    async fn process(
        &self,
        call: &ProviderCall,
        timeout: Duration,
    ) -> std::result::Result<ProviderReply, ProviderError>;
}

pub type PaymentProviderRef = Arc<dyn PaymentProvider>;

/// A request to charge a payment before `deadline`.
///
/// `started_at` is when the saga asked for the payment; the time between it
/// and each submission is recorded as time spent in queue.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRequest {
    pub payment_id: PaymentId,
    pub amount: Amount,
    pub started_at: Instant,
    pub deadline: Instant,
}

/// Entry point used by the order saga.
///
/// Submission is fire-and-forget: the returned handle only tells when the
/// background work is over. Outcomes are read back from the event store.
#[async_trait]
pub trait PaymentService: Send + Sync {
    async fn submit_payment_request(
        &self,
        order_id: OrderId,
        amount: Amount,
        started_at: Instant,
        deadline: Instant,
    ) -> Result<(PaymentId, JoinHandle<()>)>;
}
