use crate::domain::payment::{PaymentEvent, PaymentId, PaymentRecord};
use crate::domain::ports::PaymentEventStore;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory payment event log.
///
/// Uses `Arc<RwLock<HashMap<PaymentId, Vec<PaymentEvent>>>>` to allow shared
/// concurrent access. Each append is validated against the replayed record
/// under the write lock, so concurrent attempts of one payment never
/// interleave a processing fact ahead of its submission.
#[derive(Default, Clone)]
pub struct InMemoryPaymentEventStore {
    events: Arc<RwLock<HashMap<PaymentId, Vec<PaymentEvent>>>>,
}

impl InMemoryPaymentEventStore {
    /// Creates a new, empty event store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentEventStore for InMemoryPaymentEventStore {
    async fn append(&self, payment_id: PaymentId, event: PaymentEvent) -> Result<()> {
        let mut events = self.events.write().await;
        let log = events.entry(payment_id).or_default();
        let record = PaymentRecord::replay(payment_id, log.iter())?;
        if record.accepts(&event)? {
            log.push(event);
        }
        Ok(())
    }

    async fn events(&self, payment_id: PaymentId) -> Result<Vec<PaymentEvent>> {
        let events = self.events.read().await;
        Ok(events.get(&payment_id).cloned().unwrap_or_default())
    }

    async fn payment_ids(&self) -> Result<Vec<PaymentId>> {
        let events = self.events.read().await;
        Ok(events
            .iter()
            .filter(|(_, log)| !log.is_empty())
            .map(|(payment_id, _)| *payment_id)
            .collect())
    }
}
