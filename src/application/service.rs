use super::adapter::PaymentExternalSystemAdapter;
use crate::config::{AccountsConfig, AdapterSettings};
use crate::domain::account::Amount;
use crate::domain::payment::{OrderId, PaymentEvent, PaymentId, now_millis};
use crate::domain::ports::{
    PaymentEventStoreRef, PaymentProviderRef, PaymentRequest, PaymentService,
};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Creates payments for orders and hands them to the cheapest enabled
/// provider account.
pub struct OrderPaymentService {
    adapters: Vec<Arc<PaymentExternalSystemAdapter>>,
    store: PaymentEventStoreRef,
}

impl OrderPaymentService {
    /// Adapters are routed to in the given order when their prices tie.
    pub fn new(adapters: Vec<Arc<PaymentExternalSystemAdapter>>, store: PaymentEventStoreRef) -> Self {
        Self { adapters, store }
    }

    /// Builds one adapter per configured account. Must be called from within
    /// a tokio runtime.
    pub fn from_config(
        accounts: AccountsConfig,
        settings: &AdapterSettings,
        provider: PaymentProviderRef,
        store: PaymentEventStoreRef,
    ) -> Result<Self> {
        accounts.validate()?;
        let adapters = accounts
            .accounts
            .into_iter()
            .map(|profile| {
                PaymentExternalSystemAdapter::new(
                    profile,
                    settings.clone(),
                    Arc::clone(&provider),
                    Arc::clone(&store),
                )
                .map(Arc::new)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(adapters, store))
    }

    pub fn adapters(&self) -> &[Arc<PaymentExternalSystemAdapter>] {
        &self.adapters
    }

    pub fn store(&self) -> &PaymentEventStoreRef {
        &self.store
    }

    /// Cheapest enabled adapter; the first configured one wins a tie.
    pub fn select_adapter(&self) -> Option<&Arc<PaymentExternalSystemAdapter>> {
        self.adapters
            .iter()
            .filter(|adapter| adapter.is_enabled())
            .min_by(|a, b| a.price().cmp(&b.price()))
    }
}

#[async_trait]
impl PaymentService for OrderPaymentService {
    async fn submit_payment_request(
        &self,
        order_id: OrderId,
        amount: Amount,
        started_at: Instant,
        deadline: Instant,
    ) -> Result<(PaymentId, JoinHandle<()>)> {
        let payment_id = PaymentId::new();
        self.store
            .append(
                payment_id,
                PaymentEvent::Created {
                    payment_id,
                    order_id,
                    amount,
                    created_at: now_millis(),
                },
            )
            .await?;
        tracing::info!(%payment_id, %order_id, %amount, "payment created");

        let adapter = self.select_adapter().ok_or_else(|| {
            tracing::error!(%payment_id, "no enabled account to route the payment to");
            PaymentError::NoEnabledAccount
        })?;
        tracing::debug!(%payment_id, account = adapter.name(), "payment routed");

        let handle = adapter.submit_payment_async(PaymentRequest {
            payment_id,
            amount,
            started_at,
            deadline,
        });
        Ok((payment_id, handle))
    }
}
