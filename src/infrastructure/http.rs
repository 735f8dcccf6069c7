use crate::domain::ports::{ExternalSysResponse, PaymentProvider, ProviderCall, ProviderReply};
use crate::error::{PaymentError, ProviderError, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Path of the provider's payment endpoint, relative to the base URL.
pub const PROCESS_PATH: &str = "/external/process";

/// Payment provider reached over HTTP.
///
/// Every call is a `POST` with an empty body; the call parameters travel in
/// the query string and the outcome comes back as JSON.
#[derive(Debug, Clone)]
pub struct HttpPaymentProvider {
    client: Client,
    process_url: String,
}

impl HttpPaymentProvider {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| PaymentError::InternalError(Box::new(e)))?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            process_url: format!("{}{}", base_url.trim_end_matches('/'), PROCESS_PATH),
        }
    }

    pub fn process_url(&self) -> &str {
        &self.process_url
    }
}

fn transport_error(error: reqwest::Error, timeout: Duration) -> ProviderError {
    if error.is_timeout() {
        ProviderError::Timeout(timeout)
    } else {
        ProviderError::Transport(error.to_string())
    }
}

#[async_trait]
impl PaymentProvider for HttpPaymentProvider {
    async fn process(
        &self,
        call: &ProviderCall,
        timeout: Duration,
    ) -> std::result::Result<ProviderReply, ProviderError> {
        let transaction_id = call.transaction_id.to_string();
        let payment_id = call.payment_id.to_string();
        let amount = call.amount.to_string();

        let response = self
            .client
            .post(&self.process_url)
            .query(&[
                ("serviceName", call.service_name.as_str()),
                ("accountName", call.account_name.as_str()),
                ("transactionId", transaction_id.as_str()),
                ("paymentId", payment_id.as_str()),
                ("amount", amount.as_str()),
            ])
            .body(Vec::new())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| transport_error(e, timeout))?;

        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| transport_error(e, timeout))?;
        let body: ExternalSysResponse =
            serde_json::from_slice(&bytes).map_err(|e| ProviderError::Malformed {
                status,
                reason: e.to_string(),
            })?;

        tracing::trace!(
            account = %call.account_name,
            transaction_id = %call.transaction_id,
            status,
            result = body.result,
            "provider replied"
        );
        Ok(ProviderReply { status, body })
    }
}
