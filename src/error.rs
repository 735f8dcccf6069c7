use crate::domain::payment::{PaymentId, TransactionId};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Provider error: {0}")]
    ProviderError(#[from] ProviderError),
    #[error("Payment {payment_id} has no submission for transaction {transaction_id}")]
    UnknownTransaction {
        payment_id: PaymentId,
        transaction_id: TransactionId,
    },
    #[error("Payment {0} already exists")]
    DuplicatePayment(PaymentId),
    #[error("No enabled payment account available")]
    NoEnabledAccount,
    #[error("Deadline exceeded before the payment could be submitted")]
    DeadlineExceeded,
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDbError(#[from] rocksdb::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

/// Failure of a single call to the external payment provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("malformed response (status {status}): {reason}")]
    Malformed { status: u16, reason: String },
}

pub type Result<T> = std::result::Result<T, PaymentError>;
