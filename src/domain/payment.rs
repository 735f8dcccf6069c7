use super::account::Amount;
use crate::error::PaymentError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

uuid_id!(
    /// Identifies a payment across all of its attempts.
    PaymentId
);
uuid_id!(
    /// Identifies one order in the saga.
    OrderId
);
uuid_id!(
    /// Identifies one attempt (one provider call) of a payment.
    TransactionId
);

/// Milliseconds since the Unix epoch, the timestamp format of every fact.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

/// Fact: a request for this transaction was sent to the provider.
///
/// `success` describes the submission itself and is always `true`; it says
/// nothing about the payment outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionFact {
    pub transaction_id: TransactionId,
    pub success: bool,
    pub started_at: u64,
    #[serde(with = "millis")]
    pub spent_in_queue: Duration,
}

/// Fact: the provider call for this transaction finished, one way or another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingFact {
    pub transaction_id: TransactionId,
    pub success: bool,
    pub submitted_at: u64,
    pub processed_at: u64,
    pub reason: Option<String>,
    #[serde(with = "millis")]
    pub spent_in_queue: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentEvent {
    Created {
        payment_id: PaymentId,
        order_id: OrderId,
        amount: Amount,
        created_at: u64,
    },
    Submitted(SubmissionFact),
    Processed(ProcessingFact),
}

pub(crate) mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    /// No attempt has been processed yet.
    Pending,
    /// At least one attempt succeeded.
    Succeeded,
    /// Attempts were processed and none succeeded.
    Failed,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "pending"),
            PaymentStatus::Succeeded => write!(f, "succeeded"),
            PaymentStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Current state of a payment, rebuilt by replaying its events.
///
/// Attempts are only ever added: a transaction id, once present in either
/// map, keeps its first recorded fact.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRecord {
    pub payment_id: PaymentId,
    pub order_id: Option<OrderId>,
    pub amount: Option<Amount>,
    pub created_at: Option<u64>,
    pub updated_at: u64,
    pub submissions: HashMap<TransactionId, SubmissionFact>,
    pub processings: HashMap<TransactionId, ProcessingFact>,
    last_processed: Option<TransactionId>,
}

impl PaymentRecord {
    pub fn new(payment_id: PaymentId) -> Self {
        Self {
            payment_id,
            order_id: None,
            amount: None,
            created_at: None,
            updated_at: 0,
            submissions: HashMap::new(),
            processings: HashMap::new(),
            last_processed: None,
        }
    }

    /// Rebuilds a record from its event log.
    pub fn replay<'a>(
        payment_id: PaymentId,
        events: impl IntoIterator<Item = &'a PaymentEvent>,
    ) -> Result<Self, PaymentError> {
        let mut record = Self::new(payment_id);
        for event in events {
            record.apply(event)?;
        }
        Ok(record)
    }

    /// Checks whether `event` may be appended to this payment.
    ///
    /// Returns `Ok(false)` for an exact duplicate of an already applied fact.
    pub fn accepts(&self, event: &PaymentEvent) -> Result<bool, PaymentError> {
        match event {
            PaymentEvent::Created {
                order_id, amount, ..
            } => match (self.order_id, self.amount) {
                (None, None) => Ok(true),
                (Some(known_order), Some(known_amount))
                    if known_order == *order_id && known_amount == *amount =>
                {
                    Ok(false)
                }
                _ => Err(PaymentError::DuplicatePayment(self.payment_id)),
            },
            PaymentEvent::Submitted(fact) => Ok(!self.submissions.contains_key(&fact.transaction_id)),
            PaymentEvent::Processed(fact) => {
                if !self.submissions.contains_key(&fact.transaction_id) {
                    return Err(PaymentError::UnknownTransaction {
                        payment_id: self.payment_id,
                        transaction_id: fact.transaction_id,
                    });
                }
                Ok(!self.processings.contains_key(&fact.transaction_id))
            }
        }
    }

    /// Applies one event. Duplicates are ignored, out-of-order facts rejected.
    pub fn apply(&mut self, event: &PaymentEvent) -> Result<(), PaymentError> {
        if !self.accepts(event)? {
            return Ok(());
        }
        match event {
            PaymentEvent::Created {
                order_id,
                amount,
                created_at,
                ..
            } => {
                self.order_id = Some(*order_id);
                self.amount = Some(*amount);
                self.created_at = Some(*created_at);
                self.updated_at = *created_at;
            }
            PaymentEvent::Submitted(fact) => {
                self.updated_at = self.updated_at.max(fact.started_at);
                self.submissions.insert(fact.transaction_id, fact.clone());
            }
            PaymentEvent::Processed(fact) => {
                self.updated_at = self.updated_at.max(fact.processed_at);
                self.last_processed = Some(fact.transaction_id);
                self.processings.insert(fact.transaction_id, fact.clone());
            }
        }
        Ok(())
    }

    pub fn attempts(&self) -> usize {
        self.submissions.len()
    }

    pub fn status(&self) -> PaymentStatus {
        if self.processings.values().any(|p| p.success) {
            PaymentStatus::Succeeded
        } else if self.processings.is_empty() {
            PaymentStatus::Pending
        } else {
            PaymentStatus::Failed
        }
    }

    /// The most recently applied processing fact.
    pub fn last_processing(&self) -> Option<&ProcessingFact> {
        self.last_processed
            .as_ref()
            .and_then(|tx| self.processings.get(tx))
    }
}
