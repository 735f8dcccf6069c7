use crate::domain::account::Amount;
use crate::domain::payment::OrderId;
use crate::error::{PaymentError, Result};
use serde::Deserialize;
use std::io::Read;

/// One row of the payment batch: the order to charge and the amount.
///
/// A blank `order_id` gets a freshly generated id.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PaymentOrder {
    #[serde(default)]
    pub order_id: Option<OrderId>,
    pub amount: Amount,
}

/// Reads payment orders from a CSV source.
///
/// This reader wraps `csv::Reader` and provides an iterator over
/// `Result<PaymentOrder>`. It trims whitespace and accepts flexible record
/// lengths.
pub struct PaymentReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> PaymentReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily reads and deserializes payment orders.
    pub fn orders(self) -> impl Iterator<Item = Result<PaymentOrder>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(PaymentError::from))
    }
}
