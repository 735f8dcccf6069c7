use crate::domain::payment::{PaymentRecord, PaymentStatus};
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
struct PaymentReportRow {
    payment_id: String,
    order_id: String,
    amount: String,
    attempts: usize,
    status: String,
    reason: String,
}

impl From<&PaymentRecord> for PaymentReportRow {
    fn from(record: &PaymentRecord) -> Self {
        let reason = match record.status() {
            PaymentStatus::Failed => record
                .last_processing()
                .and_then(|fact| fact.reason.clone())
                .unwrap_or_default(),
            PaymentStatus::Pending | PaymentStatus::Succeeded => String::new(),
        };
        Self {
            payment_id: record.payment_id.to_string(),
            order_id: record.order_id.map(|id| id.to_string()).unwrap_or_default(),
            amount: record.amount.map(|a| a.to_string()).unwrap_or_default(),
            attempts: record.attempts(),
            status: record.status().to_string(),
            reason,
        }
    }
}

/// Writes the final state of payments as CSV.
pub struct PaymentWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> PaymentWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    /// Writes one row per record and flushes the sink.
    pub fn write_payments<'a>(
        &mut self,
        records: impl IntoIterator<Item = &'a PaymentRecord>,
    ) -> Result<()> {
        for record in records {
            self.writer.serialize(PaymentReportRow::from(record))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
