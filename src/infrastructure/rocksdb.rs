use crate::domain::payment::{PaymentEvent, PaymentId, PaymentRecord};
use crate::domain::ports::PaymentEventStore;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Options};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Column Family holding the event log of each payment.
pub const CF_PAYMENT_EVENTS: &str = "payment_events";

/// A persistent payment event store using RocksDB.
///
/// Each payment's events are stored as one JSON list keyed by the payment id
/// bytes. Appends are read-validate-write cycles serialized by a store-wide
/// lock, so a processing fact is never written ahead of its submission.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDbPaymentEventStore {
    db: Arc<DB>,
    append_lock: Arc<Mutex<()>>,
}

impl RocksDbPaymentEventStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the `payment_events` column family exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_events = ColumnFamilyDescriptor::new(CF_PAYMENT_EVENTS, Options::default());
        let db = DB::open_cf_descriptors(&opts, path, vec![cf_events])?;

        Ok(Self {
            db: Arc::new(db),
            append_lock: Arc::new(Mutex::new(())),
        })
    }

    fn read_log(&self, payment_id: PaymentId) -> Result<Vec<PaymentEvent>> {
        let cf = self.events_cf()?;
        match self.db.get_pinned_cf(cf, payment_id.0.as_bytes())? {
            Some(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                PaymentError::InternalError(Box::new(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("Deserialization error: {}", e),
                )))
            }),
            None => Ok(Vec::new()),
        }
    }

    fn events_cf(&self) -> Result<&ColumnFamily> {
        self.db.cf_handle(CF_PAYMENT_EVENTS).ok_or_else(|| {
            PaymentError::InternalError(Box::new(std::io::Error::other(
                "Payment events column family not found",
            )))
        })
    }
}

#[async_trait]
impl PaymentEventStore for RocksDbPaymentEventStore {
    async fn append(&self, payment_id: PaymentId, event: PaymentEvent) -> Result<()> {
        let _guard = self.append_lock.lock().await;

        let mut log = self.read_log(payment_id)?;
        let record = PaymentRecord::replay(payment_id, log.iter())?;
        if !record.accepts(&event)? {
            return Ok(());
        }
        log.push(event);

        let value = serde_json::to_vec(&log).map_err(|e| {
            PaymentError::InternalError(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Serialization error: {}", e),
            )))
        })?;
        let cf = self.events_cf()?;
        self.db.put_cf(cf, payment_id.0.as_bytes(), value)?;

        Ok(())
    }

    async fn events(&self, payment_id: PaymentId) -> Result<Vec<PaymentEvent>> {
        self.read_log(payment_id)
    }

    async fn payment_ids(&self) -> Result<Vec<PaymentId>> {
        let cf = self.events_cf()?;
        let mut ids = Vec::new();
        for item in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            let (key, _value) = item?;
            let id = Uuid::from_slice(&key).map_err(|e| {
                PaymentError::InternalError(Box::new(std::io::Error::other(format!(
                    "Invalid payment id key: {}",
                    e
                ))))
            })?;
            ids.push(PaymentId(id));
        }
        Ok(ids)
    }
}
