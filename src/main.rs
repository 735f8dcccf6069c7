use clap::Parser;
use miette::{IntoDiagnostic, Result};
use payment_dispatch::application::OrderPaymentService;
use payment_dispatch::config::{AccountsConfig, AdapterSettings};
use payment_dispatch::domain::payment::OrderId;
use payment_dispatch::domain::ports::{PaymentEventStoreRef, PaymentProviderRef, PaymentService};
use payment_dispatch::infrastructure::http::HttpPaymentProvider;
use payment_dispatch::infrastructure::in_memory::InMemoryPaymentEventStore;
#[cfg(feature = "storage-rocksdb")]
use payment_dispatch::infrastructure::rocksdb::RocksDbPaymentEventStore;
use payment_dispatch::interfaces::csv::payment_reader::PaymentReader;
use payment_dispatch::interfaces::csv::payment_writer::PaymentWriter;
use payment_dispatch::resilience::RateLimitStrategy;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input payments CSV file (`order_id,amount`)
    input: PathBuf,

    /// JSON file listing the provider accounts
    #[arg(long)]
    accounts: PathBuf,

    /// Base URL of the payment provider
    #[arg(long, default_value = "http://localhost:1234")]
    provider_url: String,

    /// Time each payment has to complete, in milliseconds
    #[arg(long, default_value_t = 80_000)]
    deadline_ms: u64,

    /// JSON file with adapter settings (optional)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Permit source: fixed-window, sliding-window, token-bucket[:capacity],
    /// slow-start, counting-window or sliding-log
    #[arg(long)]
    strategy: Option<RateLimitStrategy>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .init();
}

#[cfg(feature = "storage-rocksdb")]
fn open_store(db_path: Option<&Path>) -> Result<PaymentEventStoreRef> {
    match db_path {
        Some(path) => Ok(Arc::new(
            RocksDbPaymentEventStore::open(path).into_diagnostic()?,
        )),
        None => Ok(Arc::new(InMemoryPaymentEventStore::new())),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_store(db_path: Option<&Path>) -> Result<PaymentEventStoreRef> {
    if let Some(path) = db_path {
        tracing::warn!(
            path = %path.display(),
            "built without the storage-rocksdb feature, using the in-memory store"
        );
    }
    Ok(Arc::new(InMemoryPaymentEventStore::new()))
}

fn load_settings(cli: &Cli) -> Result<AdapterSettings> {
    let mut settings = match &cli.settings {
        Some(path) => {
            let file = File::open(path).into_diagnostic()?;
            serde_json::from_reader(BufReader::new(file)).into_diagnostic()?
        }
        None => AdapterSettings::default(),
    };
    if let Some(strategy) = cli.strategy {
        settings.strategy = strategy;
    }
    settings.validate().into_diagnostic()?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let accounts = AccountsConfig::load(&cli.accounts).into_diagnostic()?;
    let settings = load_settings(&cli)?;
    let store = open_store(cli.db_path.as_deref())?;
    let provider: PaymentProviderRef =
        Arc::new(HttpPaymentProvider::new(&cli.provider_url).into_diagnostic()?);
    let service = OrderPaymentService::from_config(accounts, &settings, provider, Arc::clone(&store))
        .into_diagnostic()?;

    // Submit every payment before waiting on any of them.
    let file = File::open(&cli.input).into_diagnostic()?;
    let reader = PaymentReader::new(file);
    let mut payment_ids = Vec::new();
    let mut handles = Vec::new();
    for order in reader.orders() {
        let order = match order {
            Ok(order) => order,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable payment row");
                continue;
            }
        };
        let started_at = Instant::now();
        let deadline = started_at + Duration::from_millis(cli.deadline_ms);
        let order_id = order.order_id.unwrap_or_else(OrderId::new);
        match service
            .submit_payment_request(order_id, order.amount, started_at, deadline)
            .await
        {
            Ok((payment_id, handle)) => {
                payment_ids.push(payment_id);
                handles.push(handle);
            }
            Err(e) => tracing::error!(%order_id, error = %e, "failed to submit payment"),
        }
    }

    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "payment task did not finish");
        }
    }

    let mut records = Vec::with_capacity(payment_ids.len());
    for payment_id in payment_ids {
        if let Some(record) = store.record(payment_id).await.into_diagnostic()? {
            records.push(record);
        }
    }

    let stdout = io::stdout();
    let mut writer = PaymentWriter::new(stdout.lock());
    writer.write_payments(&records).into_diagnostic()?;

    Ok(())
}
