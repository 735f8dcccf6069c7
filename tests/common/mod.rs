#![allow(dead_code)]

use assert_cmd::cargo_bin;
use async_trait::async_trait;
use payment_dispatch::domain::account::AccountProfile;
use payment_dispatch::domain::payment::PaymentEvent;
use payment_dispatch::domain::ports::{
    ExternalSysResponse, PaymentProvider, ProviderCall, ProviderReply,
};
use payment_dispatch::error::ProviderError;
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::VecDeque;
use std::ffi::OsString;
use std::fs::File;
use std::io::Error;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub type Scripted = Result<ProviderReply, ProviderError>;

pub fn reply(status: u16, result: bool, message: Option<&str>) -> Scripted {
    Ok(ProviderReply {
        status,
        body: ExternalSysResponse {
            transaction_id: String::new(),
            payment_id: String::new(),
            result,
            message: message.map(str::to_string),
        },
    })
}

pub fn success() -> Scripted {
    reply(200, true, None)
}

/// Provider returning pre-scripted responses in order, then `fallback`.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Scripted>>,
    fallback: Scripted,
    latency: Duration,
    calls: Mutex<Vec<(Instant, ProviderCall)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(script: impl IntoIterator<Item = Scripted>, fallback: Scripted) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback,
            latency: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn always(response: Scripted) -> Self {
        Self::new([], response)
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, call)| call.clone())
            .collect()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(at, _)| *at).collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentProvider for ScriptedProvider {
    async fn process(&self, call: &ProviderCall, _timeout: Duration) -> Scripted {
        self.calls
            .lock()
            .unwrap()
            .push((Instant::now(), call.clone()));
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let response = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        response
    }
}

pub fn profile(account_name: &str, price: Decimal) -> AccountProfile {
    AccountProfile {
        service_name: "onlineStore".to_string(),
        account_name: account_name.to_string(),
        parallel_requests: 8,
        rate_limit_per_sec: 100,
        price,
        average_processing_time: Duration::from_millis(1000),
        enabled: true,
    }
}

/// Every processing fact must come after the submission of its transaction.
pub fn assert_processing_follows_submission(events: &[PaymentEvent]) {
    for (index, event) in events.iter().enumerate() {
        if let PaymentEvent::Processed(fact) = event {
            let submitted_before = events[..index].iter().any(|earlier| {
                matches!(earlier, PaymentEvent::Submitted(s) if s.transaction_id == fact.transaction_id)
            });
            assert!(
                submitted_before,
                "processing of {} recorded without a prior submission",
                fact.transaction_id
            );
        }
    }
}

pub fn generate_payments_csv(path: &Path, amounts: &[&str]) -> Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);

    wtr.write_record(["order_id", "amount"])?;
    for amount in amounts {
        wtr.write_record(["", *amount])?;
    }

    wtr.flush()?;
    Ok(())
}

pub fn write_accounts_json(path: &Path, accounts: &[AccountProfile]) -> Result<(), Error> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, accounts)?;
    Ok(())
}

/// Serves `/external/process` with a fixed reply.
pub async fn mount_provider(server: &MockServer, status: u16, result: bool, message: Option<&str>) {
    Mock::given(method("POST"))
        .and(path("/external/process"))
        .respond_with(ResponseTemplate::new(status).set_body_json(json!({
            "transactionId": "t",
            "paymentId": "p",
            "result": result,
            "message": message
        })))
        .mount(server)
        .await;
}

/// Writes a payments CSV and a single-account config into `dir`.
pub fn cli_fixture(dir: &Path, amounts: &[&str]) -> (PathBuf, PathBuf) {
    let input = dir.join("payments.csv");
    let accounts = dir.join("accounts.json");
    generate_payments_csv(&input, amounts).expect("Failed to write payments CSV");
    write_accounts_json(&accounts, &[profile("acc-1", Decimal::from(10))])
        .expect("Failed to write accounts file");
    (input, accounts)
}

/// Runs the binary off the async runtime so the mock server keeps serving.
pub async fn run_cli(args: Vec<OsString>) -> Output {
    tokio::task::spawn_blocking(move || {
        Command::new(cargo_bin!("payment-dispatch"))
            .args(args)
            .output()
            .expect("Failed to execute command")
    })
    .await
    .expect("CLI task panicked")
}
