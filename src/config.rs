//! Account configuration and per-adapter tuning.

use crate::domain::account::AccountProfile;
use crate::domain::payment::millis;
use crate::error::{PaymentError, Result};
use crate::resilience::RateLimitStrategy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::time::Duration;

/// The provider accounts available to the service, in routing order.
///
/// Serialized as a plain JSON array of [`AccountProfile`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountsConfig {
    pub accounts: Vec<AccountProfile>,
}

impl AccountsConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Every profile must be valid and account names unique.
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for account in &self.accounts {
            account.validate()?;
            if !names.insert(account.account_name.as_str()) {
                return Err(PaymentError::InvalidConfig(format!(
                    "account {} is configured more than once",
                    account.account_name
                )));
            }
        }
        Ok(())
    }
}

/// Tuning shared by every adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AdapterSettings {
    /// Latency percentile the call timeout is derived from.
    pub timeout_percentile: f64,
    /// Multiplier applied to that percentile.
    pub timeout_factor: f64,
    /// Lower bound of the call timeout.
    #[serde(with = "millis")]
    pub min_timeout: Duration,
    /// Hard ceiling on attempts per payment.
    pub max_attempts: usize,
    #[serde(with = "millis")]
    pub retry_backoff: Duration,
    pub latency_min_samples: usize,
    pub latency_capacity: usize,
    /// Window over which an account's rate limit applies.
    #[serde(with = "millis")]
    pub rate_window: Duration,
    /// Added to an account's parallel requests to size its concurrency window.
    pub concurrency_headroom: usize,
    pub strategy: RateLimitStrategy,
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            timeout_percentile: 80.0,
            timeout_factor: 2.0,
            min_timeout: Duration::from_millis(300),
            max_attempts: 10,
            retry_backoff: Duration::from_millis(1),
            latency_min_samples: 10,
            latency_capacity: 100,
            rate_window: Duration::from_secs(1),
            concurrency_headroom: 0,
            strategy: RateLimitStrategy::default(),
        }
    }
}

impl AdapterSettings {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.timeout_percentile) {
            return Err(PaymentError::InvalidConfig(format!(
                "timeoutPercentile must be within 0..=100, got {}",
                self.timeout_percentile
            )));
        }
        if !self.timeout_factor.is_finite() || self.timeout_factor <= 0.0 {
            return Err(PaymentError::InvalidConfig(format!(
                "timeoutFactor must be a positive number, got {}",
                self.timeout_factor
            )));
        }
        if self.max_attempts == 0 {
            return Err(PaymentError::InvalidConfig(
                "maxAttempts must be positive".to_string(),
            ));
        }
        if self.rate_window.is_zero() {
            return Err(PaymentError::InvalidConfig(
                "rateWindow must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
