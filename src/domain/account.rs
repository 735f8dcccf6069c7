use crate::error::PaymentError;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::time::Duration;

/// Represents a positive monetary amount for a payment.
///
/// This is a wrapper around `rust_decimal::Decimal` that rejects zero and
/// negative values, so every amount sent to the provider is chargeable.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, PaymentError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(PaymentError::ValidationError(
                "Amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = PaymentError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

/// Static configuration of one payment-provider account.
///
/// Loaded once at startup and never mutated; each profile owns exactly one
/// adapter together with that adapter's limiter, tracker and retryer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountProfile {
    /// Name of the service this account is registered for.
    pub service_name: String,
    /// The unique account identifier at the provider.
    pub account_name: String,
    /// Maximum number of calls the provider accepts in flight.
    pub parallel_requests: usize,
    /// Maximum number of calls the provider accepts per second.
    pub rate_limit_per_sec: usize,
    /// Cost of a single call.
    pub price: Decimal,
    /// Expected processing time, used until enough latencies were observed.
    #[serde(
        serialize_with = "serialize_millis",
        deserialize_with = "deserialize_millis"
    )]
    pub average_processing_time: Duration,
    /// Disabled accounts are never routed to.
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

fn serialize_millis<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u64(duration.as_millis() as u64)
}

fn deserialize_millis<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let millis = u64::deserialize(deserializer)?;
    Ok(Duration::from_millis(millis))
}

impl AccountProfile {
    /// Checks the limits an adapter needs to be constructible.
    pub fn validate(&self) -> Result<(), PaymentError> {
        if self.account_name.trim().is_empty() {
            return Err(PaymentError::InvalidConfig(
                "accountName must not be empty".to_string(),
            ));
        }
        if self.rate_limit_per_sec == 0 {
            return Err(PaymentError::InvalidConfig(format!(
                "account {}: rateLimitPerSec must be positive",
                self.account_name
            )));
        }
        if self.parallel_requests == 0 {
            return Err(PaymentError::InvalidConfig(format!(
                "account {}: parallelRequests must be positive",
                self.account_name
            )));
        }
        if self.price < Decimal::ZERO {
            return Err(PaymentError::InvalidConfig(format!(
                "account {}: price must not be negative",
                self.account_name
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn profile() -> AccountProfile {
        AccountProfile {
            service_name: "onlineStore".to_string(),
            account_name: "acc-1".to_string(),
            parallel_requests: 10,
            rate_limit_per_sec: 5,
            price: dec!(30),
            average_processing_time: Duration::from_millis(1000),
            enabled: true,
        }
    }

    #[test]
    fn test_amount_validation() {
        assert!(Amount::new(dec!(1.0)).is_ok());
        assert!(matches!(
            Amount::new(dec!(0.0)),
            Err(PaymentError::ValidationError(_))
        ));
        assert!(matches!(
            Amount::new(dec!(-1.0)),
            Err(PaymentError::ValidationError(_))
        ));
    }

    #[test]
    fn test_amount_display_is_normalized() {
        let amount = Amount::new(dec!(100.00)).unwrap();
        assert_eq!(amount.to_string(), "100");
    }

    #[test]
    fn test_profile_deserialization() {
        let json = r#"{
            "serviceName": "onlineStore",
            "accountName": "acc-19",
            "parallelRequests": 8,
            "rateLimitPerSec": 5,
            "price": 30,
            "averageProcessingTime": 1200,
            "enabled": false
        }"#;

        let profile: AccountProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.account_name, "acc-19");
        assert_eq!(profile.parallel_requests, 8);
        assert_eq!(profile.rate_limit_per_sec, 5);
        assert_eq!(profile.price, dec!(30));
        assert_eq!(profile.average_processing_time, Duration::from_millis(1200));
        assert!(!profile.enabled);
    }

    #[test]
    fn test_profile_enabled_defaults_to_true() {
        let json = r#"{
            "serviceName": "onlineStore",
            "accountName": "acc-20",
            "parallelRequests": 8,
            "rateLimitPerSec": 5,
            "price": 30,
            "averageProcessingTime": 1200
        }"#;

        let profile: AccountProfile = serde_json::from_str(json).unwrap();
        assert!(profile.enabled);
    }

    #[test]
    fn test_profile_validation() {
        assert!(profile().validate().is_ok());

        let mut zero_rate = profile();
        zero_rate.rate_limit_per_sec = 0;
        assert!(matches!(
            zero_rate.validate(),
            Err(PaymentError::InvalidConfig(_))
        ));

        let mut zero_parallel = profile();
        zero_parallel.parallel_requests = 0;
        assert!(matches!(
            zero_parallel.validate(),
            Err(PaymentError::InvalidConfig(_))
        ));
    }
}
