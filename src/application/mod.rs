//! Application layer orchestrating payments against provider accounts.
//!
//! `PaymentExternalSystemAdapter` drives the attempts of a single account and
//! `OrderPaymentService` routes newly created payments to an adapter.

pub mod adapter;
pub mod service;

pub use adapter::{AttemptFailure, PaymentExternalSystemAdapter, PaymentOutcome};
pub use service::OrderPaymentService;
