//! Domain layer: value types, the payment aggregate and the ports the
//! application layer talks to.

pub mod account;
pub mod payment;
pub mod ports;
