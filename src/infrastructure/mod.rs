//! Adapters for the domain ports: event stores and the provider client.

pub mod http;
pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
