//! PostgREST client implementing the Ledgerline `RemoteStore` contract.

mod client;
mod config;
mod error;

pub use client::RemoteStoreClient;
pub use config::{RemoteStoreConfig, DEFAULT_SCHEMA, DEFAULT_TIMEOUT_SECS};
pub use error::{RemoteStoreClientError, Result};
