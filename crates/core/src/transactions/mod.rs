//! Transactions: models, idempotency fingerprints, repository contract and service.

mod idempotency;
mod transactions_model;
mod transactions_service;
mod transactions_traits;

pub use idempotency::{fingerprint, manual_fingerprint, MANUAL_PROVIDER};
pub use transactions_model::*;
pub use transactions_service::{prepare_new_transaction, TransactionService};
pub use transactions_traits::{TransactionRepositoryTrait, TransactionServiceTrait};
