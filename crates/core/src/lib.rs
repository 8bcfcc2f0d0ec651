//! Ledgerline core: domain models, repository contracts, the local-first
//! replication engine and statement reconciliation.
//!
//! This crate owns no I/O. Storage lives in `ledgerline-storage-sqlite` and the
//! remote transport in `ledgerline-remote-store`; both plug in through the
//! traits declared here.

pub mod accounts;
pub mod budgets;
pub mod categories;
pub mod errors;
pub mod profile;
pub mod reconciliation;
pub mod statements;
pub mod sync;
pub mod transactions;

pub use errors::{Error, Result};
