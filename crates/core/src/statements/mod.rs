//! Bank statement import: snapshots, idempotent inserts and auto-reconciliation.

mod statement_import_service;
mod statements_model;
mod statements_traits;

pub use statement_import_service::StatementImportService;
pub use statements_model::*;
pub use statements_traits::{StatementImportServiceTrait, StatementSnapshotRepositoryTrait};
