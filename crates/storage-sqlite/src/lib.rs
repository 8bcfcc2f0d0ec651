//! SQLite storage for Ledgerline.
//!
//! Repositories read through an r2d2 pool and write through a single writer
//! thread, so each domain mutation commits together with its outbox entry.

pub mod accounts;
pub mod budgets;
pub mod categories;
pub mod db;
pub mod errors;
pub mod profile;
pub mod schema;
pub mod statements;
pub mod sync;
pub mod transactions;

#[cfg(test)]
pub(crate) mod test_support;

pub use accounts::AccountRepository;
pub use budgets::BudgetRepository;
pub use categories::CategoryRepository;
pub use db::{create_pool, get_connection, init, run_migrations, spawn_writer, DbPool, WriteHandle};
pub use errors::StorageError;
pub use profile::ProfileRepository;
pub use statements::StatementSnapshotRepository;
pub use sync::SyncRepository;
pub use transactions::TransactionRepository;
