mod model;
mod repository;

pub use model::StatementSnapshotDB;
pub use repository::StatementSnapshotRepository;
pub(crate) use repository::delete_snapshots_for_account;
