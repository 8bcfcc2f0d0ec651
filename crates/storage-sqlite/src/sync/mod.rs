//! SQLite storage for the replication engine: outbox, high-water marks and
//! engine bookkeeping.

mod model;
mod outbox;
mod repository;

pub use model::{NewSyncOutboxEntryDB, SyncEngineStateDB, SyncHighWaterMarkDB, SyncOutboxEntryDB};
pub use outbox::{changed_fields, has_pending_outbox, write_outbox_event, OutboxWriteRequest};
pub use repository::SyncRepository;

#[cfg(test)]
mod tests;
