//! Local-first replication: outbox push, high-water-mark pull and the
//! orchestrating service.

mod pull_engine;
mod push_engine;
mod remote_store;
mod sync_config;
mod sync_model;
mod sync_row;
mod sync_service;
mod sync_traits;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use pull_engine::PullEngine;
pub use push_engine::PushEngine;
pub use remote_store::*;
pub use sync_config::*;
pub use sync_model::*;
pub use sync_row::{parse_timestamp, remote_row_id, remote_updated_at, SyncRow, SyncRowError};
pub use sync_service::SyncService;
pub use sync_traits::SyncRepositoryTrait;

#[cfg(test)]
mod tests;
