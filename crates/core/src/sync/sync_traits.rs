use async_trait::async_trait;
use chrono::NaiveDateTime;

use super::sync_model::{
    HighWaterMark, MarkSyncedOutcome, OutboxEntry, PageApplyResult, SyncEngineStatus, SyncTable,
};
use super::sync_row::SyncRow;
use crate::errors::Result;

/// Local persistence used by the push and pull engines. The outbox and marks
/// are private to the replication engine; domain repositories only append to
/// the outbox through their own write transactions.
#[async_trait]
pub trait SyncRepositoryTrait: Send + Sync {
    /// Pending entries whose retry is due, FIFO by sequence, strictly after `after_seq`.
    fn list_due_outbox(&self, after_seq: i64, limit: i64) -> Result<Vec<OutboxEntry>>;

    fn count_pending_outbox(&self) -> Result<i64>;

    /// Earliest scheduled retry among pending entries.
    fn next_outbox_retry_at(&self) -> Result<Option<NaiveDateTime>>;

    /// Marks the entry synced only if it still carries `revision`. A newer
    /// revision stays pending; a delivered INSERT becomes an UPDATE.
    async fn mark_outbox_synced(&self, seq: i64, revision: i32) -> Result<MarkSyncedOutcome>;

    async fn schedule_outbox_retry(
        &self,
        seq: i64,
        backoff_seconds: i64,
        last_error: String,
        last_error_code: String,
    ) -> Result<()>;

    fn get_high_water_mark(&self, table: SyncTable) -> Result<Option<HighWaterMark>>;

    fn list_high_water_marks(&self) -> Result<Vec<HighWaterMark>>;

    /// Upserts the page and advances the table mark in one transaction.
    /// Rows with a pending outbox entry are left alone. The mark never moves backwards.
    async fn apply_pulled_page(
        &self,
        table: SyncTable,
        rows: Vec<SyncRow>,
        advance_mark_to: Option<NaiveDateTime>,
    ) -> Result<PageApplyResult>;

    fn get_engine_status(&self) -> Result<SyncEngineStatus>;

    async fn mark_push_completed(&self) -> Result<()>;

    async fn mark_pull_completed(&self) -> Result<()>;

    async fn mark_engine_error(&self, message: String) -> Result<()>;

    async fn mark_cycle_outcome(&self, status: String, duration_ms: i64) -> Result<()>;
}
