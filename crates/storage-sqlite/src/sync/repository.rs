use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::SqliteConnection;
use log::{debug, warn};
use std::sync::Arc;

use ledgerline_core::errors::Result;
use ledgerline_core::sync::{
    HighWaterMark, MarkSyncedOutcome, OutboxEntry, PageApplyResult, SyncEngineStatus,
    SyncOperation, SyncRepositoryTrait, SyncRow, SyncTable,
};

use super::model::{SyncEngineStateDB, SyncHighWaterMarkDB, SyncOutboxEntryDB};
use super::outbox::{has_pending_outbox, to_outbox_entry};
use crate::accounts::AccountDB;
use crate::budgets::BudgetDB;
use crate::categories::CategoryDB;
use crate::db::{format_timestamp, get_connection, now_timestamp, parse_db_timestamp, WriteHandle};
use crate::errors::StorageError;
use crate::profile::ProfileDB;
use crate::schema::{
    accounts, budgets, categories, profiles, statement_snapshots, sync_engine_state,
    sync_high_water_marks, sync_outbox, transactions,
};
use crate::statements::StatementSnapshotDB;
use crate::transactions::TransactionDB;

const ENGINE_STATE_ID: i32 = 1;

pub struct SyncRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl SyncRepository {
    pub fn new(
        pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
        writer: WriteHandle,
    ) -> Self {
        Self { pool, writer }
    }
}

fn to_high_water_mark(row: SyncHighWaterMarkDB) -> Result<HighWaterMark> {
    Ok(HighWaterMark {
        table: row.table_name.parse()?,
        last_synced_at: parse_db_timestamp(&row.last_synced_at)?,
        updated_at: parse_db_timestamp(&row.updated_at)?,
    })
}

/// Another local row already owns this idempotency key, e.g. the same
/// statement imported independently on two devices.
fn idempotency_key_taken(conn: &mut SqliteConnection, row: &TransactionDB) -> Result<bool> {
    let owner = transactions::table
        .filter(transactions::idempotency_key.eq(&row.idempotency_key))
        .filter(transactions::id.ne(&row.id))
        .select(transactions::id)
        .first::<String>(conn)
        .optional()
        .map_err(StorageError::from)?;
    Ok(owner.is_some())
}

fn account_exists(conn: &mut SqliteConnection, account_id: &str) -> Result<bool> {
    Ok(diesel::select(diesel::dsl::exists(accounts::table.find(account_id)))
        .get_result::<bool>(conn)
        .map_err(StorageError::from)?)
}

fn category_exists(conn: &mut SqliteConnection, category_id: &str) -> Result<bool> {
    Ok(diesel::select(diesel::dsl::exists(categories::table.find(category_id)))
        .get_result::<bool>(conn)
        .map_err(StorageError::from)?)
}

/// Names the first parent row a pulled row references that is not stored locally.
fn missing_parent(conn: &mut SqliteConnection, row: &SyncRow) -> Result<Option<String>> {
    let missing = match row {
        SyncRow::Profile(_) | SyncRow::Account(_) | SyncRow::Category(_) => None,
        SyncRow::Budget(budget) => (!category_exists(conn, &budget.category_id)?)
            .then(|| format!("category {}", budget.category_id)),
        SyncRow::StatementSnapshot(snapshot) => (!account_exists(conn, &snapshot.account_id)?)
            .then(|| format!("account {}", snapshot.account_id)),
        SyncRow::Transaction(transaction) => {
            if !account_exists(conn, &transaction.account_id)? {
                Some(format!("account {}", transaction.account_id))
            } else {
                match &transaction.category_id {
                    Some(category) if !category_exists(conn, category)? => {
                        Some(format!("category {}", category))
                    }
                    _ => None,
                }
            }
        }
    };
    Ok(missing)
}

enum UpsertOutcome {
    Applied,
    DuplicateKey,
}

/// Writes a pulled row over the local one without touching the outbox.
fn upsert_row(conn: &mut SqliteConnection, row: SyncRow) -> Result<UpsertOutcome> {
    match row {
        SyncRow::Profile(profile) => {
            let db = ProfileDB::from(profile);
            diesel::insert_into(profiles::table)
                .values(&db)
                .on_conflict(profiles::id)
                .do_update()
                .set(&db)
                .execute(conn)
                .map_err(StorageError::from)?;
        }
        SyncRow::Account(account) => {
            let db = AccountDB::from(account);
            diesel::insert_into(accounts::table)
                .values(&db)
                .on_conflict(accounts::id)
                .do_update()
                .set(&db)
                .execute(conn)
                .map_err(StorageError::from)?;
        }
        SyncRow::Category(category) => {
            let db = CategoryDB::from(category);
            diesel::insert_into(categories::table)
                .values(&db)
                .on_conflict(categories::id)
                .do_update()
                .set(&db)
                .execute(conn)
                .map_err(StorageError::from)?;
        }
        SyncRow::Budget(budget) => {
            let db = BudgetDB::from(budget);
            diesel::insert_into(budgets::table)
                .values(&db)
                .on_conflict(budgets::id)
                .do_update()
                .set(&db)
                .execute(conn)
                .map_err(StorageError::from)?;
        }
        SyncRow::StatementSnapshot(snapshot) => {
            let db = StatementSnapshotDB::try_from(snapshot)?;
            diesel::insert_into(statement_snapshots::table)
                .values(&db)
                .on_conflict(statement_snapshots::id)
                .do_update()
                .set(&db)
                .execute(conn)
                .map_err(StorageError::from)?;
        }
        SyncRow::Transaction(transaction) => {
            let db = TransactionDB::from(transaction);
            if idempotency_key_taken(conn, &db)? {
                warn!(
                    "[Sync] Pulled transaction {} shares idempotency key {} with a local row; skipped",
                    db.id, db.idempotency_key
                );
                return Ok(UpsertOutcome::DuplicateKey);
            }
            diesel::insert_into(transactions::table)
                .values(&db)
                .on_conflict(transactions::id)
                .do_update()
                .set(&db)
                .execute(conn)
                .map_err(StorageError::from)?;
        }
    }
    Ok(UpsertOutcome::Applied)
}

/// Moves the table's mark forward to `candidate`; an older candidate is ignored.
fn advance_mark(conn: &mut SqliteConnection, table: SyncTable, candidate: NaiveDateTime) -> Result<()> {
    let current = sync_high_water_marks::table
        .find(table.as_str())
        .first::<SyncHighWaterMarkDB>(conn)
        .optional()
        .map_err(StorageError::from)?;
    if let Some(current) = &current {
        if parse_db_timestamp(&current.last_synced_at)? >= candidate {
            return Ok(());
        }
    }
    let row = SyncHighWaterMarkDB {
        table_name: table.as_str().to_string(),
        last_synced_at: format_timestamp(candidate),
        updated_at: now_timestamp(),
    };
    diesel::insert_into(sync_high_water_marks::table)
        .values(&row)
        .on_conflict(sync_high_water_marks::table_name)
        .do_update()
        .set(&row)
        .execute(conn)
        .map_err(StorageError::from)?;
    Ok(())
}

#[async_trait]
impl SyncRepositoryTrait for SyncRepository {
    fn list_due_outbox(&self, after_seq: i64, limit: i64) -> Result<Vec<OutboxEntry>> {
        let mut conn = get_connection(&self.pool)?;
        let now = now_timestamp();
        sync_outbox::table
            .filter(sync_outbox::synced_at.is_null())
            .filter(sync_outbox::seq.gt(after_seq))
            .filter(
                sync_outbox::next_retry_at
                    .is_null()
                    .or(sync_outbox::next_retry_at.le(now)),
            )
            .order(sync_outbox::seq.asc())
            .limit(limit)
            .select(SyncOutboxEntryDB::as_select())
            .load::<SyncOutboxEntryDB>(&mut conn)
            .map_err(StorageError::from)?
            .into_iter()
            .map(to_outbox_entry)
            .collect()
    }

    fn count_pending_outbox(&self) -> Result<i64> {
        let mut conn = get_connection(&self.pool)?;
        Ok(sync_outbox::table
            .filter(sync_outbox::synced_at.is_null())
            .count()
            .get_result::<i64>(&mut conn)
            .map_err(StorageError::from)?)
    }

    fn next_outbox_retry_at(&self) -> Result<Option<NaiveDateTime>> {
        let mut conn = get_connection(&self.pool)?;
        let earliest = sync_outbox::table
            .filter(sync_outbox::synced_at.is_null())
            .select(diesel::dsl::min(sync_outbox::next_retry_at))
            .first::<Option<String>>(&mut conn)
            .map_err(StorageError::from)?;
        earliest.as_deref().map(parse_db_timestamp).transpose()
    }

    async fn mark_outbox_synced(&self, seq: i64, revision: i32) -> Result<MarkSyncedOutcome> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<MarkSyncedOutcome> {
                let Some(entry) = sync_outbox::table
                    .find(seq)
                    .select(SyncOutboxEntryDB::as_select())
                    .first::<SyncOutboxEntryDB>(conn)
                    .optional()
                    .map_err(StorageError::from)?
                else {
                    return Ok(MarkSyncedOutcome::Missing);
                };
                if entry.synced_at.is_some() {
                    return Ok(MarkSyncedOutcome::Synced);
                }

                if entry.revision == revision {
                    diesel::update(sync_outbox::table.find(seq))
                        .set((
                            sync_outbox::synced_at.eq(Some(now_timestamp())),
                            sync_outbox::next_retry_at.eq::<Option<String>>(None),
                            sync_outbox::last_error.eq::<Option<String>>(None),
                            sync_outbox::last_error_code.eq::<Option<String>>(None),
                        ))
                        .execute(conn)
                        .map_err(StorageError::from)?;
                    return Ok(MarkSyncedOutcome::Synced);
                }

                // The row now exists remotely, so the merged payload goes out as an UPDATE.
                if entry.op == SyncOperation::Insert.as_str() {
                    diesel::update(sync_outbox::table.find(seq))
                        .set(sync_outbox::op.eq(SyncOperation::Update.as_str()))
                        .execute(conn)
                        .map_err(StorageError::from)?;
                }
                debug!(
                    "[Sync] seq={} changed in flight (revision {} -> {}), requeued",
                    seq, revision, entry.revision
                );
                Ok(MarkSyncedOutcome::Requeued)
            })
            .await
    }

    async fn schedule_outbox_retry(
        &self,
        seq: i64,
        backoff_seconds: i64,
        last_error: String,
        last_error_code: String,
    ) -> Result<()> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                let retry_at = format_timestamp(
                    Utc::now().naive_utc() + Duration::seconds(backoff_seconds.max(0)),
                );
                diesel::update(sync_outbox::table.find(seq))
                    .set((
                        sync_outbox::retry_count.eq(sync_outbox::retry_count + 1),
                        sync_outbox::next_retry_at.eq(Some(retry_at)),
                        sync_outbox::last_error.eq(Some(last_error)),
                        sync_outbox::last_error_code.eq(Some(last_error_code)),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    fn get_high_water_mark(&self, table: SyncTable) -> Result<Option<HighWaterMark>> {
        let mut conn = get_connection(&self.pool)?;
        sync_high_water_marks::table
            .find(table.as_str())
            .first::<SyncHighWaterMarkDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?
            .map(to_high_water_mark)
            .transpose()
    }

    fn list_high_water_marks(&self) -> Result<Vec<HighWaterMark>> {
        let mut conn = get_connection(&self.pool)?;
        sync_high_water_marks::table
            .order(sync_high_water_marks::table_name.asc())
            .load::<SyncHighWaterMarkDB>(&mut conn)
            .map_err(StorageError::from)?
            .into_iter()
            .map(to_high_water_mark)
            .collect()
    }

    async fn apply_pulled_page(
        &self,
        table: SyncTable,
        rows: Vec<SyncRow>,
        advance_mark_to: Option<NaiveDateTime>,
    ) -> Result<PageApplyResult> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<PageApplyResult> {
                let mut result = PageApplyResult::default();
                for row in rows {
                    if row.table() != table {
                        warn!(
                            "[Sync] Dropping {} row {} delivered on the {} page",
                            row.table(),
                            row.id(),
                            table
                        );
                        continue;
                    }
                    if has_pending_outbox(conn, table, row.id())? {
                        debug!("[Sync] {} {} has local changes pending, skipped", table, row.id());
                        result.skipped_pending += 1;
                        continue;
                    }
                    if let Some(parent) = missing_parent(conn, &row)? {
                        warn!(
                            "[Sync] Pulled {} {} references missing {}; skipped",
                            table,
                            row.id(),
                            parent
                        );
                        result.skipped_orphans += 1;
                        continue;
                    }
                    if let UpsertOutcome::Applied = upsert_row(conn, row)? {
                        result.applied += 1;
                    }
                }
                if let Some(candidate) = advance_mark_to {
                    advance_mark(conn, table, candidate)?;
                }
                Ok(result)
            })
            .await
    }

    fn get_engine_status(&self) -> Result<SyncEngineStatus> {
        let pending_outbox_count = self.count_pending_outbox()?;
        let mut conn = get_connection(&self.pool)?;
        let engine = sync_engine_state::table
            .find(ENGINE_STATE_ID)
            .first::<SyncEngineStateDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        let Some(engine) = engine else {
            return Ok(SyncEngineStatus {
                pending_outbox_count,
                ..SyncEngineStatus::default()
            });
        };

        Ok(SyncEngineStatus {
            last_push_at: engine.last_push_at.as_deref().map(parse_db_timestamp).transpose()?,
            last_pull_at: engine.last_pull_at.as_deref().map(parse_db_timestamp).transpose()?,
            last_error: engine.last_error,
            consecutive_failures: engine.consecutive_failures,
            last_cycle_status: engine.last_cycle_status,
            last_cycle_duration_ms: engine.last_cycle_duration_ms,
            pending_outbox_count,
        })
    }

    async fn mark_push_completed(&self) -> Result<()> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                let now = now_timestamp();
                diesel::insert_into(sync_engine_state::table)
                    .values(SyncEngineStateDB {
                        last_push_at: Some(now.clone()),
                        ..SyncEngineStateDB::initial()
                    })
                    .on_conflict(sync_engine_state::id)
                    .do_update()
                    .set((
                        sync_engine_state::last_push_at.eq(Some(now)),
                        sync_engine_state::last_error.eq::<Option<String>>(None),
                        sync_engine_state::consecutive_failures.eq(0),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn mark_pull_completed(&self) -> Result<()> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                let now = now_timestamp();
                diesel::insert_into(sync_engine_state::table)
                    .values(SyncEngineStateDB {
                        last_pull_at: Some(now.clone()),
                        ..SyncEngineStateDB::initial()
                    })
                    .on_conflict(sync_engine_state::id)
                    .do_update()
                    .set((
                        sync_engine_state::last_pull_at.eq(Some(now)),
                        sync_engine_state::last_error.eq::<Option<String>>(None),
                        sync_engine_state::consecutive_failures.eq(0),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn mark_engine_error(&self, message: String) -> Result<()> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                diesel::insert_into(sync_engine_state::table)
                    .values(SyncEngineStateDB {
                        last_error: Some(message.clone()),
                        consecutive_failures: 1,
                        ..SyncEngineStateDB::initial()
                    })
                    .on_conflict(sync_engine_state::id)
                    .do_update()
                    .set((
                        sync_engine_state::last_error.eq(Some(message)),
                        sync_engine_state::consecutive_failures
                            .eq(sync_engine_state::consecutive_failures + 1),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn mark_cycle_outcome(&self, status: String, duration_ms: i64) -> Result<()> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                diesel::insert_into(sync_engine_state::table)
                    .values(SyncEngineStateDB {
                        last_cycle_status: Some(status.clone()),
                        last_cycle_duration_ms: Some(duration_ms),
                        ..SyncEngineStateDB::initial()
                    })
                    .on_conflict(sync_engine_state::id)
                    .do_update()
                    .set((
                        sync_engine_state::last_cycle_status.eq(Some(status)),
                        sync_engine_state::last_cycle_duration_ms.eq(Some(duration_ms)),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }
}
