use async_trait::async_trait;
use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::SqliteConnection;
use std::sync::Arc;

use ledgerline_core::statements::{
    NewStatementSnapshot, StatementSnapshot, StatementSnapshotRepositoryTrait,
};
use ledgerline_core::sync::{SyncOperation, SyncTable};
use ledgerline_core::Result;

use super::model::StatementSnapshotDB;
use crate::db::{get_connection, now_timestamp, WriteHandle};
use crate::errors::StorageError;
use crate::schema::statement_snapshots;
use crate::schema::statement_snapshots::dsl::*;
use crate::sync::{write_outbox_event, OutboxWriteRequest};

pub struct StatementSnapshotRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl StatementSnapshotRepository {
    pub fn new(
        pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
        writer: WriteHandle,
    ) -> Self {
        StatementSnapshotRepository { pool, writer }
    }
}

pub(crate) fn delete_snapshots_for_account(
    conn: &mut SqliteConnection,
    account: &str,
) -> Result<usize> {
    let ids = statement_snapshots
        .filter(account_id.eq(account))
        .select(id)
        .load::<String>(conn)
        .map_err(StorageError::from)?;
    for snapshot_id in &ids {
        diesel::delete(statement_snapshots.find(snapshot_id))
            .execute(conn)
            .map_err(StorageError::from)?;
        write_outbox_event(
            conn,
            OutboxWriteRequest::delete(SyncTable::StatementSnapshots, snapshot_id.clone()),
        )?;
    }
    Ok(ids.len())
}

#[async_trait]
impl StatementSnapshotRepositoryTrait for StatementSnapshotRepository {
    fn get_snapshot(&self, snapshot_id: &str) -> Result<StatementSnapshot> {
        let mut conn = get_connection(&self.pool)?;
        let snapshot_db = statement_snapshots
            .find(snapshot_id)
            .first::<StatementSnapshotDB>(&mut conn)
            .map_err(StorageError::from)?;
        StatementSnapshot::try_from(snapshot_db)
    }

    fn list_snapshots_for_account(&self, account: &str) -> Result<Vec<StatementSnapshot>> {
        let mut conn = get_connection(&self.pool)?;
        statement_snapshots
            .filter(account_id.eq(account))
            .order((period_to.desc(), created_at.desc()))
            .load::<StatementSnapshotDB>(&mut conn)
            .map_err(StorageError::from)?
            .into_iter()
            .map(StatementSnapshot::try_from)
            .collect()
    }

    async fn save_snapshot(&self, snapshot: NewStatementSnapshot) -> Result<StatementSnapshot> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<StatementSnapshot> {
                let now = now_timestamp();
                let incoming = StatementSnapshotDB::from_new(snapshot, &now)?;
                let existing = statement_snapshots
                    .find(&incoming.id)
                    .first::<StatementSnapshotDB>(conn)
                    .optional()
                    .map_err(StorageError::from)?;

                let Some(existing) = existing else {
                    diesel::insert_into(statement_snapshots::table)
                        .values(&incoming)
                        .execute(conn)
                        .map_err(StorageError::from)?;
                    write_outbox_event(
                        conn,
                        OutboxWriteRequest::new(
                            SyncTable::StatementSnapshots,
                            incoming.id.clone(),
                            SyncOperation::Insert,
                            serde_json::to_value(&incoming)?,
                        ),
                    )?;
                    return StatementSnapshot::try_from(incoming);
                };

                let refreshed = StatementSnapshotDB {
                    created_at: existing.created_at.clone(),
                    ..incoming
                };
                let unchanged = StatementSnapshotDB {
                    updated_at: refreshed.updated_at.clone(),
                    ..existing.clone()
                } == refreshed;
                if unchanged {
                    return StatementSnapshot::try_from(existing);
                }
                diesel::update(statement_snapshots.find(&existing.id))
                    .set(&refreshed)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                write_outbox_event(
                    conn,
                    OutboxWriteRequest::update(
                        SyncTable::StatementSnapshots,
                        existing.id.clone(),
                        &serde_json::to_value(&existing)?,
                        &serde_json::to_value(&refreshed)?,
                    ),
                )?;
                StatementSnapshot::try_from(refreshed)
            })
            .await
    }
}
