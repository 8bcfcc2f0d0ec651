//! Outbox writes with per-record coalescing.
//!
//! Repositories call [`write_outbox_event`] on the writer connection right
//! after touching a domain row, so the row and its outbox mutation share a
//! transaction. Coalescing keeps at most one pending INSERT and one pending
//! UPDATE per record:
//!
//! - INSERT appends the full row.
//! - UPDATE folds the changed columns into a pending INSERT, else into a
//!   pending UPDATE, else appends an UPDATE with just those columns.
//! - DELETE of a record whose INSERT never synced drops its pending entries
//!   (net zero); otherwise it drops any pending UPDATE and appends a DELETE.

use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use log::debug;
use serde_json::{Map, Value};

use ledgerline_core::errors::{Error, Result};
use ledgerline_core::sync::{OutboxEntry, SyncOperation, SyncTable};

use super::model::{NewSyncOutboxEntryDB, SyncOutboxEntryDB};
use crate::db::{now_timestamp, parse_db_timestamp};
use crate::errors::StorageError;
use crate::schema::sync_outbox;

#[derive(Debug, Clone)]
pub struct OutboxWriteRequest {
    pub table: SyncTable,
    pub record_id: String,
    pub op: SyncOperation,
    /// Full row for INSERT, changed columns for UPDATE.
    pub payload: Value,
}

impl OutboxWriteRequest {
    pub fn new(
        table: SyncTable,
        record_id: impl Into<String>,
        op: SyncOperation,
        payload: Value,
    ) -> Self {
        Self {
            table,
            record_id: record_id.into(),
            op,
            payload,
        }
    }

    /// UPDATE carrying only the columns that differ between two serialized rows.
    pub fn update(
        table: SyncTable,
        record_id: impl Into<String>,
        before: &Value,
        after: &Value,
    ) -> Self {
        Self::new(
            table,
            record_id,
            SyncOperation::Update,
            changed_fields(before, after),
        )
    }

    pub fn delete(table: SyncTable, record_id: impl Into<String>) -> Self {
        let record_id = record_id.into();
        let payload = serde_json::json!({ "id": record_id });
        Self::new(table, record_id, SyncOperation::Delete, payload)
    }
}

/// Columns of `after` whose value differs from `before`.
pub fn changed_fields(before: &Value, after: &Value) -> Value {
    let empty = Map::new();
    let before = before.as_object().unwrap_or(&empty);
    let changed: Map<String, Value> = after
        .as_object()
        .map(|fields| {
            fields
                .iter()
                .filter(|(key, value)| before.get(*key) != Some(*value))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect()
        })
        .unwrap_or_default();
    Value::Object(changed)
}

/// Records a mutation in the outbox. Returns the sequence of the entry that
/// now carries it, or `None` when nothing is left pending for the record.
pub fn write_outbox_event(
    conn: &mut SqliteConnection,
    request: OutboxWriteRequest,
) -> Result<Option<i64>> {
    let pending = load_pending_for_record(conn, request.table, &request.record_id)?;
    let pending_insert = pending
        .iter()
        .find(|entry| entry.op == SyncOperation::Insert.as_str());
    let pending_update = pending
        .iter()
        .find(|entry| entry.op == SyncOperation::Update.as_str());
    let pending_delete = pending
        .iter()
        .find(|entry| entry.op == SyncOperation::Delete.as_str());

    match request.op {
        SyncOperation::Insert => match pending_insert {
            Some(entry) => merge_into(conn, entry, &request.payload).map(Some),
            None => append(conn, &request).map(Some),
        },
        SyncOperation::Update => {
            let is_empty = request
                .payload
                .as_object()
                .map(Map::is_empty)
                .unwrap_or(true);
            match pending_insert.or(pending_update) {
                Some(entry) if is_empty => Ok(Some(entry.seq)),
                Some(entry) => merge_into(conn, entry, &request.payload).map(Some),
                None if is_empty => Ok(None),
                None => append(conn, &request).map(Some),
            }
        }
        SyncOperation::Delete => {
            let superseded: Vec<i64> = pending_insert
                .iter()
                .chain(pending_update.iter())
                .map(|entry| entry.seq)
                .collect();
            if !superseded.is_empty() {
                diesel::delete(sync_outbox::table.filter(sync_outbox::seq.eq_any(&superseded)))
                    .execute(conn)
                    .map_err(StorageError::from)?;
            }
            if pending_insert.is_some() {
                debug!(
                    "[Outbox] {} {} never synced, dropped its pending entries",
                    request.table, request.record_id
                );
                return Ok(pending_delete.map(|entry| entry.seq));
            }
            append(conn, &request).map(Some)
        }
    }
}

/// True while any unsynced entry exists for the record.
pub fn has_pending_outbox(
    conn: &mut SqliteConnection,
    table: SyncTable,
    record_id: &str,
) -> Result<bool> {
    let count: i64 = sync_outbox::table
        .filter(sync_outbox::table_name.eq(table.as_str()))
        .filter(sync_outbox::record_id.eq(record_id))
        .filter(sync_outbox::synced_at.is_null())
        .count()
        .get_result(conn)
        .map_err(StorageError::from)?;
    Ok(count > 0)
}

fn load_pending_for_record(
    conn: &mut SqliteConnection,
    table: SyncTable,
    record_id: &str,
) -> Result<Vec<SyncOutboxEntryDB>> {
    Ok(sync_outbox::table
        .filter(sync_outbox::table_name.eq(table.as_str()))
        .filter(sync_outbox::record_id.eq(record_id))
        .filter(sync_outbox::synced_at.is_null())
        .order(sync_outbox::seq.asc())
        .select(SyncOutboxEntryDB::as_select())
        .load::<SyncOutboxEntryDB>(conn)
        .map_err(StorageError::from)?)
}

fn append(conn: &mut SqliteConnection, request: &OutboxWriteRequest) -> Result<i64> {
    let row = NewSyncOutboxEntryDB {
        table_name: request.table.as_str().to_string(),
        record_id: request.record_id.clone(),
        op: request.op.as_str().to_string(),
        payload: serde_json::to_string(&request.payload)?,
        revision: 1,
        retry_count: 0,
        created_at: now_timestamp(),
    };
    let seq = diesel::insert_into(sync_outbox::table)
        .values(&row)
        .returning(sync_outbox::seq)
        .get_result::<i64>(conn)
        .map_err(StorageError::from)?;
    debug!(
        "[Outbox] seq={} {} {} {}",
        seq, row.op, row.table_name, row.record_id
    );
    Ok(seq)
}

fn merge_into(conn: &mut SqliteConnection, entry: &SyncOutboxEntryDB, fields: &Value) -> Result<i64> {
    let mut payload: Value = serde_json::from_str(&entry.payload)?;
    if let (Some(target), Some(fields)) = (payload.as_object_mut(), fields.as_object()) {
        for (key, value) in fields {
            target.insert(key.clone(), value.clone());
        }
    }
    diesel::update(sync_outbox::table.find(entry.seq))
        .set((
            sync_outbox::payload.eq(serde_json::to_string(&payload)?),
            sync_outbox::revision.eq(entry.revision + 1),
        ))
        .execute(conn)
        .map_err(StorageError::from)?;
    debug!(
        "[Outbox] merged into seq={} {} {} (revision {})",
        entry.seq,
        entry.op,
        entry.record_id,
        entry.revision + 1
    );
    Ok(entry.seq)
}

pub(crate) fn to_outbox_entry(row: SyncOutboxEntryDB) -> Result<OutboxEntry> {
    Ok(OutboxEntry {
        seq: row.seq,
        table: row.table_name.parse()?,
        record_id: row.record_id,
        op: row.op.parse()?,
        payload: serde_json::from_str(&row.payload).map_err(Error::from)?,
        revision: row.revision,
        retry_count: row.retry_count,
        next_retry_at: row
            .next_retry_at
            .as_deref()
            .map(parse_db_timestamp)
            .transpose()?,
        last_error: row.last_error,
        last_error_code: row.last_error_code,
        created_at: parse_db_timestamp(&row.created_at)?,
        synced_at: row.synced_at.as_deref().map(parse_db_timestamp).transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn changed_fields_keeps_only_differences() {
        let before = json!({ "id": "a", "name": "Old", "notes": null, "amount": "10" });
        let after = json!({ "id": "a", "name": "New", "notes": "hi", "amount": "10" });
        assert_eq!(
            changed_fields(&before, &after),
            json!({ "name": "New", "notes": "hi" })
        );
        assert_eq!(changed_fields(&after, &after), json!({}));
    }
}
