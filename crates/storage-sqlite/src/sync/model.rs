//! Database models for the replication control tables.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(
    Queryable,
    Identifiable,
    AsChangeset,
    Selectable,
    Debug,
    Clone,
    Serialize,
    Deserialize,
)]
#[diesel(primary_key(seq))]
#[diesel(table_name = crate::schema::sync_outbox)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SyncOutboxEntryDB {
    pub seq: i64,
    pub table_name: String,
    pub record_id: String,
    pub op: String,
    pub payload: String,
    pub revision: i32,
    pub retry_count: i32,
    pub next_retry_at: Option<String>,
    pub last_error: Option<String>,
    pub last_error_code: Option<String>,
    pub created_at: String,
    pub synced_at: Option<String>,
}

/// Insert form of an outbox entry; `seq` is assigned by SQLite.
#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::sync_outbox)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct NewSyncOutboxEntryDB {
    pub table_name: String,
    pub record_id: String,
    pub op: String,
    pub payload: String,
    pub revision: i32,
    pub retry_count: i32,
    pub created_at: String,
}

#[derive(
    Queryable,
    Identifiable,
    Insertable,
    AsChangeset,
    Selectable,
    Debug,
    Clone,
    Serialize,
    Deserialize,
)]
#[diesel(primary_key(table_name))]
#[diesel(table_name = crate::schema::sync_high_water_marks)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SyncHighWaterMarkDB {
    pub table_name: String,
    pub last_synced_at: String,
    pub updated_at: String,
}

#[derive(
    Queryable,
    Identifiable,
    Insertable,
    AsChangeset,
    Selectable,
    Debug,
    Clone,
    Serialize,
    Deserialize,
)]
#[diesel(table_name = crate::schema::sync_engine_state)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SyncEngineStateDB {
    pub id: i32,
    pub last_push_at: Option<String>,
    pub last_pull_at: Option<String>,
    pub last_error: Option<String>,
    pub consecutive_failures: i32,
    pub last_cycle_status: Option<String>,
    pub last_cycle_duration_ms: Option<i64>,
}

impl SyncEngineStateDB {
    /// Row inserted the first time any engine field is written.
    pub fn initial() -> Self {
        Self {
            id: 1,
            last_push_at: None,
            last_pull_at: None,
            last_error: None,
            consecutive_failures: 0,
            last_cycle_status: None,
            last_cycle_duration_ms: None,
        }
    }
}
