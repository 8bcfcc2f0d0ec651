//! In-memory fakes for exercising the replication engine without a network.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::remote_store::{RemoteError, RemoteFilter, RemoteStore, SessionProvider};
use super::sync_model::{SyncOperation, SyncTable};
use super::sync_row::{remote_row_id, remote_updated_at};

/// One call observed by [`InMemoryRemoteStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCall {
    pub op: SyncOperation,
    pub table: SyncTable,
    pub id: String,
    pub payload: Value,
}

/// Remote store backed by ordered maps, with scripted failures.
#[derive(Default)]
pub struct InMemoryRemoteStore {
    tables: Mutex<BTreeMap<SyncTable, BTreeMap<String, Value>>>,
    failures: Mutex<VecDeque<RemoteError>>,
    calls: Mutex<Vec<RemoteCall>>,
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores rows as if another device had pushed them.
    pub fn seed(&self, table: SyncTable, rows: Vec<Value>) {
        let mut tables = lock(&self.tables);
        let target = tables.entry(table).or_default();
        for row in rows {
            if let Some(id) = remote_row_id(&row) {
                target.insert(id, row);
            }
        }
    }

    pub fn row(&self, table: SyncTable, id: &str) -> Option<Value> {
        lock(&self.tables)
            .get(&table)
            .and_then(|rows| rows.get(id).cloned())
    }

    pub fn rows(&self, table: SyncTable) -> Vec<Value> {
        lock(&self.tables)
            .get(&table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    /// The next write call fails with `err`. Queued failures apply in order.
    pub fn fail_next(&self, err: RemoteError) {
        lock(&self.failures).push_back(err);
    }

    /// Write calls observed so far, in order.
    pub fn calls(&self) -> Vec<RemoteCall> {
        lock(&self.calls).clone()
    }

    fn record(&self, op: SyncOperation, table: SyncTable, id: &str, payload: &Value) -> Result<(), RemoteError> {
        lock(&self.calls).push(RemoteCall {
            op,
            table,
            id: id.to_string(),
            payload: payload.clone(),
        });
        match lock(&self.failures).pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    async fn select(&self, table: SyncTable, filter: &RemoteFilter) -> Result<Vec<Value>, RemoteError> {
        let tables = lock(&self.tables);
        let mut rows: Vec<Value> = tables
            .get(&table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default();
        rows.retain(|row| filter.admits(remote_updated_at(row), remote_row_id(row).as_deref()));
        rows.sort_by(|a, b| {
            remote_updated_at(a)
                .cmp(&remote_updated_at(b))
                .then_with(|| remote_row_id(a).cmp(&remote_row_id(b)))
        });
        Ok(rows.into_iter().take(filter.limit).collect())
    }

    async fn insert(&self, table: SyncTable, row: &Value) -> Result<(), RemoteError> {
        let id = remote_row_id(row).ok_or_else(|| RemoteError::from_status(400, "row has no id"))?;
        self.record(SyncOperation::Insert, table, &id, row)?;
        lock(&self.tables)
            .entry(table)
            .or_default()
            .insert(id, row.clone());
        Ok(())
    }

    async fn update(&self, table: SyncTable, id: &str, partial: &Value) -> Result<(), RemoteError> {
        self.record(SyncOperation::Update, table, id, partial)?;
        let mut tables = lock(&self.tables);
        if let Some(Value::Object(existing)) = tables.entry(table).or_default().get_mut(id) {
            if let Value::Object(fields) = partial {
                merge_fields(existing, fields);
            }
        }
        Ok(())
    }

    async fn delete(&self, table: SyncTable, id: &str) -> Result<(), RemoteError> {
        self.record(SyncOperation::Delete, table, id, &Value::Null)?;
        lock(&self.tables).entry(table).or_default().remove(id);
        Ok(())
    }
}

/// Session whose presence can be toggled from a test.
pub struct StaticSession {
    token: Mutex<Option<String>>,
}

impl StaticSession {
    pub fn signed_in() -> Self {
        Self {
            token: Mutex::new(Some("test-access-token".to_string())),
        }
    }

    pub fn signed_out() -> Self {
        Self {
            token: Mutex::new(None),
        }
    }

    pub fn set_token(&self, token: Option<String>) {
        *lock(&self.token) = token;
    }
}

#[async_trait]
impl SessionProvider for StaticSession {
    async fn access_token(&self) -> Option<String> {
        lock(&self.token).clone()
    }
}

fn merge_fields(target: &mut Map<String, Value>, fields: &Map<String, Value>) {
    for (key, value) in fields {
        target.insert(key.clone(), value.clone());
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
