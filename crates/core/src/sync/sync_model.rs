//! Replication models: replicated tables, outbox entries, marks and cycle status.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result, ValidationError};

/// Tables replicated between the device and the remote store.
///
/// Declaration order is the pull order: parents before children so foreign
/// keys resolve within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTable {
    Profiles,
    Accounts,
    Categories,
    Budgets,
    StatementSnapshots,
    Transactions,
}

/// Fixed dependency order used by `pull_all`.
pub const PULL_ORDER: [SyncTable; 6] = [
    SyncTable::Profiles,
    SyncTable::Accounts,
    SyncTable::Categories,
    SyncTable::Budgets,
    SyncTable::StatementSnapshots,
    SyncTable::Transactions,
];

impl SyncTable {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Profiles => "profiles",
            Self::Accounts => "accounts",
            Self::Categories => "categories",
            Self::Budgets => "budgets",
            Self::StatementSnapshots => "statement_snapshots",
            Self::Transactions => "transactions",
        }
    }

    /// Tables whose rows this table's rows reference.
    pub fn parents(&self) -> &'static [SyncTable] {
        match self {
            Self::Profiles | Self::Accounts | Self::Categories => &[],
            Self::Budgets => &[Self::Categories],
            Self::StatementSnapshots => &[Self::Accounts],
            Self::Transactions => &[Self::Accounts, Self::Categories],
        }
    }
}

impl FromStr for SyncTable {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        PULL_ORDER
            .iter()
            .copied()
            .find(|table| table.as_str() == value)
            .ok_or_else(|| ValidationError::UnsupportedTable(value.to_string()).into())
    }
}

impl fmt::Display for SyncTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncOperation {
    Insert,
    Update,
    Delete,
}

impl SyncOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl FromStr for SyncOperation {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "INSERT" => Ok(Self::Insert),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            other => Err(Error::invalid_input(format!(
                "Unknown sync operation '{}'",
                other
            ))),
        }
    }
}

/// A pending or delivered remote operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxEntry {
    pub seq: i64,
    pub table: SyncTable,
    pub record_id: String,
    pub op: SyncOperation,
    /// Full row for INSERT, changed columns for UPDATE, `{ "id": .. }` for DELETE.
    pub payload: serde_json::Value,
    /// Bumped on every coalescing merge; mark-synced only succeeds on the revision that was sent.
    pub revision: i32,
    pub retry_count: i32,
    pub next_retry_at: Option<NaiveDateTime>,
    pub last_error: Option<String>,
    pub last_error_code: Option<String>,
    pub created_at: NaiveDateTime,
    pub synced_at: Option<NaiveDateTime>,
}

impl OutboxEntry {
    pub fn is_pending(&self) -> bool {
        self.synced_at.is_none()
    }
}

/// Result of a revision-checked mark-synced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkSyncedOutcome {
    Synced,
    /// The entry was merged while in flight and stays pending with the new payload.
    Requeued,
    /// The entry no longer exists (superseded by a local delete).
    Missing,
}

/// Per-table pull position: the newest remote `updated_at` already applied locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighWaterMark {
    pub table: SyncTable,
    pub last_synced_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Outcome of persisting one pulled page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageApplyResult {
    pub applied: usize,
    /// Rows left untouched because a local change is still waiting in the outbox.
    pub skipped_pending: usize,
    /// Rows dropped because the row they reference is not present locally.
    pub skipped_orphans: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    Idle,
    Syncing,
    Error,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Syncing => "SYNCING",
            Self::Error => "ERROR",
        }
    }
}

/// Why a sync request completed without doing any work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncSkipReason {
    AlreadySyncing,
    NoSession,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushReport {
    pub synced: usize,
    pub failed: usize,
    pub requeued: usize,
}

/// Outcome of one pass over every replicated table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullReport {
    pub pulled_counts: BTreeMap<SyncTable, usize>,
    /// Tables whose pull failed; their marks stay where the last applied page left them.
    pub failed_tables: Vec<SyncTable>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub pushed_count: usize,
    pub pulled_counts: BTreeMap<SyncTable, usize>,
    pub failed_push_count: usize,
    pub failed_pull_tables: Vec<SyncTable>,
    pub skipped: Option<SyncSkipReason>,
}

impl SyncReport {
    pub fn skipped(reason: SyncSkipReason) -> Self {
        Self {
            skipped: Some(reason),
            ..Self::default()
        }
    }

    pub fn pulled_total(&self) -> usize {
        self.pulled_counts.values().sum()
    }

    pub fn has_failures(&self) -> bool {
        self.failed_push_count > 0 || !self.failed_pull_tables.is_empty()
    }
}

/// Persisted engine bookkeeping surfaced to the UI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEngineStatus {
    pub last_push_at: Option<NaiveDateTime>,
    pub last_pull_at: Option<NaiveDateTime>,
    pub last_error: Option<String>,
    pub consecutive_failures: i32,
    pub last_cycle_status: Option<String>,
    pub last_cycle_duration_ms: Option<i64>,
    pub pending_outbox_count: i64,
}

/// Trigger source for sync cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncCycleTrigger {
    Startup,
    Periodic,
    LocalMutation,
    Manual,
}
