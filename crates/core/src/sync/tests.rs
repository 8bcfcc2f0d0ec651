use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use serde_json::{json, Value};
use tokio::sync::Semaphore;

use super::testing::{InMemoryRemoteStore, StaticSession};
use super::*;
use crate::errors::Result;

#[derive(Default)]
struct FakeSyncRepository {
    outbox: Mutex<Vec<OutboxEntry>>,
    marks: Mutex<BTreeMap<SyncTable, NaiveDateTime>>,
    applied: Mutex<Vec<SyncRow>>,
    engine: Mutex<SyncEngineStatus>,
}

impl FakeSyncRepository {
    fn enqueue(&self, table: SyncTable, record_id: &str, op: SyncOperation, payload: Value) {
        let mut outbox = self.outbox.lock().unwrap();
        let seq = outbox.len() as i64 + 1;
        outbox.push(OutboxEntry {
            seq,
            table,
            record_id: record_id.to_string(),
            op,
            payload,
            revision: 1,
            retry_count: 0,
            next_retry_at: None,
            last_error: None,
            last_error_code: None,
            created_at: Utc::now().naive_utc(),
            synced_at: None,
        });
    }

    fn entry(&self, seq: i64) -> OutboxEntry {
        self.outbox
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.seq == seq)
            .cloned()
            .unwrap()
    }

    fn mark(&self, table: SyncTable) -> Option<NaiveDateTime> {
        self.marks.lock().unwrap().get(&table).copied()
    }
}

#[async_trait]
impl SyncRepositoryTrait for FakeSyncRepository {
    fn list_due_outbox(&self, after_seq: i64, limit: i64) -> Result<Vec<OutboxEntry>> {
        let now = Utc::now().naive_utc();
        Ok(self
            .outbox
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.is_pending() && e.seq > after_seq)
            .filter(|e| e.next_retry_at.map(|at| at <= now).unwrap_or(true))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    fn count_pending_outbox(&self) -> Result<i64> {
        Ok(self
            .outbox
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.is_pending())
            .count() as i64)
    }

    fn next_outbox_retry_at(&self) -> Result<Option<NaiveDateTime>> {
        Ok(self
            .outbox
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.is_pending())
            .filter_map(|e| e.next_retry_at)
            .min())
    }

    async fn mark_outbox_synced(&self, seq: i64, revision: i32) -> Result<MarkSyncedOutcome> {
        let mut outbox = self.outbox.lock().unwrap();
        let Some(entry) = outbox.iter_mut().find(|e| e.seq == seq) else {
            return Ok(MarkSyncedOutcome::Missing);
        };
        if entry.revision != revision {
            return Ok(MarkSyncedOutcome::Requeued);
        }
        entry.synced_at = Some(Utc::now().naive_utc());
        Ok(MarkSyncedOutcome::Synced)
    }

    async fn schedule_outbox_retry(
        &self,
        seq: i64,
        backoff_seconds: i64,
        last_error: String,
        last_error_code: String,
    ) -> Result<()> {
        let mut outbox = self.outbox.lock().unwrap();
        if let Some(entry) = outbox.iter_mut().find(|e| e.seq == seq) {
            entry.retry_count += 1;
            entry.next_retry_at =
                Some(Utc::now().naive_utc() + chrono::Duration::seconds(backoff_seconds));
            entry.last_error = Some(last_error);
            entry.last_error_code = Some(last_error_code);
        }
        Ok(())
    }

    fn get_high_water_mark(&self, table: SyncTable) -> Result<Option<HighWaterMark>> {
        Ok(self.mark(table).map(|last_synced_at| HighWaterMark {
            table,
            last_synced_at,
            updated_at: last_synced_at,
        }))
    }

    fn list_high_water_marks(&self) -> Result<Vec<HighWaterMark>> {
        Ok(PULL_ORDER
            .iter()
            .filter_map(|t| self.get_high_water_mark(*t).ok().flatten())
            .collect())
    }

    async fn apply_pulled_page(
        &self,
        table: SyncTable,
        rows: Vec<SyncRow>,
        advance_mark_to: Option<NaiveDateTime>,
    ) -> Result<PageApplyResult> {
        let pending: Vec<String> = self
            .outbox
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.is_pending() && e.table == table)
            .map(|e| e.record_id.clone())
            .collect();
        let mut result = PageApplyResult::default();
        let mut applied = self.applied.lock().unwrap();
        for row in rows {
            if pending.iter().any(|id| id == row.id()) {
                result.skipped_pending += 1;
            } else {
                applied.push(row);
                result.applied += 1;
            }
        }
        if let Some(candidate) = advance_mark_to {
            let mut marks = self.marks.lock().unwrap();
            let current = marks.entry(table).or_insert(candidate);
            if candidate > *current {
                *current = candidate;
            }
        }
        Ok(result)
    }

    fn get_engine_status(&self) -> Result<SyncEngineStatus> {
        Ok(self.engine.lock().unwrap().clone())
    }

    async fn mark_push_completed(&self) -> Result<()> {
        self.engine.lock().unwrap().last_push_at = Some(Utc::now().naive_utc());
        Ok(())
    }

    async fn mark_pull_completed(&self) -> Result<()> {
        self.engine.lock().unwrap().last_pull_at = Some(Utc::now().naive_utc());
        Ok(())
    }

    async fn mark_engine_error(&self, message: String) -> Result<()> {
        let mut engine = self.engine.lock().unwrap();
        engine.last_error = Some(message);
        engine.consecutive_failures += 1;
        Ok(())
    }

    async fn mark_cycle_outcome(&self, status: String, duration_ms: i64) -> Result<()> {
        let mut engine = self.engine.lock().unwrap();
        engine.last_cycle_status = Some(status);
        engine.last_cycle_duration_ms = Some(duration_ms);
        Ok(())
    }
}

fn account_row(id: &str, updated_at: &str) -> Value {
    json!({
        "id": id,
        "name": format!("Account {id}"),
        "account_type": "SAVINGS",
        "institution": "Bancolombia",
        "currency": "COP",
        "last_four": null,
        "is_active": 1,
        "created_at": "2024-03-01T00:00:00Z",
        "updated_at": updated_at
    })
}

fn service(
    repo: Arc<FakeSyncRepository>,
    remote: Arc<dyn RemoteStore>,
    session: Arc<StaticSession>,
) -> SyncService {
    SyncService::new(repo, remote, session, SyncConfig::default())
}

#[tokio::test]
async fn push_drains_outbox_in_sequence_order() {
    let repo = Arc::new(FakeSyncRepository::default());
    repo.enqueue(SyncTable::Accounts, "acc-1", SyncOperation::Insert, account_row("acc-1", "2024-03-01T00:00:00Z"));
    repo.enqueue(SyncTable::Accounts, "acc-1", SyncOperation::Update, json!({ "name": "Renamed" }));
    repo.enqueue(SyncTable::Accounts, "acc-2", SyncOperation::Delete, json!({ "id": "acc-2" }));
    let remote = Arc::new(InMemoryRemoteStore::new());

    let engine = PushEngine::new(repo.clone(), remote.clone(), SyncConfig::default());
    let report = engine.push().await.unwrap();

    assert_eq!(report.synced, 3);
    let ops: Vec<_> = remote.calls().into_iter().map(|c| c.op).collect();
    assert_eq!(
        ops,
        vec![SyncOperation::Insert, SyncOperation::Update, SyncOperation::Delete]
    );
    assert_eq!(remote.row(SyncTable::Accounts, "acc-1").unwrap()["name"], "Renamed");
    assert_eq!(repo.count_pending_outbox().unwrap(), 0);
}

#[tokio::test]
async fn failed_entry_is_scheduled_and_the_rest_still_push() {
    let repo = Arc::new(FakeSyncRepository::default());
    repo.enqueue(SyncTable::Accounts, "acc-1", SyncOperation::Insert, account_row("acc-1", "2024-03-01T00:00:00Z"));
    repo.enqueue(SyncTable::Accounts, "acc-2", SyncOperation::Insert, account_row("acc-2", "2024-03-01T00:00:00Z"));
    let remote = Arc::new(InMemoryRemoteStore::new());
    remote.fail_next(RemoteError::from_status(503, "unavailable"));

    let engine = PushEngine::new(repo.clone(), remote.clone(), SyncConfig::default());
    let report = engine.push().await.unwrap();

    assert_eq!(report.synced, 1);
    assert_eq!(report.failed, 1);
    let failed = repo.entry(1);
    assert!(failed.is_pending());
    assert_eq!(failed.retry_count, 1);
    assert_eq!(failed.last_error_code.as_deref(), Some("retryable"));
    assert!(failed.next_retry_at.unwrap() > Utc::now().naive_utc());
    assert!(remote.row(SyncTable::Accounts, "acc-2").is_some());

    // Not yet due, so a second push leaves it alone.
    let again = engine.push().await.unwrap();
    assert_eq!(again, PushReport::default());
}

#[tokio::test]
async fn auth_failure_stops_the_push() {
    let repo = Arc::new(FakeSyncRepository::default());
    repo.enqueue(SyncTable::Accounts, "acc-1", SyncOperation::Insert, account_row("acc-1", "2024-03-01T00:00:00Z"));
    repo.enqueue(SyncTable::Accounts, "acc-2", SyncOperation::Insert, account_row("acc-2", "2024-03-01T00:00:00Z"));
    let remote = Arc::new(InMemoryRemoteStore::new());
    remote.fail_next(RemoteError::from_status(401, "expired"));

    let engine = PushEngine::new(repo.clone(), remote.clone(), SyncConfig::default());
    let err = engine.push().await.unwrap_err();

    assert!(matches!(err, crate::Error::Remote(ref e) if e.requires_reauth()));
    assert_eq!(remote.calls().len(), 1);
    assert_eq!(repo.count_pending_outbox().unwrap(), 2);
}

#[tokio::test]
async fn pull_applies_rows_and_advances_mark_monotonically() {
    let repo = Arc::new(FakeSyncRepository::default());
    let remote = Arc::new(InMemoryRemoteStore::new());
    remote.seed(
        SyncTable::Accounts,
        vec![
            account_row("acc-1", "2024-03-01T10:00:00Z"),
            account_row("acc-2", "2024-03-02T10:00:00Z"),
        ],
    );

    let engine = PullEngine::new(repo.clone(), remote.clone(), SyncConfig::default());
    assert_eq!(engine.pull_table(SyncTable::Accounts).await.unwrap(), 2);
    let first_mark = repo.mark(SyncTable::Accounts).unwrap();
    assert_eq!(first_mark, parse_timestamp("2024-03-02T10:00:00Z").unwrap());

    // Nothing new: no rows, mark unchanged.
    assert_eq!(engine.pull_table(SyncTable::Accounts).await.unwrap(), 0);
    assert_eq!(repo.mark(SyncTable::Accounts), Some(first_mark));

    remote.seed(SyncTable::Accounts, vec![account_row("acc-3", "2024-03-03T10:00:00Z")]);
    assert_eq!(engine.pull_table(SyncTable::Accounts).await.unwrap(), 1);
    assert!(repo.mark(SyncTable::Accounts).unwrap() > first_mark);
}

#[tokio::test]
async fn pull_pages_through_tied_timestamps_without_losing_rows() {
    let repo = Arc::new(FakeSyncRepository::default());
    let remote = Arc::new(InMemoryRemoteStore::new());
    remote.seed(
        SyncTable::Accounts,
        (1..=5)
            .map(|i| account_row(&format!("acc-{i}"), "2024-03-02T10:00:00Z"))
            .collect(),
    );
    let config = SyncConfig {
        pull_page_size: 2,
        ..SyncConfig::default()
    };

    let engine = PullEngine::new(repo.clone(), remote, config);
    assert_eq!(engine.pull_table(SyncTable::Accounts).await.unwrap(), 5);
    assert_eq!(
        repo.mark(SyncTable::Accounts),
        parse_timestamp("2024-03-02T10:00:00Z")
    );
}

#[tokio::test]
async fn pull_skips_malformed_rows_and_rows_with_pending_changes() {
    let repo = Arc::new(FakeSyncRepository::default());
    repo.enqueue(SyncTable::Accounts, "acc-dirty", SyncOperation::Update, json!({ "name": "Local" }));
    let remote = Arc::new(InMemoryRemoteStore::new());
    let mut broken = account_row("acc-broken", "2024-03-03T10:00:00Z");
    broken["account_type"] = json!("PIGGY_BANK");
    remote.seed(
        SyncTable::Accounts,
        vec![
            account_row("acc-ok", "2024-03-01T10:00:00Z"),
            account_row("acc-dirty", "2024-03-02T10:00:00Z"),
            broken,
        ],
    );

    let engine = PullEngine::new(repo.clone(), remote, SyncConfig::default());
    assert_eq!(engine.pull_table(SyncTable::Accounts).await.unwrap(), 1);
    let applied = repo.applied.lock().unwrap();
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].id(), "acc-ok");
    assert_eq!(
        repo.mark(SyncTable::Accounts),
        parse_timestamp("2024-03-03T10:00:00Z")
    );
}

#[tokio::test]
async fn sync_without_session_is_a_silent_no_op() {
    let repo = Arc::new(FakeSyncRepository::default());
    repo.enqueue(SyncTable::Accounts, "acc-1", SyncOperation::Insert, account_row("acc-1", "2024-03-01T00:00:00Z"));
    let remote = Arc::new(InMemoryRemoteStore::new());
    let session = Arc::new(StaticSession::signed_out());
    let sync = service(repo.clone(), remote.clone(), session.clone());

    let report = sync.sync().await.unwrap();
    assert_eq!(report.skipped, Some(SyncSkipReason::NoSession));
    assert!(remote.calls().is_empty());
    assert_eq!(sync.status(), SyncStatus::Idle);

    session.set_token(Some("token".to_string()));
    let report = sync.sync().await.unwrap();
    assert_eq!(report.pushed_count, 1);
    assert_eq!(report.pulled_counts.len(), PULL_ORDER.len());
    assert_eq!(sync.status(), SyncStatus::Idle);
}

#[tokio::test]
async fn push_failure_surfaces_as_error_status_then_recovers() {
    let repo = Arc::new(FakeSyncRepository::default());
    repo.enqueue(SyncTable::Accounts, "acc-1", SyncOperation::Insert, account_row("acc-1", "2024-03-01T00:00:00Z"));
    let remote = Arc::new(InMemoryRemoteStore::new());
    remote.fail_next(RemoteError::retryable("connection reset"));
    let sync = service(repo.clone(), remote.clone(), Arc::new(StaticSession::signed_in()));

    let report = sync.sync().await.unwrap();
    assert_eq!(report.failed_push_count, 1);
    assert_eq!(sync.status(), SyncStatus::Error);
    assert_eq!(repo.count_pending_outbox().unwrap(), 1);
    assert_eq!(
        repo.get_engine_status().unwrap().last_cycle_status.as_deref(),
        Some("push_error")
    );

    // Make the retry due and trigger again.
    repo.outbox.lock().unwrap()[0].next_retry_at = None;
    let report = sync.sync().await.unwrap();
    assert_eq!(report.pushed_count, 1);
    assert_eq!(sync.status(), SyncStatus::Idle);
}

/// Remote whose selects block until released, to hold a cycle open.
struct GatedRemote {
    inner: InMemoryRemoteStore,
    gate: Semaphore,
}

#[async_trait]
impl RemoteStore for GatedRemote {
    async fn select(&self, table: SyncTable, filter: &RemoteFilter) -> std::result::Result<Vec<Value>, RemoteError> {
        if let Ok(permit) = self.gate.acquire().await {
            permit.forget();
        }
        self.inner.select(table, filter).await
    }

    async fn insert(&self, table: SyncTable, row: &Value) -> std::result::Result<(), RemoteError> {
        self.inner.insert(table, row).await
    }

    async fn update(&self, table: SyncTable, id: &str, partial: &Value) -> std::result::Result<(), RemoteError> {
        self.inner.update(table, id, partial).await
    }

    async fn delete(&self, table: SyncTable, id: &str) -> std::result::Result<(), RemoteError> {
        self.inner.delete(table, id).await
    }
}

#[tokio::test]
async fn concurrent_sync_request_is_ignored_while_syncing() {
    let repo = Arc::new(FakeSyncRepository::default());
    let remote = Arc::new(GatedRemote {
        inner: InMemoryRemoteStore::new(),
        gate: Semaphore::new(0),
    });
    let sync = Arc::new(service(
        repo,
        remote.clone(),
        Arc::new(StaticSession::signed_in()),
    ));
    let mut status = sync.subscribe();

    let running = {
        let sync = sync.clone();
        tokio::spawn(async move { sync.sync().await })
    };
    status
        .wait_for(|s| *s == SyncStatus::Syncing)
        .await
        .unwrap();

    let second = sync.sync().await.unwrap();
    assert_eq!(second.skipped, Some(SyncSkipReason::AlreadySyncing));

    remote.gate.add_permits(PULL_ORDER.len());
    let first = running.await.unwrap().unwrap();
    assert_eq!(first.skipped, None);
    assert_eq!(sync.status(), SyncStatus::Idle);
}

#[tokio::test]
async fn pull_error_flips_status_to_error() {
    struct BrokenRemote;

    #[async_trait]
    impl RemoteStore for BrokenRemote {
        async fn select(&self, _: SyncTable, _: &RemoteFilter) -> std::result::Result<Vec<Value>, RemoteError> {
            Err(RemoteError::retryable("timeout"))
        }
        async fn insert(&self, _: SyncTable, _: &Value) -> std::result::Result<(), RemoteError> {
            Ok(())
        }
        async fn update(&self, _: SyncTable, _: &str, _: &Value) -> std::result::Result<(), RemoteError> {
            Ok(())
        }
        async fn delete(&self, _: SyncTable, _: &str) -> std::result::Result<(), RemoteError> {
            Ok(())
        }
    }

    let repo = Arc::new(FakeSyncRepository::default());
    let sync = service(repo.clone(), Arc::new(BrokenRemote), Arc::new(StaticSession::signed_in()));
    let report = sync.sync().await.unwrap();
    assert_eq!(report.failed_pull_tables, PULL_ORDER.to_vec());
    assert!(report.pulled_counts.is_empty());
    assert_eq!(sync.status(), SyncStatus::Error);
    let engine = repo.get_engine_status().unwrap();
    assert_eq!(engine.consecutive_failures, 1);
    assert_eq!(engine.last_cycle_status.as_deref(), Some("pull_error"));
    assert!(engine.last_pull_at.is_none());
}

/// Remote whose selects fail for one table only.
struct TableOutageRemote {
    inner: InMemoryRemoteStore,
    down: SyncTable,
}

#[async_trait]
impl RemoteStore for TableOutageRemote {
    async fn select(&self, table: SyncTable, filter: &RemoteFilter) -> std::result::Result<Vec<Value>, RemoteError> {
        if table == self.down {
            return Err(RemoteError::from_status(500, "relation is locked"));
        }
        self.inner.select(table, filter).await
    }

    async fn insert(&self, table: SyncTable, row: &Value) -> std::result::Result<(), RemoteError> {
        self.inner.insert(table, row).await
    }

    async fn update(&self, table: SyncTable, id: &str, partial: &Value) -> std::result::Result<(), RemoteError> {
        self.inner.update(table, id, partial).await
    }

    async fn delete(&self, table: SyncTable, id: &str) -> std::result::Result<(), RemoteError> {
        self.inner.delete(table, id).await
    }
}

#[tokio::test]
async fn one_failing_table_does_not_block_unrelated_tables() {
    let repo = Arc::new(FakeSyncRepository::default());
    let remote = Arc::new(TableOutageRemote {
        inner: InMemoryRemoteStore::new(),
        down: SyncTable::Accounts,
    });
    remote.inner.seed(SyncTable::Accounts, vec![account_row("acc-1", "2024-03-01T10:00:00Z")]);
    remote.inner.seed(
        SyncTable::Categories,
        vec![json!({
            "id": "cat-1",
            "name": "Groceries",
            "kind": "OUTFLOW",
            "parent_id": null,
            "color": null,
            "icon": null,
            "is_active": 1,
            "created_at": "2024-03-01T00:00:00Z",
            "updated_at": "2024-03-02T10:00:00Z"
        })],
    );
    let sync = service(repo.clone(), remote, Arc::new(StaticSession::signed_in()));

    let report = sync.sync().await.unwrap();
    // Tables referencing accounts wait for the next cycle.
    assert_eq!(
        report.failed_pull_tables,
        vec![
            SyncTable::Accounts,
            SyncTable::StatementSnapshots,
            SyncTable::Transactions
        ]
    );
    assert_eq!(report.pulled_counts.get(&SyncTable::Categories), Some(&1));
    assert_eq!(report.pulled_counts.get(&SyncTable::Budgets), Some(&0));
    assert!(!report.pulled_counts.contains_key(&SyncTable::Accounts));
    assert_eq!(
        repo.mark(SyncTable::Categories),
        parse_timestamp("2024-03-02T10:00:00Z")
    );
    assert_eq!(repo.mark(SyncTable::Accounts), None);

    assert_eq!(sync.status(), SyncStatus::Error);
    let engine = repo.get_engine_status().unwrap();
    assert_eq!(engine.last_cycle_status.as_deref(), Some("pull_error"));
    assert!(engine.last_pull_at.is_none());
}

/// Remote that bumps `acc-1` to a newer timestamp right after the first select,
/// the way another device editing mid-pull would.
struct EditDuringPullRemote {
    inner: InMemoryRemoteStore,
    selects: Mutex<usize>,
}

#[async_trait]
impl RemoteStore for EditDuringPullRemote {
    async fn select(&self, table: SyncTable, filter: &RemoteFilter) -> std::result::Result<Vec<Value>, RemoteError> {
        let page = self.inner.select(table, filter).await?;
        let mut selects = self.selects.lock().unwrap();
        *selects += 1;
        if *selects == 1 {
            self.inner
                .seed(SyncTable::Accounts, vec![account_row("acc-1", "2024-03-04T10:00:00Z")]);
        }
        Ok(page)
    }

    async fn insert(&self, table: SyncTable, row: &Value) -> std::result::Result<(), RemoteError> {
        self.inner.insert(table, row).await
    }

    async fn update(&self, table: SyncTable, id: &str, partial: &Value) -> std::result::Result<(), RemoteError> {
        self.inner.update(table, id, partial).await
    }

    async fn delete(&self, table: SyncTable, id: &str) -> std::result::Result<(), RemoteError> {
        self.inner.delete(table, id).await
    }
}

#[tokio::test]
async fn rows_edited_between_pages_do_not_hide_unread_rows() {
    let repo = Arc::new(FakeSyncRepository::default());
    let remote = Arc::new(EditDuringPullRemote {
        inner: InMemoryRemoteStore::new(),
        selects: Mutex::new(0),
    });
    remote.inner.seed(
        SyncTable::Accounts,
        vec![
            account_row("acc-1", "2024-03-01T10:00:00Z"),
            account_row("acc-2", "2024-03-02T10:00:00Z"),
            account_row("acc-3", "2024-03-03T10:00:00Z"),
        ],
    );
    let config = SyncConfig {
        pull_page_size: 2,
        ..SyncConfig::default()
    };

    let engine = PullEngine::new(repo.clone(), remote.clone(), config);
    engine.pull_table(SyncTable::Accounts).await.unwrap();

    let applied = repo.applied.lock().unwrap();
    let ids: Vec<&str> = applied.iter().map(|row| row.id()).collect();
    assert_eq!(ids, vec!["acc-1", "acc-2", "acc-3", "acc-1"]);
    assert_eq!(
        applied.last().unwrap().updated_at(),
        parse_timestamp("2024-03-04T10:00:00Z").unwrap()
    );
    assert_eq!(
        repo.mark(SyncTable::Accounts),
        parse_timestamp("2024-03-04T10:00:00Z")
    );
}

/// Remote that cancels the local outbox entry while its INSERT is in flight,
/// as a local delete racing the push does.
struct DeleteDuringInsertRemote {
    inner: InMemoryRemoteStore,
    repo: Arc<FakeSyncRepository>,
    fail_retract: bool,
}

#[async_trait]
impl RemoteStore for DeleteDuringInsertRemote {
    async fn select(&self, table: SyncTable, filter: &RemoteFilter) -> std::result::Result<Vec<Value>, RemoteError> {
        self.inner.select(table, filter).await
    }

    async fn insert(&self, table: SyncTable, row: &Value) -> std::result::Result<(), RemoteError> {
        self.inner.insert(table, row).await?;
        let id = row["id"].as_str().unwrap_or_default().to_string();
        self.repo
            .outbox
            .lock()
            .unwrap()
            .retain(|entry| entry.record_id != id);
        if self.fail_retract {
            self.inner.fail_next(RemoteError::retryable("connection reset"));
        }
        Ok(())
    }

    async fn update(&self, table: SyncTable, id: &str, partial: &Value) -> std::result::Result<(), RemoteError> {
        self.inner.update(table, id, partial).await
    }

    async fn delete(&self, table: SyncTable, id: &str) -> std::result::Result<(), RemoteError> {
        self.inner.delete(table, id).await
    }
}

#[tokio::test]
async fn insert_cancelled_mid_flight_is_retracted_remotely() {
    let repo = Arc::new(FakeSyncRepository::default());
    repo.enqueue(SyncTable::Accounts, "acc-1", SyncOperation::Insert, account_row("acc-1", "2024-03-01T00:00:00Z"));
    let remote = Arc::new(DeleteDuringInsertRemote {
        inner: InMemoryRemoteStore::new(),
        repo: repo.clone(),
        fail_retract: false,
    });

    let engine = PushEngine::new(repo.clone(), remote.clone(), SyncConfig::default());
    let report = engine.push().await.unwrap();

    assert_eq!(report.synced, 1);
    assert_eq!(report.failed, 0);
    let calls: Vec<_> = remote
        .inner
        .calls()
        .into_iter()
        .map(|call| (call.op, call.id))
        .collect();
    assert_eq!(
        calls,
        vec![
            (SyncOperation::Insert, "acc-1".to_string()),
            (SyncOperation::Delete, "acc-1".to_string()),
        ]
    );
    assert!(remote.inner.row(SyncTable::Accounts, "acc-1").is_none());
}

#[tokio::test]
async fn failed_retract_is_logged_and_the_push_still_succeeds() {
    let repo = Arc::new(FakeSyncRepository::default());
    repo.enqueue(SyncTable::Accounts, "acc-1", SyncOperation::Insert, account_row("acc-1", "2024-03-01T00:00:00Z"));
    repo.enqueue(SyncTable::Accounts, "acc-2", SyncOperation::Insert, account_row("acc-2", "2024-03-01T00:00:00Z"));
    let remote = Arc::new(DeleteDuringInsertRemote {
        inner: InMemoryRemoteStore::new(),
        repo: repo.clone(),
        fail_retract: true,
    });

    let engine = PushEngine::new(repo.clone(), remote.clone(), SyncConfig::default());
    let report = engine.push().await.unwrap();

    assert_eq!(report.synced, 2);
    assert_eq!(report.failed, 0);
    // Both retracts failed, so the rows stay behind on the remote.
    assert!(remote.inner.row(SyncTable::Accounts, "acc-1").is_some());
    assert!(remote.inner.row(SyncTable::Accounts, "acc-2").is_some());
    let deletes = remote
        .inner
        .calls()
        .into_iter()
        .filter(|call| call.op == SyncOperation::Delete)
        .count();
    assert_eq!(deletes, 2);
    assert_eq!(repo.count_pending_outbox().unwrap(), 0);
}

#[tokio::test]
async fn pending_outbox_shortens_the_next_cycle_delay() {
    let repo = Arc::new(FakeSyncRepository::default());
    let sync = service(
        repo.clone(),
        Arc::new(InMemoryRemoteStore::new()),
        Arc::new(StaticSession::signed_in()),
    );
    assert!(sync.next_cycle_delay() >= SyncConfig::default().foreground_interval());

    repo.enqueue(SyncTable::Accounts, "acc-1", SyncOperation::Insert, account_row("acc-1", "2024-03-01T00:00:00Z"));
    assert!(sync.next_cycle_delay() < std::time::Duration::from_secs(3));
}
