use std::sync::Arc;

use chrono::NaiveDateTime;
use rust_decimal_macros::dec;
use serde_json::json;

use ledgerline_core::accounts::{Account, AccountRepositoryTrait, AccountType, AccountUpdate};
use ledgerline_core::sync::testing::{InMemoryRemoteStore, StaticSession};
use ledgerline_core::sync::{
    parse_timestamp, MarkSyncedOutcome, SyncConfig, SyncRepositoryTrait, SyncRow, SyncService,
    SyncTable,
};
use ledgerline_core::transactions::{TransactionFilter, TransactionRepositoryTrait};

use super::SyncRepository;
use crate::accounts::AccountRepository;
use crate::test_support::{date, manual_outflow, pending_for, seed_account, setup_db};
use crate::transactions::TransactionRepository;

fn ts(value: &str) -> NaiveDateTime {
    parse_timestamp(value).expect("timestamp")
}

fn remote_account(id: &str, name: &str, updated_at: &str) -> SyncRow {
    SyncRow::Account(Account {
        id: id.to_string(),
        name: name.to_string(),
        account_type: AccountType::Savings,
        institution: None,
        currency: "COP".to_string(),
        last_four: None,
        is_active: true,
        created_at: ts("2024-03-01T00:00:00Z"),
        updated_at: ts(updated_at),
    })
}

#[tokio::test]
async fn mark_synced_requeues_an_insert_edited_in_flight_as_update() {
    let (pool, writer) = setup_db();
    seed_account(&pool, &writer, "acc-1").await;
    let sync = SyncRepository::new(pool.clone(), writer.clone());
    let accounts = AccountRepository::new(pool.clone(), writer);

    let sent = sync.list_due_outbox(0, 10).unwrap().remove(0);
    let account = accounts.get_account("acc-1").unwrap();
    accounts
        .update_account(AccountUpdate {
            id: account.id.clone(),
            name: "Visa Oro".to_string(),
            account_type: account.account_type,
            institution: account.institution.clone(),
            currency: account.currency.clone(),
            last_four: account.last_four.clone(),
            is_active: account.is_active,
        })
        .await
        .unwrap();

    let outcome = sync.mark_outbox_synced(sent.seq, sent.revision).await.unwrap();
    assert_eq!(outcome, MarkSyncedOutcome::Requeued);

    let pending = pending_for(&pool, "acc-1");
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].op, "UPDATE");
    assert_eq!(pending[0].revision, sent.revision + 1);

    let outcome = sync
        .mark_outbox_synced(pending[0].seq, pending[0].revision)
        .await
        .unwrap();
    assert_eq!(outcome, MarkSyncedOutcome::Synced);
    assert_eq!(sync.count_pending_outbox().unwrap(), 0);
}

#[tokio::test]
async fn mark_synced_reports_missing_after_local_delete() {
    let (pool, writer) = setup_db();
    seed_account(&pool, &writer, "acc-1").await;
    let sync = SyncRepository::new(pool.clone(), writer.clone());

    let sent = sync.list_due_outbox(0, 10).unwrap().remove(0);
    AccountRepository::new(pool, writer)
        .delete_account("acc-1".to_string())
        .await
        .unwrap();

    assert_eq!(
        sync.mark_outbox_synced(sent.seq, sent.revision).await.unwrap(),
        MarkSyncedOutcome::Missing
    );
}

#[tokio::test]
async fn scheduled_retry_hides_entry_until_due() {
    let (pool, writer) = setup_db();
    seed_account(&pool, &writer, "acc-1").await;
    let sync = SyncRepository::new(pool, writer);

    let entry = sync.list_due_outbox(0, 10).unwrap().remove(0);
    sync.schedule_outbox_retry(entry.seq, 60, "boom".to_string(), "retryable".to_string())
        .await
        .unwrap();

    assert!(sync.list_due_outbox(0, 10).unwrap().is_empty());
    assert_eq!(sync.count_pending_outbox().unwrap(), 1);
    assert!(sync.next_outbox_retry_at().unwrap().is_some());
    assert_eq!(sync.get_engine_status().unwrap().pending_outbox_count, 1);
}

#[tokio::test]
async fn pulled_page_skips_pending_rows_and_mark_never_moves_back() {
    let (pool, writer) = setup_db();
    seed_account(&pool, &writer, "acc-local").await;
    let sync = SyncRepository::new(pool.clone(), writer.clone());

    let result = sync
        .apply_pulled_page(
            SyncTable::Accounts,
            vec![
                remote_account("acc-local", "Overwritten", "2024-03-05T00:00:00Z"),
                remote_account("acc-remote", "Nu", "2024-03-04T00:00:00Z"),
            ],
            Some(ts("2024-03-05T00:00:00Z")),
        )
        .await
        .unwrap();
    assert_eq!(result.applied, 1);
    assert_eq!(result.skipped_pending, 1);

    let accounts = AccountRepository::new(pool.clone(), writer);
    assert_eq!(accounts.get_account("acc-local").unwrap().name, "Account acc-local");
    assert_eq!(accounts.get_account("acc-remote").unwrap().name, "Nu");
    assert!(
        pending_for(&pool, "acc-remote").is_empty(),
        "pulled rows never enter the outbox"
    );

    sync.apply_pulled_page(SyncTable::Accounts, vec![], Some(ts("2024-03-01T00:00:00Z")))
        .await
        .unwrap();
    let mark = sync.get_high_water_mark(SyncTable::Accounts).unwrap().unwrap();
    assert_eq!(mark.last_synced_at, ts("2024-03-05T00:00:00Z"));
}

#[tokio::test]
async fn pulled_rows_with_missing_parents_are_skipped() {
    let (pool, writer) = setup_db();
    seed_account(&pool, &writer, "acc-1").await;
    let sync = SyncRepository::new(pool.clone(), writer.clone());
    let transactions = TransactionRepository::new(pool.clone(), writer.clone());
    let template = transactions
        .create_transaction(manual_outflow("acc-1", date(2024, 3, 2), dec!(18000), "Rappi"))
        .await
        .unwrap();

    let remote_tx = |id: &str, account: &str, category: Option<&str>| {
        let mut row = template.clone();
        row.id = id.to_string();
        row.account_id = account.to_string();
        row.category_id = category.map(str::to_string);
        row.idempotency_key = format!("remote-{id}");
        row.updated_at = ts("2024-03-06T00:00:00Z");
        SyncRow::Transaction(row)
    };

    let result = sync
        .apply_pulled_page(
            SyncTable::Transactions,
            vec![
                remote_tx("tx-no-account", "acc-missing", None),
                remote_tx("tx-ok", "acc-1", None),
                remote_tx("tx-no-category", "acc-1", Some("cat-missing")),
            ],
            Some(ts("2024-03-06T00:00:00Z")),
        )
        .await
        .unwrap();
    assert_eq!(result.applied, 1);
    assert_eq!(result.skipped_orphans, 2);

    assert!(transactions.get_transaction("tx-ok").is_ok());
    assert!(transactions.get_transaction("tx-no-account").is_err());
    assert!(transactions.get_transaction("tx-no-category").is_err());
    let mark = sync.get_high_water_mark(SyncTable::Transactions).unwrap().unwrap();
    assert_eq!(mark.last_synced_at, ts("2024-03-06T00:00:00Z"));

    // Foreign keys stay enforced on the shared connection after the page commits.
    let orphan_insert = transactions
        .create_transaction(manual_outflow("acc-missing", date(2024, 3, 7), dec!(1000), "Uber"))
        .await;
    assert!(orphan_insert.is_err());
}

#[tokio::test]
async fn engine_state_tracks_failures_until_success() {
    let (pool, writer) = setup_db();
    let sync = SyncRepository::new(pool, writer);

    sync.mark_engine_error("offline".to_string()).await.unwrap();
    sync.mark_engine_error("still offline".to_string()).await.unwrap();
    sync.mark_cycle_outcome("retryable_error".to_string(), 12).await.unwrap();
    let status = sync.get_engine_status().unwrap();
    assert_eq!(status.consecutive_failures, 2);
    assert_eq!(status.last_error.as_deref(), Some("still offline"));
    assert_eq!(status.last_cycle_status.as_deref(), Some("retryable_error"));

    sync.mark_push_completed().await.unwrap();
    sync.mark_pull_completed().await.unwrap();
    let status = sync.get_engine_status().unwrap();
    assert_eq!(status.consecutive_failures, 0);
    assert!(status.last_error.is_none());
    assert!(status.last_push_at.is_some() && status.last_pull_at.is_some());
}

#[tokio::test]
async fn two_devices_converge_through_the_remote_store() {
    let remote = Arc::new(InMemoryRemoteStore::new());
    let session = Arc::new(StaticSession::signed_in());

    let (pool_a, writer_a) = setup_db();
    let (pool_b, writer_b) = setup_db();
    let sync_a = SyncService::new(
        Arc::new(SyncRepository::new(pool_a.clone(), writer_a.clone())),
        remote.clone(),
        session.clone(),
        SyncConfig::default(),
    );
    let sync_b = SyncService::new(
        Arc::new(SyncRepository::new(pool_b.clone(), writer_b.clone())),
        remote.clone(),
        session,
        SyncConfig::default(),
    );

    seed_account(&pool_a, &writer_a, "acc-1").await;
    let tx_a = TransactionRepository::new(pool_a.clone(), writer_a.clone());
    let created = tx_a
        .create_transaction(manual_outflow("acc-1", date(2024, 3, 2), dec!(44900), "Netflix"))
        .await
        .unwrap();

    let report = sync_a.sync().await.unwrap();
    assert_eq!(report.pushed_count, 2);
    assert_eq!(
        remote.row(SyncTable::Transactions, &created.id).unwrap()["amount"],
        json!("44900")
    );

    let report = sync_b.sync().await.unwrap();
    assert_eq!(report.pulled_counts.get(&SyncTable::Transactions), Some(&1));
    let tx_b = TransactionRepository::new(pool_b.clone(), writer_b.clone());
    let replicated = tx_b.get_transaction(&created.id).unwrap();
    assert_eq!(replicated.amount, dec!(44900));
    assert_eq!(replicated.idempotency_key, created.idempotency_key);
    assert_eq!(
        AccountRepository::new(pool_b.clone(), writer_b.clone())
            .get_account("acc-1")
            .unwrap()
            .name,
        "Account acc-1"
    );

    let mut update = ledgerline_core::transactions::TransactionUpdate::from_existing(&replicated);
    update.notes = Some("shared with family".to_string());
    tx_b.update_transaction(update).await.unwrap();
    sync_b.sync().await.unwrap();
    sync_a.sync().await.unwrap();

    let converged = tx_a
        .list_active_transactions(&TransactionFilter::for_account("acc-1"))
        .unwrap();
    assert_eq!(converged.len(), 1);
    assert_eq!(converged[0].notes.as_deref(), Some("shared with family"));
    assert_eq!(sync_a.engine_status().unwrap().pending_outbox_count, 0);
}
