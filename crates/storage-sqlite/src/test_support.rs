use std::sync::Arc;

use chrono::NaiveDate;
use diesel::prelude::*;
use rust_decimal::Decimal;
use tempfile::tempdir;

use ledgerline_core::accounts::{AccountRepositoryTrait, AccountType, NewAccount};
use ledgerline_core::transactions::{
    prepare_new_transaction, CaptureMethod, NewTransaction, TransactionDirection,
    TransactionStatus,
};

use crate::accounts::AccountRepository;
use crate::db::{create_pool, get_connection, init, run_migrations, spawn_writer, DbPool, WriteHandle};
use crate::schema::sync_outbox;
use crate::sync::SyncOutboxEntryDB;

pub(crate) fn setup_db() -> (Arc<DbPool>, WriteHandle) {
    let app_data = tempdir()
        .expect("tempdir")
        .keep()
        .to_string_lossy()
        .to_string();
    let db_path = init(&app_data).expect("init db");
    run_migrations(&db_path).expect("migrate db");
    let pool = create_pool(&db_path).expect("create pool");
    let writer = spawn_writer(pool.as_ref().clone());
    (pool, writer)
}

pub(crate) async fn seed_account(pool: &Arc<DbPool>, writer: &WriteHandle, account_id: &str) {
    AccountRepository::new(pool.clone(), writer.clone())
        .create_account(NewAccount {
            id: Some(account_id.to_string()),
            name: format!("Account {account_id}"),
            account_type: AccountType::CreditCard,
            institution: Some("Bancolombia".to_string()),
            currency: "COP".to_string(),
            last_four: Some("4321".to_string()),
            is_active: true,
        })
        .await
        .expect("seed account");
}

fn outflow(
    account_id: &str,
    date: NaiveDate,
    amount: Decimal,
    description: &str,
    capture_method: CaptureMethod,
    capture_provider: Option<String>,
) -> NewTransaction {
    prepare_new_transaction(NewTransaction {
        id: None,
        account_id: account_id.to_string(),
        category_id: None,
        amount,
        direction: TransactionDirection::Outflow,
        date,
        raw_description: description.to_string(),
        clean_description: None,
        merchant_name: None,
        status: TransactionStatus::Confirmed,
        currency: "COP".to_string(),
        notes: None,
        capture_method,
        capture_provider,
        idempotency_key: None,
    })
}

/// User-entered outflow with id and idempotency key filled in.
pub(crate) fn manual_outflow(
    account_id: &str,
    date: NaiveDate,
    amount: Decimal,
    description: &str,
) -> NewTransaction {
    outflow(account_id, date, amount, description, CaptureMethod::Manual, None)
}

/// Statement line as the import service would build it.
pub(crate) fn imported_outflow(
    account_id: &str,
    date: NaiveDate,
    amount: Decimal,
    description: &str,
) -> NewTransaction {
    outflow(
        account_id,
        date,
        amount,
        description,
        CaptureMethod::StatementImport,
        Some("bancolombia".to_string()),
    )
}

pub(crate) fn pending_outbox(pool: &Arc<DbPool>) -> Vec<SyncOutboxEntryDB> {
    let mut conn = get_connection(pool).expect("conn");
    sync_outbox::table
        .filter(sync_outbox::synced_at.is_null())
        .order(sync_outbox::seq.asc())
        .select(SyncOutboxEntryDB::as_select())
        .load::<SyncOutboxEntryDB>(&mut conn)
        .expect("load outbox")
}

pub(crate) fn pending_for(pool: &Arc<DbPool>, record_id: &str) -> Vec<SyncOutboxEntryDB> {
    pending_outbox(pool)
        .into_iter()
        .filter(|entry| entry.record_id == record_id)
        .collect()
}

pub(crate) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}
