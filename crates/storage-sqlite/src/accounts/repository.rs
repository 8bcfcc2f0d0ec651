use async_trait::async_trait;
use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::SqliteConnection;
use std::sync::Arc;
use uuid::Uuid;

use ledgerline_core::accounts::{Account, AccountRepositoryTrait, AccountUpdate, NewAccount};
use ledgerline_core::sync::{SyncOperation, SyncTable};
use ledgerline_core::Result;

use super::model::AccountDB;
use crate::db::{get_connection, now_timestamp, WriteHandle};
use crate::errors::StorageError;
use crate::schema::accounts;
use crate::schema::accounts::dsl::*;
use crate::statements::delete_snapshots_for_account;
use crate::sync::{write_outbox_event, OutboxWriteRequest};
use crate::transactions::delete_transactions_for_account;

pub struct AccountRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl AccountRepository {
    pub fn new(
        pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
        writer: WriteHandle,
    ) -> Self {
        AccountRepository { pool, writer }
    }
}

#[async_trait]
impl AccountRepositoryTrait for AccountRepository {
    fn get_account(&self, account_id: &str) -> Result<Account> {
        let mut conn = get_connection(&self.pool)?;
        let account_db = accounts
            .find(account_id)
            .first::<AccountDB>(&mut conn)
            .map_err(StorageError::from)?;
        Account::try_from(account_db)
    }

    fn list_accounts(&self, active_only: bool) -> Result<Vec<Account>> {
        let mut conn = get_connection(&self.pool)?;
        let mut query = accounts.into_boxed();
        if active_only {
            query = query.filter(is_active.eq(true));
        }
        query
            .order((name.asc(), id.asc()))
            .load::<AccountDB>(&mut conn)
            .map_err(StorageError::from)?
            .into_iter()
            .map(Account::try_from)
            .collect()
    }

    async fn create_account(&self, new_account: NewAccount) -> Result<Account> {
        new_account.validate()?;
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<Account> {
                let now = now_timestamp();
                let account_db = AccountDB {
                    id: new_account
                        .id
                        .filter(|value| !value.trim().is_empty())
                        .unwrap_or_else(|| Uuid::now_v7().to_string()),
                    name: new_account.name,
                    account_type: new_account.account_type.as_str().to_string(),
                    institution: new_account.institution,
                    currency: new_account.currency,
                    last_four: new_account.last_four,
                    is_active: new_account.is_active,
                    created_at: now.clone(),
                    updated_at: now,
                };
                let result_db = diesel::insert_into(accounts::table)
                    .values(&account_db)
                    .returning(AccountDB::as_returning())
                    .get_result(conn)
                    .map_err(StorageError::from)?;
                write_outbox_event(
                    conn,
                    OutboxWriteRequest::new(
                        SyncTable::Accounts,
                        result_db.id.clone(),
                        SyncOperation::Insert,
                        serde_json::to_value(&result_db)?,
                    ),
                )?;
                Account::try_from(result_db)
            })
            .await
    }

    async fn update_account(&self, update: AccountUpdate) -> Result<Account> {
        update.validate()?;
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<Account> {
                let existing = accounts
                    .find(&update.id)
                    .first::<AccountDB>(conn)
                    .map_err(StorageError::from)?;
                let updated = AccountDB {
                    name: update.name,
                    account_type: update.account_type.as_str().to_string(),
                    institution: update.institution,
                    currency: update.currency,
                    last_four: update.last_four,
                    is_active: update.is_active,
                    updated_at: now_timestamp(),
                    ..existing.clone()
                };
                diesel::update(accounts.find(&existing.id))
                    .set(&updated)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                write_outbox_event(
                    conn,
                    OutboxWriteRequest::update(
                        SyncTable::Accounts,
                        existing.id.clone(),
                        &serde_json::to_value(&existing)?,
                        &serde_json::to_value(&updated)?,
                    ),
                )?;
                Account::try_from(updated)
            })
            .await
    }

    /// Deletes the account together with its transactions and statement
    /// snapshots, queueing a DELETE for each removed row.
    async fn delete_account(&self, account_id: String) -> Result<usize> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<usize> {
                delete_transactions_for_account(conn, &account_id)?;
                delete_snapshots_for_account(conn, &account_id)?;
                let affected = diesel::delete(accounts.find(&account_id))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                if affected > 0 {
                    write_outbox_event(
                        conn,
                        OutboxWriteRequest::delete(SyncTable::Accounts, account_id.clone()),
                    )?;
                }
                Ok(affected)
            })
            .await
    }
}
