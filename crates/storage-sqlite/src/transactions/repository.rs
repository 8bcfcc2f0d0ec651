use async_trait::async_trait;
use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::SqliteConnection;
use log::debug;
use std::sync::Arc;

use ledgerline_core::errors::{Error, ReconciliationError, Result};
use ledgerline_core::reconciliation::{validate_merge, MergeOutcome, ReconciliationMerge};
use ledgerline_core::sync::{SyncOperation, SyncTable};
use ledgerline_core::transactions::{
    CandidatePoolQuery, CaptureMethod, ImportedInsert, NewTransaction, Transaction,
    TransactionDirection, TransactionFilter, TransactionRepositoryTrait, TransactionStatus,
    TransactionTotals, TransactionUpdate,
};

use super::model::TransactionDB;
use crate::db::{format_date, get_connection, now_timestamp, WriteHandle};
use crate::errors::StorageError;
use crate::schema::transactions;
use crate::schema::transactions::dsl::*;
use crate::sync::{write_outbox_event, OutboxWriteRequest};

pub struct TransactionRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl TransactionRepository {
    pub fn new(
        pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
        writer: WriteHandle,
    ) -> Self {
        TransactionRepository { pool, writer }
    }

    /// Loads unreconciled rows. `awaiting_review` selects the PENDING_REVIEW rows
    /// instead of the first-class ones.
    fn load_active(
        &self,
        filter: &TransactionFilter,
        awaiting_review: bool,
    ) -> Result<Vec<TransactionDB>> {
        let mut conn = get_connection(&self.pool)?;
        let mut query = transactions
            .filter(reconciled_into_transaction_id.is_null())
            .into_boxed();
        let pending = TransactionStatus::PendingReview.as_str();
        query = if awaiting_review {
            query.filter(status.eq(pending))
        } else {
            query.filter(status.ne(pending))
        };
        if let Some(account) = &filter.account_id {
            query = query.filter(account_id.eq(account.clone()));
        }
        if let Some(from) = filter.from_date {
            query = query.filter(date.ge(format_date(from)));
        }
        if let Some(to) = filter.to_date {
            query = query.filter(date.le(format_date(to)));
        }
        if !filter.include_excluded {
            query = query.filter(is_excluded.eq(false));
        }
        Ok(query
            .order((date.desc(), created_at.desc(), id.asc()))
            .load::<TransactionDB>(&mut conn)
            .map_err(StorageError::from)?)
    }
}

fn find_row(conn: &mut SqliteConnection, transaction_id: &str) -> Result<Option<TransactionDB>> {
    Ok(transactions
        .find(transaction_id)
        .first::<TransactionDB>(conn)
        .optional()
        .map_err(StorageError::from)?)
}

/// Writes `updated` over `before` and queues the changed columns.
fn save_row(conn: &mut SqliteConnection, before: &TransactionDB, updated: &TransactionDB) -> Result<()> {
    diesel::update(transactions.find(&before.id))
        .set(updated)
        .execute(conn)
        .map_err(StorageError::from)?;
    write_outbox_event(
        conn,
        OutboxWriteRequest::update(
            SyncTable::Transactions,
            before.id.clone(),
            &serde_json::to_value(before)?,
            &serde_json::to_value(updated)?,
        ),
    )?;
    Ok(())
}

fn delete_row(conn: &mut SqliteConnection, transaction_id: &str) -> Result<usize> {
    let affected = diesel::delete(transactions.find(transaction_id))
        .execute(conn)
        .map_err(StorageError::from)?;
    if affected > 0 {
        write_outbox_event(
            conn,
            OutboxWriteRequest::delete(SyncTable::Transactions, transaction_id.to_string()),
        )?;
    }
    Ok(affected)
}

/// Restores records that were folded into `target` to first-class rows.
fn release_reconciled_sources(conn: &mut SqliteConnection, target: &str) -> Result<usize> {
    let sources = transactions
        .filter(reconciled_into_transaction_id.eq(target))
        .load::<TransactionDB>(conn)
        .map_err(StorageError::from)?;
    let stamp = now_timestamp();
    for source in &sources {
        let released = TransactionDB {
            reconciled_into_transaction_id: None,
            reconciliation_score: None,
            updated_at: stamp.clone(),
            ..source.clone()
        };
        save_row(conn, source, &released)?;
    }
    Ok(sources.len())
}

pub(crate) fn delete_transactions_for_account(
    conn: &mut SqliteConnection,
    account: &str,
) -> Result<usize> {
    let ids = transactions
        .filter(account_id.eq(account))
        .select(id)
        .load::<String>(conn)
        .map_err(StorageError::from)?;
    let mut removed = 0;
    for transaction_id in &ids {
        removed += delete_row(conn, transaction_id)?;
    }
    Ok(removed)
}

pub(crate) fn clear_category_from_transactions(
    conn: &mut SqliteConnection,
    category: &str,
) -> Result<usize> {
    let rows = transactions
        .filter(category_id.eq(category))
        .load::<TransactionDB>(conn)
        .map_err(StorageError::from)?;
    let stamp = now_timestamp();
    for row in &rows {
        let cleared = TransactionDB {
            category_id: None,
            updated_at: stamp.clone(),
            ..row.clone()
        };
        save_row(conn, row, &cleared)?;
    }
    Ok(rows.len())
}

#[async_trait]
impl TransactionRepositoryTrait for TransactionRepository {
    fn get_transaction(&self, transaction_id: &str) -> Result<Transaction> {
        let mut conn = get_connection(&self.pool)?;
        let transaction_db = transactions
            .find(transaction_id)
            .first::<TransactionDB>(&mut conn)
            .map_err(StorageError::from)?;
        Transaction::try_from(transaction_db)
    }

    fn list_active_transactions(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>> {
        self.load_active(filter, false)?
            .into_iter()
            .map(Transaction::try_from)
            .collect()
    }

    fn list_pending_review(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>> {
        self.load_active(filter, true)?
            .into_iter()
            .map(Transaction::try_from)
            .collect()
    }

    fn get_totals(&self, filter: &TransactionFilter) -> Result<TransactionTotals> {
        let filter = TransactionFilter {
            include_excluded: false,
            ..filter.clone()
        };
        let mut totals = TransactionTotals::default();
        for row in self.load_active(&filter, false)? {
            let transaction = Transaction::try_from(row)?;
            match transaction.direction {
                TransactionDirection::Inflow => totals.inflow += transaction.amount,
                TransactionDirection::Outflow => totals.outflow += transaction.amount,
            }
            totals.count += 1;
        }
        Ok(totals)
    }

    fn find_reconciliation_candidates(
        &self,
        query: &CandidatePoolQuery,
    ) -> Result<Vec<Transaction>> {
        let (Some(first), Some(last)) = (query.month.first_day(), query.month.last_day()) else {
            return Err(Error::invalid_input(format!(
                "invalid calendar month {}",
                query.month
            )));
        };
        let user_entered = [
            CaptureMethod::Manual.as_str(),
            CaptureMethod::QuickCapture.as_str(),
        ];
        let mut conn = get_connection(&self.pool)?;
        let rows = transactions
            .filter(account_id.eq(&query.account_id))
            .filter(direction.eq(query.direction.as_str()))
            .filter(date.ge(format_date(first)))
            .filter(date.le(format_date(last)))
            .filter(reconciled_into_transaction_id.is_null())
            .filter(capture_method.eq_any(user_entered))
            .filter(id.ne_all(&query.exclude_ids))
            .order((date.asc(), id.asc()))
            .load::<TransactionDB>(&mut conn)
            .map_err(StorageError::from)?;
        rows.into_iter().map(Transaction::try_from).collect()
    }

    fn list_reconciled_sources(&self, transaction_id: &str) -> Result<Vec<Transaction>> {
        let mut conn = get_connection(&self.pool)?;
        transactions
            .filter(reconciled_into_transaction_id.eq(transaction_id))
            .order(created_at.asc())
            .load::<TransactionDB>(&mut conn)
            .map_err(StorageError::from)?
            .into_iter()
            .map(Transaction::try_from)
            .collect()
    }

    async fn create_transaction(&self, new_transaction: NewTransaction) -> Result<Transaction> {
        new_transaction.validate()?;
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<Transaction> {
                let transaction_db = TransactionDB::from_new(new_transaction, &now_timestamp())?;
                let result_db = diesel::insert_into(transactions::table)
                    .values(&transaction_db)
                    .returning(TransactionDB::as_returning())
                    .get_result(conn)
                    .map_err(StorageError::from)?;
                write_outbox_event(
                    conn,
                    OutboxWriteRequest::new(
                        SyncTable::Transactions,
                        result_db.id.clone(),
                        SyncOperation::Insert,
                        serde_json::to_value(&result_db)?,
                    ),
                )?;
                Transaction::try_from(result_db)
            })
            .await
    }

    /// Inserts a statement batch in one transaction. Rows whose idempotency
    /// key already exists are left untouched and reported as duplicates.
    async fn insert_imported_transactions(
        &self,
        batch: Vec<NewTransaction>,
    ) -> Result<Vec<ImportedInsert>> {
        for new_transaction in &batch {
            new_transaction.validate()?;
        }
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<Vec<ImportedInsert>> {
                let now = now_timestamp();
                let mut outcomes = Vec::with_capacity(batch.len());
                for new_transaction in batch {
                    let transaction_db = TransactionDB::from_new(new_transaction, &now)?;
                    let inserted = diesel::insert_into(transactions::table)
                        .values(&transaction_db)
                        .on_conflict_do_nothing()
                        .execute(conn)
                        .map_err(StorageError::from)?;
                    if inserted == 0 {
                        debug!(
                            "Import skipped existing idempotency key {}",
                            transaction_db.idempotency_key
                        );
                        outcomes.push(ImportedInsert::Duplicate {
                            idempotency_key: transaction_db.idempotency_key,
                        });
                        continue;
                    }
                    write_outbox_event(
                        conn,
                        OutboxWriteRequest::new(
                            SyncTable::Transactions,
                            transaction_db.id.clone(),
                            SyncOperation::Insert,
                            serde_json::to_value(&transaction_db)?,
                        ),
                    )?;
                    outcomes.push(ImportedInsert::Inserted(Transaction::try_from(
                        transaction_db,
                    )?));
                }
                Ok(outcomes)
            })
            .await
    }

    async fn update_transaction(&self, update: TransactionUpdate) -> Result<Transaction> {
        update.validate()?;
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<Transaction> {
                let existing = transactions
                    .find(&update.id)
                    .first::<TransactionDB>(conn)
                    .map_err(StorageError::from)?;
                let updated = TransactionDB {
                    category_id: update.category_id,
                    amount: update.amount.normalize().to_string(),
                    direction: update.direction.as_str().to_string(),
                    date: format_date(update.date),
                    raw_description: update.raw_description,
                    clean_description: update.clean_description,
                    merchant_name: update.merchant_name,
                    status: update.status.as_str().to_string(),
                    is_excluded: update.is_excluded,
                    notes: update.notes,
                    updated_at: now_timestamp(),
                    ..existing.clone()
                };
                save_row(conn, &existing, &updated)?;
                Transaction::try_from(updated)
            })
            .await
    }

    /// Deletes a transaction. Records that were reconciled into it become
    /// first-class again so their amounts are not lost.
    async fn delete_transaction(&self, transaction_id: String) -> Result<usize> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<usize> {
                let released = release_reconciled_sources(conn, &transaction_id)?;
                if released > 0 {
                    debug!(
                        "Released {} reconciled record(s) from {}",
                        released, transaction_id
                    );
                }
                delete_row(conn, &transaction_id)
            })
            .await
    }

    async fn apply_reconciliation_merge(&self, merge: ReconciliationMerge) -> Result<MergeOutcome> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<MergeOutcome> {
                let manual = find_row(conn, &merge.manual_id)?.ok_or_else(|| {
                    ReconciliationError::TransactionNotFound(merge.manual_id.clone())
                })?;
                let imported = find_row(conn, &merge.imported_id)?.ok_or_else(|| {
                    ReconciliationError::TransactionNotFound(merge.imported_id.clone())
                })?;
                let plan = validate_merge(
                    &Transaction::try_from(manual.clone())?,
                    &Transaction::try_from(imported.clone())?,
                    &merge,
                )?;

                let stamp = now_timestamp();
                let merged_imported = TransactionDB {
                    category_id: plan.category_id,
                    notes: plan.notes,
                    capture_method: CaptureMethod::Reconciled.as_str().to_string(),
                    status: TransactionStatus::Confirmed.as_str().to_string(),
                    reconciliation_score: Some(merge.score),
                    updated_at: stamp.clone(),
                    ..imported.clone()
                };
                let reconciled_manual = TransactionDB {
                    reconciled_into_transaction_id: Some(imported.id.clone()),
                    reconciliation_score: Some(merge.score),
                    updated_at: stamp,
                    ..manual.clone()
                };
                save_row(conn, &imported, &merged_imported)?;
                save_row(conn, &manual, &reconciled_manual)?;

                Ok(MergeOutcome {
                    imported: Transaction::try_from(merged_imported)?,
                    manual: Transaction::try_from(reconciled_manual)?,
                })
            })
            .await
    }
}

