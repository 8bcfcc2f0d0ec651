use async_trait::async_trait;
use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::SqliteConnection;
use std::sync::Arc;
use uuid::Uuid;

use ledgerline_core::budgets::{Budget, BudgetRepositoryTrait, BudgetUpdate, NewBudget};
use ledgerline_core::sync::{SyncOperation, SyncTable};
use ledgerline_core::Result;

use super::model::BudgetDB;
use crate::db::{get_connection, now_timestamp, WriteHandle};
use crate::errors::StorageError;
use crate::schema::budgets;
use crate::schema::budgets::dsl::*;
use crate::sync::{write_outbox_event, OutboxWriteRequest};

pub struct BudgetRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl BudgetRepository {
    pub fn new(
        pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
        writer: WriteHandle,
    ) -> Self {
        BudgetRepository { pool, writer }
    }
}

pub(crate) fn delete_budgets_for_category(
    conn: &mut SqliteConnection,
    category: &str,
) -> Result<usize> {
    let ids = budgets
        .filter(category_id.eq(category))
        .select(id)
        .load::<String>(conn)
        .map_err(StorageError::from)?;
    for budget_id in &ids {
        diesel::delete(budgets.find(budget_id))
            .execute(conn)
            .map_err(StorageError::from)?;
        write_outbox_event(
            conn,
            OutboxWriteRequest::delete(SyncTable::Budgets, budget_id.clone()),
        )?;
    }
    Ok(ids.len())
}

#[async_trait]
impl BudgetRepositoryTrait for BudgetRepository {
    fn list_budgets_for_month(&self, budget_month: &str) -> Result<Vec<Budget>> {
        let mut conn = get_connection(&self.pool)?;
        budgets
            .filter(month.eq(budget_month))
            .order(category_id.asc())
            .load::<BudgetDB>(&mut conn)
            .map_err(StorageError::from)?
            .into_iter()
            .map(Budget::try_from)
            .collect()
    }

    async fn create_budget(&self, new_budget: NewBudget) -> Result<Budget> {
        new_budget.validate()?;
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<Budget> {
                let now = now_timestamp();
                let budget_db = BudgetDB {
                    id: new_budget
                        .id
                        .filter(|value| !value.trim().is_empty())
                        .unwrap_or_else(|| Uuid::now_v7().to_string()),
                    category_id: new_budget.category_id,
                    month: new_budget.month,
                    amount_limit: new_budget.amount_limit.to_string(),
                    currency: new_budget.currency,
                    created_at: now.clone(),
                    updated_at: now,
                };
                let result_db = diesel::insert_into(budgets::table)
                    .values(&budget_db)
                    .returning(BudgetDB::as_returning())
                    .get_result(conn)
                    .map_err(StorageError::from)?;
                write_outbox_event(
                    conn,
                    OutboxWriteRequest::new(
                        SyncTable::Budgets,
                        result_db.id.clone(),
                        SyncOperation::Insert,
                        serde_json::to_value(&result_db)?,
                    ),
                )?;
                Budget::try_from(result_db)
            })
            .await
    }

    async fn update_budget(&self, update: BudgetUpdate) -> Result<Budget> {
        update.validate()?;
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<Budget> {
                let existing = budgets
                    .find(&update.id)
                    .first::<BudgetDB>(conn)
                    .map_err(StorageError::from)?;
                let updated = BudgetDB {
                    amount_limit: update.amount_limit.to_string(),
                    currency: update.currency,
                    updated_at: now_timestamp(),
                    ..existing.clone()
                };
                diesel::update(budgets.find(&existing.id))
                    .set(&updated)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                write_outbox_event(
                    conn,
                    OutboxWriteRequest::update(
                        SyncTable::Budgets,
                        existing.id.clone(),
                        &serde_json::to_value(&existing)?,
                        &serde_json::to_value(&updated)?,
                    ),
                )?;
                Budget::try_from(updated)
            })
            .await
    }

    async fn delete_budget(&self, budget_id: String) -> Result<usize> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<usize> {
                let affected = diesel::delete(budgets.find(&budget_id))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                if affected > 0 {
                    write_outbox_event(
                        conn,
                        OutboxWriteRequest::delete(SyncTable::Budgets, budget_id.clone()),
                    )?;
                }
                Ok(affected)
            })
            .await
    }
}
