use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use ledgerline_core::budgets::Budget;
use ledgerline_core::errors::{Error, Result};

use crate::db::{format_timestamp, parse_db_decimal, parse_db_timestamp};

#[derive(
    Queryable,
    Identifiable,
    Insertable,
    AsChangeset,
    Selectable,
    Debug,
    Clone,
    PartialEq,
    Serialize,
    Deserialize,
)]
#[diesel(table_name = crate::schema::budgets)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct BudgetDB {
    pub id: String,
    pub category_id: String,
    pub month: String,
    pub amount_limit: String,
    pub currency: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Budget> for BudgetDB {
    fn from(budget: Budget) -> Self {
        Self {
            id: budget.id,
            category_id: budget.category_id,
            month: budget.month,
            amount_limit: budget.amount_limit.to_string(),
            currency: budget.currency,
            created_at: format_timestamp(budget.created_at),
            updated_at: format_timestamp(budget.updated_at),
        }
    }
}

impl TryFrom<BudgetDB> for Budget {
    type Error = Error;

    fn try_from(db: BudgetDB) -> Result<Self> {
        Ok(Budget {
            amount_limit: parse_db_decimal(&db.amount_limit)?,
            created_at: parse_db_timestamp(&db.created_at)?,
            updated_at: parse_db_timestamp(&db.updated_at)?,
            id: db.id,
            category_id: db.category_id,
            month: db.month,
            currency: db.currency,
        })
    }
}
