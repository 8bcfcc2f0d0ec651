use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use ledgerline_core::errors::{Error, Result, ValidationError};
use ledgerline_core::transactions::{NewTransaction, Transaction};

use crate::db::{format_date, format_timestamp, parse_db_date, parse_db_decimal, parse_db_timestamp};

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
#[diesel(table_name = crate::schema::transactions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(treat_none_as_null = true)]
pub struct TransactionDB {
    pub id: String,
    pub account_id: String,
    pub category_id: Option<String>,
    pub amount: String,
    pub direction: String,
    pub date: String,
    pub raw_description: String,
    pub clean_description: Option<String>,
    pub merchant_name: Option<String>,
    pub status: String,
    pub currency: String,
    pub idempotency_key: String,
    pub is_excluded: bool,
    pub notes: Option<String>,
    pub capture_method: String,
    pub capture_provider: Option<String>,
    pub reconciled_into_transaction_id: Option<String>,
    pub reconciliation_score: Option<f64>,
    pub created_at: String,
    pub updated_at: String,
}

impl TransactionDB {
    /// Row for a new transaction. The id and idempotency key must already be
    /// filled in by the service layer.
    pub fn from_new(new_transaction: NewTransaction, now: &str) -> Result<Self> {
        let id = new_transaction
            .id
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| ValidationError::MissingField("id".to_string()))?;
        let idempotency_key = new_transaction
            .idempotency_key
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| ValidationError::MissingField("idempotencyKey".to_string()))?;
        Ok(Self {
            id,
            account_id: new_transaction.account_id,
            category_id: new_transaction.category_id,
            amount: new_transaction.amount.normalize().to_string(),
            direction: new_transaction.direction.as_str().to_string(),
            date: format_date(new_transaction.date),
            raw_description: new_transaction.raw_description,
            clean_description: new_transaction.clean_description,
            merchant_name: new_transaction.merchant_name,
            status: new_transaction.status.as_str().to_string(),
            currency: new_transaction.currency,
            idempotency_key,
            is_excluded: false,
            notes: new_transaction.notes,
            capture_method: new_transaction.capture_method.as_str().to_string(),
            capture_provider: new_transaction.capture_provider,
            reconciled_into_transaction_id: None,
            reconciliation_score: None,
            created_at: now.to_string(),
            updated_at: now.to_string(),
        })
    }
}

impl From<Transaction> for TransactionDB {
    fn from(transaction: Transaction) -> Self {
        Self {
            id: transaction.id,
            account_id: transaction.account_id,
            category_id: transaction.category_id,
            amount: transaction.amount.normalize().to_string(),
            direction: transaction.direction.as_str().to_string(),
            date: format_date(transaction.date),
            raw_description: transaction.raw_description,
            clean_description: transaction.clean_description,
            merchant_name: transaction.merchant_name,
            status: transaction.status.as_str().to_string(),
            currency: transaction.currency,
            idempotency_key: transaction.idempotency_key,
            is_excluded: transaction.is_excluded,
            notes: transaction.notes,
            capture_method: transaction.capture_method.as_str().to_string(),
            capture_provider: transaction.capture_provider,
            reconciled_into_transaction_id: transaction.reconciled_into_transaction_id,
            reconciliation_score: transaction.reconciliation_score,
            created_at: format_timestamp(transaction.created_at),
            updated_at: format_timestamp(transaction.updated_at),
        }
    }
}

impl TryFrom<TransactionDB> for Transaction {
    type Error = Error;

    fn try_from(db: TransactionDB) -> Result<Self> {
        Ok(Transaction {
            amount: parse_db_decimal(&db.amount)?,
            direction: db.direction.parse()?,
            date: parse_db_date(&db.date)?,
            status: db.status.parse()?,
            capture_method: db.capture_method.parse()?,
            created_at: parse_db_timestamp(&db.created_at)?,
            updated_at: parse_db_timestamp(&db.updated_at)?,
            id: db.id,
            account_id: db.account_id,
            category_id: db.category_id,
            raw_description: db.raw_description,
            clean_description: db.clean_description,
            merchant_name: db.merchant_name,
            currency: db.currency,
            idempotency_key: db.idempotency_key,
            is_excluded: db.is_excluded,
            notes: db.notes,
            capture_provider: db.capture_provider,
            reconciled_into_transaction_id: db.reconciled_into_transaction_id,
            reconciliation_score: db.reconciliation_score,
        })
    }
}
