use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use ledgerline_core::errors::{Error, Result};
use ledgerline_core::statements::{NewStatementSnapshot, StatementSnapshot};

use crate::db::{format_date, format_timestamp, parse_db_date, parse_db_timestamp};

/// Statement header as stored. Summary and card metadata are JSON text.
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
#[diesel(table_name = crate::schema::statement_snapshots)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(treat_none_as_null = true)]
pub struct StatementSnapshotDB {
    pub id: String,
    pub account_id: String,
    pub provider: String,
    pub statement_type: String,
    pub period_from: Option<String>,
    pub period_to: Option<String>,
    pub currency: String,
    pub summary: Option<String>,
    pub credit_card_metadata: Option<String>,
    pub transaction_count: i32,
    pub created_at: String,
    pub updated_at: String,
}

impl StatementSnapshotDB {
    pub fn from_new(snapshot: NewStatementSnapshot, now: &str) -> Result<Self> {
        Ok(Self {
            id: snapshot.id,
            account_id: snapshot.account_id,
            provider: snapshot.provider,
            statement_type: snapshot.statement_type.as_str().to_string(),
            period_from: snapshot.period_from.map(format_date),
            period_to: snapshot.period_to.map(format_date),
            currency: snapshot.currency,
            summary: snapshot
                .summary
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
            credit_card_metadata: snapshot
                .credit_card_metadata
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
            transaction_count: snapshot.transaction_count,
            created_at: now.to_string(),
            updated_at: now.to_string(),
        })
    }
}

impl TryFrom<StatementSnapshot> for StatementSnapshotDB {
    type Error = Error;

    fn try_from(snapshot: StatementSnapshot) -> Result<Self> {
        Ok(Self {
            summary: snapshot
                .summary
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
            credit_card_metadata: snapshot
                .credit_card_metadata
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
            statement_type: snapshot.statement_type.as_str().to_string(),
            period_from: snapshot.period_from.map(format_date),
            period_to: snapshot.period_to.map(format_date),
            created_at: format_timestamp(snapshot.created_at),
            updated_at: format_timestamp(snapshot.updated_at),
            id: snapshot.id,
            account_id: snapshot.account_id,
            provider: snapshot.provider,
            currency: snapshot.currency,
            transaction_count: snapshot.transaction_count,
        })
    }
}

impl TryFrom<StatementSnapshotDB> for StatementSnapshot {
    type Error = Error;

    fn try_from(db: StatementSnapshotDB) -> Result<Self> {
        Ok(StatementSnapshot {
            statement_type: db.statement_type.parse()?,
            period_from: db.period_from.as_deref().map(parse_db_date).transpose()?,
            period_to: db.period_to.as_deref().map(parse_db_date).transpose()?,
            summary: db.summary.as_deref().map(serde_json::from_str).transpose()?,
            credit_card_metadata: db
                .credit_card_metadata
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            created_at: parse_db_timestamp(&db.created_at)?,
            updated_at: parse_db_timestamp(&db.updated_at)?,
            id: db.id,
            account_id: db.account_id,
            provider: db.provider,
            currency: db.currency,
            transaction_count: db.transaction_count,
        })
    }
}
