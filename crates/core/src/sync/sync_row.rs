//! Typed rows pulled from the remote store.
//!
//! The remote store speaks loosely typed JSON: booleans may arrive as `0/1`,
//! decimals as numbers or strings, and JSON columns either inline or as
//! encoded text. `SyncRow::from_remote` normalizes all of that into the
//! domain types, or rejects the row.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

use super::sync_model::SyncTable;
use crate::accounts::{Account, AccountType};
use crate::budgets::Budget;
use crate::categories::Category;
use crate::profile::Profile;
use crate::statements::{StatementSnapshot, StatementType};
use crate::transactions::{CaptureMethod, Transaction, TransactionDirection, TransactionStatus};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SyncRowError {
    #[error("{table} row is not a JSON object")]
    NotAnObject { table: SyncTable },

    #[error("{table} row is missing '{field}'")]
    MissingField { table: SyncTable, field: String },

    #[error("{table} row has invalid '{field}': {reason}")]
    InvalidField {
        table: SyncTable,
        field: String,
        reason: String,
    },
}

/// One row per replicated table, in domain form.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncRow {
    Profile(Profile),
    Account(Account),
    Category(Category),
    Budget(Budget),
    StatementSnapshot(StatementSnapshot),
    Transaction(Transaction),
}

impl SyncRow {
    pub fn from_remote(table: SyncTable, value: &Value) -> Result<Self, SyncRowError> {
        let row = RemoteRow::new(table, value)?;
        let parsed = match table {
            SyncTable::Profiles => SyncRow::Profile(Profile {
                id: row.string("id")?,
                display_name: row.string("display_name")?,
                base_currency: row.string("base_currency")?,
                locale: row.string("locale")?,
                created_at: row.timestamp("created_at")?,
                updated_at: row.timestamp("updated_at")?,
            }),
            SyncTable::Accounts => SyncRow::Account(Account {
                id: row.string("id")?,
                name: row.string("name")?,
                account_type: row.parsed::<AccountType>("account_type")?,
                institution: row.opt_string("institution")?,
                currency: row.string("currency")?,
                last_four: row.opt_string("last_four")?,
                is_active: row.boolean("is_active")?,
                created_at: row.timestamp("created_at")?,
                updated_at: row.timestamp("updated_at")?,
            }),
            SyncTable::Categories => SyncRow::Category(Category {
                id: row.string("id")?,
                name: row.string("name")?,
                kind: row.parsed::<TransactionDirection>("kind")?,
                parent_id: row.opt_string("parent_id")?,
                color: row.opt_string("color")?,
                icon: row.opt_string("icon")?,
                is_active: row.boolean("is_active")?,
                created_at: row.timestamp("created_at")?,
                updated_at: row.timestamp("updated_at")?,
            }),
            SyncTable::Budgets => SyncRow::Budget(Budget {
                id: row.string("id")?,
                category_id: row.string("category_id")?,
                month: row.string("month")?,
                amount_limit: row.decimal("amount_limit")?,
                currency: row.string("currency")?,
                created_at: row.timestamp("created_at")?,
                updated_at: row.timestamp("updated_at")?,
            }),
            SyncTable::StatementSnapshots => SyncRow::StatementSnapshot(StatementSnapshot {
                id: row.string("id")?,
                account_id: row.string("account_id")?,
                provider: row.string("provider")?,
                statement_type: row.parsed::<StatementType>("statement_type")?,
                period_from: row.opt_date("period_from")?,
                period_to: row.opt_date("period_to")?,
                currency: row.string("currency")?,
                summary: row.opt_json("summary")?,
                credit_card_metadata: row.opt_json("credit_card_metadata")?,
                transaction_count: row.integer("transaction_count")?,
                created_at: row.timestamp("created_at")?,
                updated_at: row.timestamp("updated_at")?,
            }),
            SyncTable::Transactions => SyncRow::Transaction(Transaction {
                id: row.string("id")?,
                account_id: row.string("account_id")?,
                category_id: row.opt_string("category_id")?,
                amount: row.decimal("amount")?,
                direction: row.parsed::<TransactionDirection>("direction")?,
                date: row.date("date")?,
                raw_description: row.string("raw_description")?,
                clean_description: row.opt_string("clean_description")?,
                merchant_name: row.opt_string("merchant_name")?,
                status: row.parsed::<TransactionStatus>("status")?,
                currency: row.string("currency")?,
                idempotency_key: row.string("idempotency_key")?,
                is_excluded: row.boolean("is_excluded")?,
                notes: row.opt_string("notes")?,
                capture_method: row.parsed::<CaptureMethod>("capture_method")?,
                capture_provider: row.opt_string("capture_provider")?,
                reconciled_into_transaction_id: row.opt_string("reconciled_into_transaction_id")?,
                reconciliation_score: row.opt_float("reconciliation_score")?,
                created_at: row.timestamp("created_at")?,
                updated_at: row.timestamp("updated_at")?,
            }),
        };
        Ok(parsed)
    }

    pub fn table(&self) -> SyncTable {
        match self {
            SyncRow::Profile(_) => SyncTable::Profiles,
            SyncRow::Account(_) => SyncTable::Accounts,
            SyncRow::Category(_) => SyncTable::Categories,
            SyncRow::Budget(_) => SyncTable::Budgets,
            SyncRow::StatementSnapshot(_) => SyncTable::StatementSnapshots,
            SyncRow::Transaction(_) => SyncTable::Transactions,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            SyncRow::Profile(row) => &row.id,
            SyncRow::Account(row) => &row.id,
            SyncRow::Category(row) => &row.id,
            SyncRow::Budget(row) => &row.id,
            SyncRow::StatementSnapshot(row) => &row.id,
            SyncRow::Transaction(row) => &row.id,
        }
    }

    pub fn updated_at(&self) -> NaiveDateTime {
        match self {
            SyncRow::Profile(row) => row.updated_at,
            SyncRow::Account(row) => row.updated_at,
            SyncRow::Category(row) => row.updated_at,
            SyncRow::Budget(row) => row.updated_at,
            SyncRow::StatementSnapshot(row) => row.updated_at,
            SyncRow::Transaction(row) => row.updated_at,
        }
    }
}

/// Reads `updated_at` straight from a raw remote row, so rows that fail to
/// parse still count toward the pull position.
pub fn remote_updated_at(value: &Value) -> Option<NaiveDateTime> {
    value
        .get("updated_at")
        .and_then(Value::as_str)
        .and_then(parse_timestamp)
}

/// Reads the primary key from a raw remote row as text.
pub fn remote_row_id(value: &Value) -> Option<String> {
    match value.get("id")? {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

/// Accepts RFC 3339 (any offset, converted to UTC) or a naive
/// `YYYY-MM-DD[ T]HH:MM:SS[.f]` value taken as UTC.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc).naive_utc());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            // Postgres text output: `2024-03-02 10:00:00+00`
            DateTime::parse_from_str(&format!("{}00", value), "%Y-%m-%d %H:%M:%S%.f%z")
                .ok()
                .map(|parsed| parsed.with_timezone(&Utc).naive_utc())
        })
}

struct RemoteRow<'a> {
    table: SyncTable,
    fields: &'a Map<String, Value>,
}

impl<'a> RemoteRow<'a> {
    fn new(table: SyncTable, value: &'a Value) -> Result<Self, SyncRowError> {
        value
            .as_object()
            .map(|fields| Self { table, fields })
            .ok_or(SyncRowError::NotAnObject { table })
    }

    fn get(&self, field: &str) -> Option<&'a Value> {
        self.fields.get(field).filter(|value| !value.is_null())
    }

    fn missing(&self, field: &str) -> SyncRowError {
        SyncRowError::MissingField {
            table: self.table,
            field: field.to_string(),
        }
    }

    fn invalid(&self, field: &str, reason: impl Into<String>) -> SyncRowError {
        SyncRowError::InvalidField {
            table: self.table,
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    fn string(&self, field: &str) -> Result<String, SyncRowError> {
        self.opt_string(field)?.ok_or_else(|| self.missing(field))
    }

    fn opt_string(&self, field: &str) -> Result<Option<String>, SyncRowError> {
        match self.get(field) {
            None => Ok(None),
            Some(Value::String(value)) => Ok(Some(value.clone())),
            Some(Value::Number(value)) => Ok(Some(value.to_string())),
            Some(other) => Err(self.invalid(field, format!("expected text, got {}", other))),
        }
    }

    fn parsed<T: FromStr>(&self, field: &str) -> Result<T, SyncRowError> {
        let raw = self.string(field)?;
        raw.parse::<T>()
            .map_err(|_| self.invalid(field, format!("unrecognized value '{}'", raw)))
    }

    fn boolean(&self, field: &str) -> Result<bool, SyncRowError> {
        match self.get(field) {
            // Missing flags default to false, matching the column defaults.
            None => Ok(false),
            Some(Value::Bool(value)) => Ok(*value),
            Some(Value::Number(value)) => match value.as_i64() {
                Some(0) => Ok(false),
                Some(1) => Ok(true),
                _ => Err(self.invalid(field, format!("expected 0 or 1, got {}", value))),
            },
            Some(Value::String(value)) => match value.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "1" => Ok(true),
                "false" | "f" | "0" => Ok(false),
                other => Err(self.invalid(field, format!("expected boolean, got '{}'", other))),
            },
            Some(other) => Err(self.invalid(field, format!("expected boolean, got {}", other))),
        }
    }

    fn decimal(&self, field: &str) -> Result<Decimal, SyncRowError> {
        let value = self.get(field).ok_or_else(|| self.missing(field))?;
        let text = match value {
            Value::Number(number) => number.to_string(),
            Value::String(text) => text.trim().to_string(),
            other => return Err(self.invalid(field, format!("expected decimal, got {}", other))),
        };
        Decimal::from_str(&text)
            .or_else(|_| Decimal::from_scientific(&text))
            .map_err(|err| self.invalid(field, err.to_string()))
    }

    fn integer(&self, field: &str) -> Result<i32, SyncRowError> {
        match self.get(field) {
            None => Ok(0),
            Some(Value::Number(number)) => number
                .as_i64()
                .and_then(|n| i32::try_from(n).ok())
                .ok_or_else(|| self.invalid(field, format!("expected integer, got {}", number))),
            Some(Value::String(text)) => text
                .trim()
                .parse::<i32>()
                .map_err(|err| self.invalid(field, err.to_string())),
            Some(other) => Err(self.invalid(field, format!("expected integer, got {}", other))),
        }
    }

    fn opt_float(&self, field: &str) -> Result<Option<f64>, SyncRowError> {
        match self.get(field) {
            None => Ok(None),
            Some(Value::Number(number)) => Ok(number.as_f64()),
            Some(Value::String(text)) => text
                .trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|err| self.invalid(field, err.to_string())),
            Some(other) => Err(self.invalid(field, format!("expected number, got {}", other))),
        }
    }

    fn timestamp(&self, field: &str) -> Result<NaiveDateTime, SyncRowError> {
        let raw = self.string(field)?;
        parse_timestamp(&raw).ok_or_else(|| self.invalid(field, format!("bad timestamp '{}'", raw)))
    }

    fn date(&self, field: &str) -> Result<NaiveDate, SyncRowError> {
        self.opt_date(field)?.ok_or_else(|| self.missing(field))
    }

    fn opt_date(&self, field: &str) -> Result<Option<NaiveDate>, SyncRowError> {
        let Some(raw) = self.opt_string(field)? else {
            return Ok(None);
        };
        NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
            .ok()
            .or_else(|| parse_timestamp(&raw).map(|ts| ts.date()))
            .map(Some)
            .ok_or_else(|| self.invalid(field, format!("bad date '{}'", raw)))
    }

    /// JSON column that may arrive inline or as encoded text.
    fn opt_json<T: DeserializeOwned>(&self, field: &str) -> Result<Option<T>, SyncRowError> {
        let value = match self.get(field) {
            None => return Ok(None),
            Some(Value::String(text)) if text.trim().is_empty() => return Ok(None),
            Some(Value::String(text)) => serde_json::from_str::<Value>(text)
                .map_err(|err| self.invalid(field, err.to_string()))?,
            Some(other) => other.clone(),
        };
        if value.is_null() {
            return Ok(None);
        }
        serde_json::from_value(normalize_json_keys(value))
            .map(Some)
            .map_err(|err| self.invalid(field, err.to_string()))
    }
}

/// JSON columns are written in camelCase locally but other clients may send
/// snake_case keys; rewrite object keys to camelCase before decoding.
fn normalize_json_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (snake_to_camel(&key), normalize_json_keys(value)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_json_keys).collect()),
        other => other,
    }
}

fn snake_to_camel(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper = false;
    for c in key.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}
