//! Transaction domain models.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result, ValidationError};

/// Direction of a money movement. Amounts are always stored as positive magnitudes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionDirection {
    Inflow,
    Outflow,
}

impl TransactionDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inflow => "INFLOW",
            Self::Outflow => "OUTFLOW",
        }
    }
}

impl FromStr for TransactionDirection {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "INFLOW" => Ok(Self::Inflow),
            "OUTFLOW" => Ok(Self::Outflow),
            other => Err(Error::invalid_input(format!(
                "Unknown transaction direction '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for TransactionDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Confirmed,
    /// Imported row waiting for a human to confirm or reject a suggested match.
    PendingReview,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confirmed => "CONFIRMED",
            Self::PendingReview => "PENDING_REVIEW",
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "CONFIRMED" => Ok(Self::Confirmed),
            "PENDING_REVIEW" => Ok(Self::PendingReview),
            other => Err(Error::invalid_input(format!(
                "Unknown transaction status '{}'",
                other
            ))),
        }
    }
}

/// How a transaction entered the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaptureMethod {
    Manual,
    QuickCapture,
    StatementImport,
    /// Statement import that absorbed a manual entry through a reconciliation merge.
    Reconciled,
}

impl CaptureMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "MANUAL",
            Self::QuickCapture => "QUICK_CAPTURE",
            Self::StatementImport => "STATEMENT_IMPORT",
            Self::Reconciled => "RECONCILED",
        }
    }

    /// User-entered records are the ones a statement import may supersede.
    pub fn is_user_entered(&self) -> bool {
        matches!(self, Self::Manual | Self::QuickCapture)
    }
}

impl FromStr for CaptureMethod {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "MANUAL" => Ok(Self::Manual),
            "QUICK_CAPTURE" => Ok(Self::QuickCapture),
            "STATEMENT_IMPORT" => Ok(Self::StatementImport),
            "RECONCILED" => Ok(Self::Reconciled),
            other => Err(Error::invalid_input(format!(
                "Unknown capture method '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub account_id: String,
    pub category_id: Option<String>,
    pub amount: Decimal,
    pub direction: TransactionDirection,
    pub date: NaiveDate,
    pub raw_description: String,
    pub clean_description: Option<String>,
    pub merchant_name: Option<String>,
    pub status: TransactionStatus,
    pub currency: String,
    pub idempotency_key: String,
    pub is_excluded: bool,
    pub notes: Option<String>,
    pub capture_method: CaptureMethod,
    pub capture_provider: Option<String>,
    pub reconciled_into_transaction_id: Option<String>,
    pub reconciliation_score: Option<f64>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Transaction {
    /// A reconciled transaction is provenance only and never counts toward balances.
    pub fn is_active(&self) -> bool {
        self.reconciled_into_transaction_id.is_none()
    }

    /// Amount with sign applied (inflows positive, outflows negative).
    pub fn signed_amount(&self) -> Decimal {
        match self.direction {
            TransactionDirection::Inflow => self.amount,
            TransactionDirection::Outflow => -self.amount,
        }
    }

    /// Every description variant the record carries, best first.
    pub fn description_variants(&self) -> Vec<&str> {
        let mut variants = vec![self.raw_description.as_str()];
        if let Some(clean) = self.clean_description.as_deref() {
            variants.push(clean);
        }
        if let Some(merchant) = self.merchant_name.as_deref() {
            variants.push(merchant);
        }
        variants
    }
}

/// Input for creating a transaction through the write path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTransaction {
    pub id: Option<String>,
    pub account_id: String,
    pub category_id: Option<String>,
    pub amount: Decimal,
    pub direction: TransactionDirection,
    pub date: NaiveDate,
    pub raw_description: String,
    pub clean_description: Option<String>,
    pub merchant_name: Option<String>,
    pub status: TransactionStatus,
    pub currency: String,
    pub notes: Option<String>,
    pub capture_method: CaptureMethod,
    pub capture_provider: Option<String>,
    /// Filled in by the service layer; repositories reject a missing key.
    pub idempotency_key: Option<String>,
}

impl NewTransaction {
    pub fn validate(&self) -> Result<()> {
        if self.account_id.trim().is_empty() {
            return Err(ValidationError::MissingField("accountId".to_string()).into());
        }
        if self.amount <= Decimal::ZERO {
            return Err(ValidationError::InvalidAmount(format!(
                "amount must be a positive magnitude, got {}",
                self.amount
            ))
            .into());
        }
        if self.raw_description.trim().is_empty() {
            return Err(ValidationError::MissingField("rawDescription".to_string()).into());
        }
        if self.currency.trim().is_empty() {
            return Err(ValidationError::MissingField("currency".to_string()).into());
        }
        Ok(())
    }
}

/// Full set of user-editable fields. The storage layer diffs it against the
/// stored row so only changed columns reach the outbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionUpdate {
    pub id: String,
    pub category_id: Option<String>,
    pub amount: Decimal,
    pub direction: TransactionDirection,
    pub date: NaiveDate,
    pub raw_description: String,
    pub clean_description: Option<String>,
    pub merchant_name: Option<String>,
    pub status: TransactionStatus,
    pub is_excluded: bool,
    pub notes: Option<String>,
}

impl TransactionUpdate {
    /// Starts an update from the current state of a record.
    pub fn from_existing(transaction: &Transaction) -> Self {
        Self {
            id: transaction.id.clone(),
            category_id: transaction.category_id.clone(),
            amount: transaction.amount,
            direction: transaction.direction,
            date: transaction.date,
            raw_description: transaction.raw_description.clone(),
            clean_description: transaction.clean_description.clone(),
            merchant_name: transaction.merchant_name.clone(),
            status: transaction.status,
            is_excluded: transaction.is_excluded,
            notes: transaction.notes.clone(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.amount <= Decimal::ZERO {
            return Err(ValidationError::InvalidAmount(format!(
                "amount must be a positive magnitude, got {}",
                self.amount
            ))
            .into());
        }
        if self.raw_description.trim().is_empty() {
            return Err(ValidationError::MissingField("rawDescription".to_string()).into());
        }
        Ok(())
    }
}

/// Listing filter. Reconciled rows are never returned regardless of filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionFilter {
    pub account_id: Option<String>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub include_excluded: bool,
}

impl TransactionFilter {
    pub fn for_account(account_id: impl Into<String>) -> Self {
        Self {
            account_id: Some(account_id.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionTotals {
    pub inflow: Decimal,
    pub outflow: Decimal,
    pub count: usize,
}

impl TransactionTotals {
    pub fn net(&self) -> Decimal {
        self.inflow - self.outflow
    }
}

/// Calendar month used to scope reconciliation candidate pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CalendarMonth {
    pub year: i32,
    pub month: u32,
}

impl CalendarMonth {
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn first_day(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }

    pub fn last_day(&self) -> Option<NaiveDate> {
        let (year, month) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        NaiveDate::from_ymd_opt(year, month, 1).and_then(|d| d.pred_opt())
    }
}

impl fmt::Display for CalendarMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Query for the reconciliation candidate pool: same account, direction and
/// month, unreconciled, user-entered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidatePoolQuery {
    pub account_id: String,
    pub direction: TransactionDirection,
    pub month: CalendarMonth,
    pub exclude_ids: Vec<String>,
}

/// Per-row outcome of an insert-or-ignore import batch.
#[derive(Debug, Clone, PartialEq)]
pub enum ImportedInsert {
    Inserted(Transaction),
    Duplicate { idempotency_key: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calendar_month_bounds_handle_december_and_leap_years() {
        let december = CalendarMonth { year: 2024, month: 12 };
        assert_eq!(december.first_day(), NaiveDate::from_ymd_opt(2024, 12, 1));
        assert_eq!(december.last_day(), NaiveDate::from_ymd_opt(2024, 12, 31));

        let february = CalendarMonth::of(NaiveDate::from_ymd_opt(2024, 2, 10).unwrap());
        assert_eq!(february.last_day(), NaiveDate::from_ymd_opt(2024, 2, 29));
        assert_eq!(february.to_string(), "2024-02");
    }

    #[test]
    fn enums_round_trip_through_db_strings() {
        for method in [
            CaptureMethod::Manual,
            CaptureMethod::QuickCapture,
            CaptureMethod::StatementImport,
            CaptureMethod::Reconciled,
        ] {
            assert_eq!(method.as_str().parse::<CaptureMethod>().unwrap(), method);
        }
        assert_eq!(
            "outflow".parse::<TransactionDirection>().unwrap(),
            TransactionDirection::Outflow
        );
        assert!("SIDEWAYS".parse::<TransactionDirection>().is_err());
    }

    #[test]
    fn new_transaction_rejects_non_positive_amounts() {
        let new = NewTransaction {
            id: None,
            account_id: "acc-1".to_string(),
            category_id: None,
            amount: Decimal::ZERO,
            direction: TransactionDirection::Outflow,
            date: NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(),
            raw_description: "Netflix".to_string(),
            clean_description: None,
            merchant_name: None,
            status: TransactionStatus::Confirmed,
            currency: "COP".to_string(),
            notes: None,
            capture_method: CaptureMethod::Manual,
            capture_provider: None,
            idempotency_key: None,
        };
        assert!(matches!(
            new.validate(),
            Err(Error::Validation(ValidationError::InvalidAmount(_)))
        ));
    }
}
