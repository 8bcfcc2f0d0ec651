//! Parsed bank statements and their persisted snapshots.

use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::{Error, Result, ValidationError};
use crate::reconciliation::{MergeOutcome, ReconciliationMatch};
use crate::transactions::{Transaction, TransactionDirection};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementType {
    Savings,
    CreditCard,
    Loan,
}

impl StatementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Savings => "savings",
            Self::CreditCard => "credit_card",
            Self::Loan => "loan",
        }
    }
}

impl FromStr for StatementType {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "savings" => Ok(Self::Savings),
            "credit_card" => Ok(Self::CreditCard),
            "loan" => Ok(Self::Loan),
            other => Err(Error::invalid_input(format!(
                "Unknown statement type '{}'",
                other
            ))),
        }
    }
}

/// One movement line as read from the statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedTransaction {
    pub date: NaiveDate,
    pub description: String,
    /// Always a positive magnitude; `direction` carries the sign.
    pub amount: Decimal,
    pub direction: TransactionDirection,
    pub balance: Option<Decimal>,
    pub currency: Option<String>,
    pub authorization_number: Option<String>,
    /// Installment marker such as `1/24`.
    pub installments: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementSummary {
    pub previous_balance: Option<Decimal>,
    pub total_credits: Option<Decimal>,
    pub total_debits: Option<Decimal>,
    pub final_balance: Option<Decimal>,
    pub purchases_and_charges: Option<Decimal>,
    pub interest_charged: Option<Decimal>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditCardMetadata {
    pub credit_limit: Option<Decimal>,
    pub available_credit: Option<Decimal>,
    /// Monthly rate as reported by the bank.
    pub interest_rate: Option<Decimal>,
    pub late_interest_rate: Option<Decimal>,
    pub total_payment_due: Option<Decimal>,
    pub minimum_payment: Option<Decimal>,
    pub payment_due_date: Option<NaiveDate>,
}

/// Output of the statement parser, consumed as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedStatement {
    /// Issuing bank slug, e.g. `bancolombia` or `nu`. Used as the capture provider.
    pub bank: String,
    pub statement_type: StatementType,
    pub account_number: Option<String>,
    pub card_last_four: Option<String>,
    pub period_from: Option<NaiveDate>,
    pub period_to: Option<NaiveDate>,
    pub currency: String,
    pub summary: Option<StatementSummary>,
    pub credit_card_metadata: Option<CreditCardMetadata>,
    pub transactions: Vec<ParsedTransaction>,
}

impl ParsedStatement {
    pub fn validate(&self) -> Result<()> {
        if self.bank.trim().is_empty() {
            return Err(ValidationError::MissingField("bank".to_string()).into());
        }
        if let (Some(from), Some(to)) = (self.period_from, self.period_to) {
            if from > to {
                return Err(Error::invalid_input(format!(
                    "statement period starts after it ends ({} > {})",
                    from, to
                )));
            }
        }
        for (index, line) in self.transactions.iter().enumerate() {
            if line.amount <= Decimal::ZERO {
                return Err(ValidationError::InvalidAmount(format!(
                    "line {} has non-positive amount {}",
                    index, line.amount
                ))
                .into());
            }
            if line.description.trim().is_empty() {
                return Err(ValidationError::MissingField(format!(
                    "transactions[{}].description",
                    index
                ))
                .into());
            }
        }
        Ok(())
    }

    /// Provider component of the idempotency fingerprint.
    pub fn provider(&self) -> String {
        self.bank.trim().to_ascii_lowercase()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementSnapshot {
    pub id: String,
    pub account_id: String,
    pub provider: String,
    pub statement_type: StatementType,
    pub period_from: Option<NaiveDate>,
    pub period_to: Option<NaiveDate>,
    pub currency: String,
    pub summary: Option<StatementSummary>,
    pub credit_card_metadata: Option<CreditCardMetadata>,
    pub transaction_count: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStatementSnapshot {
    pub id: String,
    pub account_id: String,
    pub provider: String,
    pub statement_type: StatementType,
    pub period_from: Option<NaiveDate>,
    pub period_to: Option<NaiveDate>,
    pub currency: String,
    pub summary: Option<StatementSummary>,
    pub credit_card_metadata: Option<CreditCardMetadata>,
    pub transaction_count: i32,
}

impl NewStatementSnapshot {
    pub fn from_statement(account_id: &str, statement: &ParsedStatement) -> Self {
        Self {
            id: snapshot_id(account_id, statement),
            account_id: account_id.to_string(),
            provider: statement.provider(),
            statement_type: statement.statement_type,
            period_from: statement.period_from,
            period_to: statement.period_to,
            currency: statement.currency.clone(),
            summary: statement.summary.clone(),
            credit_card_metadata: statement.credit_card_metadata.clone(),
            transaction_count: i32::try_from(statement.transactions.len()).unwrap_or(i32::MAX),
        }
    }
}

/// Content-derived id so re-importing the same statement period reuses its snapshot.
pub fn snapshot_id(account_id: &str, statement: &ParsedStatement) -> String {
    let period = |d: Option<NaiveDate>| d.map(|d| d.to_string()).unwrap_or_default();
    let canonical = [
        "statement".to_string(),
        account_id.trim().to_string(),
        statement.provider(),
        statement.statement_type.as_str().to_string(),
        period(statement.period_from),
        period(statement.period_to),
    ]
    .join("|");
    let digest = Sha256::digest(canonical.as_bytes());
    format!("{:x}", digest)[..32].to_string()
}

/// Imported row whose best match needs a human decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingReview {
    pub transaction: Transaction,
    pub suggestion: ReconciliationMatch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementImportResult {
    pub snapshot: StatementSnapshot,
    pub inserted: Vec<Transaction>,
    pub duplicate_count: usize,
    pub auto_merged: Vec<MergeOutcome>,
    pub pending_review: Vec<PendingReview>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn statement() -> ParsedStatement {
        ParsedStatement {
            bank: "Bancolombia".to_string(),
            statement_type: StatementType::Savings,
            account_number: Some("123-456789-00".to_string()),
            card_last_four: None,
            period_from: NaiveDate::from_ymd_opt(2024, 3, 1),
            period_to: NaiveDate::from_ymd_opt(2024, 3, 31),
            currency: "COP".to_string(),
            summary: None,
            credit_card_metadata: None,
            transactions: vec![ParsedTransaction {
                date: NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(),
                description: "NETFLIX.COM".to_string(),
                amount: dec!(50000),
                direction: TransactionDirection::Outflow,
                balance: None,
                currency: None,
                authorization_number: None,
                installments: None,
            }],
        }
    }

    #[test]
    fn snapshot_id_is_stable_per_period() {
        let a = snapshot_id("acc-1", &statement());
        let b = snapshot_id("acc-1", &statement());
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);

        let mut april = statement();
        april.period_from = NaiveDate::from_ymd_opt(2024, 4, 1);
        assert_ne!(a, snapshot_id("acc-1", &april));
    }

    #[test]
    fn parser_payload_deserializes() {
        let json = serde_json::json!({
            "bank": "nu",
            "statementType": "credit_card",
            "accountNumber": null,
            "cardLastFour": "4321",
            "periodFrom": "2024-02-15",
            "periodTo": "2024-03-14",
            "currency": "COP",
            "summary": { "finalBalance": "1250000.50" },
            "creditCardMetadata": null,
            "transactions": []
        });
        let parsed: ParsedStatement = serde_json::from_value(json).expect("statement");
        assert_eq!(parsed.statement_type, StatementType::CreditCard);
        assert_eq!(
            parsed.summary.and_then(|s| s.final_balance),
            Some(dec!(1250000.50))
        );
    }

    #[test]
    fn validate_rejects_inverted_period_and_bad_lines() {
        let mut inverted = statement();
        inverted.period_from = NaiveDate::from_ymd_opt(2024, 4, 1);
        assert!(inverted.validate().is_err());

        let mut zero = statement();
        zero.transactions[0].amount = Decimal::ZERO;
        assert!(zero.validate().is_err());

        assert!(statement().validate().is_ok());
    }
}
