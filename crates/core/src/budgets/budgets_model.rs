//! Monthly budget models.

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result, ValidationError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Budget {
    pub id: String,
    pub category_id: String,
    /// Calendar month in `YYYY-MM` form.
    pub month: String,
    pub amount_limit: Decimal,
    pub currency: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBudget {
    pub id: Option<String>,
    pub category_id: String,
    pub month: String,
    pub amount_limit: Decimal,
    pub currency: String,
}

impl NewBudget {
    pub fn validate(&self) -> Result<()> {
        if self.category_id.trim().is_empty() {
            return Err(ValidationError::MissingField("categoryId".to_string()).into());
        }
        validate_month(&self.month)?;
        validate_limit(self.amount_limit)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetUpdate {
    pub id: String,
    pub amount_limit: Decimal,
    pub currency: String,
}

impl BudgetUpdate {
    pub fn validate(&self) -> Result<()> {
        validate_limit(self.amount_limit)
    }
}

/// Accepts `YYYY-MM` with a real month.
pub fn validate_month(month: &str) -> Result<()> {
    NaiveDate::parse_from_str(&format!("{}-01", month), "%Y-%m-%d")
        .ok()
        .filter(|_| month.len() == 7)
        .map(|_| ())
        .ok_or_else(|| Error::invalid_input(format!("month must be YYYY-MM, got '{}'", month)))
}

fn validate_limit(limit: Decimal) -> Result<()> {
    if limit < Decimal::ZERO {
        return Err(ValidationError::InvalidAmount(format!(
            "budget limit cannot be negative, got {}",
            limit
        ))
        .into());
    }
    Ok(())
}
