//! Account domain models.

use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountType {
    Savings,
    Checking,
    CreditCard,
    Cash,
    Other,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Savings => "SAVINGS",
            Self::Checking => "CHECKING",
            Self::CreditCard => "CREDIT_CARD",
            Self::Cash => "CASH",
            Self::Other => "OTHER",
        }
    }
}

impl FromStr for AccountType {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "SAVINGS" => Ok(Self::Savings),
            "CHECKING" => Ok(Self::Checking),
            "CREDIT_CARD" => Ok(Self::CreditCard),
            "CASH" => Ok(Self::Cash),
            "OTHER" => Ok(Self::Other),
            other => Err(Error::invalid_input(format!(
                "Unknown account type '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub name: String,
    pub account_type: AccountType,
    pub institution: Option<String>,
    pub currency: String,
    /// Last four digits of the card or account number, as printed on statements.
    pub last_four: Option<String>,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccount {
    pub id: Option<String>,
    pub name: String,
    pub account_type: AccountType,
    pub institution: Option<String>,
    pub currency: String,
    pub last_four: Option<String>,
    pub is_active: bool,
}

impl NewAccount {
    pub fn validate(&self) -> Result<()> {
        validate_account_fields(&self.name, &self.currency, self.last_four.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountUpdate {
    pub id: String,
    pub name: String,
    pub account_type: AccountType,
    pub institution: Option<String>,
    pub currency: String,
    pub last_four: Option<String>,
    pub is_active: bool,
}

impl AccountUpdate {
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(ValidationError::MissingField("id".to_string()).into());
        }
        validate_account_fields(&self.name, &self.currency, self.last_four.as_deref())
    }
}

fn validate_account_fields(name: &str, currency: &str, last_four: Option<&str>) -> Result<()> {
    if name.trim().is_empty() {
        return Err(ValidationError::MissingField("name".to_string()).into());
    }
    if currency.trim().is_empty() {
        return Err(ValidationError::MissingField("currency".to_string()).into());
    }
    if let Some(digits) = last_four {
        if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(Error::invalid_input(format!(
                "lastFour must be four digits, got '{}'",
                digits
            )));
        }
    }
    Ok(())
}
