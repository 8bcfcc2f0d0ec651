use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, ValidationError};

/// The signed-in user's preferences. One row per installation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub display_name: String,
    pub base_currency: String,
    pub locale: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub id: String,
    pub display_name: String,
    pub base_currency: String,
    pub locale: String,
}

impl ProfileUpdate {
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(ValidationError::MissingField("id".to_string()).into());
        }
        if self.base_currency.trim().len() != 3 {
            return Err(ValidationError::InvalidInput(format!(
                "baseCurrency must be an ISO 4217 code, got '{}'",
                self.base_currency
            ))
            .into());
        }
        Ok(())
    }
}
