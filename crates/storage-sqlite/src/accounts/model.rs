use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use ledgerline_core::accounts::Account;
use ledgerline_core::errors::{Error, Result};

use crate::db::{format_timestamp, parse_db_timestamp};

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
#[diesel(table_name = crate::schema::accounts)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(treat_none_as_null = true)]
pub struct AccountDB {
    pub id: String,
    pub name: String,
    pub account_type: String,
    pub institution: Option<String>,
    pub currency: String,
    pub last_four: Option<String>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Account> for AccountDB {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            name: account.name,
            account_type: account.account_type.as_str().to_string(),
            institution: account.institution,
            currency: account.currency,
            last_four: account.last_four,
            is_active: account.is_active,
            created_at: format_timestamp(account.created_at),
            updated_at: format_timestamp(account.updated_at),
        }
    }
}

impl TryFrom<AccountDB> for Account {
    type Error = Error;

    fn try_from(db: AccountDB) -> Result<Self> {
        Ok(Account {
            account_type: db.account_type.parse()?,
            created_at: parse_db_timestamp(&db.created_at)?,
            updated_at: parse_db_timestamp(&db.updated_at)?,
            id: db.id,
            name: db.name,
            institution: db.institution,
            currency: db.currency,
            last_four: db.last_four,
            is_active: db.is_active,
        })
    }
}
