use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use ledgerline_core::errors::{Error, Result};
use ledgerline_core::profile::Profile;

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
#[diesel(table_name = crate::schema::profiles)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ProfileDB {
    pub id: String,
    pub display_name: String,
    pub base_currency: String,
    pub locale: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Profile> for ProfileDB {
    fn from(profile: Profile) -> Self {
        Self {
            id: profile.id,
            display_name: profile.display_name,
            base_currency: profile.base_currency,
            locale: profile.locale,
            created_at: format_timestamp(profile.created_at),
            updated_at: format_timestamp(profile.updated_at),
        }
    }
}

impl TryFrom<ProfileDB> for Profile {
    type Error = Error;

    fn try_from(db: ProfileDB) -> Result<Self> {
        Ok(Profile {
            created_at: parse_db_timestamp(&db.created_at)?,
            updated_at: parse_db_timestamp(&db.updated_at)?,
            id: db.id,
            display_name: db.display_name,
            base_currency: db.base_currency,
            locale: db.locale,
        })
    }
}
