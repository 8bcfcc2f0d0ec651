use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use ledgerline_core::categories::Category;
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
#[diesel(table_name = crate::schema::categories)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(treat_none_as_null = true)]
pub struct CategoryDB {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub parent_id: Option<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Category> for CategoryDB {
    fn from(category: Category) -> Self {
        Self {
            id: category.id,
            name: category.name,
            kind: category.kind.as_str().to_string(),
            parent_id: category.parent_id,
            color: category.color,
            icon: category.icon,
            is_active: category.is_active,
            created_at: format_timestamp(category.created_at),
            updated_at: format_timestamp(category.updated_at),
        }
    }
}

impl TryFrom<CategoryDB> for Category {
    type Error = Error;

    fn try_from(db: CategoryDB) -> Result<Self> {
        Ok(Category {
            kind: db.kind.parse()?,
            created_at: parse_db_timestamp(&db.created_at)?,
            updated_at: parse_db_timestamp(&db.updated_at)?,
            id: db.id,
            name: db.name,
            parent_id: db.parent_id,
            color: db.color,
            icon: db.icon,
            is_active: db.is_active,
        })
    }
}
