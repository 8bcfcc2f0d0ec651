use async_trait::async_trait;
use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::SqliteConnection;
use std::sync::Arc;
use uuid::Uuid;

use ledgerline_core::categories::{Category, CategoryRepositoryTrait, CategoryUpdate, NewCategory};
use ledgerline_core::sync::{SyncOperation, SyncTable};
use ledgerline_core::Result;

use super::model::CategoryDB;
use crate::budgets::delete_budgets_for_category;
use crate::db::{get_connection, now_timestamp, WriteHandle};
use crate::errors::StorageError;
use crate::schema::categories;
use crate::schema::categories::dsl::*;
use crate::sync::{write_outbox_event, OutboxWriteRequest};
use crate::transactions::clear_category_from_transactions;

pub struct CategoryRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl CategoryRepository {
    pub fn new(
        pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
        writer: WriteHandle,
    ) -> Self {
        CategoryRepository { pool, writer }
    }
}

/// Detaches child categories from a parent that is going away.
fn orphan_children(conn: &mut SqliteConnection, parent: &str) -> Result<()> {
    let children = categories
        .filter(parent_id.eq(parent))
        .load::<CategoryDB>(conn)
        .map_err(StorageError::from)?;
    let stamp = now_timestamp();
    for child in children {
        let updated = CategoryDB {
            parent_id: None,
            updated_at: stamp.clone(),
            ..child.clone()
        };
        diesel::update(categories.find(&child.id))
            .set(&updated)
            .execute(conn)
            .map_err(StorageError::from)?;
        write_outbox_event(
            conn,
            OutboxWriteRequest::update(
                SyncTable::Categories,
                child.id.clone(),
                &serde_json::to_value(&child)?,
                &serde_json::to_value(&updated)?,
            ),
        )?;
    }
    Ok(())
}

#[async_trait]
impl CategoryRepositoryTrait for CategoryRepository {
    fn get_category(&self, category_id: &str) -> Result<Category> {
        let mut conn = get_connection(&self.pool)?;
        let category_db = categories
            .find(category_id)
            .first::<CategoryDB>(&mut conn)
            .map_err(StorageError::from)?;
        Category::try_from(category_db)
    }

    fn list_categories(&self) -> Result<Vec<Category>> {
        let mut conn = get_connection(&self.pool)?;
        categories
            .order((kind.asc(), name.asc()))
            .load::<CategoryDB>(&mut conn)
            .map_err(StorageError::from)?
            .into_iter()
            .map(Category::try_from)
            .collect()
    }

    async fn create_category(&self, new_category: NewCategory) -> Result<Category> {
        new_category.validate()?;
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<Category> {
                let now = now_timestamp();
                let category_db = CategoryDB {
                    id: new_category
                        .id
                        .filter(|value| !value.trim().is_empty())
                        .unwrap_or_else(|| Uuid::now_v7().to_string()),
                    name: new_category.name,
                    kind: new_category.kind.as_str().to_string(),
                    parent_id: new_category.parent_id,
                    color: new_category.color,
                    icon: new_category.icon,
                    is_active: true,
                    created_at: now.clone(),
                    updated_at: now,
                };
                let result_db = diesel::insert_into(categories::table)
                    .values(&category_db)
                    .returning(CategoryDB::as_returning())
                    .get_result(conn)
                    .map_err(StorageError::from)?;
                write_outbox_event(
                    conn,
                    OutboxWriteRequest::new(
                        SyncTable::Categories,
                        result_db.id.clone(),
                        SyncOperation::Insert,
                        serde_json::to_value(&result_db)?,
                    ),
                )?;
                Category::try_from(result_db)
            })
            .await
    }

    async fn update_category(&self, update: CategoryUpdate) -> Result<Category> {
        update.validate()?;
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<Category> {
                let existing = categories
                    .find(&update.id)
                    .first::<CategoryDB>(conn)
                    .map_err(StorageError::from)?;
                let updated = CategoryDB {
                    name: update.name,
                    parent_id: update.parent_id,
                    color: update.color,
                    icon: update.icon,
                    is_active: update.is_active,
                    updated_at: now_timestamp(),
                    ..existing.clone()
                };
                diesel::update(categories.find(&existing.id))
                    .set(&updated)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                write_outbox_event(
                    conn,
                    OutboxWriteRequest::update(
                        SyncTable::Categories,
                        existing.id.clone(),
                        &serde_json::to_value(&existing)?,
                        &serde_json::to_value(&updated)?,
                    ),
                )?;
                Category::try_from(updated)
            })
            .await
    }

    /// Removes the category's budgets, clears it from transactions and
    /// detaches child categories before deleting it.
    async fn delete_category(&self, category_id: String) -> Result<usize> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<usize> {
                delete_budgets_for_category(conn, &category_id)?;
                clear_category_from_transactions(conn, &category_id)?;
                orphan_children(conn, &category_id)?;
                let affected = diesel::delete(categories.find(&category_id))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                if affected > 0 {
                    write_outbox_event(
                        conn,
                        OutboxWriteRequest::delete(SyncTable::Categories, category_id.clone()),
                    )?;
                }
                Ok(affected)
            })
            .await
    }
}
