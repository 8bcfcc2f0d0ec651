use async_trait::async_trait;

use super::categories_model::{Category, CategoryUpdate, NewCategory};
use crate::errors::Result;

#[async_trait]
pub trait CategoryRepositoryTrait: Send + Sync {
    fn get_category(&self, category_id: &str) -> Result<Category>;
    fn list_categories(&self) -> Result<Vec<Category>>;
    async fn create_category(&self, new_category: NewCategory) -> Result<Category>;
    async fn update_category(&self, update: CategoryUpdate) -> Result<Category>;
    async fn delete_category(&self, category_id: String) -> Result<usize>;
}
