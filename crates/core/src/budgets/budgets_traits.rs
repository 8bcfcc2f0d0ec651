use async_trait::async_trait;

use super::budgets_model::{Budget, BudgetUpdate, NewBudget};
use crate::errors::Result;

#[async_trait]
pub trait BudgetRepositoryTrait: Send + Sync {
    fn list_budgets_for_month(&self, month: &str) -> Result<Vec<Budget>>;
    async fn create_budget(&self, new_budget: NewBudget) -> Result<Budget>;
    async fn update_budget(&self, update: BudgetUpdate) -> Result<Budget>;
    async fn delete_budget(&self, budget_id: String) -> Result<usize>;
}
