mod budgets_model;
mod budgets_traits;

pub use budgets_model::*;
pub use budgets_traits::BudgetRepositoryTrait;
