mod model;
mod repository;

pub use model::BudgetDB;
pub use repository::BudgetRepository;
pub(crate) use repository::delete_budgets_for_category;
