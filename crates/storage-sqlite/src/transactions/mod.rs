mod model;
mod repository;

pub use model::TransactionDB;
pub use repository::TransactionRepository;
pub(crate) use repository::{clear_category_from_transactions, delete_transactions_for_account};
