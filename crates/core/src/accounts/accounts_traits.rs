use async_trait::async_trait;

use super::accounts_model::{Account, AccountUpdate, NewAccount};
use crate::errors::Result;

/// Storage contract for accounts; mutations queue outbox entries in the same transaction.
#[async_trait]
pub trait AccountRepositoryTrait: Send + Sync {
    fn get_account(&self, account_id: &str) -> Result<Account>;
    fn list_accounts(&self, active_only: bool) -> Result<Vec<Account>>;
    async fn create_account(&self, new_account: NewAccount) -> Result<Account>;
    async fn update_account(&self, update: AccountUpdate) -> Result<Account>;
    async fn delete_account(&self, account_id: String) -> Result<usize>;
}
