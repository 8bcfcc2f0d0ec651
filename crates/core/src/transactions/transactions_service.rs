use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use uuid::Uuid;

use super::idempotency::{fingerprint, manual_fingerprint};
use super::transactions_model::{
    NewTransaction, Transaction, TransactionFilter, TransactionTotals, TransactionUpdate,
};
use super::transactions_traits::{TransactionRepositoryTrait, TransactionServiceTrait};
use crate::errors::Result;

/// UI-facing transaction CRUD. Assigns ids and idempotency keys; the
/// repository takes care of the outbox.
pub struct TransactionService {
    repository: Arc<dyn TransactionRepositoryTrait>,
}

impl TransactionService {
    pub fn new(repository: Arc<dyn TransactionRepositoryTrait>) -> Self {
        Self { repository }
    }
}

/// Fills in the id and idempotency key a new transaction needs before storage.
pub fn prepare_new_transaction(mut new_transaction: NewTransaction) -> NewTransaction {
    let id = new_transaction
        .id
        .clone()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| Uuid::now_v7().to_string());

    if new_transaction.idempotency_key.is_none() {
        let key = if new_transaction.capture_method.is_user_entered() {
            manual_fingerprint(
                &id,
                &new_transaction.account_id,
                new_transaction.date,
                new_transaction.amount,
                &new_transaction.raw_description,
            )
        } else {
            fingerprint(
                new_transaction.capture_provider.as_deref().unwrap_or_default(),
                &new_transaction.account_id,
                new_transaction.date,
                new_transaction.amount,
                &new_transaction.raw_description,
            )
        };
        new_transaction.idempotency_key = Some(key);
    }
    new_transaction.id = Some(id);
    new_transaction
}

#[async_trait]
impl TransactionServiceTrait for TransactionService {
    fn get_transaction(&self, transaction_id: &str) -> Result<Transaction> {
        self.repository.get_transaction(transaction_id)
    }

    fn list_active_transactions(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>> {
        self.repository.list_active_transactions(filter)
    }

    fn list_pending_review(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>> {
        self.repository.list_pending_review(filter)
    }

    fn get_totals(&self, filter: &TransactionFilter) -> Result<TransactionTotals> {
        self.repository.get_totals(filter)
    }

    async fn create_transaction(&self, new_transaction: NewTransaction) -> Result<Transaction> {
        new_transaction.validate()?;
        let prepared = prepare_new_transaction(new_transaction);
        debug!(
            "Creating transaction {:?} via {}",
            prepared.id,
            prepared.capture_method.as_str()
        );
        self.repository.create_transaction(prepared).await
    }

    async fn update_transaction(&self, update: TransactionUpdate) -> Result<Transaction> {
        update.validate()?;
        self.repository.update_transaction(update).await
    }

    async fn delete_transaction(&self, transaction_id: String) -> Result<usize> {
        self.repository.delete_transaction(transaction_id).await
    }
}
