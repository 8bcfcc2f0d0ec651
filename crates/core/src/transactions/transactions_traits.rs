use async_trait::async_trait;

use super::transactions_model::{
    CandidatePoolQuery, ImportedInsert, NewTransaction, Transaction, TransactionFilter,
    TransactionTotals, TransactionUpdate,
};
use crate::errors::Result;
use crate::reconciliation::{MergeOutcome, ReconciliationMerge};

/// Storage contract for transactions. Every mutating method performs the
/// row write and its outbox mutation in one local transaction.
#[async_trait]
pub trait TransactionRepositoryTrait: Send + Sync {
    fn get_transaction(&self, transaction_id: &str) -> Result<Transaction>;

    /// Lists first-class rows; reconciled provenance rows and imported rows
    /// still awaiting review are never returned.
    fn list_active_transactions(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>>;

    /// Imported rows flagged PENDING_REVIEW. They stay out of listings and totals
    /// until a merge or a status update confirms them.
    fn list_pending_review(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>>;

    /// Totals over active, non-excluded rows.
    fn get_totals(&self, filter: &TransactionFilter) -> Result<TransactionTotals>;

    fn find_reconciliation_candidates(&self, query: &CandidatePoolQuery)
        -> Result<Vec<Transaction>>;

    /// Lists reconciled rows that were merged into `transaction_id`, for audit.
    fn list_reconciled_sources(&self, transaction_id: &str) -> Result<Vec<Transaction>>;

    async fn create_transaction(&self, new_transaction: NewTransaction) -> Result<Transaction>;

    /// Insert-or-ignore on the idempotency key; duplicates are reported, not errors.
    async fn insert_imported_transactions(
        &self,
        batch: Vec<NewTransaction>,
    ) -> Result<Vec<ImportedInsert>>;

    async fn update_transaction(&self, update: TransactionUpdate) -> Result<Transaction>;

    async fn delete_transaction(&self, transaction_id: String) -> Result<usize>;

    /// Validates and applies a merge atomically, queueing both rows to the outbox.
    async fn apply_reconciliation_merge(&self, merge: ReconciliationMerge) -> Result<MergeOutcome>;
}

#[async_trait]
pub trait TransactionServiceTrait: Send + Sync {
    fn get_transaction(&self, transaction_id: &str) -> Result<Transaction>;
    fn list_active_transactions(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>>;
    fn list_pending_review(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>>;
    fn get_totals(&self, filter: &TransactionFilter) -> Result<TransactionTotals>;
    async fn create_transaction(&self, new_transaction: NewTransaction) -> Result<Transaction>;
    async fn update_transaction(&self, update: TransactionUpdate) -> Result<Transaction>;
    async fn delete_transaction(&self, transaction_id: String) -> Result<usize>;
}
