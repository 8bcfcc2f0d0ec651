use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info, warn};

use super::statements_model::{
    NewStatementSnapshot, ParsedStatement, PendingReview, StatementImportResult,
};
use super::statements_traits::{StatementImportServiceTrait, StatementSnapshotRepositoryTrait};
use crate::errors::{Error, Result};
use crate::reconciliation::{
    ReconciliationDecision, ReconciliationMerge, ReconciliationQuery, ReconciliationServiceTrait,
};
use crate::transactions::{
    prepare_new_transaction, CaptureMethod, ImportedInsert, NewTransaction, TransactionRepositoryTrait,
    TransactionStatus, TransactionUpdate,
};

/// Persists parsed statements and reconciles their lines against manual entries.
pub struct StatementImportService {
    snapshots: Arc<dyn StatementSnapshotRepositoryTrait>,
    transactions: Arc<dyn TransactionRepositoryTrait>,
    reconciliation: Arc<dyn ReconciliationServiceTrait>,
}

impl StatementImportService {
    pub fn new(
        snapshots: Arc<dyn StatementSnapshotRepositoryTrait>,
        transactions: Arc<dyn TransactionRepositoryTrait>,
        reconciliation: Arc<dyn ReconciliationServiceTrait>,
    ) -> Self {
        Self {
            snapshots,
            transactions,
            reconciliation,
        }
    }

    fn to_new_transactions(account_id: &str, statement: &ParsedStatement) -> Vec<NewTransaction> {
        let provider = statement.provider();
        statement
            .transactions
            .iter()
            .map(|line| {
                prepare_new_transaction(NewTransaction {
                    id: None,
                    account_id: account_id.to_string(),
                    category_id: None,
                    amount: line.amount,
                    direction: line.direction,
                    date: line.date,
                    raw_description: line.description.trim().to_string(),
                    clean_description: None,
                    merchant_name: None,
                    status: TransactionStatus::Confirmed,
                    currency: line
                        .currency
                        .clone()
                        .unwrap_or_else(|| statement.currency.clone()),
                    notes: None,
                    capture_method: CaptureMethod::StatementImport,
                    capture_provider: Some(provider.clone()),
                    idempotency_key: None,
                })
            })
            .collect()
    }
}

#[async_trait]
impl StatementImportServiceTrait for StatementImportService {
    async fn import_statement(
        &self,
        account_id: &str,
        statement: ParsedStatement,
    ) -> Result<StatementImportResult> {
        if account_id.trim().is_empty() {
            return Err(Error::invalid_input("accountId is required"));
        }
        statement.validate()?;

        let snapshot = self
            .snapshots
            .save_snapshot(NewStatementSnapshot::from_statement(account_id, &statement))
            .await?;

        let batch = Self::to_new_transactions(account_id, &statement);
        let outcomes = self.transactions.insert_imported_transactions(batch).await?;

        let mut inserted = Vec::new();
        let mut duplicate_count = 0;
        for outcome in outcomes {
            match outcome {
                ImportedInsert::Inserted(transaction) => inserted.push(transaction),
                ImportedInsert::Duplicate { idempotency_key } => {
                    debug!("[Reconcile] Skipping duplicate statement line {}", idempotency_key);
                    duplicate_count += 1;
                }
            }
        }

        let mut auto_merged = Vec::new();
        let mut pending_review = Vec::new();
        let mut final_rows = Vec::with_capacity(inserted.len());
        for transaction in inserted {
            let query = ReconciliationQuery::for_imported(&transaction);
            let Some(best) = self.reconciliation.find_best_match(&query)? else {
                final_rows.push(transaction);
                continue;
            };

            match best.decision {
                ReconciliationDecision::AutoMerge => {
                    let merge = ReconciliationMerge::new(
                        best.candidate.id.clone(),
                        transaction.id.clone(),
                        best.score,
                    );
                    match self.reconciliation.apply_reconciliation_merge(merge).await {
                        Ok(outcome) => {
                            final_rows.push(outcome.imported.clone());
                            auto_merged.push(outcome);
                        }
                        Err(Error::Reconciliation(err)) => {
                            warn!(
                                "[Reconcile] Auto-merge of {} skipped: {}",
                                transaction.id, err
                            );
                            final_rows.push(transaction);
                        }
                        Err(err) => return Err(err),
                    }
                }
                ReconciliationDecision::Review => {
                    let mut update = TransactionUpdate::from_existing(&transaction);
                    update.status = TransactionStatus::PendingReview;
                    let flagged = self.transactions.update_transaction(update).await?;
                    final_rows.push(flagged.clone());
                    pending_review.push(PendingReview {
                        transaction: flagged,
                        suggestion: best,
                    });
                }
                ReconciliationDecision::NoMatch => final_rows.push(transaction),
            }
        }

        info!(
            "[Reconcile] Imported {} statement for {}: {} new, {} duplicate, {} merged, {} to review",
            snapshot.provider,
            account_id,
            final_rows.len(),
            duplicate_count,
            auto_merged.len(),
            pending_review.len()
        );

        Ok(StatementImportResult {
            snapshot,
            inserted: final_rows,
            duplicate_count,
            auto_merged,
            pending_review,
        })
    }
}
