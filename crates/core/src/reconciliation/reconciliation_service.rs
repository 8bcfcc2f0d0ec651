use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info};

use super::matcher::{rank, score_pool};
use super::reconciliation_model::{
    MatcherConfig, MergeOutcome, ReconciliationCandidates, ReconciliationMatch,
    ReconciliationMerge, ReconciliationQuery,
};
use crate::errors::{Error, Result};
use crate::transactions::{
    CalendarMonth, CandidatePoolQuery, Transaction, TransactionRepositoryTrait,
};

#[async_trait]
pub trait ReconciliationServiceTrait: Send + Sync {
    /// Ranks unreconciled manual records in the same account, direction and month.
    fn get_reconciliation_candidates(
        &self,
        query: &ReconciliationQuery,
    ) -> Result<ReconciliationCandidates>;

    /// Best match for a query, or `None` when nothing reaches the review band.
    fn find_best_match(&self, query: &ReconciliationQuery) -> Result<Option<ReconciliationMatch>>;

    async fn apply_reconciliation_merge(&self, merge: ReconciliationMerge) -> Result<MergeOutcome>;
}

pub struct ReconciliationService {
    repository: Arc<dyn TransactionRepositoryTrait>,
    config: MatcherConfig,
}

impl ReconciliationService {
    pub fn new(repository: Arc<dyn TransactionRepositoryTrait>, config: MatcherConfig) -> Self {
        Self { repository, config }
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    fn load_pool(&self, query: &ReconciliationQuery) -> Result<Vec<Transaction>> {
        self.repository
            .find_reconciliation_candidates(&CandidatePoolQuery {
                account_id: query.account_id.clone(),
                direction: query.direction,
                month: CalendarMonth::of(query.date),
                exclude_ids: query.exclude_ids.clone(),
            })
    }
}

#[async_trait]
impl ReconciliationServiceTrait for ReconciliationService {
    fn get_reconciliation_candidates(
        &self,
        query: &ReconciliationQuery,
    ) -> Result<ReconciliationCandidates> {
        let pool = self.load_pool(query)?;
        let candidates = score_pool(query, &pool, &self.config);
        let best_match = rank(query, &pool, &self.config);
        debug!(
            "[Reconcile] {} candidate(s) for {} {} on {}",
            candidates.len(),
            query.direction,
            query.amount,
            query.date
        );
        Ok(ReconciliationCandidates {
            best_match,
            candidates,
        })
    }

    fn find_best_match(&self, query: &ReconciliationQuery) -> Result<Option<ReconciliationMatch>> {
        let pool = self.load_pool(query)?;
        Ok(rank(query, &pool, &self.config))
    }

    async fn apply_reconciliation_merge(&self, merge: ReconciliationMerge) -> Result<MergeOutcome> {
        if !(0.0..=1.0).contains(&merge.score) {
            return Err(Error::invalid_input(format!(
                "reconciliation score must be within [0, 1], got {}",
                merge.score
            )));
        }
        let outcome = self.repository.apply_reconciliation_merge(merge).await?;
        info!(
            "[Reconcile] Merged {} into {}",
            outcome.manual.id, outcome.imported.id
        );
        Ok(outcome)
    }
}
