//! Reconciliation models.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::transactions::{Transaction, TransactionDirection};

/// Classification of the best candidate for an imported transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconciliationDecision {
    AutoMerge,
    Review,
    #[serde(rename = "NONE")]
    NoMatch,
}

impl ReconciliationDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AutoMerge => "AUTO_MERGE",
            Self::Review => "REVIEW",
            Self::NoMatch => "NONE",
        }
    }
}

/// Score bands and weights for the matcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MatcherConfig {
    pub auto_merge_threshold: f64,
    pub review_threshold: f64,
    /// Day difference at which the date component reaches zero.
    pub date_window_days: i64,
    pub date_weight: f64,
    pub text_weight: f64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            auto_merge_threshold: 0.85,
            review_threshold: 0.5,
            date_window_days: 7,
            date_weight: 0.5,
            text_weight: 0.5,
        }
    }
}

impl MatcherConfig {
    pub fn decide(&self, score: f64) -> ReconciliationDecision {
        if score >= self.auto_merge_threshold {
            ReconciliationDecision::AutoMerge
        } else if score >= self.review_threshold {
            ReconciliationDecision::Review
        } else {
            ReconciliationDecision::NoMatch
        }
    }
}

/// The imported side of a match: what a statement line says happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationQuery {
    pub account_id: String,
    pub direction: TransactionDirection,
    pub amount: Decimal,
    pub date: NaiveDate,
    pub description: String,
    /// Records that must never be offered, typically the imported row itself.
    #[serde(default)]
    pub exclude_ids: Vec<String>,
}

impl ReconciliationQuery {
    pub fn for_imported(imported: &Transaction) -> Self {
        Self {
            account_id: imported.account_id.clone(),
            direction: imported.direction,
            amount: imported.amount,
            date: imported.date,
            description: imported.raw_description.clone(),
            exclude_ids: vec![imported.id.clone()],
        }
    }
}

/// One candidate with its score breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredCandidate {
    pub candidate: Transaction,
    pub score: f64,
    pub date_score: f64,
    pub text_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationMatch {
    pub candidate: Transaction,
    pub score: f64,
    pub decision: ReconciliationDecision,
}

/// Ranked result handed to the UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationCandidates {
    pub best_match: Option<ReconciliationMatch>,
    pub candidates: Vec<ScoredCandidate>,
}

impl ReconciliationCandidates {
    pub fn decision(&self) -> ReconciliationDecision {
        self.best_match
            .as_ref()
            .map(|m| m.decision)
            .unwrap_or(ReconciliationDecision::NoMatch)
    }
}

/// Request to fold a manual record into an imported one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationMerge {
    pub manual_id: String,
    pub imported_id: String,
    pub score: f64,
    pub override_category_id: Option<String>,
    pub override_notes: Option<String>,
}

impl ReconciliationMerge {
    pub fn new(manual_id: impl Into<String>, imported_id: impl Into<String>, score: f64) -> Self {
        Self {
            manual_id: manual_id.into(),
            imported_id: imported_id.into(),
            score,
            override_category_id: None,
            override_notes: None,
        }
    }
}

/// State of both rows after a committed merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeOutcome {
    pub imported: Transaction,
    pub manual: Transaction,
}

/// Metadata the imported row inherits from a merge.
#[derive(Debug, Clone, PartialEq)]
pub struct MergePlan {
    pub category_id: Option<String>,
    pub notes: Option<String>,
}
