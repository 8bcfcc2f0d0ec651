//! Pure ranking of manual candidates against an imported transaction.

use std::cmp::Ordering;

use super::reconciliation_model::{
    MatcherConfig, ReconciliationMatch, ReconciliationQuery, ScoredCandidate,
};
use super::text_similarity::description_similarity;
use crate::transactions::Transaction;

/// Returns the best candidate at or above the review threshold, or `None`.
pub fn rank(
    imported: &ReconciliationQuery,
    pool: &[Transaction],
    config: &MatcherConfig,
) -> Option<ReconciliationMatch> {
    score_pool(imported, pool, config)
        .into_iter()
        .next()
        .and_then(|best| {
            let decision = config.decide(best.score);
            (best.score >= config.review_threshold).then(|| ReconciliationMatch {
                candidate: best.candidate,
                score: best.score,
                decision,
            })
        })
}

/// Scores every eligible candidate, best first. Candidates whose amount,
/// direction or account differ are dropped rather than scored.
pub fn score_pool(
    imported: &ReconciliationQuery,
    pool: &[Transaction],
    config: &MatcherConfig,
) -> Vec<ScoredCandidate> {
    let mut scored: Vec<ScoredCandidate> = pool
        .iter()
        .filter(|candidate| is_eligible(imported, candidate))
        .map(|candidate| score_candidate(imported, candidate, config))
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| day_distance(imported, &a.candidate).cmp(&day_distance(imported, &b.candidate)))
            .then_with(|| a.candidate.created_at.cmp(&b.candidate.created_at))
            .then_with(|| a.candidate.id.cmp(&b.candidate.id))
    });
    scored
}

fn is_eligible(imported: &ReconciliationQuery, candidate: &Transaction) -> bool {
    candidate.amount == imported.amount
        && candidate.direction == imported.direction
        && candidate.account_id == imported.account_id
        && candidate.reconciled_into_transaction_id.is_none()
        && !imported.exclude_ids.contains(&candidate.id)
}

fn score_candidate(
    imported: &ReconciliationQuery,
    candidate: &Transaction,
    config: &MatcherConfig,
) -> ScoredCandidate {
    let date_score = date_score(day_distance(imported, candidate), config.date_window_days);
    let text_score = candidate
        .description_variants()
        .into_iter()
        .map(|variant| description_similarity(&imported.description, variant))
        .fold(0.0_f64, f64::max);
    let score = (config.date_weight * date_score + config.text_weight * text_score).clamp(0.0, 1.0);

    ScoredCandidate {
        candidate: candidate.clone(),
        score,
        date_score,
        text_score,
    }
}

fn day_distance(imported: &ReconciliationQuery, candidate: &Transaction) -> i64 {
    (imported.date - candidate.date).num_days().abs()
}

fn date_score(days: i64, window: i64) -> f64 {
    if window <= 0 {
        return if days == 0 { 1.0 } else { 0.0 };
    }
    (1.0 - days as f64 / window as f64).max(0.0)
}
