//! Statement reconciliation: matching imported transactions against manual
//! entries and folding confirmed matches together.

mod matcher;
mod merge_rules;
mod reconciliation_model;
mod reconciliation_service;
mod text_similarity;

pub use matcher::{rank, score_pool};
pub use merge_rules::validate_merge;
pub use reconciliation_model::*;
pub use reconciliation_service::{ReconciliationService, ReconciliationServiceTrait};
pub use text_similarity::{description_similarity, normalize_description};
