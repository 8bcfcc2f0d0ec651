use super::reconciliation_model::{MergePlan, ReconciliationMerge};
use crate::errors::ReconciliationError;
use crate::transactions::Transaction;

/// Checks every precondition of a merge against the current rows and returns
/// the metadata the imported row inherits. Storage runs this inside the write
/// transaction so nothing is mutated when it fails.
pub fn validate_merge(
    manual: &Transaction,
    imported: &Transaction,
    merge: &ReconciliationMerge,
) -> Result<MergePlan, ReconciliationError> {
    if manual.id == imported.id {
        return Err(ReconciliationError::SelfMerge(manual.id.clone()));
    }
    if manual.reconciled_into_transaction_id.is_some() {
        return Err(ReconciliationError::AlreadyReconciled(manual.id.clone()));
    }
    if imported.reconciled_into_transaction_id.is_some() {
        return Err(ReconciliationError::AlreadyReconciled(imported.id.clone()));
    }
    if !manual.capture_method.is_user_entered() {
        return Err(ReconciliationError::WrongCaptureMethod {
            id: manual.id.clone(),
            capture_method: manual.capture_method.as_str().to_string(),
            expected: "MANUAL or QUICK_CAPTURE",
        });
    }
    if imported.capture_method.is_user_entered() {
        return Err(ReconciliationError::WrongCaptureMethod {
            id: imported.id.clone(),
            capture_method: imported.capture_method.as_str().to_string(),
            expected: "STATEMENT_IMPORT or RECONCILED",
        });
    }

    let mismatch = |field: &'static str| ReconciliationError::Mismatch {
        manual_id: manual.id.clone(),
        imported_id: imported.id.clone(),
        field,
    };
    if manual.account_id != imported.account_id {
        return Err(mismatch("account"));
    }
    if manual.direction != imported.direction {
        return Err(mismatch("direction"));
    }
    if manual.amount != imported.amount {
        return Err(mismatch("amount"));
    }

    Ok(MergePlan {
        category_id: merge
            .override_category_id
            .clone()
            .or_else(|| manual.category_id.clone())
            .or_else(|| imported.category_id.clone()),
        notes: merge
            .override_notes
            .clone()
            .or_else(|| manual.notes.clone())
            .or_else(|| imported.notes.clone()),
    })
}
