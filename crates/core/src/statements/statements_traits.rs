use async_trait::async_trait;

use super::statements_model::{
    NewStatementSnapshot, ParsedStatement, StatementImportResult, StatementSnapshot,
};
use crate::errors::Result;

#[async_trait]
pub trait StatementSnapshotRepositoryTrait: Send + Sync {
    fn get_snapshot(&self, snapshot_id: &str) -> Result<StatementSnapshot>;
    fn list_snapshots_for_account(&self, account_id: &str) -> Result<Vec<StatementSnapshot>>;

    /// Inserts the snapshot, or refreshes the existing row when the same period is imported again.
    async fn save_snapshot(&self, snapshot: NewStatementSnapshot) -> Result<StatementSnapshot>;
}

#[async_trait]
pub trait StatementImportServiceTrait: Send + Sync {
    async fn import_statement(
        &self,
        account_id: &str,
        statement: ParsedStatement,
    ) -> Result<StatementImportResult>;
}
