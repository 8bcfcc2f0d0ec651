//! Drains the outbox to the remote store, one entry at a time.

use std::sync::Arc;

use log::{debug, warn};

use super::remote_store::{RemoteError, RemoteStore};
use super::sync_config::SyncConfig;
use super::sync_model::{MarkSyncedOutcome, OutboxEntry, PushReport, SyncOperation};
use super::sync_traits::SyncRepositoryTrait;
use crate::errors::{Error, Result};

pub struct PushEngine {
    repository: Arc<dyn SyncRepositoryTrait>,
    remote: Arc<dyn RemoteStore>,
    config: SyncConfig,
}

impl PushEngine {
    pub fn new(
        repository: Arc<dyn SyncRepositoryTrait>,
        remote: Arc<dyn RemoteStore>,
        config: SyncConfig,
    ) -> Self {
        Self {
            repository,
            remote,
            config,
        }
    }

    /// Pushes every due entry in sequence order. A failed entry is scheduled
    /// for retry and the next one is attempted; only an authentication failure
    /// stops the run, since every later call would fail the same way.
    pub async fn push(&self) -> Result<PushReport> {
        let mut report = PushReport::default();
        let mut after_seq = 0_i64;
        let limit = i64::try_from(self.config.push_batch_size.max(1)).unwrap_or(i64::MAX);

        loop {
            let batch = self.repository.list_due_outbox(after_seq, limit)?;
            let batch_len = batch.len();
            for entry in batch {
                after_seq = after_seq.max(entry.seq);
                match self.send(&entry).await {
                    Ok(()) => {
                        match self
                            .repository
                            .mark_outbox_synced(entry.seq, entry.revision)
                            .await?
                        {
                            MarkSyncedOutcome::Synced => report.synced += 1,
                            MarkSyncedOutcome::Requeued => {
                                debug!(
                                    "[Push] {} {} changed while in flight, left pending",
                                    entry.table, entry.record_id
                                );
                                report.requeued += 1;
                            }
                            MarkSyncedOutcome::Missing => {
                                report.synced += 1;
                                if entry.op == SyncOperation::Insert {
                                    self.retract_insert(&entry).await;
                                }
                            }
                        }
                    }
                    Err(err) => {
                        report.failed += 1;
                        self.schedule_retry(&entry, &err).await?;
                        if err.requires_reauth() {
                            return Err(Error::Remote(err));
                        }
                    }
                }
            }
            if (batch_len as i64) < limit {
                break;
            }
        }

        if report.synced > 0 {
            self.repository.mark_push_completed().await?;
        }
        Ok(report)
    }

    async fn send(&self, entry: &OutboxEntry) -> std::result::Result<(), RemoteError> {
        debug!(
            "[Push] seq={} {} {} {}",
            entry.seq,
            entry.op.as_str(),
            entry.table,
            entry.record_id
        );
        match entry.op {
            SyncOperation::Insert => self.remote.insert(entry.table, &entry.payload).await,
            SyncOperation::Update => {
                self.remote
                    .update(entry.table, &entry.record_id, &entry.payload)
                    .await
            }
            SyncOperation::Delete => self.remote.delete(entry.table, &entry.record_id).await,
        }
    }

    /// The record was deleted locally while its INSERT was in flight, which
    /// cancelled the outbox entry. Remove the row the INSERT just created.
    async fn retract_insert(&self, entry: &OutboxEntry) {
        if let Err(err) = self.remote.delete(entry.table, &entry.record_id).await {
            warn!(
                "[Push] Could not retract {} {} after local delete: {}",
                entry.table, entry.record_id, err
            );
        }
    }

    async fn schedule_retry(&self, entry: &OutboxEntry, err: &RemoteError) -> Result<()> {
        let backoff = if err.requires_reauth() {
            self.config.reauth_retry_secs
        } else {
            self.config.backoff_seconds(entry.retry_count)
        };
        warn!(
            "[Push] {} {} {} failed ({}), retry in {}s: {}",
            entry.op.as_str(),
            entry.table,
            entry.record_id,
            err.class.code(),
            backoff,
            err
        );
        self.repository
            .schedule_outbox_retry(
                entry.seq,
                backoff,
                err.to_string(),
                err.class.code().to_string(),
            )
            .await
    }
}
