//! Incremental per-table pull driven by high-water marks.

use std::sync::Arc;

use chrono::NaiveDateTime;
use log::{debug, info, warn};
use serde_json::Value;

use super::remote_store::{RemoteFilter, RemoteStore};
use super::sync_config::SyncConfig;
use super::sync_model::{PullReport, SyncTable, PULL_ORDER};
use super::sync_row::{remote_row_id, remote_updated_at, SyncRow};
use super::sync_traits::SyncRepositoryTrait;
use crate::errors::{Error, Result};

pub struct PullEngine {
    repository: Arc<dyn SyncRepositoryTrait>,
    remote: Arc<dyn RemoteStore>,
    config: SyncConfig,
}

impl PullEngine {
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

    /// Pulls every replicated table in dependency order.
    ///
    /// A failing table is logged and reported while the remaining tables still
    /// pull. Tables referencing a failed table wait for the next cycle, since
    /// their rows would be dropped as orphans. Only an auth failure ends the
    /// pass early. The pull is marked complete when every table succeeded.
    pub async fn pull_all(&self) -> Result<PullReport> {
        let mut report = PullReport::default();
        for table in PULL_ORDER {
            if let Some(parent) = table
                .parents()
                .iter()
                .find(|parent| report.failed_tables.contains(*parent))
            {
                warn!("[Pull] {} skipped because {} failed", table, parent);
                report.failed_tables.push(table);
                continue;
            }
            match self.pull_table(table).await {
                Ok(applied) => {
                    report.pulled_counts.insert(table, applied);
                }
                Err(Error::Remote(err)) if err.requires_reauth() => {
                    return Err(Error::Remote(err));
                }
                Err(err) => {
                    warn!("[Pull] {} failed, continuing with the next table: {}", table, err);
                    report.failed_tables.push(table);
                }
            }
        }
        if report.failed_tables.is_empty() {
            self.repository.mark_pull_completed().await?;
        }
        Ok(report)
    }

    /// Pulls rows changed after the table's mark and returns how many were applied.
    pub async fn pull_table(&self, table: SyncTable) -> Result<usize> {
        let start_mark = self
            .repository
            .get_high_water_mark(table)?
            .map(|mark| mark.last_synced_at);
        let page_size = self.config.pull_page_size.max(1);
        let mut cursor: Option<PageCursor> = None;
        let mut applied = 0;
        let mut skipped_pending = 0;
        let mut skipped_orphans = 0;

        loop {
            let filter = match &cursor {
                Some(cursor) => RemoteFilter {
                    updated_after: Some(cursor.updated_at),
                    after_id: Some(cursor.id.clone()),
                    limit: page_size,
                },
                None => RemoteFilter {
                    updated_after: start_mark,
                    after_id: None,
                    limit: page_size,
                },
            };
            let page = self.remote.select(table, &filter).await?;
            let is_last_page = page.len() < page_size;

            let floor = cursor.as_ref().map(|cursor| cursor.updated_at);
            let advance_to = next_mark(&page, is_last_page, floor);
            let rows = parse_page(table, &page);
            let result = self
                .repository
                .apply_pulled_page(table, rows, advance_to)
                .await?;
            applied += result.applied;
            skipped_pending += result.skipped_pending;
            skipped_orphans += result.skipped_orphans;

            if is_last_page {
                break;
            }
            match page_cursor(&page) {
                Some(next) if cursor.as_ref().map_or(true, |current| next > *current) => {
                    cursor = Some(next);
                }
                _ => {
                    warn!(
                        "[Pull] {}: page ended without a usable (updated_at, id) cursor, resuming next cycle",
                        table
                    );
                    break;
                }
            }
        }

        if applied > 0 || skipped_pending > 0 || skipped_orphans > 0 {
            info!(
                "[Pull] {}: applied {} row(s), kept {} with pending local changes, dropped {} orphan(s)",
                table, applied, skipped_pending, skipped_orphans
            );
        } else {
            debug!("[Pull] {}: up to date", table);
        }
        Ok(applied)
    }
}

/// Keyset position after the last row of a full page.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct PageCursor {
    updated_at: NaiveDateTime,
    id: String,
}

fn page_cursor(page: &[Value]) -> Option<PageCursor> {
    page.iter().rev().find_map(|row| {
        Some(PageCursor {
            updated_at: remote_updated_at(row)?,
            id: remote_row_id(row)?,
        })
    })
}

fn parse_page(table: SyncTable, page: &[Value]) -> Vec<SyncRow> {
    page.iter()
        .filter_map(|value| match SyncRow::from_remote(table, value) {
            Ok(row) => Some(row),
            Err(err) => {
                warn!("[Pull] Skipping malformed row: {}", err);
                None
            }
        })
        .collect()
}

/// Mark to record once this page is applied.
///
/// The last page advances to the newest timestamp seen, or to `floor` (the
/// cursor timestamp it was read after) when that is newer. A full page may be
/// followed by more rows sharing its newest timestamp, so it only advances to
/// the newest timestamp strictly below that; an interrupted pull re-reads the
/// tie group rather than skipping part of it.
fn next_mark(
    page: &[Value],
    is_last_page: bool,
    floor: Option<NaiveDateTime>,
) -> Option<NaiveDateTime> {
    let mut stamps: Vec<NaiveDateTime> = page.iter().filter_map(remote_updated_at).collect();
    stamps.sort();
    if is_last_page {
        return stamps.last().copied().max(floor);
    }
    let newest = *stamps.last()?;
    stamps.into_iter().rev().find(|stamp| *stamp < newest)
}
