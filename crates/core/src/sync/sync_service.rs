//! Sync orchestrator: session gate, single-flight guard, status machine and
//! background loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use super::pull_engine::PullEngine;
use super::push_engine::PushEngine;
use super::remote_store::{RemoteStore, SessionProvider};
use super::sync_config::{SyncConfig, SYNC_PENDING_OUTBOX_DELAY_MS};
use super::sync_model::{
    SyncCycleTrigger, SyncEngineStatus, SyncReport, SyncSkipReason, SyncStatus,
};
use super::sync_traits::SyncRepositoryTrait;
use crate::errors::Result;

pub struct SyncService {
    repository: Arc<dyn SyncRepositoryTrait>,
    session: Arc<dyn SessionProvider>,
    push: PushEngine,
    pull: PullEngine,
    config: SyncConfig,
    status_tx: watch::Sender<SyncStatus>,
    cycle_mutex: Mutex<()>,
    background_task: Mutex<Option<JoinHandle<()>>>,
}

impl SyncService {
    pub fn new(
        repository: Arc<dyn SyncRepositoryTrait>,
        remote: Arc<dyn RemoteStore>,
        session: Arc<dyn SessionProvider>,
        config: SyncConfig,
    ) -> Self {
        let (status_tx, _) = watch::channel(SyncStatus::Idle);
        Self {
            push: PushEngine::new(repository.clone(), remote.clone(), config.clone()),
            pull: PullEngine::new(repository.clone(), remote, config.clone()),
            repository,
            session,
            config,
            status_tx,
            cycle_mutex: Mutex::new(()),
            background_task: Mutex::new(None),
        }
    }

    pub fn status(&self) -> SyncStatus {
        *self.status_tx.borrow()
    }

    /// Observe status transitions (IDLE -> SYNCING -> IDLE | ERROR).
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status_tx.subscribe()
    }

    pub async fn sync(&self) -> Result<SyncReport> {
        self.run_cycle(SyncCycleTrigger::Manual).await
    }

    /// Runs one push-then-pull cycle. A cycle already in flight or a missing
    /// session makes this a no-op that reports why it skipped.
    pub async fn run_cycle(&self, trigger: SyncCycleTrigger) -> Result<SyncReport> {
        let Ok(_cycle_guard) = self.cycle_mutex.try_lock() else {
            debug!("[Sync] Cycle already running, ignoring {:?} trigger", trigger);
            return Ok(SyncReport::skipped(SyncSkipReason::AlreadySyncing));
        };

        if self.session.access_token().await.is_none() {
            debug!("[Sync] No session, skipping {:?} cycle", trigger);
            return Ok(SyncReport::skipped(SyncSkipReason::NoSession));
        }

        self.status_tx.send_replace(SyncStatus::Syncing);
        let started_at = Instant::now();
        let result = self.push_then_pull().await;
        let duration_ms = i64::try_from(started_at.elapsed().as_millis()).unwrap_or(i64::MAX);

        match result {
            Ok(report) if !report.has_failures() => {
                self.status_tx.send_replace(SyncStatus::Idle);
                self.record_outcome("ok", duration_ms).await;
                info!(
                    "[Sync] {:?} cycle done in {}ms: pushed={} pulled={}",
                    trigger,
                    duration_ms,
                    report.pushed_count,
                    report.pulled_total()
                );
                Ok(report)
            }
            Ok(report) => {
                self.status_tx.send_replace(SyncStatus::Error);
                let mut problems = Vec::new();
                if report.failed_push_count > 0 {
                    problems.push(format!(
                        "{} outbox entr{} failed to push",
                        report.failed_push_count,
                        if report.failed_push_count == 1 { "y" } else { "ies" }
                    ));
                }
                if !report.failed_pull_tables.is_empty() {
                    let tables: Vec<&str> =
                        report.failed_pull_tables.iter().map(|t| t.as_str()).collect();
                    problems.push(format!("pull failed for {}", tables.join(", ")));
                }
                let message = problems.join("; ");
                warn!("[Sync] {:?} cycle finished with errors: {}", trigger, message);
                self.record_error(message).await;
                let outcome = if report.failed_push_count > 0 {
                    "push_error"
                } else {
                    "pull_error"
                };
                self.record_outcome(outcome, duration_ms).await;
                Ok(report)
            }
            Err(err) => {
                self.status_tx.send_replace(SyncStatus::Error);
                error!("[Sync] {:?} cycle failed: {}", trigger, err);
                self.record_error(err.to_string()).await;
                let status = if err.is_transient() { "retryable_error" } else { "error" };
                self.record_outcome(status, duration_ms).await;
                Err(err)
            }
        }
    }

    async fn push_then_pull(&self) -> Result<SyncReport> {
        let pushed = self.push.push().await?;
        let pulled = self.pull.pull_all().await?;
        Ok(SyncReport {
            pushed_count: pushed.synced,
            pulled_counts: pulled.pulled_counts,
            failed_push_count: pushed.failed,
            failed_pull_tables: pulled.failed_tables,
            skipped: None,
        })
    }

    async fn record_error(&self, message: String) {
        if let Err(err) = self.repository.mark_engine_error(message).await {
            warn!("[Sync] Failed to persist engine error: {}", err);
        }
    }

    async fn record_outcome(&self, status: &str, duration_ms: i64) {
        if let Err(err) = self
            .repository
            .mark_cycle_outcome(status.to_string(), duration_ms)
            .await
        {
            warn!("[Sync] Failed to persist cycle outcome: {}", err);
        }
    }

    /// Delay before the next background cycle: the foreground interval plus
    /// jitter, pulled in to the earliest scheduled retry, and short while
    /// local changes are waiting.
    pub fn next_cycle_delay(&self) -> Duration {
        let jitter = self.config.jitter();
        let mut delay = self.config.foreground_interval() + jitter;

        if let Ok(Some(retry_at)) = self.repository.next_outbox_retry_at() {
            let now = chrono::Utc::now().naive_utc();
            let wait = (retry_at - now).to_std().unwrap_or(Duration::ZERO);
            delay = delay.min((wait + jitter).max(Duration::from_secs(1)));
        }

        if let Ok(pending) = self.repository.list_due_outbox(0, 1) {
            if !pending.is_empty() {
                let short = Duration::from_millis(
                    SYNC_PENDING_OUTBOX_DELAY_MS + (jitter.as_millis() as u64 % 500),
                );
                delay = delay.min(short);
            }
        }
        delay
    }

    /// Spawns the periodic sync loop if it is not already running.
    pub async fn start_background(self: &Arc<Self>) -> Result<()> {
        let mut guard = self.background_task.lock().await;
        if let Some(handle) = guard.as_ref() {
            if !handle.is_finished() {
                return Ok(());
            }
            guard.take();
        }

        let service = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut trigger = SyncCycleTrigger::Startup;
            loop {
                if let Err(err) = service.run_cycle(trigger).await {
                    debug!("[Sync] Background cycle error: {}", err);
                }
                trigger = SyncCycleTrigger::Periodic;
                tokio::time::sleep(service.next_cycle_delay()).await;
            }
        });
        *guard = Some(handle);
        info!("[Sync] Background engine started");
        Ok(())
    }

    pub async fn stop_background(&self) {
        let mut guard = self.background_task.lock().await;
        if let Some(handle) = guard.take() {
            handle.abort();
            info!("[Sync] Background engine stopped");
        }
    }

    /// Wakes the loop early after a local mutation by running a cycle now.
    pub async fn notify_local_change(&self) -> Result<SyncReport> {
        self.run_cycle(SyncCycleTrigger::LocalMutation).await
    }

    pub fn engine_status(&self) -> Result<SyncEngineStatus> {
        self.repository.get_engine_status()
    }
}
