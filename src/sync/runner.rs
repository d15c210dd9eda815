//! Sync Run Tracker: one fetch → reconcile pass over a single entity type.
//!
//! A run moves `Pending → Fetching → Reconciling → Completed`. Only a total
//! fetch failure (or cancellation before anything was fetched) ends in
//! `Failed`, and that is surfaced to the caller as an error rather than as a
//! zero-count result. Once reconciliation starts the run always completes,
//! possibly with `failed > 0`.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, warn};

use crate::data::models::{LogOutcome, RunCounts, SyncAction, SyncLogEntry};
use crate::data::store::SyncLogSink;
use crate::shopify::UpstreamError;
use crate::shopify::query::MAX_PAGE_SIZE;
use crate::sync::cache::{CacheEntryStatus, CacheSource, Clock, EntityCache};
use crate::sync::entity::{EntityType, NormalizedEntity};
use crate::sync::errors::SyncError;
use crate::sync::fetcher::Fetcher;
use crate::sync::reconcile::{Interruption, ItemFailure, Reconciler};
use crate::utils::{fmt_duration, log_if_slow};

const SLOW_RUN_THRESHOLD: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Pending,
    Fetching,
    Reconciling,
    Completed,
    Failed,
}

impl RunState {
    fn can_advance_to(self, next: RunState) -> bool {
        matches!(
            (self, next),
            (RunState::Pending, RunState::Fetching)
                | (RunState::Fetching, RunState::Reconciling)
                | (RunState::Fetching, RunState::Failed)
                | (RunState::Reconciling, RunState::Completed)
        )
    }
}

/// Latest known state of runs for one entity type.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatus {
    pub state: RunState,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub last_counts: Option<RunCounts>,
    pub last_error: Option<String>,
}

/// Summary of one completed run. Immutable once returned.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRunResult {
    pub entity_type: EntityType,
    pub created: u32,
    pub updated: u32,
    pub failed: u32,
    pub total: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub errors: Vec<ItemFailure>,
    /// Whether the items came from the cache, a fresh fetch, or a stale fallback.
    pub source: CacheSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interrupted: Option<Interruption>,
}

impl SyncRunResult {
    pub fn counts(&self) -> RunCounts {
        RunCounts {
            created: self.created,
            updated: self.updated,
            failed: self.failed,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub force_refresh: bool,
    /// Page size; the configured default when `None`.
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Copy)]
pub struct RunSettings {
    pub page_size: u32,
    pub run_timeout: Duration,
}

/// Per-type entry returned by [`SyncRunner::status`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySyncStatus {
    pub entity_type: EntityType,
    pub cache: Option<CacheEntryStatus>,
    pub run: Option<RunStatus>,
}

pub struct SyncRunner {
    fetcher: Fetcher,
    cache: EntityCache<NormalizedEntity>,
    reconciler: Reconciler,
    logs: Arc<dyn SyncLogSink>,
    clock: Arc<dyn Clock>,
    settings: RunSettings,
    runs: DashMap<EntityType, RunStatus>,
}

/// Tracks one run's state and mirrors it into the shared status map.
struct RunTracker<'a> {
    entity_type: EntityType,
    state: RunState,
    started_at: DateTime<Utc>,
    runs: &'a DashMap<EntityType, RunStatus>,
}

impl<'a> RunTracker<'a> {
    fn start(
        entity_type: EntityType,
        started_at: DateTime<Utc>,
        runs: &'a DashMap<EntityType, RunStatus>,
    ) -> Self {
        let previous = runs.get(&entity_type).map(|r| r.value().clone());
        runs.insert(
            entity_type,
            RunStatus {
                state: RunState::Pending,
                started_at,
                finished_at: None,
                last_counts: previous.as_ref().and_then(|r| r.last_counts),
                last_error: previous.and_then(|r| r.last_error),
            },
        );
        Self {
            entity_type,
            state: RunState::Pending,
            started_at,
            runs,
        }
    }

    fn advance(&mut self, next: RunState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "invalid run transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!(entity_type = %self.entity_type, from = ?self.state, to = ?next, "run state change");
        self.state = next;
        if let Some(mut status) = self.runs.get_mut(&self.entity_type) {
            status.state = next;
        }
    }

    fn complete(mut self, finished_at: DateTime<Utc>, counts: RunCounts) {
        self.advance(RunState::Completed);
        if let Some(mut status) = self.runs.get_mut(&self.entity_type) {
            status.finished_at = Some(finished_at);
            status.last_counts = Some(counts);
            status.last_error = None;
        }
    }

    fn fail(mut self, finished_at: DateTime<Utc>, message: String) {
        self.advance(RunState::Failed);
        if let Some(mut status) = self.runs.get_mut(&self.entity_type) {
            status.finished_at = Some(finished_at);
            status.last_error = Some(message);
        }
    }
}

impl SyncRunner {
    pub fn new(
        fetcher: Fetcher,
        reconciler: Reconciler,
        logs: Arc<dyn SyncLogSink>,
        clock: Arc<dyn Clock>,
        cache_ttl: Duration,
        settings: RunSettings,
    ) -> Self {
        Self {
            fetcher,
            cache: EntityCache::new(cache_ttl, clock.clone()),
            reconciler,
            logs,
            clock,
            settings,
            runs: DashMap::new(),
        }
    }

    pub fn settings(&self) -> RunSettings {
        self.settings
    }

    /// Run one sync for `entity_type`.
    ///
    /// Returns `Err` only when nothing could be fetched (no fresh data and no
    /// stale cache to fall back on) or the run was cancelled before fetching
    /// finished. Per-item failures are reported in the result.
    ///
    /// The run executes on its own task. Dropping the returned future does not
    /// stop it; it still reaches `Completed` or `Failed` and writes its logs.
    /// Use `cancel` to stop a run early.
    pub async fn run(
        self: &Arc<Self>,
        entity_type: EntityType,
        options: RunOptions,
        cancel: &CancellationToken,
    ) -> Result<SyncRunResult, SyncError> {
        let runner = Arc::clone(self);
        let cancel = cancel.clone();
        let span = tracing::info_span!("sync_run", %entity_type);
        let handle = tokio::spawn(
            async move { runner.run_inner(entity_type, options, &cancel).await }.instrument(span),
        );

        match handle.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Err(SyncError::Cancelled { entity_type }),
        }
    }

    async fn run_inner(
        &self,
        entity_type: EntityType,
        options: RunOptions,
        cancel: &CancellationToken,
    ) -> Result<SyncRunResult, SyncError> {
        let start = Instant::now();
        let started_at = self.clock.now();
        let deadline = tokio::time::Instant::now() + self.settings.run_timeout;
        let limit = options
            .limit
            .unwrap_or(self.settings.page_size)
            .clamp(1, MAX_PAGE_SIZE);
        let mut tracker = RunTracker::start(entity_type, started_at, &self.runs);

        tracker.advance(RunState::Fetching);
        let run_timeout = self.settings.run_timeout;
        let fetcher = &self.fetcher;
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(None),
            read = self.cache.get(entity_type, options.force_refresh, limit, |limit| async move {
                tokio::time::timeout_at(deadline, fetcher.fetch(entity_type, limit))
                    .await
                    .unwrap_or(Err(UpstreamError::Timeout(run_timeout)))
            }) => read.map_err(Some),
        };

        let read = match read {
            Ok(read) => read,
            Err(cause) => {
                let err = match cause {
                    Some(source) => SyncError::Fetch {
                        entity_type,
                        source,
                    },
                    None => SyncError::Cancelled { entity_type },
                };
                let finished_at = self.clock.now();
                error!(
                    duration = fmt_duration(start.elapsed()),
                    error = %err,
                    "sync run failed"
                );
                self.append_log(SyncLogEntry {
                    entity_type,
                    external_id: None,
                    action: SyncAction::Fetch,
                    outcome: LogOutcome::Failure,
                    message: err.to_string(),
                    counts: None,
                    created_at: finished_at,
                })
                .await;
                tracker.fail(finished_at, err.to_string());
                return Err(err);
            }
        };

        tracker.advance(RunState::Reconciling);
        let outcome = self
            .reconciler
            .reconcile_until(entity_type, &read.items, Some(deadline), cancel)
            .await;
        let finished_at = self.clock.now();

        let result = SyncRunResult {
            entity_type,
            created: outcome.created,
            updated: outcome.updated,
            failed: outcome.failed,
            total: outcome.total(),
            started_at,
            finished_at,
            errors: outcome.errors,
            source: read.source,
            interrupted: outcome.interrupted,
        };

        self.persist_run_logs(&result).await;
        tracker.complete(finished_at, result.counts());

        let duration = start.elapsed();
        log_if_slow(start, SLOW_RUN_THRESHOLD, "sync run");
        if result.failed > 0 || result.interrupted.is_some() {
            warn!(
                created = result.created,
                updated = result.updated,
                failed = result.failed,
                total = result.total,
                source = ?result.source,
                interrupted = ?result.interrupted,
                duration = fmt_duration(duration),
                "sync run completed with failures"
            );
        } else {
            info!(
                created = result.created,
                updated = result.updated,
                total = result.total,
                source = ?result.source,
                duration = fmt_duration(duration),
                "sync run completed"
            );
        }

        Ok(result)
    }

    /// Run every entity type concurrently; one failure does not stop the rest.
    pub async fn run_all(
        self: &Arc<Self>,
        options: RunOptions,
        cancel: &CancellationToken,
    ) -> Vec<(EntityType, Result<SyncRunResult, SyncError>)> {
        let runs = EntityType::ALL.map(|ty| async move { (ty, self.run(ty, options, cancel).await) });
        futures::future::join_all(runs).await
    }

    /// One item-failure entry per failed item, then the run summary.
    async fn persist_run_logs(&self, result: &SyncRunResult) {
        let mut interruption = None;
        for failure in &result.errors {
            if failure.action == SyncAction::Run {
                interruption = Some(failure.message.clone());
                continue;
            }
            self.append_log(SyncLogEntry::item_failure(
                result.entity_type,
                failure.item_external_id.clone(),
                failure.action,
                failure.message.clone(),
                result.finished_at,
            ))
            .await;
        }

        let outcome = if result.failed == 0 && result.interrupted.is_none() {
            LogOutcome::Success
        } else {
            LogOutcome::Partial
        };
        let mut message = format!(
            "created {}, updated {}, failed {} of {} ({:?} data)",
            result.created, result.updated, result.failed, result.total, result.source
        );
        if let Some(interruption) = interruption {
            message.push_str("; ");
            message.push_str(&interruption);
        }

        self.append_log(SyncLogEntry {
            entity_type: result.entity_type,
            external_id: None,
            action: SyncAction::Run,
            outcome,
            message,
            counts: Some(result.counts()),
            created_at: result.finished_at,
        })
        .await;
    }

    /// Log persistence is best-effort; a failed append never fails the run.
    async fn append_log(&self, entry: SyncLogEntry) {
        if let Err(e) = self.logs.append(&entry).await {
            warn!(
                entity_type = %entry.entity_type,
                action = %entry.action,
                error = %e,
                "failed to persist sync log entry"
            );
        }
    }

    pub fn status(&self) -> Vec<EntitySyncStatus> {
        EntityType::ALL
            .iter()
            .map(|&entity_type| EntitySyncStatus {
                entity_type,
                cache: self.cache.status(entity_type),
                run: self.runs.get(&entity_type).map(|r| r.value().clone()),
            })
            .collect()
    }

    pub fn run_state(&self, entity_type: EntityType) -> Option<RunState> {
        self.runs.get(&entity_type).map(|r| r.state)
    }

    /// Clear one entity type's cache entry, or all of them.
    pub fn clear_cache(&self, entity_type: Option<EntityType>) -> usize {
        match entity_type {
            Some(ty) => usize::from(self.cache.clear(ty)),
            None => self.cache.clear_all(),
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        self.cache.ttl()
    }
}
