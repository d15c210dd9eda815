//! Sync trigger, status, log and cache endpoints.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::response::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::data::models::SyncLogRecord;
use crate::shopify::query::MAX_PAGE_SIZE;
use crate::state::AppState;
use crate::sync::entity::EntityType;
use crate::sync::runner::{EntitySyncStatus, RunOptions, SyncRunResult};
use crate::web::error::ApiError;

const DEFAULT_LOG_LIMIT: u32 = 100;
const MAX_LOG_LIMIT: u32 = 500;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerParams {
    #[serde(default)]
    pub force: bool,
    pub limit: Option<u32>,
}

impl TriggerParams {
    fn options(&self, default_limit: u32) -> RunOptions {
        RunOptions {
            force_refresh: self.force,
            limit: Some(self.limit.unwrap_or(default_limit).clamp(1, MAX_PAGE_SIZE)),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub success: bool,
    #[serde(flatten)]
    pub result: SyncRunResult,
}

/// One element of the `POST /sync` response.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum EntityOutcome {
    Completed(SyncResponse),
    Failed(FailedSync),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedSync {
    pub entity_type: EntityType,
    pub success: bool,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct SyncAllResponse {
    pub results: Vec<EntityOutcome>,
}

/// `POST /sync/{entityType}`
#[instrument(skip_all)]
pub async fn trigger_sync(
    State(state): State<AppState>,
    Path(entity_type): Path<String>,
    params: Result<Query<TriggerParams>, QueryRejection>,
) -> Result<Json<SyncResponse>, ApiError> {
    let entity_type: EntityType = entity_type.parse()?;
    let Query(params) = params?;
    let options = params.options(state.page_size);
    info!(%entity_type, force = options.force_refresh, limit = ?options.limit, "sync triggered");

    let result = state
        .runner
        .run(entity_type, options, &state.shutdown)
        .await?;
    Ok(Json(SyncResponse {
        success: true,
        result,
    }))
}

/// `POST /sync`
#[instrument(skip_all)]
pub async fn trigger_sync_all(
    State(state): State<AppState>,
    params: Result<Query<TriggerParams>, QueryRejection>,
) -> Result<Json<SyncAllResponse>, ApiError> {
    let Query(params) = params?;
    let options = params.options(state.page_size);
    info!(force = options.force_refresh, limit = ?options.limit, "sync of all entity types triggered");

    let results = state
        .runner
        .run_all(options, &state.shutdown)
        .await
        .into_iter()
        .map(|(entity_type, outcome)| match outcome {
            Ok(result) => EntityOutcome::Completed(SyncResponse {
                success: true,
                result,
            }),
            Err(e) => EntityOutcome::Failed(FailedSync {
                entity_type,
                success: false,
                error: e.to_string(),
            }),
        })
        .collect();
    Ok(Json(SyncAllResponse { results }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityStatusResponse {
    #[serde(flatten)]
    pub status: EntitySyncStatus,
    pub local_count: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub cache_ttl_secs: u64,
    pub entities: Vec<EntityStatusResponse>,
}

/// `GET /sync/status`
pub async fn sync_status(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let mut entities = Vec::new();
    for status in state.runner.status() {
        let local_count = state.store.count(status.entity_type).await?;
        entities.push(EntityStatusResponse {
            status,
            local_count,
        });
    }
    Ok(Json(StatusResponse {
        cache_ttl_secs: state.runner.cache_ttl().as_secs(),
        entities,
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogParams {
    pub entity_type: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub logs: Vec<SyncLogRecord>,
}

/// `GET /sync/logs`
pub async fn sync_logs(
    State(state): State<AppState>,
    params: Result<Query<LogParams>, QueryRejection>,
) -> Result<Json<LogsResponse>, ApiError> {
    let Query(params) = params?;
    let entity_type = params
        .entity_type
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(str::parse::<EntityType>)
        .transpose()?;
    let limit = params
        .limit
        .unwrap_or(DEFAULT_LOG_LIMIT)
        .clamp(1, MAX_LOG_LIMIT);

    let logs = state.logs.recent(entity_type, limit).await?;
    Ok(Json(LogsResponse { logs }))
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub cleared: usize,
}

/// `DELETE /sync/cache`
pub async fn clear_all_caches(State(state): State<AppState>) -> Json<ClearResponse> {
    let cleared = state.runner.clear_cache(None);
    info!(cleared, "entity cache cleared");
    Json(ClearResponse { cleared })
}

/// `DELETE /sync/cache/{entityType}`
pub async fn clear_cache(
    State(state): State<AppState>,
    Path(entity_type): Path<String>,
) -> Result<Json<ClearResponse>, ApiError> {
    let entity_type: EntityType = entity_type.parse()?;
    let cleared = state.runner.clear_cache(Some(entity_type));
    info!(%entity_type, cleared, "entity cache cleared");
    Ok(Json(ClearResponse { cleared }))
}
