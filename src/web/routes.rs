//! Router construction.

use axum::{
    Router,
    routing::{delete, get, post},
};
use std::time::Duration;
use tower_http::{compression::CompressionLayer, timeout::TimeoutLayer};

use crate::state::AppState;
use crate::web::middleware::request_id::RequestIdLayer;
use crate::web::{status, sync};

/// Headroom above the run timeout so a timed-out run can still report its counts.
const RESPONSE_GRACE: Duration = Duration::from_secs(15);

pub fn create_router(app_state: AppState) -> Router {
    let request_timeout = app_state.runner.settings().run_timeout + RESPONSE_GRACE;

    let sync_router = Router::new()
        .route("/sync", post(sync::trigger_sync_all))
        .route("/sync/status", get(sync::sync_status))
        .route("/sync/logs", get(sync::sync_logs))
        .route("/sync/cache", delete(sync::clear_all_caches))
        .route("/sync/cache/{entity_type}", delete(sync::clear_cache))
        .route("/sync/{entity_type}", post(sync::trigger_sync));

    Router::new()
        .route("/health", get(status::health))
        .merge(sync_router)
        .with_state(app_state)
        .layer((
            RequestIdLayer,
            CompressionLayer::new()
                .zstd(true)
                .br(true)
                .gzip(true)
                .quality(tower_http::CompressionLevel::Fastest),
            TimeoutLayer::new(request_timeout),
        ))
}
