//! JSON error responses for the HTTP surface.

use axum::extract::rejection::QueryRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use tracing::error;

use crate::data::store::StoreError;
use crate::sync::SyncError;
use crate::sync::entity::UnknownEntityType;

/// Errors a handler can return; each maps to one status code and a
/// `{"error": "..."}` body.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    UnknownEntityType(#[from] UnknownEntityType),
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error("database error")]
    Store(#[from] StoreError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::UnknownEntityType(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Sync(SyncError::UnknownEntityType(_)) => StatusCode::BAD_REQUEST,
            ApiError::Sync(SyncError::Fetch { .. }) => StatusCode::BAD_GATEWAY,
            ApiError::Sync(SyncError::Cancelled { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let ApiError::Store(e) = &self {
            error!(error = %e, "database error while handling request");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
