//! Error types for the Admin API client.

use std::time::Duration;

/// A batch-level failure talking to the upstream platform.
///
/// Any of these aborts the whole fetch for an entity type; per-record shape
/// problems never surface here.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest_middleware::Error),
    #[error("upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("upstream reported errors: {0}")]
    Graphql(String),
    #[error("failed to parse upstream response")]
    ParseFailed {
        url: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("upstream response is missing `{path}`")]
    MissingCollection { path: String },
    #[error("upstream did not respond within {}s", .0.as_secs())]
    Timeout(Duration),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(reqwest_middleware::Error::Reqwest(err))
    }
}
