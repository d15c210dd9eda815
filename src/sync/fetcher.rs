//! Upstream Fetcher: one page of raw records per call, normalized.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::shopify::UpstreamError;
use crate::sync::entity::{EntityType, NormalizedEntity};
use crate::sync::normalize::normalize;

/// Anything that can hand back one page of raw upstream records.
///
/// Fails only for batch-level problems (transport, protocol, missing
/// top-level collection). Individual records are returned as-is.
#[async_trait]
pub trait UpstreamSource: Send + Sync {
    async fn fetch_records(
        &self,
        entity_type: EntityType,
        limit: u32,
    ) -> Result<Vec<Value>, UpstreamError>;
}

#[derive(Clone)]
pub struct Fetcher {
    source: Arc<dyn UpstreamSource>,
}

impl Fetcher {
    pub fn new(source: Arc<dyn UpstreamSource>) -> Self {
        Self { source }
    }

    /// Fetch a single page and normalize each record.
    ///
    /// Pagination beyond the first page is the caller's concern.
    pub async fn fetch(
        &self,
        entity_type: EntityType,
        limit: u32,
    ) -> Result<Vec<NormalizedEntity>, UpstreamError> {
        let raw = self.source.fetch_records(entity_type, limit).await?;
        let descriptor = entity_type.descriptor();
        let items: Vec<NormalizedEntity> = raw.iter().map(|r| normalize(descriptor, r)).collect();
        debug!(%entity_type, limit, fetched = items.len(), "fetched upstream page");
        Ok(items)
    }
}
