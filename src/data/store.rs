//! The local store boundary used by the sync engine.
//!
//! The engine only ever needs "upsert this row", "count rows" and
//! "append a log record"; Postgres implements both traits in
//! [`crate::data::PgStore`].

use async_trait::async_trait;

use crate::data::models::{SyncLogEntry, SyncLogRecord, UpsertOutcome};
use crate::sync::entity::{EntityType, NormalizedField};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("write rejected: {0}")]
    Rejected(String),
}

/// Mirrored entity rows, one table per entity type.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Insert the row for `external_id` or update its sync-managed columns,
    /// as one atomic statement. Sets `last_synced_at` to now either way.
    async fn upsert(
        &self,
        entity_type: EntityType,
        external_id: &str,
        fields: &[NormalizedField],
    ) -> Result<UpsertOutcome, StoreError>;

    async fn count(&self, entity_type: EntityType) -> Result<i64, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// Append-only sync log records.
#[async_trait]
pub trait SyncLogSink: Send + Sync {
    async fn append(&self, entry: &SyncLogEntry) -> Result<(), StoreError>;

    /// Most recent records first, optionally for one entity type.
    async fn recent(
        &self,
        entity_type: Option<EntityType>,
        limit: u32,
    ) -> Result<Vec<SyncLogRecord>, StoreError>;
}
