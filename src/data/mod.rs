//! Local persistence: mirrored entity tables and the sync log.

pub mod entities;
pub mod models;
pub mod store;
pub mod sync_logs;

#[cfg(test)]
pub(crate) mod memory;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::data::models::{SyncLogEntry, SyncLogRecord, UpsertOutcome};
use crate::data::store::{EntityStore, StoreError, SyncLogSink};
use crate::sync::entity::{EntityType, NormalizedField};

/// Postgres-backed implementation of the store boundary.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl EntityStore for PgStore {
    async fn upsert(
        &self,
        entity_type: EntityType,
        external_id: &str,
        fields: &[NormalizedField],
    ) -> Result<UpsertOutcome, StoreError> {
        Ok(entities::upsert(&self.pool, entity_type, external_id, fields).await?)
    }

    async fn count(&self, entity_type: EntityType) -> Result<i64, StoreError> {
        Ok(entities::count(&self.pool, entity_type).await?)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl SyncLogSink for PgStore {
    async fn append(&self, entry: &SyncLogEntry) -> Result<(), StoreError> {
        Ok(sync_logs::insert(&self.pool, entry).await?)
    }

    async fn recent(
        &self,
        entity_type: Option<EntityType>,
        limit: u32,
    ) -> Result<Vec<SyncLogRecord>, StoreError> {
        Ok(sync_logs::list_recent(&self.pool, entity_type, i64::from(limit)).await?)
    }
}
