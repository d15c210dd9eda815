//! In-memory store used by engine and web tests.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use crate::data::models::{SyncLogEntry, SyncLogRecord, UpsertAction, UpsertOutcome};
use crate::data::store::{EntityStore, StoreError, SyncLogSink};
use crate::sync::entity::{EntityType, NormalizedField};

#[derive(Debug, Clone)]
pub(crate) struct MemoryRow {
    pub local_id: i64,
    pub fields: Vec<NormalizedField>,
    pub last_synced_at: chrono::DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    rows: HashMap<(EntityType, String), MemoryRow>,
    next_id: i64,
    logs: Vec<SyncLogEntry>,
}

#[derive(Default)]
pub(crate) struct MemoryStore {
    inner: Mutex<Inner>,
    /// External ids whose writes fail with a rejected-write error.
    reject: Mutex<HashSet<String>>,
    /// Artificial latency per upsert, for timeout tests.
    delay: Mutex<Option<Duration>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject(&self, external_id: &str) {
        self.reject.lock().unwrap().insert(external_id.to_owned());
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn row(&self, entity_type: EntityType, external_id: &str) -> Option<MemoryRow> {
        self.inner
            .lock()
            .unwrap()
            .rows
            .get(&(entity_type, external_id.to_owned()))
            .cloned()
    }

    pub fn len(&self, entity_type: EntityType) -> usize {
        self.inner
            .lock()
            .unwrap()
            .rows
            .keys()
            .filter(|(ty, _)| *ty == entity_type)
            .count()
    }

    pub fn logs(&self) -> Vec<SyncLogEntry> {
        self.inner.lock().unwrap().logs.clone()
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn upsert(
        &self,
        entity_type: EntityType,
        external_id: &str,
        fields: &[NormalizedField],
    ) -> Result<UpsertOutcome, StoreError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.reject.lock().unwrap().contains(external_id) {
            return Err(StoreError::Rejected(format!(
                "constraint violation for {external_id}"
            )));
        }

        let mut inner = self.inner.lock().unwrap();
        let key = (entity_type, external_id.to_owned());
        let now = Utc::now();
        if let Some(row) = inner.rows.get_mut(&key) {
            row.fields = fields.to_vec();
            row.last_synced_at = now;
            return Ok(UpsertOutcome {
                local_id: row.local_id,
                action: UpsertAction::Updated,
            });
        }

        inner.next_id += 1;
        let local_id = inner.next_id;
        inner.rows.insert(
            key,
            MemoryRow {
                local_id,
                fields: fields.to_vec(),
                last_synced_at: now,
            },
        );
        Ok(UpsertOutcome {
            local_id,
            action: UpsertAction::Created,
        })
    }

    async fn count(&self, entity_type: EntityType) -> Result<i64, StoreError> {
        Ok(self.len(entity_type) as i64)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl SyncLogSink for MemoryStore {
    async fn append(&self, entry: &SyncLogEntry) -> Result<(), StoreError> {
        self.inner.lock().unwrap().logs.push(entry.clone());
        Ok(())
    }

    async fn recent(
        &self,
        entity_type: Option<EntityType>,
        limit: u32,
    ) -> Result<Vec<SyncLogRecord>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .logs
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, e)| entity_type.is_none_or(|ty| e.entity_type == ty))
            .take(limit as usize)
            .map(|(i, e)| SyncLogRecord {
                id: i as i64 + 1,
                entity_type: e.entity_type.as_str().to_owned(),
                external_id: e.external_id.clone(),
                action: e.action.as_str().to_owned(),
                outcome: e.outcome.as_str().to_owned(),
                message: e.message.clone(),
                created: e.counts.map(|c| c.created as i32),
                updated: e.counts.map(|c| c.updated as i32),
                failed: e.counts.map(|c| c.failed as i32),
                total: e.counts.map(|c| c.total() as i32),
                created_at: e.created_at,
            })
            .collect())
    }
}
