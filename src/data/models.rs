//! `sqlx::FromRow` row types and the enums stored in text columns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::sync::entity::EntityType;

/// Whether an upsert inserted a new row or refreshed an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertAction {
    Created,
    Updated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub local_id: i64,
    pub action: UpsertAction,
}

/// The step a log entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    /// Whole-run summary or whole-run failure.
    Run,
    Fetch,
    Validate,
    Upsert,
}

impl SyncAction {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncAction::Run => "run",
            SyncAction::Fetch => "fetch",
            SyncAction::Validate => "validate",
            SyncAction::Upsert => "upsert",
        }
    }
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutcome {
    Success,
    Partial,
    Failure,
}

impl LogOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            LogOutcome::Success => "success",
            LogOutcome::Partial => "partial",
            LogOutcome::Failure => "failure",
        }
    }
}

/// Created/updated/failed counts attached to run-level log entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunCounts {
    pub created: u32,
    pub updated: u32,
    pub failed: u32,
}

impl RunCounts {
    pub fn total(&self) -> u32 {
        self.created + self.updated + self.failed
    }
}

/// One append-only observability record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncLogEntry {
    pub entity_type: EntityType,
    pub external_id: Option<String>,
    pub action: SyncAction,
    pub outcome: LogOutcome,
    pub message: String,
    pub counts: Option<RunCounts>,
    pub created_at: DateTime<Utc>,
}

impl SyncLogEntry {
    pub fn item_failure(
        entity_type: EntityType,
        external_id: Option<String>,
        action: SyncAction,
        message: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            entity_type,
            external_id,
            action,
            outcome: LogOutcome::Failure,
            message,
            counts: None,
            created_at,
        }
    }
}

/// A persisted log row as read back from `sync_logs`.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SyncLogRecord {
    pub id: i64,
    pub entity_type: String,
    pub external_id: Option<String>,
    pub action: String,
    pub outcome: String,
    pub message: String,
    pub created: Option<i32>,
    pub updated: Option<i32>,
    pub failed: Option<i32>,
    pub total: Option<i32>,
    pub created_at: DateTime<Utc>,
}
