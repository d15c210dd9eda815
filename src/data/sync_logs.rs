//! Database operations for the append-only `sync_logs` table.

use crate::data::models::{SyncLogEntry, SyncLogRecord};
use crate::sync::entity::EntityType;
use sqlx::PgPool;

/// Append one log record.
pub async fn insert(pool: &PgPool, entry: &SyncLogEntry) -> Result<(), sqlx::Error> {
    let counts = entry.counts;
    let as_i32 = |n: u32| i32::try_from(n).unwrap_or(i32::MAX);

    sqlx::query(
        r#"
        INSERT INTO sync_logs (
            entity_type, external_id, action, outcome, message,
            created, updated, failed, total, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(entry.entity_type.as_str())
    .bind(entry.external_id.as_deref())
    .bind(entry.action.as_str())
    .bind(entry.outcome.as_str())
    .bind(&entry.message)
    .bind(counts.map(|c| as_i32(c.created)))
    .bind(counts.map(|c| as_i32(c.updated)))
    .bind(counts.map(|c| as_i32(c.failed)))
    .bind(counts.map(|c| as_i32(c.total())))
    .bind(entry.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Fetch the most recent records, newest first.
///
/// Passing `None` for `entity_type` disables that filter.
pub async fn list_recent(
    pool: &PgPool,
    entity_type: Option<EntityType>,
    limit: i64,
) -> Result<Vec<SyncLogRecord>, sqlx::Error> {
    sqlx::query_as::<_, SyncLogRecord>(
        r#"
        SELECT id, entity_type, external_id, action, outcome, message,
               created, updated, failed, total, created_at
        FROM sync_logs
        WHERE ($1::text IS NULL OR entity_type = $1)
        ORDER BY created_at DESC, id DESC
        LIMIT $2
        "#,
    )
    .bind(entity_type.map(EntityType::as_str))
    .bind(limit)
    .fetch_all(pool)
    .await
}
