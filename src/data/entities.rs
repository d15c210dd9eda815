//! Database operations for mirrored entity tables.
//!
//! Statements are generated from the static entity descriptors (table and
//! column names are compile-time constants); every value is a bind parameter.

use crate::data::models::{UpsertAction, UpsertOutcome};
use crate::sync::entity::{EntityDescriptor, EntityType, FieldKind, FieldValue, NormalizedField};
use crate::sync::normalize::default_value;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Pre-rendered upsert statement per entity type.
static UPSERT_SQL: LazyLock<HashMap<EntityType, String>> = LazyLock::new(|| {
    EntityType::ALL
        .iter()
        .map(|ty| (*ty, build_upsert_sql(ty.descriptor())))
        .collect()
});

fn sql_type(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::Text { .. } | FieldKind::Reference => "text",
        FieldKind::Decimal => "numeric",
        FieldKind::Integer => "int8",
        FieldKind::Boolean { .. } => "bool",
        FieldKind::Timestamp => "timestamptz",
        FieldKind::Json => "jsonb",
    }
}

/// `INSERT ... ON CONFLICT (external_id) DO UPDATE` touching only sync-managed
/// columns. `xmax = 0` holds only for a freshly inserted tuple, which tells
/// created and updated apart without a separate lookup.
fn build_upsert_sql(desc: &EntityDescriptor) -> String {
    let columns: Vec<&str> = desc.fields.iter().map(|rule| rule.column).collect();
    let placeholders: Vec<String> = desc
        .fields
        .iter()
        .enumerate()
        .map(|(i, rule)| format!("${}::{}", i + 2, sql_type(rule.kind)))
        .collect();
    let assignments: Vec<String> = columns
        .iter()
        .map(|column| format!("{column} = EXCLUDED.{column}"))
        .collect();

    format!(
        "INSERT INTO {table} (external_id, {columns}, last_synced_at) \
         VALUES ($1, {placeholders}, NOW()) \
         ON CONFLICT (external_id) DO UPDATE SET {assignments}, \
         last_synced_at = EXCLUDED.last_synced_at \
         RETURNING id, (xmax = 0) AS inserted",
        table = desc.table,
        columns = columns.join(", "),
        placeholders = placeholders.join(", "),
        assignments = assignments.join(", "),
    )
}

/// Insert or refresh one mirrored row.
pub async fn upsert(
    pool: &PgPool,
    entity_type: EntityType,
    external_id: &str,
    fields: &[NormalizedField],
) -> Result<UpsertOutcome, sqlx::Error> {
    let desc = entity_type.descriptor();
    let sql = UPSERT_SQL
        .get(&entity_type)
        .map(String::as_str)
        .ok_or_else(|| sqlx::Error::Protocol(format!("no upsert statement for {entity_type}")))?;

    let mut query = sqlx::query_as::<_, (i64, bool)>(sql).bind(external_id.to_owned());
    // Bind in descriptor order, whatever order `fields` arrives in.
    for rule in desc.fields {
        let value = fields
            .iter()
            .find(|f| f.column == rule.column)
            .map(|f| f.value.clone())
            .unwrap_or_else(|| default_value(rule.kind));
        query = match value {
            FieldValue::Text(s) | FieldValue::Decimal(s) => query.bind(s),
            FieldValue::Integer(n) => query.bind(n),
            FieldValue::Boolean(b) => query.bind(b),
            FieldValue::Timestamp(ts) => query.bind(ts),
            FieldValue::Json(v) => query.bind(v),
        };
    }

    let (local_id, inserted) = query.fetch_one(pool).await?;
    Ok(UpsertOutcome {
        local_id,
        action: if inserted {
            UpsertAction::Created
        } else {
            UpsertAction::Updated
        },
    })
}

/// Number of mirrored rows for an entity type.
pub async fn count(pool: &PgPool, entity_type: EntityType) -> Result<i64, sqlx::Error> {
    let table = entity_type.descriptor().table;
    let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await?;
    Ok(count)
}
