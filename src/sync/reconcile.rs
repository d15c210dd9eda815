//! Idempotent create-or-update of normalized entities against local rows.
//!
//! Items are processed strictly in order, one at a time, so counts are
//! deterministic and failure log entries line up with the upstream order. A
//! single bad item is counted and skipped; it never ends the batch.

use serde::Serialize;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::data::models::{SyncAction, UpsertAction, UpsertOutcome};
use crate::data::store::EntityStore;
use crate::shopify::ids::canonicalize;
use crate::sync::entity::{EntityDescriptor, EntityType, NormalizedEntity};
use crate::sync::errors::{ItemError, ItemValidationError};

/// One entry of a run's error list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemFailure {
    /// Raw upstream id of the failing item; `None` for run-level entries.
    pub item_external_id: Option<String>,
    #[serde(skip)]
    pub action: SyncAction,
    pub message: String,
}

/// Why reconciliation stopped before the end of the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Interruption {
    TimedOut,
    Cancelled,
}

#[derive(Debug, Default)]
pub struct ReconcileOutcome {
    pub created: u32,
    pub updated: u32,
    pub failed: u32,
    pub errors: Vec<ItemFailure>,
    pub interrupted: Option<Interruption>,
}

impl ReconcileOutcome {
    pub fn total(&self) -> u32 {
        self.created + self.updated + self.failed
    }
}

/// Check minimal required data and return the canonical external id.
pub fn validate(
    descriptor: &EntityDescriptor,
    item: &NormalizedEntity,
) -> Result<String, ItemValidationError> {
    let canonical = item
        .external_id
        .as_deref()
        .map(canonicalize)
        .filter(|id| !id.trim().is_empty())
        .ok_or(ItemValidationError::MissingExternalId)?;

    for column in descriptor.required {
        let present = item.field(column).is_some_and(|field| {
            field.from_upstream && field.value.as_text().is_none_or(|s| !s.trim().is_empty())
        });
        if !present {
            return Err(ItemValidationError::MissingField(column));
        }
    }

    Ok(canonical)
}

pub struct Reconciler {
    store: Arc<dyn EntityStore>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    /// Reconcile every item with no deadline.
    pub async fn reconcile(
        &self,
        entity_type: EntityType,
        items: &[NormalizedEntity],
    ) -> ReconcileOutcome {
        self.reconcile_until(entity_type, items, None, &CancellationToken::new())
            .await
    }

    /// Reconcile items until done, `deadline` passes, or `cancel` fires.
    ///
    /// An interrupted run keeps everything counted so far and records one
    /// run-level error naming how many items were left unprocessed. The item
    /// in flight at that moment is not counted.
    pub async fn reconcile_until(
        &self,
        entity_type: EntityType,
        items: &[NormalizedEntity],
        deadline: Option<Instant>,
        cancel: &CancellationToken,
    ) -> ReconcileOutcome {
        let descriptor = entity_type.descriptor();
        let mut outcome = ReconcileOutcome::default();

        for (index, item) in items.iter().enumerate() {
            let work = self.reconcile_item(descriptor, item);
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(Interruption::Cancelled),
                _ = sleep_until_opt(deadline) => Err(Interruption::TimedOut),
                result = work => Ok(result),
            };

            match result {
                Ok(Ok(UpsertOutcome { local_id, action })) => {
                    trace!(%entity_type, external_id = ?item.external_id, local_id, ?action, "item reconciled");
                    match action {
                        UpsertAction::Created => outcome.created += 1,
                        UpsertAction::Updated => outcome.updated += 1,
                    }
                }
                Ok(Err(err)) => {
                    let action = match err {
                        ItemError::Validation(_) => SyncAction::Validate,
                        ItemError::Store(_) => SyncAction::Upsert,
                    };
                    warn!(
                        %entity_type,
                        external_id = ?item.external_id,
                        label = ?item.label(),
                        %action,
                        error = %err,
                        "item failed to reconcile"
                    );
                    outcome.failed += 1;
                    outcome.errors.push(ItemFailure {
                        item_external_id: item.external_id.clone(),
                        action,
                        message: err.to_string(),
                    });
                }
                Err(interruption) => {
                    let remaining = items.len() - index;
                    let reason = match interruption {
                        Interruption::TimedOut => "run timed out",
                        Interruption::Cancelled => "run was cancelled",
                    };
                    warn!(%entity_type, remaining, reason, "reconciliation stopped early");
                    outcome.errors.push(ItemFailure {
                        item_external_id: None,
                        action: SyncAction::Run,
                        message: format!(
                            "{reason} after {} of {} items; {remaining} not processed",
                            index,
                            items.len()
                        ),
                    });
                    outcome.interrupted = Some(interruption);
                    break;
                }
            }
        }

        debug!(
            %entity_type,
            created = outcome.created,
            updated = outcome.updated,
            failed = outcome.failed,
            "reconciliation finished"
        );
        outcome
    }

    async fn reconcile_item(
        &self,
        descriptor: &EntityDescriptor,
        item: &NormalizedEntity,
    ) -> Result<UpsertOutcome, ItemError> {
        let external_id = validate(descriptor, item)?;
        let outcome = self
            .store
            .upsert(descriptor.entity_type, &external_id, &item.fields)
            .await?;
        Ok(outcome)
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
