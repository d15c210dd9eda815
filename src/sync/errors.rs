//! Error taxonomy for sync runs.
//!
//! Per-item failures ([`ItemError`]) are always recovered inside the run and
//! show up as counts and log entries. Only [`SyncError`] escapes a run.

use crate::data::store::StoreError;
use crate::shopify::UpstreamError;
use crate::sync::entity::{EntityType, UnknownEntityType};

/// A single record is unusable as received.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ItemValidationError {
    #[error("record has no external id")]
    MissingExternalId,
    #[error("required field `{0}` is missing or blank")]
    MissingField(&'static str),
}

/// Why one item was counted as failed.
#[derive(Debug, thiserror::Error)]
pub enum ItemError {
    #[error(transparent)]
    Validation(#[from] ItemValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A failure of the run as a whole.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    UnknownEntityType(#[from] UnknownEntityType),
    #[error("fetching {entity_type} from upstream failed: {source}")]
    Fetch {
        entity_type: EntityType,
        #[source]
        source: UpstreamError,
    },
    #[error("{entity_type} sync was cancelled before any data was fetched")]
    Cancelled { entity_type: EntityType },
}
