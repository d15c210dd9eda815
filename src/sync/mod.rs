//! The sync engine: fetch a page of upstream records, cache it, and reconcile
//! it into the local store.

pub mod cache;
pub mod entity;
pub mod errors;
pub mod fetcher;
pub mod normalize;
pub mod reconcile;
pub mod runner;

#[cfg(test)]
pub(crate) mod testing;

pub use entity::EntityType;
pub use errors::SyncError;
pub use runner::{RunOptions, SyncRunResult, SyncRunner};
