//! Per-entity-type TTL cache of the last successful upstream fetch.
//!
//! Entries are never purged on expiry: a stale entry is skipped for fresh
//! reads but still served when the upstream fetch fails. The cache is keyed by
//! entity type only. An entry that was filled with a smaller `limit` than the
//! caller now asks for is treated like a stale one, so a bigger page is never
//! silently answered with a smaller cached page.
//!
//! Concurrent `get` calls for the same type are not linearized: a slow fetch
//! may overwrite the result of a faster, newer one.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

use crate::sync::entity::EntityType;

/// Source of "now" for freshness checks, swappable in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += chrono::Duration::from_std(by).unwrap_or(chrono::Duration::MAX);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Debug)]
struct CacheEntry<T> {
    items: Arc<Vec<T>>,
    fetched_at: DateTime<Utc>,
    limit: u32,
}

// Manual impl: `T` itself need not be `Clone`.
impl<T> Clone for CacheEntry<T> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
            fetched_at: self.fetched_at,
            limit: self.limit,
        }
    }
}

/// What a `get` call was answered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheSource {
    /// Fresh cached entry; the fetch function was not called.
    Hit,
    /// Fetched from upstream and stored.
    Fetched,
    /// Fetch failed; an older entry was served instead.
    Stale,
}

/// Items returned by [`EntityCache::get`] plus how they were obtained.
#[derive(Debug)]
pub struct CacheRead<T> {
    pub items: Arc<Vec<T>>,
    pub source: CacheSource,
    pub fetched_at: DateTime<Utc>,
}

/// Snapshot of one entry for status reporting.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntryStatus {
    pub entity_type: EntityType,
    pub items: usize,
    pub limit: u32,
    pub fetched_at: DateTime<Utc>,
    pub age_secs: i64,
    pub fresh: bool,
}

pub struct EntityCache<T> {
    entries: DashMap<EntityType, CacheEntry<T>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<T> EntityCache<T> {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn is_fresh(&self, entry: &CacheEntry<T>, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(entry.fetched_at);
        // A clock that stepped backwards yields a negative age; treat as fresh.
        age.to_std().map_or(true, |age| age < self.ttl)
    }

    /// Return cached items for `entity_type`, calling `fetch` only when needed.
    ///
    /// * `force_refresh == false` and a fresh entry covering `limit` exists:
    ///   return it without calling `fetch`.
    /// * Otherwise call `fetch(limit)` and replace the entry on success.
    /// * If `fetch` fails and any previous entry exists, log a warning and
    ///   return the previous items. With no previous entry, the error is returned.
    pub async fn get<F, Fut, E>(
        &self,
        entity_type: EntityType,
        force_refresh: bool,
        limit: u32,
        fetch: F,
    ) -> Result<CacheRead<T>, E>
    where
        F: FnOnce(u32) -> Fut,
        Fut: Future<Output = Result<Vec<T>, E>>,
        E: Display,
    {
        // Clone out of the map so no shard lock is held across the await below.
        let previous = self.entries.get(&entity_type).map(|e| e.value().clone());

        if !force_refresh
            && let Some(entry) = &previous
            && entry.limit >= limit
            && self.is_fresh(entry, self.clock.now())
        {
            debug!(%entity_type, items = entry.items.len(), "entity cache hit");
            return Ok(CacheRead {
                items: entry.items.clone(),
                source: CacheSource::Hit,
                fetched_at: entry.fetched_at,
            });
        }

        match fetch(limit).await {
            Ok(items) => {
                let entry = CacheEntry {
                    items: Arc::new(items),
                    fetched_at: self.clock.now(),
                    limit,
                };
                let read = CacheRead {
                    items: entry.items.clone(),
                    source: CacheSource::Fetched,
                    fetched_at: entry.fetched_at,
                };
                self.entries.insert(entity_type, entry);
                Ok(read)
            }
            Err(err) => match previous {
                Some(entry) => {
                    warn!(
                        %entity_type,
                        error = %err,
                        items = entry.items.len(),
                        fetched_at = %entry.fetched_at,
                        "upstream fetch failed, serving stale cache entry"
                    );
                    Ok(CacheRead {
                        items: entry.items,
                        source: CacheSource::Stale,
                        fetched_at: entry.fetched_at,
                    })
                }
                None => Err(err),
            },
        }
    }

    /// Drop the entry for one entity type. Returns whether one existed.
    pub fn clear(&self, entity_type: EntityType) -> bool {
        self.entries.remove(&entity_type).is_some()
    }

    /// Drop every entry. Returns how many were removed.
    pub fn clear_all(&self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    pub fn status(&self, entity_type: EntityType) -> Option<CacheEntryStatus> {
        let entry = self.entries.get(&entity_type)?;
        let now = self.clock.now();
        Some(CacheEntryStatus {
            entity_type,
            items: entry.items.len(),
            limit: entry.limit,
            fetched_at: entry.fetched_at,
            age_secs: now.signed_duration_since(entry.fetched_at).num_seconds(),
            fresh: self.is_fresh(&entry, now),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TTL: Duration = Duration::from_secs(300);

    fn cache() -> (EntityCache<u32>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        (EntityCache::new(TTL, clock.clone()), clock)
    }

    /// A fetch function that counts its invocations and returns `items`.
    fn counting(
        calls: &AtomicUsize,
        items: Vec<u32>,
    ) -> impl FnOnce(u32) -> std::future::Ready<Result<Vec<u32>, String>> + '_ {
        move |_limit| {
            calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok(items))
        }
    }

    fn failing(calls: &AtomicUsize) -> impl FnOnce(u32) -> std::future::Ready<Result<Vec<u32>, String>> + '_ {
        move |_limit| {
            calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Err("upstream down".to_string()))
        }
    }

    #[tokio::test]
    async fn hit_within_ttl_skips_fetch() {
        let (cache, clock) = cache();
        let calls = AtomicUsize::new(0);

        let first = cache
            .get(EntityType::Product, false, 10, counting(&calls, vec![1, 2]))
            .await
            .unwrap();
        assert_eq!(first.source, CacheSource::Fetched);

        clock.advance(Duration::from_secs(299));
        let second = cache
            .get(EntityType::Product, false, 10, counting(&calls, vec![9]))
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.source, CacheSource::Hit);
        assert_eq!(*second.items, vec![1, 2]);
    }

    #[tokio::test]
    async fn expired_entry_refetches() {
        let (cache, clock) = cache();
        let calls = AtomicUsize::new(0);

        cache
            .get(EntityType::Order, false, 10, counting(&calls, vec![1]))
            .await
            .unwrap();
        clock.advance(TTL);
        let read = cache
            .get(EntityType::Order, false, 10, counting(&calls, vec![2]))
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(read.source, CacheSource::Fetched);
        assert_eq!(*read.items, vec![2]);
    }

    #[tokio::test]
    async fn force_refresh_bypasses_fresh_entry() {
        let (cache, _clock) = cache();
        let calls = AtomicUsize::new(0);

        cache
            .get(EntityType::Customer, false, 10, counting(&calls, vec![1]))
            .await
            .unwrap();
        let read = cache
            .get(EntityType::Customer, true, 10, counting(&calls, vec![2]))
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(*read.items, vec![2]);
    }

    #[tokio::test]
    async fn failure_serves_stale_entry() {
        let (cache, clock) = cache();
        let calls = AtomicUsize::new(0);

        cache
            .get(EntityType::Product, false, 10, counting(&calls, vec![7, 8]))
            .await
            .unwrap();
        clock.advance(TTL * 3);

        let read = cache
            .get(EntityType::Product, false, 10, failing(&calls))
            .await
            .unwrap();
        assert_eq!(read.source, CacheSource::Stale);
        assert_eq!(*read.items, vec![7, 8]);

        // The stale entry is kept, not replaced or purged.
        let status = cache.status(EntityType::Product).unwrap();
        assert_eq!(status.items, 2);
        assert!(!status.fresh);
    }

    #[tokio::test]
    async fn failure_without_entry_propagates() {
        let (cache, _clock) = cache();
        let calls = AtomicUsize::new(0);

        let err = cache
            .get(EntityType::Promotion, false, 10, failing(&calls))
            .await
            .unwrap_err();
        assert_eq!(err, "upstream down");
        assert!(cache.status(EntityType::Promotion).is_none());
    }

    #[tokio::test]
    async fn larger_limit_is_a_miss() {
        let (cache, _clock) = cache();
        let calls = AtomicUsize::new(0);

        cache
            .get(EntityType::Product, false, 5, counting(&calls, vec![1]))
            .await
            .unwrap();
        cache
            .get(EntityType::Product, false, 3, counting(&calls, vec![2]))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let read = cache
            .get(EntityType::Product, false, 50, counting(&calls, vec![3]))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(read.source, CacheSource::Fetched);
    }

    #[tokio::test]
    async fn entries_are_per_entity_type() {
        let (cache, _clock) = cache();
        let calls = AtomicUsize::new(0);

        cache
            .get(EntityType::Product, false, 10, counting(&calls, vec![1]))
            .await
            .unwrap();
        cache
            .get(EntityType::Collection, false, 10, counting(&calls, vec![2]))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn clear_forces_next_fetch() {
        let (cache, _clock) = cache();
        let calls = AtomicUsize::new(0);

        cache
            .get(EntityType::Product, false, 10, counting(&calls, vec![1]))
            .await
            .unwrap();
        assert!(cache.clear(EntityType::Product));
        assert!(!cache.clear(EntityType::Product));

        let err = cache
            .get(EntityType::Product, false, 10, failing(&calls))
            .await
            .unwrap_err();
        assert_eq!(err, "upstream down");
        assert_eq!(cache.clear_all(), 0);
    }
}
