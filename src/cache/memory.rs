use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use tracing::debug;

use super::{CachedResult, QueryCacheProvider, QueryResultsRegion};
use crate::config::LoaderSettings;
use crate::error::CacheError;
use crate::key::QueryKey;
use crate::transform::ResultValue;

/// Last-modification stamps of query spaces on a logical clock.
///
/// Every query about to populate the cache and every invalidation draws the
/// next tick, so an entry is stale exactly when one of its spaces was
/// invalidated after its query started.
#[derive(Debug, Default)]
pub struct UpdateTimestamps {
    clock: AtomicU64,
    stamps: Mutex<HashMap<String, u64>>,
}

impl UpdateTimestamps {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_timestamp(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn invalidate(&self, spaces: &[String]) {
        let ts = self.next_timestamp();
        let mut stamps = self.stamps.lock().unwrap_or_else(PoisonError::into_inner);
        for space in spaces {
            stamps.insert(space.clone(), ts);
        }
    }

    #[must_use]
    pub fn is_up_to_date(&self, spaces: &[String], timestamp: u64) -> bool {
        let stamps = self.stamps.lock().unwrap_or_else(PoisonError::into_inner);
        spaces
            .iter()
            .all(|space| stamps.get(space).is_none_or(|last| *last < timestamp))
    }
}

#[derive(Debug)]
struct MemoryRegion {
    name: String,
    entries: Cache<QueryKey, CachedResult>,
    timestamps: Arc<UpdateTimestamps>,
}

#[async_trait]
impl QueryResultsRegion for MemoryRegion {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &QueryKey, spaces: &[String]) -> Result<Option<CachedResult>, CacheError> {
        let Some(entry) = self.entries.get(key).await else {
            return Ok(None);
        };
        if self.timestamps.is_up_to_date(spaces, entry.timestamp) {
            Ok(Some(entry))
        } else {
            debug!(region = %self.name, "Cached query results are stale");
            self.entries.invalidate(key).await;
            Ok(None)
        }
    }

    async fn put(
        &self,
        key: QueryKey,
        rows: Vec<ResultValue>,
        timestamp: u64,
    ) -> Result<(), CacheError> {
        let entry = CachedResult {
            rows: Arc::new(rows),
            result_transformer: key.result_transformer().clone(),
            timestamp,
        };
        self.entries.insert(key, entry).await;
        Ok(())
    }
}

/// In-process cache provider: one `moka` cache per region name, sharing a
/// single [`UpdateTimestamps`] registry.
///
/// ```rust
/// use reactive_query_loader::prelude::*;
///
/// let cache = InMemoryQueryCache::new(&LoaderSettings::default());
/// assert!(cache.region("default-query-results-region").is_some());
/// ```
#[derive(Debug)]
pub struct InMemoryQueryCache {
    ttl: Duration,
    max_entries: u64,
    timestamps: Arc<UpdateTimestamps>,
    regions: Mutex<HashMap<String, Arc<MemoryRegion>>>,
}

impl InMemoryQueryCache {
    #[must_use]
    pub fn new(settings: &LoaderSettings) -> Self {
        Self {
            ttl: Duration::from_secs(settings.query_cache_ttl_secs),
            max_entries: settings.query_cache_max_entries,
            timestamps: Arc::new(UpdateTimestamps::new()),
            regions: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn timestamps(&self) -> &Arc<UpdateTimestamps> {
        &self.timestamps
    }

    /// Entries currently held by `region`, after pending maintenance runs.
    pub async fn entry_count(&self, region: &str) -> u64 {
        let region = self
            .regions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(region)
            .cloned();
        match region {
            Some(r) => {
                r.entries.run_pending_tasks().await;
                r.entries.entry_count()
            }
            None => 0,
        }
    }

    fn build_region(&self, name: &str) -> MemoryRegion {
        debug!(
            region = name,
            ttl_secs = self.ttl.as_secs(),
            max_entries = self.max_entries,
            "Creating query results region"
        );
        MemoryRegion {
            name: name.to_string(),
            entries: Cache::builder()
                .max_capacity(self.max_entries)
                .time_to_live(self.ttl)
                .build(),
            timestamps: Arc::clone(&self.timestamps),
        }
    }
}

#[async_trait]
impl QueryCacheProvider for InMemoryQueryCache {
    fn region(&self, name: &str) -> Option<Arc<dyn QueryResultsRegion>> {
        let mut regions = self.regions.lock().unwrap_or_else(PoisonError::into_inner);
        let region = regions
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(self.build_region(name)));
        Some(Arc::clone(region) as Arc<dyn QueryResultsRegion>)
    }

    fn next_timestamp(&self) -> u64 {
        self.timestamps.next_timestamp()
    }

    async fn invalidate(&self, spaces: &[String]) -> Result<(), CacheError> {
        self.timestamps.invalidate(spaces);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spaces(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn stale_only_after_invalidation_following_the_put() {
        let ts = UpdateTimestamps::new();
        let stored_at = ts.next_timestamp();
        assert!(ts.is_up_to_date(&spaces(&["users"]), stored_at));
        ts.invalidate(&spaces(&["orders"]));
        assert!(ts.is_up_to_date(&spaces(&["users"]), stored_at));
        ts.invalidate(&spaces(&["users"]));
        assert!(!ts.is_up_to_date(&spaces(&["users"]), stored_at));
        let later = ts.next_timestamp();
        assert!(ts.is_up_to_date(&spaces(&["users"]), later));
    }
}
