//! Query-results cache: region contracts and the gateway the loader talks to.

pub mod memory;

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::CacheError;
use crate::key::QueryKey;
use crate::stats::StatisticsSink;
use crate::transform::{CacheableResultTransformer, ResultValue};

pub use memory::{InMemoryQueryCache, UpdateTimestamps};

/// A cached result list together with the form its rows are in.
#[derive(Debug, Clone)]
pub struct CachedResult {
    pub rows: Arc<Vec<ResultValue>>,
    pub result_transformer: CacheableResultTransformer,
    /// Logical time the entry was stored at; see [`UpdateTimestamps`].
    pub timestamp: u64,
}

/// A named store of query results.
///
/// Implementations own eviction and staleness; the loader only reads on
/// lookup and writes on miss.
#[async_trait]
pub trait QueryResultsRegion: Debug + Send + Sync {
    fn name(&self) -> &str;

    /// Fetch the entry for `key` unless it is missing or stale with respect
    /// to any of `spaces`.
    async fn get(&self, key: &QueryKey, spaces: &[String]) -> Result<Option<CachedResult>, CacheError>;

    /// Store `rows` under `key`, tagged with the key's row form and the
    /// `timestamp` drawn before the rows were read.
    async fn put(&self, key: QueryKey, rows: Vec<ResultValue>, timestamp: u64)
    -> Result<(), CacheError>;
}

/// Hands out regions by name.
#[async_trait]
pub trait QueryCacheProvider: Debug + Send + Sync {
    /// `None` when the region cannot be served.
    fn region(&self, name: &str) -> Option<Arc<dyn QueryResultsRegion>>;

    /// Next tick of the clock shared with [`QueryCacheProvider::invalidate`].
    fn next_timestamp(&self) -> u64;

    /// Mark `spaces` as modified; entries that read any of them go stale.
    async fn invalidate(&self, spaces: &[String]) -> Result<(), CacheError>;
}

/// Lookup and populate with region faults contained.
///
/// A failing or unavailable region never fails the query: lookups degrade to
/// a miss and stores are skipped, both with a warning.
#[derive(Debug, Clone)]
pub struct ResultCacheGateway {
    provider: Arc<dyn QueryCacheProvider>,
    statistics: Arc<dyn StatisticsSink>,
}

impl ResultCacheGateway {
    #[must_use]
    pub fn new(provider: Arc<dyn QueryCacheProvider>, statistics: Arc<dyn StatisticsSink>) -> Self {
        Self {
            provider,
            statistics,
        }
    }

    /// Cached rows for `key`, or `None` on a miss.
    pub async fn lookup(
        &self,
        key: &QueryKey,
        spaces: &[String],
        query_identifier: &str,
    ) -> Option<Vec<ResultValue>> {
        let region_name = key.region();
        let found = match self.provider.region(region_name) {
            None => {
                warn!(region = region_name, "Query cache region unavailable; treating as miss");
                None
            }
            Some(region) => match region.get(key, spaces).await {
                Ok(Some(entry)) if entry.result_transformer == *key.result_transformer() => {
                    Some(entry)
                }
                Ok(Some(entry)) => {
                    warn!(
                        region = region_name,
                        stored = ?entry.result_transformer,
                        "Cached entry has a different row form than its key; treating as miss"
                    );
                    None
                }
                Ok(None) => None,
                Err(e) => {
                    warn!(region = region_name, error = %e, "Query cache lookup failed; treating as miss");
                    None
                }
            },
        };

        match found {
            Some(entry) => {
                debug!(region = region_name, rows = entry.rows.len(), "Query cache hit");
                self.statistics.query_cache_hit(query_identifier, region_name);
                Some(entry.rows.as_ref().clone())
            }
            None => {
                debug!(region = region_name, "Query cache miss");
                self.statistics.query_cache_miss(query_identifier, region_name);
                None
            }
        }
    }

    /// Timestamp to draw before executing a query whose rows will be stored.
    #[must_use]
    pub fn next_timestamp(&self) -> u64 {
        self.provider.next_timestamp()
    }

    /// Store freshly executed rows read after `timestamp` was drawn. Returns
    /// whether the store happened.
    pub async fn populate(
        &self,
        key: QueryKey,
        rows: Vec<ResultValue>,
        timestamp: u64,
        query_identifier: &str,
    ) -> bool {
        let region_name = key.region().to_string();
        let Some(region) = self.provider.region(&region_name) else {
            warn!(region = %region_name, "Query cache region unavailable; skipping store");
            return false;
        };
        match region.put(key, rows, timestamp).await {
            Ok(()) => {
                self.statistics.query_cache_put(query_identifier, &region_name);
                true
            }
            Err(e) => {
                warn!(region = %region_name, error = %e, "Query cache store failed; skipping");
                false
            }
        }
    }

    /// Forward an invalidation to the provider, logging failures.
    pub async fn invalidate(&self, spaces: &[String]) {
        if let Err(e) = self.provider.invalidate(spaces).await {
            warn!(error = %e, ?spaces, "Query cache invalidation failed");
        }
    }
}
