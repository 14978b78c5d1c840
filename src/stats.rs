//! Execution and query-cache statistics.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

/// Receiver of statistics events.
///
/// The loader checks [`StatisticsSink::is_enabled`] before timing a query,
/// so a disabled sink costs nothing per execution.
pub trait StatisticsSink: Debug + Send + Sync {
    fn is_enabled(&self) -> bool;

    /// One top-level query execution finished successfully.
    fn query_executed(&self, query_identifier: &str, rows: usize, elapsed_ms: u64);

    fn query_cache_hit(&self, _query_identifier: &str, _region: &str) {}

    fn query_cache_miss(&self, _query_identifier: &str, _region: &str) {}

    fn query_cache_put(&self, _query_identifier: &str, _region: &str) {}
}

/// A sink that records nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledStatistics;

impl StatisticsSink for DisabledStatistics {
    fn is_enabled(&self) -> bool {
        false
    }

    fn query_executed(&self, _query_identifier: &str, _rows: usize, _elapsed_ms: u64) {}
}

/// Aggregates for one query identifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryStatistics {
    pub execution_count: u64,
    pub execution_row_count: u64,
    pub execution_min_time_ms: u64,
    pub execution_max_time_ms: u64,
    pub execution_total_time_ms: u64,
    pub cache_hit_count: u64,
    pub cache_miss_count: u64,
    pub cache_put_count: u64,
}

impl QueryStatistics {
    #[must_use]
    pub fn execution_avg_time_ms(&self) -> u64 {
        self.execution_total_time_ms
            .checked_div(self.execution_count)
            .unwrap_or(0)
    }
}

/// Thread-safe statistics shared by every session of a runtime.
#[derive(Debug)]
pub struct ConcurrentStatistics {
    enabled: AtomicBool,
    query_execution_count: AtomicU64,
    query_cache_hit_count: AtomicU64,
    query_cache_miss_count: AtomicU64,
    query_cache_put_count: AtomicU64,
    per_query: Mutex<HashMap<String, QueryStatistics>>,
}

impl ConcurrentStatistics {
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            query_execution_count: AtomicU64::new(0),
            query_cache_hit_count: AtomicU64::new(0),
            query_cache_miss_count: AtomicU64::new(0),
            query_cache_put_count: AtomicU64::new(0),
            per_query: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    #[must_use]
    pub fn query_execution_count(&self) -> u64 {
        self.query_execution_count.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn query_cache_hit_count(&self) -> u64 {
        self.query_cache_hit_count.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn query_cache_miss_count(&self) -> u64 {
        self.query_cache_miss_count.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn query_cache_put_count(&self) -> u64 {
        self.query_cache_put_count.load(Ordering::Relaxed)
    }

    /// Snapshot of the aggregates for `query_identifier`.
    #[must_use]
    pub fn query_statistics(&self, query_identifier: &str) -> Option<QueryStatistics> {
        self.per_query
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(query_identifier)
            .copied()
    }

    pub fn clear(&self) {
        self.query_execution_count.store(0, Ordering::Relaxed);
        self.query_cache_hit_count.store(0, Ordering::Relaxed);
        self.query_cache_miss_count.store(0, Ordering::Relaxed);
        self.query_cache_put_count.store(0, Ordering::Relaxed);
        self.per_query
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn update(&self, query_identifier: &str, f: impl FnOnce(&mut QueryStatistics)) {
        let mut map = self.per_query.lock().unwrap_or_else(PoisonError::into_inner);
        f(map.entry(query_identifier.to_string()).or_default());
    }
}

impl Default for ConcurrentStatistics {
    fn default() -> Self {
        Self::new(true)
    }
}

impl StatisticsSink for ConcurrentStatistics {
    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    fn query_executed(&self, query_identifier: &str, rows: usize, elapsed_ms: u64) {
        self.query_execution_count.fetch_add(1, Ordering::Relaxed);
        self.update(query_identifier, |s| {
            if s.execution_count == 0 || elapsed_ms < s.execution_min_time_ms {
                s.execution_min_time_ms = elapsed_ms;
            }
            s.execution_max_time_ms = s.execution_max_time_ms.max(elapsed_ms);
            s.execution_total_time_ms += elapsed_ms;
            s.execution_count += 1;
            s.execution_row_count += rows as u64;
        });
    }

    fn query_cache_hit(&self, query_identifier: &str, _region: &str) {
        if !self.is_enabled() {
            return;
        }
        self.query_cache_hit_count.fetch_add(1, Ordering::Relaxed);
        self.update(query_identifier, |s| s.cache_hit_count += 1);
    }

    fn query_cache_miss(&self, query_identifier: &str, _region: &str) {
        if !self.is_enabled() {
            return;
        }
        self.query_cache_miss_count.fetch_add(1, Ordering::Relaxed);
        self.update(query_identifier, |s| s.cache_miss_count += 1);
    }

    fn query_cache_put(&self, query_identifier: &str, _region: &str) {
        if !self.is_enabled() {
            return;
        }
        self.query_cache_put_count.fetch_add(1, Ordering::Relaxed);
        self.update(query_identifier, |s| s.cache_put_count += 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregates_min_max_total() {
        let stats = ConcurrentStatistics::new(true);
        stats.query_executed("q", 2, 10);
        stats.query_executed("q", 3, 4);
        stats.query_executed("q", 1, 7);
        let q = stats.query_statistics("q").unwrap();
        assert_eq!(q.execution_count, 3);
        assert_eq!(q.execution_row_count, 6);
        assert_eq!(q.execution_min_time_ms, 4);
        assert_eq!(q.execution_max_time_ms, 10);
        assert_eq!(q.execution_avg_time_ms(), 7);
        assert_eq!(stats.query_execution_count(), 3);
    }

    #[test]
    fn disabled_sink_ignores_cache_events() {
        let stats = ConcurrentStatistics::new(false);
        stats.query_cache_hit("q", "r");
        assert_eq!(stats.query_cache_hit_count(), 0);
        assert!(stats.query_statistics("q").is_none());
    }
}
