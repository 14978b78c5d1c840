use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reactive_query_loader::prelude::*;
use reactive_query_loader::statement::BoundStatement;
use reactive_query_loader::test_utils::{CacheFault, FaultyCacheProvider, ScriptedProvider};

const SQL: &str = "select id from t where x = ?";

struct Fixture {
    provider: Arc<ScriptedProvider>,
    stats: Arc<ConcurrentStatistics>,
    session: QuerySession,
}

fn fixture(cache_enabled: bool, cache: Option<Arc<dyn QueryCacheProvider>>) -> Fixture {
    let provider = Arc::new(ScriptedProvider::new(
        Dialect::sqlite(),
        &["id"],
        vec![vec![RowValues::Int(1)], vec![RowValues::Int(2)]],
    ));
    let stats = Arc::new(ConcurrentStatistics::new(true));
    let settings = LoaderSettings::builder()
        .query_cache(cache_enabled)
        .statistics(true)
        .build()
        .unwrap();
    let mut builder = LoaderRuntime::builder(provider.clone())
        .settings(settings)
        .statistics(stats.clone());
    if let Some(cache) = cache {
        builder = builder.cache_provider(cache);
    }
    Fixture {
        provider,
        stats,
        session: QuerySession::new(builder.build()),
    }
}

fn cacheable_42() -> QueryParameters {
    QueryParameters::new()
        .with_positional(vec![RowValues::Int(42)])
        .cacheable()
}

fn ids(rows: &[ResultValue]) -> Vec<i64> {
    rows.iter()
        .map(|r| *r.as_scalar().and_then(RowValues::as_int).unwrap())
        .collect()
}

#[tokio::test]
async fn second_identical_call_is_served_from_cache() {
    let f = fixture(true, None);
    let loader = QueryLoader::immediate(vec!["id".into()]);

    let first = loader.list(&f.session, SQL, "q", &cacheable_42()).await.unwrap();
    let second = loader.list(&f.session, SQL, "q", &cacheable_42()).await.unwrap();

    assert_eq!(ids(&first), vec![1, 2]);
    assert_eq!(first, second);
    assert_eq!(f.provider.execution_count(), 1);
    assert_eq!(f.stats.query_cache_miss_count(), 1);
    assert_eq!(f.stats.query_cache_put_count(), 1);
    assert_eq!(f.stats.query_cache_hit_count(), 1);
}

#[tokio::test]
async fn another_session_hits_the_same_entry() {
    let f = fixture(true, None);
    let loader = QueryLoader::immediate(vec!["id".into()]);
    let other = QuerySession::new(f.session.runtime().clone());

    loader.list(&f.session, SQL, "q", &cacheable_42()).await.unwrap();
    loader.list(&other, SQL, "q", &cacheable_42()).await.unwrap();

    assert_eq!(f.provider.execution_count(), 1);
}

#[tokio::test]
async fn non_cacheable_parameters_bypass_the_cache() {
    let f = fixture(true, None);
    let loader = QueryLoader::immediate(vec!["id".into()]);
    let params = QueryParameters::new().with_positional(vec![RowValues::Int(42)]);

    loader.list(&f.session, SQL, "q", &params).await.unwrap();
    loader.list(&f.session, SQL, "q", &params).await.unwrap();

    assert_eq!(f.provider.execution_count(), 2);
    assert_eq!(f.stats.query_cache_miss_count(), 0);
    assert_eq!(f.stats.query_cache_put_count(), 0);
}

#[tokio::test]
async fn disabled_query_cache_always_executes() {
    let f = fixture(false, None);
    let loader = QueryLoader::immediate(vec!["id".into()]);

    loader.list(&f.session, SQL, "q", &cacheable_42()).await.unwrap();
    loader.list(&f.session, SQL, "q", &cacheable_42()).await.unwrap();

    assert_eq!(f.provider.execution_count(), 2);
    assert!(f.session.runtime().cache_gateway().is_none());
}

#[tokio::test]
async fn invalidated_query_space_forces_reexecution() {
    let f = fixture(true, None);
    let loader = QueryLoader::immediate(vec!["id".into()]).with_query_spaces(vec!["t".into()]);

    loader.list(&f.session, SQL, "q", &cacheable_42()).await.unwrap();
    f.session.invalidate_query_spaces(&["other".to_string()]).await;
    loader.list(&f.session, SQL, "q", &cacheable_42()).await.unwrap();
    assert_eq!(f.provider.execution_count(), 1);

    f.provider.set_rows(vec![vec![RowValues::Int(3)]]);
    f.session.invalidate_query_spaces(&["t".to_string()]).await;
    let rows = loader.list(&f.session, SQL, "q", &cacheable_42()).await.unwrap();

    assert_eq!(f.provider.execution_count(), 2);
    assert_eq!(ids(&rows), vec![3]);
}

/// Reads the current value, then holds the connection for a while before
/// returning it.
#[derive(Debug)]
struct SlowReader {
    dialect: Dialect,
    value: Arc<AtomicI64>,
}

#[async_trait]
impl ConnectionProvider for SlowReader {
    fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    async fn execute_select(&self, _statement: &BoundStatement) -> Result<ResultSet, DriverError> {
        let read = self.value.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(ResultSet::from_rows(
            vec!["id".into()],
            vec![vec![RowValues::Int(read)]],
        ))
    }
}

#[tokio::test]
async fn invalidation_during_a_miss_keeps_the_stored_rows_stale() {
    let value = Arc::new(AtomicI64::new(1));
    let provider = Arc::new(SlowReader {
        dialect: Dialect::sqlite(),
        value: value.clone(),
    });
    let settings = LoaderSettings::builder().query_cache(true).build().unwrap();
    let session = QuerySession::new(LoaderRuntime::builder(provider).settings(settings).build());
    let loader = QueryLoader::immediate(vec!["id".into()]).with_query_spaces(vec!["t".into()]);

    let writer = async {
        tokio::time::sleep(Duration::from_millis(30)).await;
        value.store(2, Ordering::SeqCst);
        session.invalidate_query_spaces(&["t".to_string()]).await;
    };
    let params = cacheable_42();
    let (first, ()) = tokio::join!(loader.list(&session, SQL, "q", &params), writer);
    assert_eq!(ids(&first.unwrap()), vec![1]);

    let second = loader.list(&session, SQL, "q", &cacheable_42()).await.unwrap();
    assert_eq!(ids(&second), vec![2]);
}

#[tokio::test]
async fn different_values_get_separate_entries() {
    let cache = Arc::new(InMemoryQueryCache::new(&LoaderSettings::default()));
    let f = fixture(true, Some(cache.clone() as Arc<dyn QueryCacheProvider>));
    let loader = QueryLoader::immediate(vec!["id".into()]);
    let other = QueryParameters::new()
        .with_positional(vec![RowValues::Int(43)])
        .cacheable();

    loader.list(&f.session, SQL, "q", &cacheable_42()).await.unwrap();
    loader.list(&f.session, SQL, "q", &other).await.unwrap();

    assert_eq!(f.provider.execution_count(), 2);
    assert_eq!(cache.entry_count(DEFAULT_QUERY_RESULTS_REGION).await, 2);
    assert_eq!(cache.entry_count("elsewhere").await, 0);
}

#[tokio::test]
async fn unavailable_region_degrades_to_execution() {
    let cache = Arc::new(FaultyCacheProvider::new(CacheFault::Unavailable));
    let f = fixture(true, Some(cache as Arc<dyn QueryCacheProvider>));
    let loader = QueryLoader::immediate(vec!["id".into()]);

    let first = loader.list(&f.session, SQL, "q", &cacheable_42()).await.unwrap();
    let second = loader.list(&f.session, SQL, "q", &cacheable_42()).await.unwrap();

    assert_eq!(ids(&first), vec![1, 2]);
    assert_eq!(first, second);
    assert_eq!(f.provider.execution_count(), 2);
    assert_eq!(f.stats.query_cache_put_count(), 0);
}

#[tokio::test]
async fn failing_region_never_fails_the_query() {
    let cache = Arc::new(FaultyCacheProvider::new(CacheFault::Failing));
    let f = fixture(true, Some(cache.clone() as Arc<dyn QueryCacheProvider>));
    let loader = QueryLoader::immediate(vec!["id".into()]);

    let rows = loader.list(&f.session, SQL, "q", &cacheable_42()).await.unwrap();
    f.session.invalidate_query_spaces(&["t".to_string()]).await;

    assert_eq!(ids(&rows), vec![1, 2]);
    assert_eq!(cache.attempts(), 2);
    assert_eq!(f.stats.query_cache_miss_count(), 1);
    assert_eq!(f.stats.query_cache_put_count(), 0);
}

#[tokio::test]
async fn region_from_parameters_overrides_the_default() {
    let cache = Arc::new(InMemoryQueryCache::new(&LoaderSettings::default()));
    let f = fixture(true, Some(cache.clone() as Arc<dyn QueryCacheProvider>));
    let loader = QueryLoader::immediate(vec!["id".into()]);

    loader
        .list(&f.session, SQL, "q", &cacheable_42().with_cache_region("reports"))
        .await
        .unwrap();

    assert_eq!(cache.entry_count("reports").await, 1);
    assert_eq!(cache.entry_count(DEFAULT_QUERY_RESULTS_REGION).await, 0);
}
