use std::sync::Arc;
use std::time::Duration;

use reactive_query_loader::prelude::*;
use reactive_query_loader::test_utils::ScriptedProvider;

const SQL: &str = "select id from t";

fn setup(stats_enabled: bool, cache: bool) -> (Arc<ScriptedProvider>, Arc<ConcurrentStatistics>, QuerySession) {
    // No limit clause support, so max rows are enforced on the returned rows.
    let provider = Arc::new(ScriptedProvider::new(
        Dialect::builder().name("scripted").build(),
        &["id"],
        vec![vec![RowValues::Int(1)], vec![RowValues::Int(2)], vec![RowValues::Int(3)]],
    ));
    let stats = Arc::new(ConcurrentStatistics::new(stats_enabled));
    let settings = LoaderSettings::builder()
        .statistics(stats_enabled)
        .query_cache(cache)
        .build()
        .unwrap();
    let runtime = LoaderRuntime::builder(provider.clone())
        .settings(settings)
        .statistics(stats.clone())
        .build();
    (provider, stats, QuerySession::new(runtime))
}

#[tokio::test]
async fn each_execution_is_recorded_once() {
    let (provider, stats, s) = setup(true, false);
    provider.set_delay(Some(Duration::from_millis(5)));
    let loader = QueryLoader::immediate(vec!["id".into()]);

    loader.list(&s, SQL, "all-ids", &QueryParameters::new()).await.unwrap();
    loader.list(&s, SQL, "all-ids", &QueryParameters::new()).await.unwrap();

    let q = stats.query_statistics("all-ids").unwrap();
    assert_eq!(stats.query_execution_count(), 2);
    assert_eq!(q.execution_count, 2);
    assert_eq!(q.execution_row_count, 6);
    assert!(q.execution_min_time_ms >= 5);
    assert!(q.execution_max_time_ms >= q.execution_min_time_ms);
    assert!(q.execution_avg_time_ms() >= 5);
}

#[tokio::test]
async fn window_applies_before_rows_are_counted() {
    let (_provider, stats, s) = setup(true, false);
    let loader = QueryLoader::immediate(vec!["id".into()]);
    let params = QueryParameters::new().with_max_rows(2);

    let rows = loader.list(&s, SQL, "two", &params).await.unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(stats.query_statistics("two").unwrap().execution_row_count, 2);
}

#[tokio::test]
async fn cache_hit_records_no_execution() {
    let (_provider, stats, s) = setup(true, true);
    let loader = QueryLoader::immediate(vec!["id".into()]);
    let params = QueryParameters::new().cacheable();

    loader.list(&s, SQL, "cached", &params).await.unwrap();
    loader.list(&s, SQL, "cached", &params).await.unwrap();
    loader.list(&s, SQL, "cached", &params).await.unwrap();

    let q = stats.query_statistics("cached").unwrap();
    assert_eq!(q.execution_count, 1);
    assert_eq!(q.cache_miss_count, 1);
    assert_eq!(q.cache_put_count, 1);
    assert_eq!(q.cache_hit_count, 2);
}

#[tokio::test]
async fn disabled_statistics_record_nothing() {
    let (provider, stats, s) = setup(false, true);
    let loader = QueryLoader::immediate(vec!["id".into()]);
    let params = QueryParameters::new().cacheable();

    loader.list(&s, SQL, "quiet", &params).await.unwrap();
    loader.list(&s, SQL, "quiet", &params).await.unwrap();

    assert_eq!(provider.execution_count(), 1);
    assert_eq!(stats.query_execution_count(), 0);
    assert_eq!(stats.query_cache_hit_count(), 0);
    assert!(stats.query_statistics("quiet").is_none());
}

#[tokio::test]
async fn statistics_can_be_switched_on_at_runtime() {
    let (_provider, stats, s) = setup(false, false);
    let loader = QueryLoader::immediate(vec!["id".into()]);

    loader.list(&s, SQL, "late", &QueryParameters::new()).await.unwrap();
    stats.set_enabled(true);
    loader.list(&s, SQL, "late", &QueryParameters::new()).await.unwrap();

    assert_eq!(stats.query_execution_count(), 1);
    stats.clear();
    assert!(stats.query_statistics("late").is_none());
}
