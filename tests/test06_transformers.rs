use std::collections::BTreeMap;
use std::sync::Arc;

use reactive_query_loader::prelude::*;
use reactive_query_loader::test_utils::ScriptedProvider;
use reactive_query_loader::transform::TupleTransformer;

const SQL: &str = "select id, name, dept from emp";

fn rows() -> Vec<Vec<RowValues>> {
    vec![
        vec![RowValues::Int(1), RowValues::Text("ann".into()), RowValues::Text("ops".into())],
        vec![RowValues::Int(2), RowValues::Text("bo".into()), RowValues::Text("dev".into())],
        vec![RowValues::Int(1), RowValues::Text("ann".into()), RowValues::Text("ops".into())],
    ]
}

fn session(cache: bool) -> (Arc<ScriptedProvider>, QuerySession) {
    let provider = Arc::new(ScriptedProvider::new(
        Dialect::sqlite(),
        &["id", "name", "dept"],
        rows(),
    ));
    let settings = LoaderSettings::builder().query_cache(cache).build().unwrap();
    let runtime = LoaderRuntime::builder(provider.clone()).settings(settings).build();
    (provider, QuerySession::new(runtime))
}

fn aliases() -> Vec<String> {
    vec!["id".into(), "name".into(), "dept".into()]
}

/// Keeps the name column, upper-cased.
#[derive(Debug)]
struct UpperName;

impl TupleTransformer for UpperName {
    fn transform_tuple(&self, tuple: Vec<RowValues>, aliases: &[String]) -> Result<ResultValue, LoaderError> {
        let idx = aliases.iter().position(|a| a == "name").ok_or_else(|| {
            LoaderError::TransformationError("no name column".into())
        })?;
        let name = tuple[idx].as_text().unwrap_or_default().to_uppercase();
        Ok(ResultValue::Scalar(RowValues::Text(name)))
    }

    fn include_in_transform(&self, aliases: &[String], _tuple_length: usize) -> Vec<bool> {
        aliases.iter().map(|a| a == "name").collect()
    }
}

fn transformers() -> Vec<ResultTransformer> {
    vec![
        ResultTransformer::PassThrough,
        ResultTransformer::ToList,
        ResultTransformer::AliasToMap,
        ResultTransformer::RootEntity,
        ResultTransformer::DistinctRootEntity,
        ResultTransformer::Distinct,
        ResultTransformer::Custom(Arc::new(UpperName)),
    ]
}

async fn list(loader: &QueryLoader, session: &QuerySession, transformer: &ResultTransformer, cacheable: bool) -> Vec<ResultValue> {
    let mut params = QueryParameters::new().with_result_transformer(transformer.clone());
    if cacheable {
        params = params.cacheable();
    }
    loader.list(session, SQL, "emp", &params).await.unwrap()
}

#[tokio::test]
async fn immediate_and_deferred_agree_without_cache() {
    let (_, s) = session(false);
    let immediate = QueryLoader::immediate(aliases());
    let deferred = QueryLoader::deferred(aliases());

    for t in transformers() {
        let a = list(&immediate, &s, &t, false).await;
        let b = list(&deferred, &s, &t, false).await;
        assert_eq!(a, b, "transformer {t:?}");
    }
}

#[tokio::test]
async fn cache_miss_and_hit_match_the_uncached_result() {
    for t in transformers() {
        for loader in [QueryLoader::immediate(aliases()), QueryLoader::deferred(aliases())] {
            let (_, plain) = session(false);
            let expected = list(&loader, &plain, &t, false).await;

            let (provider, cached) = session(true);
            let miss = list(&loader, &cached, &t, true).await;
            let hit = list(&loader, &cached, &t, true).await;

            assert_eq!(miss, expected, "miss with {t:?} in {:?}", loader.transform_mode());
            assert_eq!(hit, expected, "hit with {t:?} in {:?}", loader.transform_mode());
            assert_eq!(provider.execution_count(), 1);
        }
    }
}

#[tokio::test]
async fn entry_stored_by_one_transformer_serves_another_reading_the_same_columns() {
    for loader in [QueryLoader::immediate(aliases()), QueryLoader::deferred(aliases())] {
        let mode = loader.transform_mode();
        let (provider, s) = session(true);

        let stored = list(&loader, &s, &ResultTransformer::PassThrough, true).await;
        assert_eq!(
            stored[1],
            ResultValue::Tuple(vec![
                RowValues::Int(2),
                RowValues::Text("bo".into()),
                RowValues::Text("dev".into()),
            ]),
            "{mode:?}"
        );

        let maps = list(&loader, &s, &ResultTransformer::AliasToMap, true).await;
        let expected = BTreeMap::from([
            ("dept".to_string(), RowValues::Text("dev".into())),
            ("id".to_string(), RowValues::Int(2)),
            ("name".to_string(), RowValues::Text("bo".into())),
        ]);
        assert_eq!(maps.len(), 3, "{mode:?}");
        assert_eq!(maps[1], ResultValue::Map(expected), "{mode:?}");

        let lists = list(&loader, &s, &ResultTransformer::ToList, true).await;
        assert_eq!(lists, stored, "{mode:?}");
        assert!(lists.iter().all(|v| matches!(v, ResultValue::Tuple(t) if t.len() == 3)), "{mode:?}");

        assert_eq!(provider.execution_count(), 1, "{mode:?}");
    }
}

#[tokio::test]
async fn shapes_of_each_transformer() {
    let (_, s) = session(false);
    let loader = QueryLoader::immediate(aliases());

    let roots = list(&loader, &s, &ResultTransformer::DistinctRootEntity, false).await;
    assert_eq!(
        roots,
        vec![
            ResultValue::Scalar(RowValues::Text("ops".into())),
            ResultValue::Scalar(RowValues::Text("dev".into())),
        ]
    );

    let distinct = list(&loader, &s, &ResultTransformer::Distinct, false).await;
    assert_eq!(distinct.len(), 2);

    let maps = list(&loader, &s, &ResultTransformer::AliasToMap, false).await;
    let expected = BTreeMap::from([
        ("dept".to_string(), RowValues::Text("dev".into())),
        ("id".to_string(), RowValues::Int(2)),
        ("name".to_string(), RowValues::Text("bo".into())),
    ]);
    assert_eq!(maps[1], ResultValue::Map(expected));

    let names = list(&loader, &s, &ResultTransformer::Custom(Arc::new(UpperName)), false).await;
    assert_eq!(names[0], ResultValue::Scalar(RowValues::Text("ANN".into())));
}

#[tokio::test]
async fn loader_default_transformer_applies_when_none_requested() {
    let (_, s) = session(false);
    let loader = QueryLoader::immediate(aliases()).with_default_transformer(ResultTransformer::RootEntity);

    let rows = loader.list(&s, SQL, "emp", &QueryParameters::new()).await.unwrap();

    assert_eq!(rows[0], ResultValue::Scalar(RowValues::Text("ops".into())));
}

#[tokio::test]
async fn result_row_mask_drops_columns_before_transforming() {
    let (provider, s) = session(true);
    let loader = QueryLoader::deferred(aliases()).with_include_in_result_row(vec![true, true, false]);
    let params = QueryParameters::new()
        .with_result_transformer(ResultTransformer::AliasToMap)
        .cacheable();

    let first = loader.list(&s, SQL, "emp", &params).await.unwrap();
    let second = loader.list(&s, SQL, "emp", &params).await.unwrap();

    let ResultValue::Map(map) = &first[0] else {
        panic!("expected a map, got {:?}", first[0]);
    };
    assert_eq!(map.keys().collect::<Vec<_>>(), vec!["id", "name"]);
    assert_eq!(first, second);
    assert_eq!(provider.execution_count(), 1);
}

#[tokio::test]
async fn mismatched_mask_is_a_transformation_error() {
    let (_, s) = session(true);
    let loader = QueryLoader::immediate(aliases()).with_include_in_result_row(vec![true]);
    let params = QueryParameters::new().cacheable();

    let err = loader.list(&s, SQL, "emp", &params).await.unwrap_err();

    assert!(matches!(err, LoaderError::TransformationError(_)));
}
