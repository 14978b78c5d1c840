use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use reactive_query_loader::prelude::*;
use reactive_query_loader::test_utils::ScriptedProvider;

const SQL: &str = "select id, name from users where org = ?";

fn session() -> QuerySession {
    let provider = Arc::new(ScriptedProvider::new(Dialect::sqlite(), &["id", "name"], vec![]));
    QuerySession::new(LoaderRuntime::builder(provider).build())
}

fn loader() -> QueryLoader {
    QueryLoader::immediate(vec!["id".into(), "name".into()])
}

fn org(id: i64) -> QueryParameters {
    QueryParameters::new()
        .with_positional(vec![RowValues::Int(id)])
        .cacheable()
}

fn tenant(id: i64) -> BTreeMap<String, RowValues> {
    BTreeMap::from([("tenant".to_string(), RowValues::Int(id))])
}

#[test]
fn equal_content_gives_equal_keys_across_sessions() {
    let a = loader().query_key(&session(), SQL, &org(1)).unwrap();
    let b = loader().query_key(&session(), SQL, &org(1)).unwrap();

    assert_eq!(a, b);
    let set: HashSet<QueryKey> = [a, b].into_iter().collect();
    assert_eq!(set.len(), 1);
}

#[test]
fn every_component_distinguishes_keys() {
    let s = session();
    let base = loader().query_key(&s, SQL, &org(1)).unwrap();

    let other_value = loader().query_key(&s, SQL, &org(2)).unwrap();
    let other_sql = loader()
        .query_key(&s, "select id, name from users where dept = ?", &org(1))
        .unwrap();
    let other_region = loader()
        .query_key(&s, SQL, &org(1).with_cache_region("reports"))
        .unwrap();
    let other_page = loader().query_key(&s, SQL, &org(1).with_max_rows(5)).unwrap();
    let other_shape = loader()
        .query_key(&s, SQL, &org(1).with_result_transformer(ResultTransformer::RootEntity))
        .unwrap();

    for other in [&other_value, &other_sql, &other_region, &other_page, &other_shape] {
        assert_ne!(&base, other);
    }
    assert_eq!(base.region(), DEFAULT_QUERY_RESULTS_REGION);
    assert_eq!(other_region.region(), "reports");
}

#[test]
fn pagination_values_are_part_of_the_parameters() {
    let key = loader()
        .query_key(&session(), SQL, &org(1).with_first_row(5).with_max_rows(10))
        .unwrap();
    assert_eq!(
        key.parameters(),
        &[RowValues::Int(1), RowValues::Int(10), RowValues::Int(5)]
    );
    assert_eq!(key.sql(), SQL);
}

#[test]
fn enabled_filters_enter_the_key_in_name_order() {
    let mut first = session();
    first.enable_filter("tenant", tenant(7));
    first.enable_filter("active", BTreeMap::new());

    let mut second = session();
    second.enable_filter("active", BTreeMap::new());
    second.enable_filter("tenant", tenant(7));

    let mut third = session();
    third.enable_filter("active", BTreeMap::new());
    third.enable_filter("tenant", tenant(8));

    let a = loader().query_key(&first, SQL, &org(1)).unwrap();
    let b = loader().query_key(&second, SQL, &org(1)).unwrap();
    let c = loader().query_key(&third, SQL, &org(1)).unwrap();

    assert_eq!(a, b);
    assert_ne!(a, c);
    let names: Vec<&str> = a.filter_keys().iter().map(FilterKey::name).collect();
    assert_eq!(names, vec!["active", "tenant"]);

    first.disable_filter("tenant");
    let d = loader().query_key(&first, SQL, &org(1)).unwrap();
    assert_ne!(a, d);
}

#[test]
fn transformers_reading_the_same_columns_share_a_key() {
    let s = session();
    let map = loader()
        .query_key(&s, SQL, &org(1).with_result_transformer(ResultTransformer::AliasToMap))
        .unwrap();
    let plain = loader().query_key(&s, SQL, &org(1)).unwrap();
    let list = loader()
        .query_key(&s, SQL, &org(1).with_result_transformer(ResultTransformer::ToList))
        .unwrap();

    assert_eq!(map, plain);
    assert_eq!(map, list);
}

#[test]
fn unbindable_parameters_fail_key_generation() {
    let params = QueryParameters::new()
        .with_typed_positional(vec![TypedValue::new(RowValues::Text("x".into()), SqlType::Integer)])
        .cacheable();
    let err = loader().query_key(&session(), SQL, &params).unwrap_err();
    assert!(matches!(err, LoaderError::BindingError { .. }));
}
