//! Query-cache keys.

use std::collections::BTreeMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::binder::{ParameterBinder, to_parameter_array};
use crate::dialect::Dialect;
use crate::error::LoaderError;
use crate::parameters::QueryParameters;
use crate::transform::CacheableResultTransformer;
use crate::types::RowValues;

/// An enabled filter as it takes part in a cache key.
#[derive(Debug, Clone)]
pub struct FilterKey {
    name: String,
    parameters: BTreeMap<String, RowValues>,
}

impl FilterKey {
    #[must_use]
    pub fn new(name: impl Into<String>, parameters: BTreeMap<String, RowValues>) -> Self {
        Self {
            name: name.into(),
            parameters,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for FilterKey {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.parameters.len() == other.parameters.len()
            && self
                .parameters
                .iter()
                .zip(&other.parameters)
                .all(|((ka, va), (kb, vb))| ka == kb && va.key_eq(vb))
    }
}

impl Eq for FilterKey {}

impl Hash for FilterKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        for (k, v) in &self.parameters {
            k.hash(state);
            v.key_hash(state);
        }
    }
}

/// Identity of one cacheable query result.
///
/// Built only from what determines the result: SQL text, bound values in
/// bind order, pagination, enabled filters, cache region and the cached
/// row form. Nothing about the calling session or connection goes in, so
/// keys from different sessions compare equal when their content does.
///
/// The hash is computed once at construction.
#[derive(Debug, Clone)]
pub struct QueryKey {
    sql: String,
    parameters: Vec<RowValues>,
    first_row: Option<usize>,
    max_rows: Option<usize>,
    filter_keys: Vec<FilterKey>,
    region: String,
    result_transformer: CacheableResultTransformer,
    hash_code: u64,
}

impl QueryKey {
    /// Derive the key for `sql` run with `parameters`.
    ///
    /// # Errors
    /// Fails only when the parameters cannot be bound.
    pub fn generate(
        sql: &str,
        parameters: &QueryParameters,
        dialect: &Dialect,
        binder: &dyn ParameterBinder,
        filters: impl IntoIterator<Item = FilterKey>,
        region: &str,
        result_transformer: CacheableResultTransformer,
    ) -> Result<Self, LoaderError> {
        let values = to_parameter_array(sql, parameters, dialect, binder)?;
        let mut filter_keys: Vec<FilterKey> = filters.into_iter().collect();
        filter_keys.sort_by(|a, b| a.name.cmp(&b.name));
        let selection = parameters.row_selection();
        Ok(Self::new(
            sql.to_string(),
            values,
            selection.first_row.filter(|f| *f > 0),
            selection.max_rows.filter(|m| *m > 0),
            filter_keys,
            region.to_string(),
            result_transformer,
        ))
    }

    fn new(
        sql: String,
        parameters: Vec<RowValues>,
        first_row: Option<usize>,
        max_rows: Option<usize>,
        filter_keys: Vec<FilterKey>,
        region: String,
        result_transformer: CacheableResultTransformer,
    ) -> Self {
        let mut key = Self {
            sql,
            parameters,
            first_row,
            max_rows,
            filter_keys,
            region,
            result_transformer,
            hash_code: 0,
        };
        key.hash_code = key.generate_hash_code();
        key
    }

    fn generate_hash_code(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.sql.hash(&mut hasher);
        self.parameters.len().hash(&mut hasher);
        for value in &self.parameters {
            value.key_hash(&mut hasher);
        }
        self.first_row.hash(&mut hasher);
        self.max_rows.hash(&mut hasher);
        self.filter_keys.hash(&mut hasher);
        self.region.hash(&mut hasher);
        self.result_transformer.hash(&mut hasher);
        hasher.finish()
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    #[must_use]
    pub fn parameters(&self) -> &[RowValues] {
        &self.parameters
    }

    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    #[must_use]
    pub fn filter_keys(&self) -> &[FilterKey] {
        &self.filter_keys
    }

    /// Descriptor of the row form cached under this key.
    #[must_use]
    pub fn result_transformer(&self) -> &CacheableResultTransformer {
        &self.result_transformer
    }
}

impl PartialEq for QueryKey {
    fn eq(&self, other: &Self) -> bool {
        self.hash_code == other.hash_code
            && self.sql == other.sql
            && self.parameters.len() == other.parameters.len()
            && self
                .parameters
                .iter()
                .zip(&other.parameters)
                .all(|(a, b)| a.key_eq(b))
            && self.first_row == other.first_row
            && self.max_rows == other.max_rows
            && self.filter_keys == other.filter_keys
            && self.region == other.region
            && self.result_transformer == other.result_transformer
    }
}

impl Eq for QueryKey {}

impl Hash for QueryKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash_code);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::PositionalParameterBinder;

    fn key(sql: &str, params: &QueryParameters, filters: Vec<FilterKey>) -> QueryKey {
        let aliases = vec!["id".to_string()];
        QueryKey::generate(
            sql,
            params,
            &Dialect::sqlite(),
            &PositionalParameterBinder,
            filters,
            "region",
            CacheableResultTransformer::create(None, &aliases, None).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn filter_order_does_not_matter() {
        let params = QueryParameters::new().with_positional(vec![RowValues::Int(1)]);
        let a = FilterKey::new("a", BTreeMap::from([("x".to_string(), RowValues::Int(1))]));
        let b = FilterKey::new("b", BTreeMap::new());
        let k1 = key("select id from t where x = ?", &params, vec![a.clone(), b.clone()]);
        let k2 = key("select id from t where x = ?", &params, vec![b, a]);
        assert_eq!(k1, k2);
    }

    #[test]
    fn pagination_is_part_of_the_key() {
        let base = QueryParameters::new().with_positional(vec![RowValues::Int(1)]);
        let paged = base.clone().with_max_rows(5);
        let k1 = key("select id from t where x = ?", &base, vec![]);
        let k2 = key("select id from t where x = ?", &paged, vec![]);
        assert_ne!(k1, k2);
        assert_eq!(k2.parameters(), &[RowValues::Int(1), RowValues::Int(5)]);
    }
}
