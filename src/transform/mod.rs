//! Result transformers: pure functions turning raw tuple rows into the shape
//! a caller asked for.
//!
//! Two entry points exist, matching the loader's transform mode:
//! - immediate: each row goes through [`ResultTransformer::transform_tuple`] as it
//!   is read, and cached rows are reshaped with
//!   [`CacheableResultTransformer::retransform_results`];
//! - deferred: rows stay tuples until the result list is built, and cached rows
//!   are turned back into tuples with
//!   [`CacheableResultTransformer::untransform_to_tuples`].

pub mod cacheable;

use std::collections::{BTreeMap, HashSet};
use std::fmt::Debug;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::LoaderError;
use crate::types::RowValues;

pub use cacheable::CacheableResultTransformer;

/// One caller-visible result row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResultValue {
    /// A single column, unwrapped.
    Scalar(RowValues),
    Tuple(Vec<RowValues>),
    /// Values keyed by column alias.
    Map(BTreeMap<String, RowValues>),
}

impl ResultValue {
    /// Build the pass-through shape of a tuple: one column unwraps to a scalar.
    #[must_use]
    pub fn from_tuple(mut tuple: Vec<RowValues>) -> Self {
        if tuple.len() == 1 {
            ResultValue::Scalar(tuple.remove(0))
        } else {
            ResultValue::Tuple(tuple)
        }
    }

    #[must_use]
    pub fn as_tuple(&self) -> Option<&[RowValues]> {
        if let ResultValue::Tuple(values) = self {
            Some(values)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_scalar(&self) -> Option<&RowValues> {
        if let ResultValue::Scalar(value) = self {
            Some(value)
        } else {
            None
        }
    }

    /// Identity comparison consistent with [`RowValues::key_eq`].
    #[must_use]
    pub fn key_eq(&self, other: &ResultValue) -> bool {
        match (self, other) {
            (ResultValue::Scalar(a), ResultValue::Scalar(b)) => a.key_eq(b),
            (ResultValue::Tuple(a), ResultValue::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.key_eq(y))
            }
            (ResultValue::Map(a), ResultValue::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b)
                        .all(|((ka, va), (kb, vb))| ka == kb && va.key_eq(vb))
            }
            _ => false,
        }
    }

    pub fn key_hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            ResultValue::Scalar(v) => v.key_hash(state),
            ResultValue::Tuple(values) => {
                values.len().hash(state);
                for v in values {
                    v.key_hash(state);
                }
            }
            ResultValue::Map(map) => {
                map.len().hash(state);
                for (k, v) in map {
                    k.hash(state);
                    v.key_hash(state);
                }
            }
        }
    }
}

struct Identity<'a>(&'a ResultValue);

impl PartialEq for Identity<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.0.key_eq(other.0)
    }
}

impl Eq for Identity<'_> {}

impl Hash for Identity<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.key_hash(state);
    }
}

/// Drop repeated values, keeping the first occurrence of each.
#[must_use]
pub fn distinct(list: Vec<ResultValue>) -> Vec<ResultValue> {
    let keep: Vec<bool> = {
        let mut seen = HashSet::with_capacity(list.len());
        list.iter().map(|v| seen.insert(Identity(v))).collect()
    };
    list.into_iter()
        .zip(keep)
        .filter_map(|(v, k)| k.then_some(v))
        .collect()
}

/// User-supplied row transformation.
///
/// Only [`TupleTransformer::transform_tuple`] is required. A transformer that
/// needs just some of the columns overrides
/// [`TupleTransformer::include_in_transform`] so that cached rows keep only
/// those columns.
pub trait TupleTransformer: Debug + Send + Sync {
    /// # Errors
    /// Returns `LoaderError::TransformationError` when the tuple cannot be reshaped.
    fn transform_tuple(
        &self,
        tuple: Vec<RowValues>,
        aliases: &[String],
    ) -> Result<ResultValue, LoaderError>;

    fn transform_list(&self, list: Vec<ResultValue>) -> Vec<ResultValue> {
        list
    }

    fn include_in_transform(&self, _aliases: &[String], tuple_length: usize) -> Vec<bool> {
        vec![true; tuple_length]
    }

    /// Whether the transformed value is one of the tuple's own elements.
    fn is_transformed_value_a_tuple_element(&self, _aliases: &[String], _tuple_length: usize) -> bool {
        false
    }
}

/// The result shape a caller requests.
///
/// ```rust
/// use reactive_query_loader::prelude::*;
///
/// let row = vec![RowValues::Int(1), RowValues::Text("a".into())];
/// let aliases = vec!["id".to_string(), "name".to_string()];
/// let value = ResultTransformer::AliasToMap.transform_tuple(row, &aliases).unwrap();
/// assert!(matches!(value, ResultValue::Map(_)));
/// ```
#[derive(Debug, Clone)]
pub enum ResultTransformer {
    /// Rows as they come; one column unwraps to a scalar.
    PassThrough,
    /// Every row as a tuple, even single-column ones.
    ToList,
    /// Every row as an alias-keyed map.
    AliasToMap,
    /// The last column of each row.
    RootEntity,
    /// The last column of each row, without repeats.
    DistinctRootEntity,
    /// Pass-through rows, without repeats.
    Distinct,
    Custom(Arc<dyn TupleTransformer>),
}

impl PartialEq for ResultTransformer {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ResultTransformer::Custom(a), ResultTransformer::Custom(b)) => Arc::ptr_eq(a, b),
            (a, b) => std::mem::discriminant(a) == std::mem::discriminant(b),
        }
    }
}

impl ResultTransformer {
    /// # Errors
    /// Returns `LoaderError::TransformationError` when the tuple does not fit the shape.
    pub fn transform_tuple(
        &self,
        tuple: Vec<RowValues>,
        aliases: &[String],
    ) -> Result<ResultValue, LoaderError> {
        match self {
            ResultTransformer::PassThrough | ResultTransformer::Distinct => {
                Ok(ResultValue::from_tuple(tuple))
            }
            ResultTransformer::ToList => Ok(ResultValue::Tuple(tuple)),
            ResultTransformer::AliasToMap => {
                if aliases.len() != tuple.len() {
                    return Err(LoaderError::TransformationError(format!(
                        "{} aliases for a tuple of {} values",
                        aliases.len(),
                        tuple.len()
                    )));
                }
                Ok(ResultValue::Map(aliases.iter().cloned().zip(tuple).collect()))
            }
            ResultTransformer::RootEntity | ResultTransformer::DistinctRootEntity => tuple
                .into_iter()
                .last()
                .map(ResultValue::Scalar)
                .ok_or_else(|| {
                    LoaderError::TransformationError("root entity of an empty tuple".into())
                }),
            ResultTransformer::Custom(inner) => inner.transform_tuple(tuple, aliases),
        }
    }

    #[must_use]
    pub fn transform_list(&self, list: Vec<ResultValue>) -> Vec<ResultValue> {
        match self {
            ResultTransformer::Distinct | ResultTransformer::DistinctRootEntity => distinct(list),
            ResultTransformer::Custom(inner) => inner.transform_list(list),
            _ => list,
        }
    }

    /// Whether the transformer works on a subset of the tuple and can say
    /// which columns it needs.
    #[must_use]
    pub fn is_tuple_subset(&self) -> bool {
        !matches!(self, ResultTransformer::ToList | ResultTransformer::Distinct)
    }

    /// Mask of the tuple columns this transformer reads.
    #[must_use]
    pub fn include_in_transform(&self, aliases: &[String], tuple_length: usize) -> Vec<bool> {
        match self {
            ResultTransformer::RootEntity | ResultTransformer::DistinctRootEntity => {
                let mut mask = vec![false; tuple_length];
                if let Some(last) = mask.last_mut() {
                    *last = true;
                }
                mask
            }
            ResultTransformer::Custom(inner) => inner.include_in_transform(aliases, tuple_length),
            _ => vec![true; tuple_length],
        }
    }

    #[must_use]
    pub fn is_transformed_value_a_tuple_element(&self, aliases: &[String], tuple_length: usize) -> bool {
        match self {
            ResultTransformer::PassThrough => tuple_length == 1,
            ResultTransformer::RootEntity | ResultTransformer::DistinctRootEntity => true,
            ResultTransformer::Custom(inner) => {
                inner.is_transformed_value_a_tuple_element(aliases, tuple_length)
            }
            _ => false,
        }
    }
}
