use serde::{Deserialize, Serialize};

use super::{ResultTransformer, ResultValue};
use crate::error::LoaderError;
use crate::types::RowValues;

/// The hashable description of the form rows take inside the query cache.
///
/// Cached rows hold only the tuple columns some transformer needs
/// (`include_in_transform_index`), in pass-through shape. The descriptor is
/// part of the cache key, so two requests share an entry only when their
/// transformers read the same columns; reshaping into the concrete requested
/// form happens on the way out.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheableResultTransformer {
    tuple_length: usize,
    tuple_subset_length: usize,
    include_in_tuple: Vec<bool>,
    include_in_transform_index: Option<Vec<usize>>,
}

impl CacheableResultTransformer {
    /// Describe the cached form for `transformer` over rows with the given
    /// `aliases`, of which `include_in_tuple` selects the tuple columns
    /// (all of them when `None`).
    ///
    /// # Errors
    /// Returns `LoaderError::TransformationError` when the mask and aliases
    /// disagree in length.
    pub fn create(
        transformer: Option<&ResultTransformer>,
        aliases: &[String],
        include_in_tuple: Option<&[bool]>,
    ) -> Result<Self, LoaderError> {
        let include_in_tuple = match include_in_tuple {
            Some(mask) if mask.len() != aliases.len() => {
                return Err(LoaderError::TransformationError(format!(
                    "include mask has {} entries for {} aliases",
                    mask.len(),
                    aliases.len()
                )));
            }
            Some(mask) => mask.to_vec(),
            None => vec![true; aliases.len()],
        };
        let include_in_transform = match transformer {
            Some(t) if t.is_tuple_subset() => {
                let tuple_aliases = select(aliases, &include_in_tuple);
                let mask = t.include_in_transform(&tuple_aliases, tuple_aliases.len());
                if mask.len() != tuple_aliases.len() {
                    return Err(LoaderError::TransformationError(format!(
                        "transform mask has {} entries for a tuple of {}",
                        mask.len(),
                        tuple_aliases.len()
                    )));
                }
                Some(mask)
            }
            _ => None,
        };
        Ok(Self::from_masks(include_in_tuple, include_in_transform))
    }

    fn from_masks(include_in_tuple: Vec<bool>, include_in_transform: Option<Vec<bool>>) -> Self {
        let tuple_length = count_true(&include_in_tuple);
        let tuple_subset_length = include_in_transform
            .as_deref()
            .map_or(tuple_length, count_true);
        let include_in_transform_index = if tuple_subset_length == tuple_length {
            None
        } else {
            include_in_transform.map(|mask| {
                mask.iter()
                    .enumerate()
                    .filter_map(|(i, keep)| keep.then_some(i))
                    .collect()
            })
        };
        Self {
            tuple_length,
            tuple_subset_length,
            include_in_tuple,
            include_in_transform_index,
        }
    }

    #[must_use]
    pub fn tuple_length(&self) -> usize {
        self.tuple_length
    }

    #[must_use]
    pub fn tuple_subset_length(&self) -> usize {
        self.tuple_subset_length
    }

    /// The aliases of the tuple columns, in tuple order.
    #[must_use]
    pub fn tuple_aliases(&self, aliases: &[String]) -> Vec<String> {
        select(aliases, &self.include_in_tuple)
    }

    fn index<T: Clone>(&self, values: &[T]) -> Vec<T> {
        match &self.include_in_transform_index {
            Some(index) => index.iter().filter_map(|i| values.get(*i).cloned()).collect(),
            None => values.to_vec(),
        }
    }

    fn index_owned(&self, tuple: Vec<RowValues>) -> Vec<RowValues> {
        match &self.include_in_transform_index {
            Some(index) => {
                let mut slots: Vec<Option<RowValues>> = tuple.into_iter().map(Some).collect();
                index
                    .iter()
                    .filter_map(|i| slots.get_mut(*i).and_then(Option::take))
                    .collect()
            }
            None => tuple,
        }
    }

    fn unindex(&self, subset: Vec<RowValues>) -> Vec<RowValues> {
        match &self.include_in_transform_index {
            Some(index) => {
                let mut tuple = vec![RowValues::Null; self.tuple_length];
                for (value, i) in subset.into_iter().zip(index) {
                    tuple[*i] = value;
                }
                tuple
            }
            None => subset,
        }
    }

    /// Reduce a full tuple to its cacheable form.
    ///
    /// # Errors
    /// Returns `LoaderError::TransformationError` for a tuple of the wrong length.
    pub fn transform_tuple(&self, tuple: Vec<RowValues>) -> Result<ResultValue, LoaderError> {
        if tuple.len() != self.tuple_length {
            return Err(LoaderError::TransformationError(format!(
                "expected a tuple of {} values, got {}",
                self.tuple_length,
                tuple.len()
            )));
        }
        Ok(ResultValue::from_tuple(self.index_owned(tuple)))
    }

    /// Reshape cached rows into the form `transformer` produces.
    ///
    /// `aliases` and `include_in_tuple` must describe the same result row
    /// this descriptor was created for.
    ///
    /// # Errors
    /// Returns `LoaderError::TransformationError` when `transformer` would
    /// have cached a different form, or a row cannot be reshaped.
    pub fn retransform_results(
        &self,
        results: Vec<ResultValue>,
        aliases: &[String],
        transformer: &ResultTransformer,
        include_in_tuple: Option<&[bool]>,
    ) -> Result<Vec<ResultValue>, LoaderError> {
        let expected = Self::create(Some(transformer), aliases, include_in_tuple)?;
        if expected != *self {
            return Err(LoaderError::TransformationError(format!(
                "cached rows were stored for {self:?}, which is not compatible with {transformer:?}"
            )));
        }
        let tuple_aliases = self.tuple_aliases(aliases);
        let aliases_to_use = self.index(&tuple_aliases);
        let requires_retransform = match transformer {
            ResultTransformer::PassThrough => false,
            t if t.is_tuple_subset() => {
                !t.is_transformed_value_a_tuple_element(&aliases_to_use, self.tuple_length)
            }
            _ => true,
        };
        if !requires_retransform {
            return Ok(results);
        }
        let single = self.tuple_subset_length == 1;
        results
            .into_iter()
            .map(|value| {
                let tuple = untransform_to_tuple(value, single)?;
                transformer.transform_tuple(tuple, &aliases_to_use)
            })
            .collect()
    }

    /// Turn cached rows back into full-length tuples; columns the cached
    /// form dropped come back as `Null`.
    ///
    /// # Errors
    /// Returns `LoaderError::TransformationError` for a row that is not in
    /// this descriptor's cached form.
    pub fn untransform_to_tuples(
        &self,
        results: Vec<ResultValue>,
    ) -> Result<Vec<ResultValue>, LoaderError> {
        let single = self.tuple_subset_length == 1;
        results
            .into_iter()
            .map(|value| {
                let subset = untransform_to_tuple(value, single)?;
                if subset.len() != self.tuple_subset_length {
                    return Err(LoaderError::TransformationError(format!(
                        "cached row has {} values, expected {}",
                        subset.len(),
                        self.tuple_subset_length
                    )));
                }
                Ok(ResultValue::Tuple(self.unindex(subset)))
            })
            .collect()
    }
}

fn untransform_to_tuple(value: ResultValue, single: bool) -> Result<Vec<RowValues>, LoaderError> {
    match value {
        ResultValue::Scalar(v) if single => Ok(vec![v]),
        ResultValue::Tuple(values) if !single => Ok(values),
        other => Err(LoaderError::TransformationError(format!(
            "{other:?} is not a cached row"
        ))),
    }
}

fn select<T: Clone>(values: &[T], mask: &[bool]) -> Vec<T> {
    values
        .iter()
        .zip(mask)
        .filter_map(|(v, keep)| keep.then(|| v.clone()))
        .collect()
}

fn count_true(mask: &[bool]) -> usize {
    mask.iter().filter(|b| **b).count()
}
