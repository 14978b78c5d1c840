//! Per-call query parameters: bound values, pagination, locking and the
//! caller's requested result shape.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::transform::ResultTransformer;
use crate::types::{RowValues, TypedValue};

/// Pagination and execution limits for one query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowSelection {
    /// Zero-based index of the first row to return.
    pub first_row: Option<usize>,
    /// Maximum number of rows to return.
    pub max_rows: Option<usize>,
    /// Per-query execution timeout.
    pub timeout: Option<Duration>,
}

impl RowSelection {
    #[must_use]
    pub fn has_max_rows(&self) -> bool {
        self.max_rows.is_some_and(|m| m > 0)
    }

    #[must_use]
    pub fn first_row_value(&self) -> usize {
        self.first_row.unwrap_or(0)
    }

    #[must_use]
    pub fn has_first_row(&self) -> bool {
        self.first_row_value() > 0
    }
}

/// Row-locking mode requested for a query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LockMode {
    #[default]
    None,
    Read,
    PessimisticRead,
    PessimisticWrite,
}

/// How long to wait for row locks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LockTimeout {
    #[default]
    WaitForever,
    NoWait,
    SkipLocked,
    Millis(u32),
}

impl LockTimeout {
    /// Value bound for a parameterized lock timeout.
    ///
    /// `None` for [`LockTimeout::WaitForever`], which never binds.
    #[must_use]
    pub fn as_parameter(self) -> Option<i64> {
        match self {
            LockTimeout::WaitForever => None,
            LockTimeout::NoWait => Some(0),
            LockTimeout::SkipLocked => Some(-2),
            LockTimeout::Millis(ms) => Some(i64::from(ms)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LockOptions {
    pub lock_mode: LockMode,
    pub timeout: LockTimeout,
}

impl LockOptions {
    #[must_use]
    pub fn new(lock_mode: LockMode, timeout: LockTimeout) -> Self {
        Self { lock_mode, timeout }
    }
}

/// The bag of values and options describing one query execution.
///
/// ```rust
/// use reactive_query_loader::prelude::*;
///
/// let params = QueryParameters::new()
///     .with_positional(vec![RowValues::Int(42)])
///     .with_max_rows(10)
///     .cacheable();
/// assert!(params.is_cacheable());
/// ```
#[derive(Debug, Clone, Default)]
pub struct QueryParameters {
    positional: Vec<TypedValue>,
    named: BTreeMap<String, TypedValue>,
    row_selection: RowSelection,
    lock_options: Option<LockOptions>,
    result_transformer: Option<ResultTransformer>,
    cacheable: bool,
    cache_region: Option<String>,
    callable: bool,
}

impl QueryParameters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Positional values bound without declared types.
    #[must_use]
    pub fn with_positional(mut self, values: Vec<RowValues>) -> Self {
        self.positional = values.into_iter().map(TypedValue::inferred).collect();
        self
    }

    #[must_use]
    pub fn with_typed_positional(mut self, values: Vec<TypedValue>) -> Self {
        self.positional = values;
        self
    }

    #[must_use]
    pub fn with_named(mut self, name: impl Into<String>, value: impl Into<TypedValue>) -> Self {
        self.named.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_first_row(mut self, first_row: usize) -> Self {
        self.row_selection.first_row = Some(first_row);
        self
    }

    #[must_use]
    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.row_selection.max_rows = Some(max_rows);
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.row_selection.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_lock_options(mut self, lock_options: LockOptions) -> Self {
        self.lock_options = Some(lock_options);
        self
    }

    #[must_use]
    pub fn with_result_transformer(mut self, transformer: ResultTransformer) -> Self {
        self.result_transformer = Some(transformer);
        self
    }

    /// Mark the query as eligible for the query-results cache.
    #[must_use]
    pub fn cacheable(mut self) -> Self {
        self.cacheable = true;
        self
    }

    #[must_use]
    pub fn with_cache_region(mut self, region: impl Into<String>) -> Self {
        self.cache_region = Some(region.into());
        self
    }

    #[must_use]
    pub fn callable(mut self) -> Self {
        self.callable = true;
        self
    }

    pub fn set_result_transformer(&mut self, transformer: Option<ResultTransformer>) {
        self.result_transformer = transformer;
    }

    #[must_use]
    pub fn positional(&self) -> &[TypedValue] {
        &self.positional
    }

    #[must_use]
    pub fn named(&self) -> &BTreeMap<String, TypedValue> {
        &self.named
    }

    #[must_use]
    pub fn row_selection(&self) -> &RowSelection {
        &self.row_selection
    }

    #[must_use]
    pub fn lock_options(&self) -> Option<&LockOptions> {
        self.lock_options.as_ref()
    }

    #[must_use]
    pub fn result_transformer(&self) -> Option<&ResultTransformer> {
        self.result_transformer.as_ref()
    }

    #[must_use]
    pub fn is_cacheable(&self) -> bool {
        self.cacheable
    }

    #[must_use]
    pub fn cache_region(&self) -> Option<&str> {
        self.cache_region.as_deref()
    }

    #[must_use]
    pub fn is_callable(&self) -> bool {
        self.callable
    }
}
