//! Query loaders: the orchestration of binding, caching, execution and
//! result transformation for one kind of query.

use std::sync::Arc;

use tracing::trace;

use crate::binder::{ParameterBinder, PositionalParameterBinder, bind_statement};
use crate::cache::ResultCacheGateway;
use crate::dialect::{Dialect, limit};
use crate::error::{DriverError, LoaderError};
use crate::executor::ReactiveQueryExecutor;
use crate::key::QueryKey;
use crate::parameters::QueryParameters;
use crate::results::ResultSet;
use crate::session::QuerySession;
use crate::statement::BoundStatement;
use crate::transform::{CacheableResultTransformer, ResultTransformer, ResultValue};
use crate::types::RowValues;

/// When the requested result transformer is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformMode {
    /// Row by row while reading; cached rows are retransformed on the way out.
    Immediate,
    /// Rows stay tuples until the result list is built.
    Deferred,
}

/// Loads query results for one query shape.
///
/// A loader fixes what the result row looks like (its column aliases and
/// which of them are part of the row), when transformation happens, and how
/// ordinary parameters are bound. Everything per call comes in through
/// [`QueryParameters`]; everything per caller through [`QuerySession`].
///
/// ```rust,no_run
/// use reactive_query_loader::prelude::*;
///
/// # async fn run(session: QuerySession) -> Result<(), LoaderError> {
/// let loader = QueryLoader::immediate(vec!["id".into()]);
/// let params = QueryParameters::new().with_positional(vec![RowValues::Int(42)]);
/// let rows = loader
///     .list(&session, "select id from t where x = ?", "ids-by-x", &params)
///     .await?;
/// # let _ = rows;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct QueryLoader {
    result_row_aliases: Vec<String>,
    include_in_result_row: Option<Vec<bool>>,
    mode: TransformMode,
    parameter_binder: Arc<dyn ParameterBinder>,
    default_transformer: Option<ResultTransformer>,
    query_spaces: Vec<String>,
}

impl QueryLoader {
    #[must_use]
    pub fn new(result_row_aliases: Vec<String>, mode: TransformMode) -> Self {
        Self {
            result_row_aliases,
            include_in_result_row: None,
            mode,
            parameter_binder: Arc::new(PositionalParameterBinder),
            default_transformer: None,
            query_spaces: Vec::new(),
        }
    }

    #[must_use]
    pub fn immediate(result_row_aliases: Vec<String>) -> Self {
        Self::new(result_row_aliases, TransformMode::Immediate)
    }

    #[must_use]
    pub fn deferred(result_row_aliases: Vec<String>) -> Self {
        Self::new(result_row_aliases, TransformMode::Deferred)
    }

    /// Select which selected columns make up the result row.
    #[must_use]
    pub fn with_include_in_result_row(mut self, mask: Vec<bool>) -> Self {
        self.include_in_result_row = Some(mask);
        self
    }

    #[must_use]
    pub fn with_parameter_binder(mut self, binder: Arc<dyn ParameterBinder>) -> Self {
        self.parameter_binder = binder;
        self
    }

    /// Transformer used when the call does not request one.
    #[must_use]
    pub fn with_default_transformer(mut self, transformer: ResultTransformer) -> Self {
        self.default_transformer = Some(transformer);
        self
    }

    /// Tables the query reads; cached results go stale when any of them is invalidated.
    #[must_use]
    pub fn with_query_spaces(mut self, spaces: Vec<String>) -> Self {
        self.query_spaces = spaces;
        self
    }

    #[must_use]
    pub fn result_row_aliases(&self) -> &[String] {
        &self.result_row_aliases
    }

    #[must_use]
    pub fn transform_mode(&self) -> TransformMode {
        self.mode
    }

    #[must_use]
    pub fn query_spaces(&self) -> &[String] {
        &self.query_spaces
    }

    /// Run the query, through the query cache when the runtime has one
    /// enabled and `parameters` are cacheable.
    ///
    /// # Errors
    /// Binding, execution and transformation failures; cache faults never fail the call.
    pub async fn list(
        &self,
        session: &QuerySession,
        sql: &str,
        query_identifier: &str,
        parameters: &QueryParameters,
    ) -> Result<Vec<ResultValue>, LoaderError> {
        match session.runtime().cache_gateway() {
            Some(gateway) if parameters.is_cacheable() => {
                self.list_using_query_cache(session, &gateway, sql, query_identifier, parameters)
                    .await
            }
            _ => {
                self.list_ignore_query_cache(session, sql, query_identifier, parameters)
                    .await
            }
        }
    }

    /// # Errors
    /// Binding, execution and transformation failures.
    pub async fn list_ignore_query_cache(
        &self,
        session: &QuerySession,
        sql: &str,
        query_identifier: &str,
        parameters: &QueryParameters,
    ) -> Result<Vec<ResultValue>, LoaderError> {
        let rows = self
            .do_list(session, sql, query_identifier, parameters, None)
            .await?;
        self.get_result_list(rows, self.resolve_result_transformer(parameters))
    }

    /// Serve from the cache, or execute once and populate it, then reshape
    /// the rows into the requested form.
    ///
    /// # Errors
    /// Binding, execution and transformation failures.
    pub async fn list_using_query_cache(
        &self,
        session: &QuerySession,
        gateway: &ResultCacheGateway,
        sql: &str,
        query_identifier: &str,
        parameters: &QueryParameters,
    ) -> Result<Vec<ResultValue>, LoaderError> {
        let key = self.query_key(session, sql, parameters)?;
        let descriptor = key.result_transformer().clone();

        let rows = match gateway
            .lookup(&key, &self.query_spaces, query_identifier)
            .await
        {
            Some(rows) => rows,
            None => {
                let timestamp = gateway.next_timestamp();
                let rows = self
                    .do_list(session, sql, query_identifier, parameters, Some(&descriptor))
                    .await?;
                gateway
                    .populate(key, rows.clone(), timestamp, query_identifier)
                    .await;
                rows
            }
        };

        let resolved = self.resolve_result_transformer(parameters);
        let rows = self.transform(rows, &descriptor, resolved)?;
        self.get_result_list(rows, resolved)
    }

    /// Bind and execute as one translated, timed execution.
    ///
    /// With `forced` set, rows come back in that cached form regardless of
    /// the requested transformer.
    ///
    /// # Errors
    /// `LoaderError::BindingError` before execution starts, otherwise the
    /// translated execution failure.
    pub async fn do_list(
        &self,
        session: &QuerySession,
        sql: &str,
        query_identifier: &str,
        parameters: &QueryParameters,
        forced: Option<&CacheableResultTransformer>,
    ) -> Result<Vec<ResultValue>, LoaderError> {
        let executor = session.executor();
        let statement = self.prepare_statement(sql, parameters, executor.dialect())?;
        let run = self.do_query_and_initialize_non_lazy_collections(
            session, &executor, &statement, parameters, forced, true,
        );
        executor
            .execute(sql, query_identifier, parameters.row_selection().timeout, run)
            .await
    }

    /// Execute `statement`, turn its rows into result values and, when
    /// `initialize_non_lazy` is set, run the session's collection initializer.
    ///
    /// # Errors
    /// Untranslated driver failures; malformed rows surface as
    /// `DriverError::ResultShape`.
    pub async fn do_query_and_initialize_non_lazy_collections(
        &self,
        session: &QuerySession,
        executor: &ReactiveQueryExecutor,
        statement: &BoundStatement,
        parameters: &QueryParameters,
        forced: Option<&CacheableResultTransformer>,
        initialize_non_lazy: bool,
    ) -> Result<Vec<ResultValue>, DriverError> {
        let result_set = executor.select(statement).await?;
        let rows = self.process_result_set(result_set, parameters, forced)?;
        if initialize_non_lazy && let Some(initializer) = session.collection_initializer() {
            initializer.initialize_non_lazy_collections().await?;
        }
        Ok(rows)
    }

    /// Rewrite the SQL for pagination and bind everything into a fresh statement.
    ///
    /// # Errors
    /// Returns `LoaderError::BindingError` from any binding step.
    pub fn prepare_statement(
        &self,
        sql: &str,
        parameters: &QueryParameters,
        dialect: &Dialect,
    ) -> Result<BoundStatement, LoaderError> {
        let sql = self.parameter_binder.expand_sql(sql)?;
        let selection = parameters.row_selection();
        let limit_handler = limit::resolve(dialect.limit_handler(), selection);
        let mut statement = BoundStatement::new(limit_handler.process_sql(sql, selection));
        bind_statement(
            &mut statement,
            parameters,
            limit_handler,
            dialect,
            self.parameter_binder.as_ref(),
        )?;
        statement.set_skip_rows(limit_handler.rows_to_skip(selection));
        Ok(statement)
    }

    /// # Errors
    /// Fails only when the parameters cannot be bound or the include mask
    /// does not match the aliases.
    pub fn query_key(
        &self,
        session: &QuerySession,
        sql: &str,
        parameters: &QueryParameters,
    ) -> Result<QueryKey, LoaderError> {
        let region = parameters
            .cache_region()
            .unwrap_or(&session.runtime().settings().default_cache_region);
        QueryKey::generate(
            sql,
            parameters,
            session.runtime().provider().dialect(),
            self.parameter_binder.as_ref(),
            session.filter_keys(),
            region,
            self.cacheable_result_transformer(parameters)?,
        )
    }

    /// Descriptor of the form this loader caches rows in for `parameters`.
    ///
    /// # Errors
    /// Returns `LoaderError::TransformationError` when the include mask does
    /// not match the aliases.
    pub fn cacheable_result_transformer(
        &self,
        parameters: &QueryParameters,
    ) -> Result<CacheableResultTransformer, LoaderError> {
        CacheableResultTransformer::create(
            self.resolve_result_transformer(parameters),
            &self.result_row_aliases,
            self.include_in_result_row.as_deref(),
        )
    }

    #[must_use]
    pub fn resolve_result_transformer<'a>(
        &'a self,
        parameters: &'a QueryParameters,
    ) -> Option<&'a ResultTransformer> {
        parameters
            .result_transformer()
            .or(self.default_transformer.as_ref())
    }

    /// Reshape cached-form rows for `resolved`.
    ///
    /// # Errors
    /// Returns `LoaderError::TransformationError` when the rows cannot be reshaped.
    pub fn transform(
        &self,
        rows: Vec<ResultValue>,
        descriptor: &CacheableResultTransformer,
        resolved: Option<&ResultTransformer>,
    ) -> Result<Vec<ResultValue>, LoaderError> {
        let Some(transformer) = resolved else {
            return Ok(rows);
        };
        match self.mode {
            TransformMode::Immediate => descriptor.retransform_results(
                rows,
                &self.result_row_aliases,
                transformer,
                self.include_in_result_row.as_deref(),
            ),
            TransformMode::Deferred => descriptor.untransform_to_tuples(rows),
        }
    }

    /// Final list-level step: deferred loaders transform each tuple here,
    /// then the transformer sees the whole list.
    ///
    /// # Errors
    /// Returns `LoaderError::TransformationError` when a row cannot be transformed.
    pub fn get_result_list(
        &self,
        rows: Vec<ResultValue>,
        resolved: Option<&ResultTransformer>,
    ) -> Result<Vec<ResultValue>, LoaderError> {
        let Some(transformer) = resolved else {
            return Ok(rows);
        };
        let rows = match self.mode {
            TransformMode::Immediate => rows,
            TransformMode::Deferred => {
                let aliases = self.tuple_aliases();
                rows.into_iter()
                    .map(|row| match row {
                        ResultValue::Tuple(tuple) => transformer.transform_tuple(tuple, &aliases),
                        other => Err(LoaderError::TransformationError(format!(
                            "deferred transformation expects tuples, got {other:?}"
                        ))),
                    })
                    .collect::<Result<Vec<_>, _>>()?
            }
        };
        Ok(transformer.transform_list(rows))
    }

    fn tuple_aliases(&self) -> Vec<String> {
        match &self.include_in_result_row {
            Some(mask) => self
                .result_row_aliases
                .iter()
                .zip(mask)
                .filter_map(|(alias, keep)| keep.then(|| alias.clone()))
                .collect(),
            None => self.result_row_aliases.clone(),
        }
    }

    fn process_result_set(
        &self,
        result_set: ResultSet,
        parameters: &QueryParameters,
        forced: Option<&CacheableResultTransformer>,
    ) -> Result<Vec<ResultValue>, DriverError> {
        let expected = self.result_row_aliases.len();
        let resolved = self.resolve_result_transformer(parameters);
        let aliases = self.tuple_aliases();
        trace!(rows = result_set.len(), "Processing result set");

        result_set
            .into_rows()
            .into_iter()
            .map(|row| {
                if row.len() != expected {
                    return Err(DriverError::ResultShape(format!(
                        "row has {} columns, the loader expects {expected}",
                        row.len()
                    )));
                }
                let tuple = self.result_row(row);
                let value = match (forced, self.mode, resolved) {
                    (Some(descriptor), _, _) => descriptor.transform_tuple(tuple),
                    (None, TransformMode::Immediate, Some(t)) => t.transform_tuple(tuple, &aliases),
                    (None, TransformMode::Deferred, Some(_)) => Ok(ResultValue::Tuple(tuple)),
                    (None, _, None) => Ok(ResultValue::from_tuple(tuple)),
                };
                value.map_err(|e| DriverError::ResultShape(e.to_string()))
            })
            .collect()
    }

    fn result_row(&self, row: Vec<RowValues>) -> Vec<RowValues> {
        match &self.include_in_result_row {
            Some(mask) => row
                .into_iter()
                .zip(mask)
                .filter_map(|(value, keep)| keep.then_some(value))
                .collect(),
            None => row,
        }
    }
}
