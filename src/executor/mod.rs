//! Asynchronous execution of bound statements.

mod translate;

pub use translate::{SqlExceptionTranslator, StandardSqlExceptionTranslator};

use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{Instrument, Span, debug};

use crate::dialect::Dialect;
use crate::error::{DriverError, LoaderError};
use crate::results::ResultSet;
use crate::statement::BoundStatement;
use crate::stats::StatisticsSink;

/// Context message attached to every translated execution failure.
pub const EXECUTION_FAILURE_MESSAGE: &str = "could not execute query";

/// Source of connections and the capabilities of the engine behind them.
///
/// `execute_select` borrows a connection for the duration of the call and
/// must give it back on every exit path, including when the returned future
/// is dropped before completion.
#[async_trait]
pub trait ConnectionProvider: Debug + Send + Sync {
    fn dialect(&self) -> &Dialect;

    /// Run `statement` and return every row.
    async fn execute_select(&self, statement: &BoundStatement) -> Result<ResultSet, DriverError>;
}

/// Runs statements through a [`ConnectionProvider`], timing them for the
/// statistics sink and translating failures once.
///
/// Everything it runs is instrumented with the span given at construction.
#[derive(Debug, Clone)]
pub struct ReactiveQueryExecutor {
    provider: Arc<dyn ConnectionProvider>,
    statistics: Arc<dyn StatisticsSink>,
    translator: Arc<dyn SqlExceptionTranslator>,
    default_timeout: Option<Duration>,
    span: Span,
}

impl ReactiveQueryExecutor {
    #[must_use]
    pub fn new(
        provider: Arc<dyn ConnectionProvider>,
        statistics: Arc<dyn StatisticsSink>,
        translator: Arc<dyn SqlExceptionTranslator>,
    ) -> Self {
        Self {
            provider,
            statistics,
            translator,
            default_timeout: None,
            span: Span::none(),
        }
    }

    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Timeout for executions whose row selection sets none.
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    #[must_use]
    pub fn dialect(&self) -> &Dialect {
        self.provider.dialect()
    }

    #[must_use]
    pub fn statistics(&self) -> &Arc<dyn StatisticsSink> {
        &self.statistics
    }

    #[must_use]
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Run `statement` and apply its row window: leading rows the SQL could
    /// not offset are dropped and the max-rows directive is enforced.
    ///
    /// # Errors
    /// Returns the provider's `DriverError` untranslated.
    pub async fn select(&self, statement: &BoundStatement) -> Result<ResultSet, DriverError> {
        debug!(sql = statement.sql(), "Executing query");
        let mut result_set = self.provider.execute_select(statement).await?;
        result_set.apply_window(statement.max_rows(), statement.skip_rows());
        Ok(result_set)
    }

    /// Await one top-level execution.
    ///
    /// Starts a clock only when statistics are enabled. A failure, or the
    /// timeout elapsing, goes through the translator exactly once with `sql`
    /// attached; on success the row count and elapsed time are recorded
    /// once under `query_identifier`. Dropping the timed-out future releases
    /// whatever connection it held.
    ///
    /// # Errors
    /// Returns `LoaderError::ExecutionError` for any failure of `run`.
    pub async fn execute<T, F>(
        &self,
        sql: &str,
        query_identifier: &str,
        timeout: Option<Duration>,
        run: F,
    ) -> Result<Vec<T>, LoaderError>
    where
        F: Future<Output = Result<Vec<T>, DriverError>> + Send,
        T: Send,
    {
        let start = self.statistics.is_enabled().then(Instant::now);
        let run = run.instrument(self.span.clone());
        let outcome = match timeout.or(self.default_timeout) {
            Some(limit) => tokio::time::timeout(limit, run)
                .await
                .unwrap_or(Err(DriverError::Timeout(limit))),
            None => run.await,
        };

        let rows = match outcome {
            Ok(rows) => rows,
            Err(error) => {
                self.span.in_scope(|| {
                    debug!(sql, error = %error, "could not execute query");
                });
                return Err(self
                    .translator
                    .translate(error, EXECUTION_FAILURE_MESSAGE, sql));
            }
        };

        if let Some(start) = start {
            let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
            self.statistics
                .query_executed(query_identifier, rows.len(), elapsed_ms);
        }
        Ok(rows)
    }
}
