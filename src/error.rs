use std::time::Duration;

use thiserror::Error;

/// Failures raised by a connection provider while running a statement.
///
/// These never reach callers directly: the executor routes every one of them
/// through a [`SqlExceptionTranslator`](crate::executor::SqlExceptionTranslator)
/// which turns it into [`LoaderError::ExecutionError`].
#[derive(Debug, Error)]
pub enum DriverError {
    #[cfg(feature = "postgres")]
    #[error(transparent)]
    PostgresError(#[from] tokio_postgres::Error),

    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[cfg(feature = "postgres")]
    #[error(transparent)]
    PoolErrorPostgres(#[from] bb8::RunError<tokio_postgres::Error>),

    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    PoolErrorSqlite(#[from] bb8::RunError<rusqlite::Error>),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// An engine-reported failure carrying an optional SQLSTATE code.
    #[error("{message}")]
    EngineError {
        sql_state: Option<String>,
        message: String,
    },

    #[error("Result shape error: {0}")]
    ResultShape(String),

    /// A statement reached the backend with parameters it cannot send.
    #[error("Parameter error: {0}")]
    Parameter(String),

    #[error("Statement timed out after {0:?}")]
    Timeout(Duration),

    #[error("Background task failed: {0}")]
    TaskError(String),
}

impl DriverError {
    /// SQLSTATE code reported by the engine, when one is known.
    #[must_use]
    pub fn sql_state(&self) -> Option<String> {
        match self {
            #[cfg(feature = "postgres")]
            DriverError::PostgresError(e) => e.code().map(|c| c.code().to_string()),
            DriverError::EngineError { sql_state, .. } => sql_state.clone(),
            _ => None,
        }
    }
}

impl From<tokio::task::JoinError> for DriverError {
    fn from(err: tokio::task::JoinError) -> Self {
        DriverError::TaskError(err.to_string())
    }
}

/// Broad classification attached to translated execution failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    ConstraintViolation,
    LockAcquisition,
    DataException,
    SqlGrammar,
    Connection,
    Timeout,
    Generic,
}

/// Errors surfaced to callers of the loader.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// A parameter could not be bound. The statement must be discarded.
    #[error("Parameter binding error at position {position}: {message} [{sql}]")]
    BindingError {
        sql: String,
        position: usize,
        message: String,
    },

    /// The single translated form of any failure raised while executing a query.
    #[error("{message} [{source}] [{sql}]")]
    ExecutionError {
        message: String,
        sql: String,
        category: ErrorCategory,
        sql_state: Option<String>,
        #[source]
        source: DriverError,
    },

    /// Requested result shape is inconsistent with the loader's result row.
    #[error("Result transformation error: {0}")]
    TransformationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl LoaderError {
    /// SQL text attached to the failure, if any.
    #[must_use]
    pub fn sql(&self) -> Option<&str> {
        match self {
            LoaderError::BindingError { sql, .. } | LoaderError::ExecutionError { sql, .. } => {
                Some(sql)
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn category(&self) -> Option<ErrorCategory> {
        if let LoaderError::ExecutionError { category, .. } = self {
            Some(*category)
        } else {
            None
        }
    }
}

/// Faults raised by a query-results cache region.
///
/// Recovered inside the cache gateway; never returned to callers.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache region '{0}' is unavailable")]
    RegionUnavailable(String),

    #[error("Cache region '{region}' failed: {message}")]
    RegionFault { region: String, message: String },
}
