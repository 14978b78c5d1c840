//! Pooled connections behind the [`ConnectionProvider`] seam.

use std::fmt;

use async_trait::async_trait;

use crate::dialect::Dialect;
use crate::error::DriverError;
use crate::executor::ConnectionProvider;
use crate::results::ResultSet;
use crate::statement::BoundStatement;
use crate::types::DatabaseType;

#[cfg(feature = "postgres")]
use crate::postgres::PgManager;
#[cfg(feature = "sqlite")]
use crate::sqlite::SqliteManager;

/// Connection pool for one of the supported engines.
#[derive(Clone)]
pub enum BackendPool {
    /// `PostgreSQL` connection pool
    #[cfg(feature = "postgres")]
    Postgres(bb8::Pool<PgManager>),
    /// `SQLite` connection pool
    #[cfg(feature = "sqlite")]
    Sqlite(bb8::Pool<SqliteManager>),
}

impl fmt::Debug for BackendPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            #[cfg(feature = "postgres")]
            Self::Postgres(pool) => f.debug_tuple("Postgres").field(&pool.state().connections).finish(),
            #[cfg(feature = "sqlite")]
            Self::Sqlite(pool) => f.debug_tuple("Sqlite").field(&pool.state().connections).finish(),
        }
    }
}

/// A pool plus the dialect statements for it are bound with.
///
/// Each `execute_select` checks out one connection and returns it when the
/// call finishes or its future is dropped.
#[derive(Clone, Debug)]
pub struct PoolProvider {
    pool: BackendPool,
    db_type: DatabaseType,
    dialect: Dialect,
}

impl PoolProvider {
    #[must_use]
    pub fn from_parts(pool: BackendPool, db_type: DatabaseType, dialect: Dialect) -> Self {
        Self {
            pool,
            db_type,
            dialect,
        }
    }

    #[must_use]
    pub fn pool(&self) -> &BackendPool {
        &self.pool
    }

    #[must_use]
    pub fn db_type(&self) -> DatabaseType {
        self.db_type
    }

    /// Replace the engine dialect, e.g. to change lock timeout support.
    #[must_use]
    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Run unparameterized statements, typically schema setup.
    ///
    /// # Errors
    /// Returns the backend's `DriverError`.
    pub async fn execute_batch(&self, sql: &str) -> Result<(), DriverError> {
        match &self.pool {
            #[cfg(feature = "postgres")]
            BackendPool::Postgres(pool) => crate::postgres::execute_batch(pool, sql).await,
            #[cfg(feature = "sqlite")]
            BackendPool::Sqlite(pool) => crate::sqlite::execute_batch(pool, sql).await,
        }
    }
}

#[async_trait]
impl ConnectionProvider for PoolProvider {
    fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    async fn execute_select(&self, statement: &BoundStatement) -> Result<ResultSet, DriverError> {
        match &self.pool {
            #[cfg(feature = "postgres")]
            BackendPool::Postgres(pool) => crate::postgres::execute_select(pool, statement).await,
            #[cfg(feature = "sqlite")]
            BackendPool::Sqlite(pool) => crate::sqlite::execute_select(pool, statement).await,
        }
    }
}
