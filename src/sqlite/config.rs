use std::future::Future;

use bb8::{ManageConnection, Pool};

use crate::dialect::Dialect;
use crate::error::DriverError;
use crate::pool::{BackendPool, PoolProvider};
use crate::types::DatabaseType;

/// bb8 manager opening `SQLite` connections on a database file.
///
/// Checkout does no I/O. A connection handed back with a transaction still
/// open is broken and gets dropped instead of reused.
#[derive(Debug, Clone)]
pub struct SqliteManager {
    db_path: String,
}

impl SqliteManager {
    #[must_use]
    pub fn new(db_path: String) -> Self {
        Self { db_path }
    }
}

impl ManageConnection for SqliteManager {
    type Connection = rusqlite::Connection;
    type Error = rusqlite::Error;

    #[allow(clippy::manual_async_fn)]
    fn connect(&self) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send {
        let path = self.db_path.clone();
        async move { rusqlite::Connection::open(path) }
    }

    #[allow(clippy::manual_async_fn)]
    fn is_valid(
        &self,
        _conn: &mut Self::Connection,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        async { Ok(()) }
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        !conn.is_autocommit()
    }
}

/// Options for configuring a `SQLite` pool.
#[derive(Debug, Clone)]
pub struct SqliteOptions {
    pub db_path: String,
    pub max_size: u32,
}

impl SqliteOptions {
    #[must_use]
    pub fn new(db_path: String) -> Self {
        Self {
            db_path,
            max_size: 4,
        }
    }

    #[must_use]
    pub fn with_max_size(mut self, max_size: u32) -> Self {
        self.max_size = max_size;
        self
    }
}

/// Fluent builder for `SQLite` options.
#[derive(Debug, Clone)]
pub struct SqliteOptionsBuilder {
    opts: SqliteOptions,
}

impl SqliteOptionsBuilder {
    #[must_use]
    pub fn new(db_path: String) -> Self {
        Self {
            opts: SqliteOptions::new(db_path),
        }
    }

    #[must_use]
    pub fn max_size(mut self, max_size: u32) -> Self {
        self.opts.max_size = max_size;
        self
    }

    #[must_use]
    pub fn finish(self) -> SqliteOptions {
        self.opts
    }

    /// Build a `PoolProvider` for `SQLite`.
    ///
    /// # Errors
    /// Returns `DriverError` if pool creation or the initial pragma fails.
    pub async fn build(self) -> Result<PoolProvider, DriverError> {
        PoolProvider::new_sqlite(self.finish()).await
    }
}

impl PoolProvider {
    #[must_use]
    pub fn sqlite_builder(db_path: String) -> SqliteOptionsBuilder {
        SqliteOptionsBuilder::new(db_path)
    }

    /// Create a `SQLite` pool and switch the database to WAL journaling.
    ///
    /// # Errors
    /// Returns `DriverError::ConnectionError` if the pool cannot be created,
    /// or the pool/`SQLite` error from the first checkout.
    pub async fn new_sqlite(opts: SqliteOptions) -> Result<Self, DriverError> {
        if opts.max_size == 0 {
            return Err(DriverError::ConnectionError(
                "SQLite pool max_size must be positive".to_string(),
            ));
        }
        let pool = Pool::builder()
            .max_size(opts.max_size)
            .build(SqliteManager::new(opts.db_path))
            .await
            .map_err(|e| DriverError::ConnectionError(format!("Failed to create SQLite pool: {e}")))?;

        {
            let conn = pool.get().await?;
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }

        Ok(PoolProvider::from_parts(
            BackendPool::Sqlite(pool),
            DatabaseType::Sqlite,
            Dialect::sqlite(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connection_left_in_a_transaction_is_not_reused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.db").to_string_lossy().into_owned();
        let pool = Pool::builder()
            .max_size(1)
            .build(SqliteManager::new(path))
            .await
            .unwrap();

        {
            let conn = pool.get().await.unwrap();
            conn.execute_batch("BEGIN;").unwrap();
            assert!(!conn.is_autocommit());
        }
        assert_eq!(pool.state().connections, 0);

        let conn = pool.get().await.unwrap();
        assert!(conn.is_autocommit());
    }
}
