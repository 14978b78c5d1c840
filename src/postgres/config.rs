use std::future::Future;

use bb8::{ManageConnection, Pool};
use tokio_postgres::{Client, NoTls};
use tracing::{debug, warn};

use crate::dialect::Dialect;
use crate::error::DriverError;
use crate::pool::{BackendPool, PoolProvider};
use crate::types::DatabaseType;

/// bb8 manager for Postgres clients.
#[derive(Debug, Clone)]
pub struct PgManager {
    config: tokio_postgres::Config,
}

impl PgManager {
    #[must_use]
    pub fn new(config: tokio_postgres::Config) -> Self {
        Self { config }
    }
}

impl ManageConnection for PgManager {
    type Connection = Client;
    type Error = tokio_postgres::Error;

    #[allow(clippy::manual_async_fn)]
    fn connect(&self) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send {
        let cfg = self.config.clone();
        async move {
            debug!(
                hosts = ?cfg.get_hosts(),
                db = ?cfg.get_dbname(),
                user = ?cfg.get_user(),
                "Connecting to postgres"
            );
            let (client, connection) = cfg.connect(NoTls).await?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    warn!(error = %e, "Postgres connection task ended with an error");
                }
            });
            Ok(client)
        }
    }

    #[allow(clippy::manual_async_fn)]
    fn is_valid(
        &self,
        conn: &mut Self::Connection,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        async move { conn.simple_query("SELECT 1").await.map(|_| ()) }
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        conn.is_closed()
    }
}

/// Options for configuring a Postgres pool.
#[derive(Debug, Clone)]
pub struct PostgresOptions {
    pub config: tokio_postgres::Config,
    pub max_size: u32,
}

impl PostgresOptions {
    #[must_use]
    pub fn new(config: tokio_postgres::Config) -> Self {
        Self {
            config,
            max_size: 10,
        }
    }

    #[must_use]
    pub fn with_max_size(mut self, max_size: u32) -> Self {
        self.max_size = max_size;
        self
    }
}

impl PoolProvider {
    /// Create a Postgres pool. Connections are opened lazily on first checkout.
    ///
    /// # Errors
    /// Returns `DriverError::ConnectionError` if a required config field is
    /// missing or the pool cannot be created.
    pub async fn new_postgres(opts: PostgresOptions) -> Result<Self, DriverError> {
        let cfg = &opts.config;
        if cfg.get_dbname().is_none() {
            return Err(DriverError::ConnectionError("dbname is required".to_string()));
        }
        if cfg.get_hosts().is_empty() {
            return Err(DriverError::ConnectionError("host is required".to_string()));
        }
        if cfg.get_user().is_none() {
            return Err(DriverError::ConnectionError("user is required".to_string()));
        }

        let pool = Pool::builder()
            .max_size(opts.max_size)
            .build_unchecked(PgManager::new(opts.config));

        Ok(PoolProvider::from_parts(
            BackendPool::Postgres(pool),
            DatabaseType::Postgres,
            Dialect::postgres(),
        ))
    }
}
