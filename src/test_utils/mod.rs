//! In-process doubles for exercising loaders without a database.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::cache::{CachedResult, QueryCacheProvider, QueryResultsRegion};
use crate::dialect::Dialect;
use crate::error::{CacheError, DriverError};
use crate::executor::ConnectionProvider;
use crate::key::QueryKey;
use crate::results::ResultSet;
use crate::statement::BoundStatement;
use crate::transform::ResultValue;
use crate::types::RowValues;

/// Connection provider answering every statement from a script.
///
/// Each execution takes a lease that is released when the execution ends,
/// however it ends; [`ScriptedProvider::leases_in_use`] tells whether any
/// are still held.
#[derive(Debug)]
pub struct ScriptedProvider {
    dialect: Dialect,
    columns: Vec<String>,
    rows: Mutex<Vec<Vec<RowValues>>>,
    failures: Mutex<VecDeque<DriverError>>,
    delay: Mutex<Option<Duration>>,
    executed: Mutex<Vec<BoundStatement>>,
    executions: AtomicUsize,
    leases: Arc<AtomicUsize>,
}

struct Lease(Arc<AtomicUsize>);

impl Drop for Lease {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedProvider {
    #[must_use]
    pub fn new(dialect: Dialect, columns: &[&str], rows: Vec<Vec<RowValues>>) -> Self {
        Self {
            dialect,
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            rows: Mutex::new(rows),
            failures: Mutex::new(VecDeque::new()),
            delay: Mutex::new(None),
            executed: Mutex::new(Vec::new()),
            executions: AtomicUsize::new(0),
            leases: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn set_rows(&self, rows: Vec<Vec<RowValues>>) {
        *self.rows.lock().unwrap_or_else(PoisonError::into_inner) = rows;
    }

    /// The next execution fails with `error`.
    pub fn fail_next(&self, error: DriverError) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(error);
    }

    /// Every execution waits `delay` before answering.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap_or_else(PoisonError::into_inner) = delay;
    }

    #[must_use]
    pub fn execution_count(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn leases_in_use(&self) -> usize {
        self.leases.load(Ordering::SeqCst)
    }

    /// Statements received so far, in order.
    #[must_use]
    pub fn executed(&self) -> Vec<BoundStatement> {
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ConnectionProvider for ScriptedProvider {
    fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    async fn execute_select(&self, statement: &BoundStatement) -> Result<ResultSet, DriverError> {
        self.leases.fetch_add(1, Ordering::SeqCst);
        let _lease = Lease(Arc::clone(&self.leases));
        self.executions.fetch_add(1, Ordering::SeqCst);
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(statement.clone());

        let delay = *self.delay.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self
            .failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        if let Some(error) = failure {
            return Err(error);
        }

        let rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner).clone();
        Ok(ResultSet::from_rows(self.columns.clone(), rows))
    }
}

/// What a [`FaultyCacheProvider`] does when asked for a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheFault {
    /// No region is ever available.
    Unavailable,
    /// Regions exist but every read and write fails.
    Failing,
}

/// Cache provider whose regions never work.
#[derive(Debug)]
pub struct FaultyCacheProvider {
    fault: CacheFault,
    attempts: Arc<AtomicUsize>,
}

impl FaultyCacheProvider {
    #[must_use]
    pub fn new(fault: CacheFault) -> Self {
        Self {
            fault,
            attempts: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Reads and writes attempted against failing regions.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
struct FailingRegion {
    name: String,
    attempts: Arc<AtomicUsize>,
}

impl FailingRegion {
    fn fault(&self) -> CacheError {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        CacheError::RegionFault {
            region: self.name.clone(),
            message: "region offline".to_string(),
        }
    }
}

#[async_trait]
impl QueryResultsRegion for FailingRegion {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, _key: &QueryKey, _spaces: &[String]) -> Result<Option<CachedResult>, CacheError> {
        Err(self.fault())
    }

    async fn put(
        &self,
        _key: QueryKey,
        _rows: Vec<ResultValue>,
        _timestamp: u64,
    ) -> Result<(), CacheError> {
        Err(self.fault())
    }
}

#[async_trait]
impl QueryCacheProvider for FaultyCacheProvider {
    fn region(&self, name: &str) -> Option<Arc<dyn QueryResultsRegion>> {
        match self.fault {
            CacheFault::Unavailable => None,
            CacheFault::Failing => Some(Arc::new(FailingRegion {
                name: name.to_string(),
                attempts: Arc::clone(&self.attempts),
            })),
        }
    }

    fn next_timestamp(&self) -> u64 {
        0
    }

    async fn invalidate(&self, _spaces: &[String]) -> Result<(), CacheError> {
        Err(CacheError::RegionUnavailable("all".to_string()))
    }
}
