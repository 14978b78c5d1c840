//! Non-blocking query loading.
//!
//! A [`QueryLoader`](loader::QueryLoader) binds a statement, optionally
//! serves it from the query-results cache, executes it through a
//! [`ConnectionProvider`](executor::ConnectionProvider) and reshapes the rows
//! with a [`ResultTransformer`](transform::ResultTransformer).

pub mod binder;
pub mod cache;
pub mod config;
pub mod dialect;
pub mod error;
pub mod executor;
pub mod key;
pub mod loader;
pub mod parameters;
pub mod pool;
pub mod prelude;
pub mod results;
pub mod session;
pub mod statement;
pub mod stats;
pub mod transform;
pub mod translation;
pub mod types;

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use error::{DriverError, LoaderError};
pub use loader::QueryLoader;
pub use types::RowValues;
