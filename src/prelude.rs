//! Convenient imports for common functionality.

pub use crate::binder::{NamedParameterBinder, ParameterBinder, PositionalParameterBinder};
pub use crate::cache::{InMemoryQueryCache, QueryCacheProvider, ResultCacheGateway};
pub use crate::config::{DEFAULT_QUERY_RESULTS_REGION, LoaderSettings};
pub use crate::dialect::Dialect;
pub use crate::error::{DriverError, ErrorCategory, LoaderError};
pub use crate::executor::{ConnectionProvider, ReactiveQueryExecutor};
pub use crate::key::{FilterKey, QueryKey};
pub use crate::loader::{QueryLoader, TransformMode};
pub use crate::parameters::{LockMode, LockOptions, LockTimeout, QueryParameters, RowSelection};
pub use crate::pool::PoolProvider;
pub use crate::results::ResultSet;
pub use crate::session::{LoaderRuntime, QuerySession};
pub use crate::stats::{ConcurrentStatistics, StatisticsSink};
pub use crate::transform::{CacheableResultTransformer, ResultTransformer, ResultValue};
pub use crate::translation::PlaceholderStyle;
pub use crate::types::{DatabaseType, RowValues, SqlType, TypedValue};
