//! Capability flags of the database engine a statement is bound for.

pub mod limit;

use std::sync::Arc;

use crate::translation::PlaceholderStyle;
use crate::types::DatabaseType;

pub use limit::{LimitHandler, LimitOffsetLimitHandler, NoopLimitHandler, TopLimitHandler};

/// Engine capabilities consulted while binding and executing statements.
///
/// ```rust
/// use reactive_query_loader::prelude::*;
///
/// let dialect = Dialect::builder()
///     .lock_timeouts(true, true)
///     .build();
/// assert!(dialect.is_lock_timeout_parameterized());
/// ```
#[derive(Debug, Clone)]
pub struct Dialect {
    name: String,
    supports_lock_timeouts: bool,
    lock_timeout_parameterized: bool,
    supports_callable_out_parameter: bool,
    placeholder_style: PlaceholderStyle,
    limit_handler: Arc<dyn LimitHandler>,
}

impl Dialect {
    #[must_use]
    pub fn builder() -> DialectBuilder {
        DialectBuilder::default()
    }

    /// `SQLite`: `limit ? offset ?`, no row locks, no callable statements.
    #[must_use]
    pub fn sqlite() -> Self {
        Self::builder()
            .name("sqlite")
            .limit_handler(Arc::new(LimitOffsetLimitHandler))
            .placeholder_style(PlaceholderStyle::Sqlite)
            .build()
    }

    /// `PostgreSQL`: `limit ? offset ?`; lock timeouts exist but are set
    /// through a session setting rather than a bind parameter.
    #[must_use]
    pub fn postgres() -> Self {
        Self::builder()
            .name("postgres")
            .limit_handler(Arc::new(LimitOffsetLimitHandler))
            .placeholder_style(PlaceholderStyle::Postgres)
            .lock_timeouts(true, false)
            .callable_out_parameter(true)
            .build()
    }

    #[must_use]
    pub fn for_database(db_type: DatabaseType) -> Self {
        match db_type {
            #[cfg(feature = "postgres")]
            DatabaseType::Postgres => Self::postgres(),
            #[cfg(feature = "sqlite")]
            DatabaseType::Sqlite => Self::sqlite(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn supports_lock_timeouts(&self) -> bool {
        self.supports_lock_timeouts
    }

    #[must_use]
    pub fn is_lock_timeout_parameterized(&self) -> bool {
        self.lock_timeout_parameterized
    }

    #[must_use]
    pub fn supports_callable_out_parameter(&self) -> bool {
        self.supports_callable_out_parameter
    }

    #[must_use]
    pub fn placeholder_style(&self) -> PlaceholderStyle {
        self.placeholder_style
    }

    #[must_use]
    pub fn limit_handler(&self) -> &dyn LimitHandler {
        self.limit_handler.as_ref()
    }
}

/// Fluent builder for [`Dialect`].
#[derive(Debug, Clone)]
pub struct DialectBuilder {
    dialect: Dialect,
}

impl Default for DialectBuilder {
    fn default() -> Self {
        Self {
            dialect: Dialect {
                name: "generic".into(),
                supports_lock_timeouts: false,
                lock_timeout_parameterized: false,
                supports_callable_out_parameter: false,
                placeholder_style: PlaceholderStyle::Sqlite,
                limit_handler: Arc::new(NoopLimitHandler),
            },
        }
    }
}

impl DialectBuilder {
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.dialect.name = name.into();
        self
    }

    /// Whether lock timeouts are supported, and whether they are bound as a parameter.
    #[must_use]
    pub fn lock_timeouts(mut self, supported: bool, parameterized: bool) -> Self {
        self.dialect.supports_lock_timeouts = supported;
        self.dialect.lock_timeout_parameterized = parameterized;
        self
    }

    #[must_use]
    pub fn callable_out_parameter(mut self, supported: bool) -> Self {
        self.dialect.supports_callable_out_parameter = supported;
        self
    }

    #[must_use]
    pub fn placeholder_style(mut self, style: PlaceholderStyle) -> Self {
        self.dialect.placeholder_style = style;
        self
    }

    #[must_use]
    pub fn limit_handler(mut self, handler: Arc<dyn LimitHandler>) -> Self {
        self.dialect.limit_handler = handler;
        self
    }

    #[must_use]
    pub fn build(self) -> Dialect {
        self.dialect
    }
}
