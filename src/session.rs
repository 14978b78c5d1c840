//! Shared runtime collaborators and the per-caller session view of them.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::Span;

use crate::cache::{InMemoryQueryCache, QueryCacheProvider, ResultCacheGateway};
use crate::config::LoaderSettings;
use crate::error::DriverError;
use crate::executor::{
    ConnectionProvider, ReactiveQueryExecutor, SqlExceptionTranslator,
    StandardSqlExceptionTranslator,
};
use crate::key::FilterKey;
use crate::stats::{ConcurrentStatistics, StatisticsSink};
use crate::types::RowValues;

/// Eager initialization of collections that must be loaded along with the
/// main result.
#[async_trait]
pub trait CollectionInitializer: Debug + Send + Sync {
    async fn initialize_non_lazy_collections(&self) -> Result<(), DriverError>;
}

/// Collaborators shared by every session: connections, cache, statistics,
/// error translation and settings.
#[derive(Debug)]
pub struct LoaderRuntime {
    provider: Arc<dyn ConnectionProvider>,
    cache_provider: Option<Arc<dyn QueryCacheProvider>>,
    statistics: Arc<dyn StatisticsSink>,
    translator: Arc<dyn SqlExceptionTranslator>,
    settings: LoaderSettings,
}

impl LoaderRuntime {
    #[must_use]
    pub fn builder(provider: Arc<dyn ConnectionProvider>) -> LoaderRuntimeBuilder {
        LoaderRuntimeBuilder {
            provider,
            cache_provider: None,
            statistics: None,
            translator: None,
            settings: LoaderSettings::default(),
        }
    }

    #[must_use]
    pub fn provider(&self) -> &Arc<dyn ConnectionProvider> {
        &self.provider
    }

    #[must_use]
    pub fn statistics(&self) -> &Arc<dyn StatisticsSink> {
        &self.statistics
    }

    #[must_use]
    pub fn settings(&self) -> &LoaderSettings {
        &self.settings
    }

    /// The gateway, when the query cache is enabled and a provider exists.
    #[must_use]
    pub fn cache_gateway(&self) -> Option<ResultCacheGateway> {
        if !self.settings.query_cache_enabled {
            return None;
        }
        self.cache_provider
            .as_ref()
            .map(|provider| ResultCacheGateway::new(Arc::clone(provider), Arc::clone(&self.statistics)))
    }

    #[must_use]
    pub fn executor(&self, span: Span) -> ReactiveQueryExecutor {
        ReactiveQueryExecutor::new(
            Arc::clone(&self.provider),
            Arc::clone(&self.statistics),
            Arc::clone(&self.translator),
        )
        .with_default_timeout(self.settings.default_query_timeout())
        .with_span(span)
    }
}

/// Fluent builder for [`LoaderRuntime`].
///
/// Unset collaborators default to [`ConcurrentStatistics`] (enabled per the
/// settings), [`StandardSqlExceptionTranslator`] and, when the query cache
/// is enabled, an [`InMemoryQueryCache`].
#[derive(Debug)]
pub struct LoaderRuntimeBuilder {
    provider: Arc<dyn ConnectionProvider>,
    cache_provider: Option<Arc<dyn QueryCacheProvider>>,
    statistics: Option<Arc<dyn StatisticsSink>>,
    translator: Option<Arc<dyn SqlExceptionTranslator>>,
    settings: LoaderSettings,
}

impl LoaderRuntimeBuilder {
    #[must_use]
    pub fn settings(mut self, settings: LoaderSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn cache_provider(mut self, cache_provider: Arc<dyn QueryCacheProvider>) -> Self {
        self.cache_provider = Some(cache_provider);
        self
    }

    #[must_use]
    pub fn statistics(mut self, statistics: Arc<dyn StatisticsSink>) -> Self {
        self.statistics = Some(statistics);
        self
    }

    #[must_use]
    pub fn translator(mut self, translator: Arc<dyn SqlExceptionTranslator>) -> Self {
        self.translator = Some(translator);
        self
    }

    #[must_use]
    pub fn build(self) -> Arc<LoaderRuntime> {
        let settings = self.settings;
        let statistics = self
            .statistics
            .unwrap_or_else(|| Arc::new(ConcurrentStatistics::new(settings.statistics_enabled)));
        let cache_provider = self.cache_provider.or_else(|| {
            settings
                .query_cache_enabled
                .then(|| Arc::new(InMemoryQueryCache::new(&settings)) as Arc<dyn QueryCacheProvider>)
        });
        Arc::new(LoaderRuntime {
            provider: self.provider,
            cache_provider,
            statistics,
            translator: self
                .translator
                .unwrap_or_else(|| Arc::new(StandardSqlExceptionTranslator)),
            settings,
        })
    }
}

/// A filter enabled on a session, with its parameter values.
#[derive(Debug, Clone)]
pub struct EnabledFilter {
    pub name: String,
    pub parameters: BTreeMap<String, RowValues>,
}

/// One caller's view of the runtime: enabled filters, the collection
/// initializer and the tracing span its queries run in.
///
/// Nothing here enters a query-cache key except the enabled filters.
#[derive(Debug, Clone)]
pub struct QuerySession {
    runtime: Arc<LoaderRuntime>,
    enabled_filters: BTreeMap<String, EnabledFilter>,
    collection_initializer: Option<Arc<dyn CollectionInitializer>>,
    span: Span,
}

impl QuerySession {
    #[must_use]
    pub fn new(runtime: Arc<LoaderRuntime>) -> Self {
        Self {
            runtime,
            enabled_filters: BTreeMap::new(),
            collection_initializer: None,
            span: Span::none(),
        }
    }

    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    #[must_use]
    pub fn with_collection_initializer(mut self, initializer: Arc<dyn CollectionInitializer>) -> Self {
        self.collection_initializer = Some(initializer);
        self
    }

    pub fn enable_filter(&mut self, name: impl Into<String>, parameters: BTreeMap<String, RowValues>) {
        let name = name.into();
        self.enabled_filters
            .insert(name.clone(), EnabledFilter { name, parameters });
    }

    pub fn disable_filter(&mut self, name: &str) {
        self.enabled_filters.remove(name);
    }

    #[must_use]
    pub fn enabled_filters(&self) -> impl Iterator<Item = &EnabledFilter> {
        self.enabled_filters.values()
    }

    #[must_use]
    pub fn filter_keys(&self) -> Vec<FilterKey> {
        self.enabled_filters
            .values()
            .map(|f| FilterKey::new(f.name.clone(), f.parameters.clone()))
            .collect()
    }

    #[must_use]
    pub fn runtime(&self) -> &Arc<LoaderRuntime> {
        &self.runtime
    }

    #[must_use]
    pub fn collection_initializer(&self) -> Option<&Arc<dyn CollectionInitializer>> {
        self.collection_initializer.as_ref()
    }

    #[must_use]
    pub fn executor(&self) -> ReactiveQueryExecutor {
        self.runtime.executor(self.span.clone())
    }

    /// Mark `spaces` as modified so cached results reading them go stale.
    pub async fn invalidate_query_spaces(&self, spaces: &[String]) {
        if let Some(gateway) = self.runtime.cache_gateway() {
            gateway.invalidate(spaces).await;
        }
    }
}
