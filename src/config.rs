use std::time::Duration;

use serde::Deserialize;

use crate::error::LoaderError;

/// Region used when a query does not name one.
pub const DEFAULT_QUERY_RESULTS_REGION: &str = "default-query-results-region";

/// Runtime-wide loader settings.
///
/// Missing fields take their defaults, so a partial JSON document is enough:
/// ```rust
/// use reactive_query_loader::prelude::*;
///
/// let settings = LoaderSettings::from_json_str(r#"{ "query_cache_enabled": true }"#).unwrap();
/// assert!(settings.query_cache_enabled);
/// assert_eq!(settings.default_cache_region, "default-query-results-region");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoaderSettings {
    pub statistics_enabled: bool,
    pub query_cache_enabled: bool,
    pub default_cache_region: String,
    pub query_cache_ttl_secs: u64,
    pub query_cache_max_entries: u64,
    /// Applied to queries whose row selection carries no timeout.
    pub default_query_timeout_ms: Option<u64>,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            statistics_enabled: false,
            query_cache_enabled: false,
            default_cache_region: DEFAULT_QUERY_RESULTS_REGION.to_string(),
            query_cache_ttl_secs: 3600,
            query_cache_max_entries: 10_000,
            default_query_timeout_ms: None,
        }
    }
}

impl LoaderSettings {
    #[must_use]
    pub fn builder() -> LoaderSettingsBuilder {
        LoaderSettingsBuilder::default()
    }

    /// Parse settings from JSON.
    ///
    /// # Errors
    /// Returns `LoaderError::ConfigError` on malformed JSON or invalid values.
    pub fn from_json_str(json: &str) -> Result<Self, LoaderError> {
        let settings: Self = serde_json::from_str(json)
            .map_err(|e| LoaderError::ConfigError(format!("invalid loader settings: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    /// # Errors
    /// Returns `LoaderError::ConfigError` when a value is out of range.
    pub fn validate(&self) -> Result<(), LoaderError> {
        if self.default_cache_region.trim().is_empty() {
            return Err(LoaderError::ConfigError(
                "default_cache_region must not be empty".to_string(),
            ));
        }
        if self.query_cache_max_entries == 0 {
            return Err(LoaderError::ConfigError(
                "query_cache_max_entries must be positive".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn default_query_timeout(&self) -> Option<Duration> {
        self.default_query_timeout_ms.map(Duration::from_millis)
    }
}

/// Fluent builder for [`LoaderSettings`].
#[derive(Debug, Clone, Default)]
pub struct LoaderSettingsBuilder {
    settings: LoaderSettings,
}

impl LoaderSettingsBuilder {
    #[must_use]
    pub fn statistics(mut self, enabled: bool) -> Self {
        self.settings.statistics_enabled = enabled;
        self
    }

    #[must_use]
    pub fn query_cache(mut self, enabled: bool) -> Self {
        self.settings.query_cache_enabled = enabled;
        self
    }

    #[must_use]
    pub fn default_cache_region(mut self, region: impl Into<String>) -> Self {
        self.settings.default_cache_region = region.into();
        self
    }

    #[must_use]
    pub fn query_cache_ttl_secs(mut self, secs: u64) -> Self {
        self.settings.query_cache_ttl_secs = secs;
        self
    }

    #[must_use]
    pub fn query_cache_max_entries(mut self, max_entries: u64) -> Self {
        self.settings.query_cache_max_entries = max_entries;
        self
    }

    #[must_use]
    pub fn default_query_timeout(mut self, timeout: Duration) -> Self {
        self.settings.default_query_timeout_ms =
            Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// # Errors
    /// Returns `LoaderError::ConfigError` when a value is out of range.
    pub fn build(self) -> Result<LoaderSettings, LoaderError> {
        self.settings.validate()?;
        Ok(self.settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_region() {
        let err = LoaderSettings::builder().default_cache_region(" ").build().unwrap_err();
        assert!(matches!(err, LoaderError::ConfigError(_)));
    }

    #[test]
    fn json_overrides_defaults() {
        let settings = LoaderSettings::from_json_str(
            r#"{ "statistics_enabled": true, "default_query_timeout_ms": 250 }"#,
        )
        .unwrap();
        assert!(settings.statistics_enabled);
        assert_eq!(settings.default_query_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(settings.query_cache_max_entries, 10_000);
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        assert!(matches!(
            LoaderSettings::from_json_str("{ nope"),
            Err(LoaderError::ConfigError(_))
        ));
    }
}
