use serde::{Deserialize, Serialize};

use crate::backend::{BackendRegistry, BackendType};
use crate::batch::DEFAULT_BATCH_SIZE;
use crate::cache::DEFAULT_MAX_SIZE;
use crate::database::Database;
use crate::error::SqliteDualError;
use crate::pragma::PragmaConfig;

/// Options for opening a [`Database`].
///
/// Deserializes from camelCase JSON; every field is optional:
/// ```rust
/// use sqlite_dual::prelude::*;
///
/// let opts = DatabaseOptions::from_json(r#"{"forceBackend": "native", "cacheSize": 50}"#).unwrap();
/// assert_eq!(opts.force_backend, Some(BackendType::Native));
/// assert_eq!(opts.cache_size, 50);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatabaseOptions {
    /// Use exactly this engine instead of auto-detecting
    pub force_backend: Option<BackendType>,
    pub pragmas: PragmaConfig,
    /// Maximum number of cached prepared statements
    pub cache_size: usize,
    /// Idle time after which a cached statement expires; 0 disables expiry
    pub cache_ttl_ms: u64,
    /// Default chunk size for batched bulk inserts
    pub batch_size: usize,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            force_backend: None,
            pragmas: PragmaConfig::default(),
            cache_size: DEFAULT_MAX_SIZE,
            cache_ttl_ms: 0,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl DatabaseOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse options from JSON.
    ///
    /// # Errors
    ///
    /// Returns `SqliteDualError::ConfigError` for malformed JSON or invalid values.
    pub fn from_json(json: &str) -> Result<Self, SqliteDualError> {
        let opts: Self = serde_json::from_str(json)?;
        opts.validate()?;
        Ok(opts)
    }

    /// # Errors
    ///
    /// Returns `SqliteDualError::ConfigError` when `cache_size` or `batch_size` is zero.
    pub fn validate(&self) -> Result<(), SqliteDualError> {
        if self.cache_size == 0 {
            return Err(SqliteDualError::ConfigError(
                "cacheSize must be at least 1".into(),
            ));
        }
        if self.batch_size == 0 {
            return Err(SqliteDualError::ConfigError(
                "batchSize must be at least 1".into(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn with_backend(mut self, backend: BackendType) -> Self {
        self.force_backend = Some(backend);
        self
    }
}

/// Fluent builder for [`DatabaseOptions`].
#[derive(Debug, Clone, Default)]
pub struct DatabaseOptionsBuilder {
    opts: DatabaseOptions,
}

impl DatabaseOptionsBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn force_backend(mut self, backend: BackendType) -> Self {
        self.opts.force_backend = Some(backend);
        self
    }

    #[must_use]
    pub fn pragmas(mut self, pragmas: PragmaConfig) -> Self {
        self.opts.pragmas = pragmas;
        self
    }

    #[must_use]
    pub fn cache_size(mut self, cache_size: usize) -> Self {
        self.opts.cache_size = cache_size;
        self
    }

    #[must_use]
    pub fn cache_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.opts.cache_ttl_ms = ttl_ms;
        self
    }

    #[must_use]
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.opts.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn finish(self) -> DatabaseOptions {
        self.opts
    }

    /// Open a database with these options.
    ///
    /// # Errors
    ///
    /// Returns `SqliteDualError` if the options are invalid or the backend cannot be opened.
    pub async fn open(self, registry: &BackendRegistry) -> Result<Database, SqliteDualError> {
        Database::open(registry, self.finish()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_gives_defaults() {
        let opts = DatabaseOptions::from_json("{}").unwrap();
        assert_eq!(opts, DatabaseOptions::default());
        assert_eq!(opts.cache_size, 100);
        assert_eq!(opts.batch_size, 1000);
    }

    #[test]
    fn rejects_zero_sizes_and_bad_json() {
        assert!(matches!(
            DatabaseOptions::from_json(r#"{"cacheSize": 0}"#),
            Err(SqliteDualError::ConfigError(_))
        ));
        assert!(matches!(
            DatabaseOptions::from_json(r#"{"forceBackend": "oracle"}"#),
            Err(SqliteDualError::ConfigError(_))
        ));
    }

    #[test]
    fn builder_sets_every_field() {
        let opts = DatabaseOptionsBuilder::new()
            .force_backend(BackendType::Portable)
            .pragmas(PragmaConfig::none())
            .cache_size(3)
            .cache_ttl_ms(250)
            .batch_size(10)
            .finish();
        assert_eq!(opts.force_backend, Some(BackendType::Portable));
        assert_eq!(opts.pragmas, PragmaConfig::none());
        assert_eq!((opts.cache_size, opts.cache_ttl_ms, opts.batch_size), (3, 250, 10));
    }
}
