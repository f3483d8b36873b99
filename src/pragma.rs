//! Tuning pragmas applied to every freshly opened backend.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::Backend;
use crate::error::SqliteDualError;

/// Where SQLite keeps temporary tables and indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TempStore {
    Default,
    File,
    #[default]
    Memory,
}

impl TempStore {
    /// Numeric value understood by `PRAGMA temp_store`.
    #[must_use]
    pub fn as_pragma_value(self) -> u8 {
        match self {
            TempStore::Default => 0,
            TempStore::File => 1,
            TempStore::Memory => 2,
        }
    }
}

/// Pragma settings. `None` leaves the engine default in place.
///
/// The defaults suit a workload that keeps the whole database in memory and exports it
/// explicitly: no on-disk journal and no fsync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PragmaConfig {
    pub journal_mode: Option<String>,
    pub synchronous: Option<String>,
    pub cache_size: Option<i64>,
    pub temp_store: Option<TempStore>,
    pub page_size: Option<u32>,
    pub mmap_size: Option<i64>,
}

impl Default for PragmaConfig {
    fn default() -> Self {
        Self {
            journal_mode: Some("memory".into()),
            synchronous: Some("off".into()),
            cache_size: Some(10_000),
            temp_store: Some(TempStore::Memory),
            page_size: None,
            mmap_size: None,
        }
    }
}

impl PragmaConfig {
    /// A configuration that emits no pragmas at all.
    #[must_use]
    pub fn none() -> Self {
        Self {
            journal_mode: None,
            synchronous: None,
            cache_size: None,
            temp_store: None,
            page_size: None,
            mmap_size: None,
        }
    }
}

/// One pragma to run: its name and the full statement text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PragmaStatement {
    pub name: &'static str,
    pub sql: String,
}

fn validate_identifier(name: &str, value: &str) -> Result<(), SqliteDualError> {
    let valid = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(SqliteDualError::ConfigError(format!(
            "invalid value for pragma {name}: {value:?}"
        )))
    }
}

#[derive(Debug, Clone, Default)]
pub struct PragmaOptimizer {
    config: PragmaConfig,
}

impl PragmaOptimizer {
    #[must_use]
    pub fn new(config: PragmaConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &PragmaConfig {
        &self.config
    }

    /// The pragma statements for this configuration, in the order they are applied:
    /// `journal_mode`, `synchronous`, `cache_size`, `temp_store`, `page_size`, `mmap_size`.
    ///
    /// # Errors
    ///
    /// Returns `SqliteDualError::ConfigError` if a string value is not a plain identifier.
    pub fn build_statements(&self) -> Result<Vec<PragmaStatement>, SqliteDualError> {
        let config = &self.config;
        let mut statements = Vec::new();
        let mut push = |name: &'static str, value: String| {
            statements.push(PragmaStatement {
                name,
                sql: format!("PRAGMA {name} = {value}"),
            });
        };

        if let Some(mode) = &config.journal_mode {
            validate_identifier("journal_mode", mode)?;
            push("journal_mode", mode.clone());
        }
        if let Some(sync) = &config.synchronous {
            validate_identifier("synchronous", sync)?;
            push("synchronous", sync.clone());
        }
        if let Some(size) = config.cache_size {
            push("cache_size", size.to_string());
        }
        if let Some(store) = config.temp_store {
            push("temp_store", store.as_pragma_value().to_string());
        }
        if let Some(size) = config.page_size {
            push("page_size", size.to_string());
        }
        if let Some(size) = config.mmap_size {
            push("mmap_size", size.to_string());
        }
        Ok(statements)
    }

    /// Run every pragma against `backend`, stopping at the first failure.
    ///
    /// Pragmas the backend reports as unsupported are skipped.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by the backend, or `ConfigError` for invalid values.
    pub fn apply(&self, backend: &mut dyn Backend) -> Result<(), SqliteDualError> {
        for pragma in self.build_statements()? {
            if !backend.supports_pragma(pragma.name) {
                debug!(
                    pragma = pragma.name,
                    backend = %backend.backend_type(),
                    "skipping pragma unsupported by backend"
                );
                continue;
            }
            debug!(sql = %pragma.sql, "applying pragma");
            backend.exec_sql(&pragma.sql)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendType, NativeStatement};
    use crate::results::QueryExecResult;

    /// Records every statement it is asked to run and fails the one named in `fail_on`.
    #[derive(Default)]
    struct ScriptedBackend {
        executed: Vec<String>,
        fail_on: Option<&'static str>,
        unsupported: Vec<&'static str>,
    }

    impl Backend for ScriptedBackend {
        fn backend_type(&self) -> BackendType {
            BackendType::Portable
        }

        fn is_closed(&self) -> bool {
            false
        }

        fn exec_sql(&mut self, sql: &str) -> Result<Vec<QueryExecResult>, SqliteDualError> {
            self.executed.push(sql.to_string());
            if self.fail_on == Some(sql) {
                return Err(SqliteDualError::ExecutionError(format!("{sql} rejected")));
            }
            Ok(Vec::new())
        }

        fn prepare(
            &mut self,
            sql: &str,
        ) -> Result<Box<dyn NativeStatement + Send>, SqliteDualError> {
            Err(SqliteDualError::ExecutionError(format!("cannot prepare {sql}")))
        }

        fn export_db(&mut self) -> Result<Vec<u8>, SqliteDualError> {
            Ok(Vec::new())
        }

        fn close(&mut self) -> Result<(), SqliteDualError> {
            Ok(())
        }

        fn supports_pragma(&self, name: &str) -> bool {
            !self.unsupported.contains(&name)
        }
    }

    fn sql_of(optimizer: &PragmaOptimizer) -> Vec<String> {
        optimizer
            .build_statements()
            .unwrap()
            .into_iter()
            .map(|p| p.sql)
            .collect()
    }

    #[test]
    fn defaults_emit_four_pragmas_in_order() {
        assert_eq!(
            sql_of(&PragmaOptimizer::default()),
            vec![
                "PRAGMA journal_mode = memory",
                "PRAGMA synchronous = off",
                "PRAGMA cache_size = 10000",
                "PRAGMA temp_store = 2",
            ]
        );
    }

    #[test]
    fn optional_pragmas_follow_the_fixed_order() {
        let config = PragmaConfig {
            journal_mode: None,
            synchronous: None,
            cache_size: None,
            temp_store: Some(TempStore::File),
            page_size: Some(8192),
            mmap_size: Some(0),
        };
        assert_eq!(
            sql_of(&PragmaOptimizer::new(config)),
            vec![
                "PRAGMA temp_store = 1",
                "PRAGMA page_size = 8192",
                "PRAGMA mmap_size = 0",
            ]
        );
        assert!(sql_of(&PragmaOptimizer::new(PragmaConfig::none())).is_empty());
    }

    #[test]
    fn rejects_values_that_are_not_identifiers() {
        let config = PragmaConfig {
            journal_mode: Some("wal; DROP TABLE t".into()),
            ..PragmaConfig::default()
        };
        let err = PragmaOptimizer::new(config).build_statements().unwrap_err();
        assert!(matches!(err, SqliteDualError::ConfigError(_)));
    }

    #[test]
    fn deserializes_camel_case_with_defaults() {
        let config: PragmaConfig =
            serde_json::from_str(r#"{"cacheSize": 500, "tempStore": "file"}"#).unwrap();
        assert_eq!(config.cache_size, Some(500));
        assert_eq!(config.temp_store, Some(TempStore::File));
        assert_eq!(config.journal_mode.as_deref(), Some("memory"));
    }

    #[test]
    fn apply_stops_at_the_first_failing_pragma() {
        let mut backend = ScriptedBackend {
            fail_on: Some("PRAGMA synchronous = off"),
            ..ScriptedBackend::default()
        };
        let err = PragmaOptimizer::default().apply(&mut backend).unwrap_err();
        assert!(matches!(err, SqliteDualError::ExecutionError(_)));
        assert_eq!(
            backend.executed,
            vec!["PRAGMA journal_mode = memory", "PRAGMA synchronous = off"]
        );
    }

    #[test]
    fn apply_skips_pragmas_the_backend_does_not_support() {
        let mut backend = ScriptedBackend {
            unsupported: vec!["journal_mode", "temp_store"],
            ..ScriptedBackend::default()
        };
        PragmaOptimizer::default().apply(&mut backend).unwrap();
        assert_eq!(
            backend.executed,
            vec!["PRAGMA synchronous = off", "PRAGMA cache_size = 10000"]
        );
    }

    #[test]
    fn invalid_values_fail_before_anything_runs() {
        let mut backend = ScriptedBackend::default();
        let config = PragmaConfig {
            synchronous: Some("off'".into()),
            ..PragmaConfig::default()
        };
        let err = PragmaOptimizer::new(config).apply(&mut backend).unwrap_err();
        assert!(matches!(err, SqliteDualError::ConfigError(_)));
        assert!(backend.executed.is_empty());
    }
}
