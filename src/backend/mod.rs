//! The contract every SQLite execution engine satisfies, and the selector that picks one.

pub mod registry;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::SqliteDualError;
use crate::results::{QueryExecResult, Row};
use crate::types::Params;

pub use registry::BackendRegistry;

/// The engines this crate can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// In-process compiled SQLite (`rusqlite`, bundled amalgamation)
    Native,
    /// Pure-Rust SQLite-compatible engine (`turso`), no C toolchain required
    Portable,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendType::Native => f.write_str("native"),
            BackendType::Portable => f.write_str("portable"),
        }
    }
}

/// Minimal operation set of an engine handle.
///
/// Implementations must fail every method other than `close`/`is_closed` with
/// [`SqliteDualError::ClosedResource`] once closed; `close` itself is idempotent.
pub trait Backend {
    fn backend_type(&self) -> BackendType;

    fn is_closed(&self) -> bool;

    /// Run one or more `;`-separated statements without parameters.
    ///
    /// # Errors
    /// Returns `SqlSyntax` when the engine rejects the text, or the classified engine error.
    fn exec_sql(&mut self, sql: &str) -> Result<Vec<QueryExecResult>, SqliteDualError>;

    /// Compile one statement into an engine handle.
    ///
    /// # Errors
    /// Returns `SqlSyntax` when the engine rejects the text.
    fn prepare(&mut self, sql: &str) -> Result<Box<dyn NativeStatement + Send>, SqliteDualError>;

    /// Produce a standard SQLite file image of the committed database state.
    ///
    /// # Errors
    /// Returns an error when called inside an open transaction or the image cannot be read.
    fn export_db(&mut self) -> Result<Vec<u8>, SqliteDualError>;

    /// Release the engine. Safe to call more than once.
    ///
    /// # Errors
    /// Returns an error if the engine reports a failure while shutting down.
    fn close(&mut self) -> Result<(), SqliteDualError>;

    /// Whether the engine honours `PRAGMA <name>`; unsupported pragmas are skipped by the
    /// pragma optimizer.
    fn supports_pragma(&self, _name: &str) -> bool {
        true
    }
}

/// Engine-side prepared statement, driven by [`crate::statement::Statement`].
pub trait NativeStatement {
    /// Result column names, in select-list order (empty for DML/DDL).
    ///
    /// # Errors
    /// Returns `ClosedResource` if the owning backend is closed.
    fn column_names(&mut self) -> Result<Vec<String>, SqliteDualError>;

    /// Replace the current bindings. Slots without a value bind NULL.
    ///
    /// # Errors
    /// Returns `ParameterError` if the params do not fit the statement.
    fn bind(&mut self, params: &Params) -> Result<(), SqliteDualError>;

    /// Advance to the next row; `None` once the statement is exhausted.
    ///
    /// # Errors
    /// Propagates engine errors such as constraint violations.
    fn step(&mut self) -> Result<Option<Row>, SqliteDualError>;

    /// Execute to completion and return the number of rows changed.
    ///
    /// # Errors
    /// Propagates engine errors such as constraint violations.
    fn run(&mut self) -> Result<usize, SqliteDualError>;

    /// Rewind the statement and clear its bindings.
    ///
    /// # Errors
    /// Returns `ClosedResource` if the owning backend is closed.
    fn reset(&mut self) -> Result<(), SqliteDualError>;

    /// Release the engine handle. Finalizing after the backend closed is a no-op.
    ///
    /// # Errors
    /// Returns an error if the engine fails to release the handle.
    fn finalize(&mut self) -> Result<(), SqliteDualError>;
}

/// Reject an operation on a closed backend or facade before touching the engine.
///
/// # Errors
/// Returns `SqliteDualError::ClosedResource` when `closed` is set.
pub fn ensure_open(closed: bool, what: &str) -> Result<(), SqliteDualError> {
    if closed {
        Err(SqliteDualError::ClosedResource(format!(
            "{what} is closed; operation not permitted"
        )))
    } else {
        Ok(())
    }
}

/// Reject an operation on a freed statement before touching the engine.
///
/// # Errors
/// Returns `SqliteDualError::FreedResource` when `freed` is set.
pub fn ensure_not_freed(freed: bool, sql: &str) -> Result<(), SqliteDualError> {
    if freed {
        Err(SqliteDualError::FreedResource(format!(
            "statement has been freed: {sql}"
        )))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guards_raise_the_right_errors() {
        assert!(ensure_open(false, "backend").is_ok());
        assert!(ensure_open(true, "backend").unwrap_err().is_closed());
        assert!(ensure_not_freed(false, "SELECT 1").is_ok());
        assert!(ensure_not_freed(true, "SELECT 1").unwrap_err().is_freed());
    }

    #[test]
    fn backend_type_round_trips_through_serde() {
        let json = serde_json::to_string(&BackendType::Portable).unwrap();
        assert_eq!(json, "\"portable\"");
        let parsed: BackendType = serde_json::from_str("\"native\"").unwrap();
        assert_eq!(parsed, BackendType::Native);
    }
}
