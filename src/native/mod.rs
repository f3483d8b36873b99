//! Native engine: `rusqlite` with the bundled SQLite amalgamation.
//!
//! The connection lives on a file in a private temporary directory so that a database image
//! can be exported by checkpointing and reading the file back.

pub mod params;
pub mod query;
mod statement;

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tempfile::TempDir;
use tracing::debug;

use crate::backend::{Backend, BackendType, NativeStatement, ensure_open};
use crate::error::{EnginePhase, SqliteDualError};
use crate::image::validate_image;
use crate::results::QueryExecResult;
use crate::sql_text::split_statements;

pub use statement::NativeSqliteStatement;

/// Connection shared between the backend and the statements it prepared. `None` once closed.
pub(crate) type SharedConnection = Arc<Mutex<Option<Connection>>>;

const DB_FILE_NAME: &str = "main.db";

/// Whether the compiled-in SQLite library can open a connection and answer a query.
#[must_use]
pub fn probe() -> bool {
    Connection::open_in_memory()
        .and_then(|conn| conn.query_row("SELECT sqlite_version()", [], |row| row.get::<_, String>(0)))
        .is_ok()
}

/// Run `f` against the live connection, failing with `ClosedResource` after close.
pub(crate) fn with_connection<T>(
    conn: &SharedConnection,
    f: impl FnOnce(&Connection) -> Result<T, SqliteDualError>,
) -> Result<T, SqliteDualError> {
    let guard = conn.lock().map_err(|err| {
        SqliteDualError::ConnectionError(format!("SQLite connection mutex poisoned: {err}"))
    })?;
    let live = guard.as_ref().ok_or_else(|| {
        SqliteDualError::ClosedResource("native backend is closed; operation not permitted".into())
    })?;
    f(live)
}

pub struct NativeBackend {
    conn: SharedConnection,
    path: PathBuf,
    dir: Option<TempDir>,
    closed: bool,
}

impl NativeBackend {
    /// Open a fresh database, or one seeded from an existing image.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` if `existing` is not a usable SQLite image, or an I/O error if
    /// the private directory cannot be created.
    pub fn open(existing: Option<&[u8]>) -> Result<Self, SqliteDualError> {
        let seed = match existing {
            Some(bytes) if validate_image(bytes)?.is_some() => Some(bytes),
            _ => None,
        };

        let dir = tempfile::Builder::new().prefix("sqlite-dual-native").tempdir()?;
        let path = dir.path().join(DB_FILE_NAME);
        if let Some(bytes) = seed {
            fs::write(&path, bytes)?;
        }

        let conn = Connection::open(&path)
            .map_err(|err| SqliteDualError::from_rusqlite(err, EnginePhase::Open))?;
        if seed.is_some() {
            verify_image(&conn)?;
        }
        debug!(path = %path.display(), seeded = seed.is_some(), "opened native backend");

        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
            path,
            dir: Some(dir),
            closed: false,
        })
    }
}

fn verify_image(conn: &Connection) -> Result<(), SqliteDualError> {
    let verdict: String = conn
        .query_row("PRAGMA quick_check", [], |row| row.get(0))
        .map_err(|err| SqliteDualError::from_rusqlite(err, EnginePhase::Open))?;
    if verdict == "ok" {
        Ok(())
    } else {
        Err(SqliteDualError::InvalidFormat(format!(
            "integrity check failed: {verdict}"
        )))
    }
}

impl Backend for NativeBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Native
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn exec_sql(&mut self, sql: &str) -> Result<Vec<QueryExecResult>, SqliteDualError> {
        ensure_open(self.closed, "native backend")?;
        with_connection(&self.conn, |conn| {
            let mut results = Vec::new();
            for statement_sql in split_statements(sql) {
                let mut stmt = conn
                    .prepare(statement_sql)
                    .map_err(|err| SqliteDualError::from_rusqlite(err, EnginePhase::Prepare))?;
                if stmt.column_count() == 0 {
                    stmt.raw_execute()?;
                } else {
                    results.push(query::build_result_set(&mut stmt)?);
                }
            }
            Ok(results)
        })
    }

    fn prepare(&mut self, sql: &str) -> Result<Box<dyn NativeStatement + Send>, SqliteDualError> {
        ensure_open(self.closed, "native backend")?;
        let columns = with_connection(&self.conn, |conn| {
            let stmt = conn
                .prepare_cached(sql)
                .map_err(|err| SqliteDualError::from_rusqlite(err, EnginePhase::Prepare))?;
            Ok(query::column_names(&stmt))
        })?;
        Ok(Box::new(NativeSqliteStatement::new(
            Arc::clone(&self.conn),
            sql.to_owned(),
            columns,
        )))
    }

    fn export_db(&mut self) -> Result<Vec<u8>, SqliteDualError> {
        ensure_open(self.closed, "native backend")?;
        let has_schema = with_connection(&self.conn, |conn| {
            if !conn.is_autocommit() {
                return Err(SqliteDualError::ExecutionError(
                    "cannot export while a transaction is open".into(),
                ));
            }
            let objects: i64 =
                conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| row.get(0))?;
            if objects > 0 {
                conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
            }
            Ok(objects > 0)
        })?;
        if !has_schema {
            return Ok(Vec::new());
        }
        Ok(fs::read(&self.path)?)
    }

    fn close(&mut self) -> Result<(), SqliteDualError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let taken = self
            .conn
            .lock()
            .map_err(|err| {
                SqliteDualError::ConnectionError(format!("SQLite connection mutex poisoned: {err}"))
            })?
            .take();
        let outcome = match taken {
            Some(conn) => conn.close().map_err(|(_, err)| SqliteDualError::from(err)),
            None => Ok(()),
        };
        // Connection must be gone before the directory is removed.
        self.dir.take();
        debug!("closed native backend");
        outcome
    }
}

impl Drop for NativeBackend {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RowValues;

    #[test]
    fn probe_finds_bundled_sqlite() {
        assert!(probe());
    }

    #[test]
    fn exec_sql_reports_result_sets_for_row_producing_statements() {
        let mut backend = NativeBackend::open(None).unwrap();
        let results = backend
            .exec_sql("CREATE TABLE t (id INTEGER); INSERT INTO t VALUES (1); SELECT id FROM t; SELECT id FROM t WHERE id > 5")
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].columns, vec!["id".to_string()]);
        assert_eq!(results[0].values, vec![vec![RowValues::Int(1)]]);
        assert!(results[1].is_empty());
    }

    #[test]
    fn syntax_errors_are_classified() {
        let mut backend = NativeBackend::open(None).unwrap();
        let err = backend.exec_sql("SELEC 1").unwrap_err();
        assert!(matches!(err, SqliteDualError::SqlSyntax(_)));
        assert!(matches!(backend.prepare("SELEC 1"), Err(SqliteDualError::SqlSyntax(_))));
    }

    #[test]
    fn close_is_idempotent_and_blocks_further_use() {
        let mut backend = NativeBackend::open(None).unwrap();
        backend.close().unwrap();
        backend.close().unwrap();
        assert!(backend.is_closed());
        assert!(backend.exec_sql("SELECT 1").unwrap_err().is_closed());
        assert!(backend.export_db().unwrap_err().is_closed());
    }

    #[test]
    fn empty_database_exports_zero_bytes() {
        let mut backend = NativeBackend::open(None).unwrap();
        assert!(backend.export_db().unwrap().is_empty());
    }
}
