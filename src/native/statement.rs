use std::collections::VecDeque;

use crate::backend::NativeStatement;
use crate::error::{EnginePhase, SqliteDualError};
use crate::results::Row;
use crate::types::Params;

use super::params::apply_bindings;
use super::query::collect_rows;
use super::{SharedConnection, with_connection};

/// Prepared statement on the native engine.
///
/// The compiled statement lives in the connection's statement cache; this handle keeps the
/// SQL and its bindings. The connection sits behind a mutex shared with every other handle,
/// and a `rusqlite::Rows` cursor cannot outlive the guard, so the first `step` runs the
/// statement to completion and buffers all of its rows. Memory use is proportional to the
/// result set. Callers needing bounded memory should page with `LIMIT`/`OFFSET`.
///
/// The buffered rows are a snapshot: writes made after the first `step` are not visible
/// until the statement is reset or rebound.
pub struct NativeSqliteStatement {
    conn: SharedConnection,
    sql: String,
    columns: Vec<String>,
    bound: Params,
    pending: VecDeque<Row>,
    executed: bool,
    finalized: bool,
}

impl NativeSqliteStatement {
    pub(crate) fn new(conn: SharedConnection, sql: String, columns: Vec<String>) -> Self {
        Self {
            conn,
            sql,
            columns,
            bound: Params::None,
            pending: VecDeque::new(),
            executed: false,
            finalized: false,
        }
    }

    fn ensure_live(&self) -> Result<(), SqliteDualError> {
        if self.finalized {
            return Err(SqliteDualError::FreedResource(format!(
                "statement has been finalized: {}",
                self.sql
            )));
        }
        Ok(())
    }

    /// Execute with the current bindings, returning the produced rows and the change count.
    fn execute(&self) -> Result<(Vec<Row>, usize), SqliteDualError> {
        with_connection(&self.conn, |conn| {
            let mut stmt = conn
                .prepare_cached(&self.sql)
                .map_err(|err| SqliteDualError::from_rusqlite(err, EnginePhase::Prepare))?;
            apply_bindings(&mut stmt, &self.bound)?;
            if stmt.column_count() == 0 {
                let changed = stmt.raw_execute()?;
                Ok((Vec::new(), changed))
            } else {
                let rows = collect_rows(&mut stmt)?;
                let changed = usize::try_from(conn.changes()).map_err(|err| {
                    SqliteDualError::ExecutionError(format!("change count out of range: {err}"))
                })?;
                Ok((rows, changed))
            }
        })
    }
}

impl NativeStatement for NativeSqliteStatement {
    fn column_names(&mut self) -> Result<Vec<String>, SqliteDualError> {
        self.ensure_live()?;
        with_connection(&self.conn, |_| Ok(self.columns.clone()))
    }

    fn bind(&mut self, params: &Params) -> Result<(), SqliteDualError> {
        self.ensure_live()?;
        with_connection(&self.conn, |conn| {
            let mut stmt = conn
                .prepare_cached(&self.sql)
                .map_err(|err| SqliteDualError::from_rusqlite(err, EnginePhase::Prepare))?;
            apply_bindings(&mut stmt, params)
        })?;
        self.bound = params.clone();
        self.pending.clear();
        self.executed = false;
        Ok(())
    }

    /// The first call executes and buffers the whole result; later calls pop from the buffer.
    fn step(&mut self) -> Result<Option<Row>, SqliteDualError> {
        self.ensure_live()?;
        if !self.executed {
            let (rows, _) = self.execute()?;
            self.pending = rows.into();
            self.executed = true;
        }
        Ok(self.pending.pop_front())
    }

    fn run(&mut self) -> Result<usize, SqliteDualError> {
        self.ensure_live()?;
        let (_, changed) = self.execute()?;
        self.pending.clear();
        self.executed = true;
        Ok(changed)
    }

    fn reset(&mut self) -> Result<(), SqliteDualError> {
        self.ensure_live()?;
        with_connection(&self.conn, |_| Ok(()))?;
        self.bound = Params::None;
        self.pending.clear();
        self.executed = false;
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), SqliteDualError> {
        self.finalized = true;
        self.pending.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::backend::Backend;
    use crate::native::NativeBackend;
    use crate::types::{Params, RowValues};

    #[test]
    fn binds_positional_and_named_parameters() {
        let mut backend = NativeBackend::open(None).unwrap();
        backend
            .exec_sql("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)")
            .unwrap();

        let mut insert = backend.prepare("INSERT INTO users (id, name) VALUES (?, ?)").unwrap();
        insert
            .bind(&Params::from(vec![RowValues::Int(1), RowValues::from("alice")]))
            .unwrap();
        assert_eq!(insert.run().unwrap(), 1);

        let mut named = backend.prepare("INSERT INTO users (id, name) VALUES (:id, $name)").unwrap();
        named
            .bind(&Params::named([("id", RowValues::Int(2)), ("name", RowValues::from("bob"))]))
            .unwrap();
        assert_eq!(named.run().unwrap(), 1);

        let mut select = backend.prepare("SELECT name FROM users ORDER BY id").unwrap();
        assert_eq!(select.column_names().unwrap(), vec!["name".to_string()]);
        assert_eq!(select.step().unwrap(), Some(vec![RowValues::from("alice")]));
        assert_eq!(select.step().unwrap(), Some(vec![RowValues::from("bob")]));
        assert_eq!(select.step().unwrap(), None);
    }

    #[test]
    fn rejects_unknown_names_and_extra_values() {
        let mut backend = NativeBackend::open(None).unwrap();
        let mut stmt = backend.prepare("SELECT :a").unwrap();
        assert!(stmt.bind(&Params::named([("b", RowValues::Int(1))])).is_err());
        assert!(
            stmt.bind(&Params::from(vec![RowValues::Int(1), RowValues::Int(2)]))
                .is_err()
        );
    }

    #[test]
    fn statements_fail_once_the_backend_is_closed() {
        let mut backend = NativeBackend::open(None).unwrap();
        let mut stmt = backend.prepare("SELECT 1").unwrap();
        backend.close().unwrap();
        assert!(stmt.step().unwrap_err().is_closed());
        assert!(stmt.finalize().is_ok());
    }

    #[test]
    fn stepping_yields_a_snapshot_taken_on_the_first_step() {
        let mut backend = NativeBackend::open(None).unwrap();
        backend
            .exec_sql("CREATE TABLE t (id INTEGER); INSERT INTO t VALUES (1), (2);")
            .unwrap();

        let mut select = backend.prepare("SELECT id FROM t ORDER BY id").unwrap();
        assert_eq!(select.step().unwrap(), Some(vec![RowValues::Int(1)]));
        backend.exec_sql("INSERT INTO t VALUES (3)").unwrap();
        assert_eq!(select.step().unwrap(), Some(vec![RowValues::Int(2)]));
        assert_eq!(select.step().unwrap(), None);

        select.reset().unwrap();
        let mut seen = Vec::new();
        while let Some(row) = select.step().unwrap() {
            seen.push(row);
        }
        assert_eq!(seen.len(), 3);
    }
}
