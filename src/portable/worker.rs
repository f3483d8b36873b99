//! Dedicated thread that owns the Turso database, its connection, and every compiled
//! statement. The engine's API is async; the worker drives it on a private current-thread
//! runtime so callers can stay synchronous.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::thread::{self, JoinHandle};

use tokio::sync::oneshot;
use tracing::{debug, error};

use crate::error::{EnginePhase, SqliteDualError};
use crate::results::{QueryExecResult, Row};
use crate::sql_text::split_statements;

use super::journal::{Control, TransactionJournal, is_write};
use super::params::turso_value_to_row_value;

type Reply<T> = SyncSender<Result<T, SqliteDualError>>;

/// Column names of a freshly compiled statement, plus the worker-side id addressing it.
pub(crate) struct PreparedInfo {
    pub id: u64,
    pub columns: Vec<String>,
}

pub(crate) enum Command {
    ExecSql {
        sql: String,
        respond_to: Reply<Vec<QueryExecResult>>,
    },
    Prepare {
        sql: String,
        respond_to: Reply<PreparedInfo>,
    },
    Start {
        id: u64,
        params: Vec<turso::Value>,
        respond_to: Reply<()>,
    },
    Next {
        id: u64,
        respond_to: Reply<Option<Row>>,
    },
    Run {
        id: u64,
        params: Vec<turso::Value>,
        respond_to: Reply<usize>,
    },
    Reset {
        id: u64,
        respond_to: Reply<()>,
    },
    Finalize {
        id: u64,
    },
    Export {
        respond_to: Reply<Vec<u8>>,
    },
    Shutdown,
}

/// Caller side of the worker channel.
pub(crate) struct WorkerClient {
    sender: Sender<Command>,
}

impl WorkerClient {
    fn send_command(&self, command: Command) -> Result<(), SqliteDualError> {
        self.sender
            .send(command)
            .map_err(|_| SqliteDualError::ConnectionError("portable worker closed".into()))
    }

    /// Send a command and block until the worker answers.
    pub(crate) fn request<T>(
        &self,
        what: &str,
        build: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, SqliteDualError> {
        let (tx, rx) = mpsc::sync_channel(1);
        self.send_command(build(tx))?;
        rx.recv().map_err(|_| {
            SqliteDualError::ConnectionError(format!("portable worker dropped while {what}"))
        })?
    }

    /// Fire-and-forget; used for releasing statements, where nobody waits on the outcome.
    pub(crate) fn notify(&self, command: Command) {
        let _ = self.send_command(command);
    }
}

/// Spawn the worker for the database file at `path`.
///
/// The returned receiver resolves once the engine has opened the file (or failed to).
pub(crate) fn spawn(
    path: PathBuf,
) -> Result<
    (
        WorkerClient,
        JoinHandle<()>,
        oneshot::Receiver<Result<(), SqliteDualError>>,
    ),
    SqliteDualError,
> {
    let (sender, receiver) = mpsc::channel::<Command>();
    let (ready_tx, ready_rx) = oneshot::channel();
    let handle = thread::Builder::new()
        .name("sqlite-dual-portable".into())
        .spawn(move || run_worker(&path, &receiver, ready_tx))
        .map_err(|err| {
            SqliteDualError::ConnectionError(format!(
                "failed to spawn portable worker thread: {err}"
            ))
        })?;
    Ok((WorkerClient { sender }, handle, ready_rx))
}

fn engine_error(phase: EnginePhase) -> impl Fn(turso::Error) -> SqliteDualError {
    move |err| SqliteDualError::from_engine_message(err.to_string(), phase)
}

struct StatementSlot {
    stmt: turso::Statement,
    sql: String,
    rows: Option<turso::Rows>,
    /// Bindings of an in-flight `Start`, journaled once its rows are exhausted.
    pending: Option<Vec<turso::Value>>,
    writes: bool,
    yields_rows: bool,
}

struct WorkerState {
    path: PathBuf,
    _db: turso::Database,
    conn: turso::Connection,
    statements: HashMap<u64, StatementSlot>,
    next_id: u64,
    journal: TransactionJournal,
}

impl WorkerState {
    async fn open(path: &Path) -> Result<Self, SqliteDualError> {
        let path_str = path.to_str().ok_or_else(|| {
            SqliteDualError::ConnectionError(format!(
                "database path is not valid UTF-8: {}",
                path.display()
            ))
        })?;
        let db = turso::Builder::new_local(path_str)
            .build()
            .await
            .map_err(engine_error(EnginePhase::Open))?;
        let conn = db.connect().map_err(engine_error(EnginePhase::Open))?;
        Ok(Self {
            path: path.to_path_buf(),
            _db: db,
            conn,
            statements: HashMap::new(),
            next_id: 0,
            journal: TransactionJournal::default(),
        })
    }

    fn slot(&mut self, id: u64) -> Result<&mut StatementSlot, SqliteDualError> {
        self.statements.get_mut(&id).ok_or_else(|| {
            SqliteDualError::FreedResource(format!("portable statement {id} has been finalized"))
        })
    }

    fn in_transaction(&self) -> Result<bool, SqliteDualError> {
        self.conn
            .is_autocommit()
            .map(|autocommit| !autocommit)
            .map_err(engine_error(EnginePhase::Execute))
    }

    /// Drop the journal if the engine has already left the transaction, e.g. after an
    /// error that rolled it back.
    fn sync_journal(&mut self) -> Result<(), SqliteDualError> {
        if self.journal.is_active() && !self.in_transaction()? {
            debug!("transaction ended inside the engine; discarding savepoint journal");
            self.journal.clear();
        }
        Ok(())
    }

    /// Journal a completed write while a transaction is open.
    fn record(&mut self, sql: String, params: Vec<turso::Value>) -> Result<(), SqliteDualError> {
        self.sync_journal()?;
        self.journal.record(sql, params);
        Ok(())
    }

    /// Compile and run one statement to completion, collecting whatever rows it yields.
    ///
    /// Some statements report no result columns yet still produce a row
    /// (`PRAGMA wal_checkpoint`), so rows are always drained rather than executed.
    async fn run_to_completion(
        &self,
        sql: &str,
        params: Vec<turso::Value>,
    ) -> Result<QueryExecResult, SqliteDualError> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .await
            .map_err(engine_error(EnginePhase::Prepare))?;
        let columns = stmt.columns().iter().map(|c| c.name().to_string()).collect();
        let rows = stmt
            .query(turso::params::Params::Positional(params))
            .await
            .map_err(engine_error(EnginePhase::Execute))?;
        let mut result = QueryExecResult::new(columns);
        for row in drain_rows(rows).await? {
            result.push_row(row);
        }
        Ok(result)
    }

    async fn exec_sql(&mut self, sql: &str) -> Result<Vec<QueryExecResult>, SqliteDualError> {
        let mut results = Vec::new();
        for statement_sql in split_statements(sql) {
            self.sync_journal()?;
            match Control::parse(statement_sql) {
                Some(Control::Savepoint(name)) => self.savepoint(name).await?,
                Some(Control::Release(name)) => self.release(&name).await?,
                Some(Control::RollbackTo(name)) => self.rollback_to(&name).await?,
                control => {
                    let result = self.run_to_completion(statement_sql, Vec::new()).await?;
                    match control {
                        Some(Control::Begin) => self.journal.begin(statement_sql),
                        Some(Control::Commit | Control::Rollback) => self.journal.clear(),
                        _ if is_write(statement_sql) => {
                            self.record(statement_sql.to_string(), Vec::new())?;
                        }
                        _ => {}
                    }
                    if !result.columns.is_empty() {
                        results.push(result);
                    }
                }
            }
        }
        Ok(results)
    }

    async fn savepoint(&mut self, name: String) -> Result<(), SqliteDualError> {
        let opened = !self.in_transaction()?;
        if opened {
            self.run_to_completion("BEGIN", Vec::new()).await?;
            self.journal.begin("BEGIN");
        }
        debug!(savepoint = %name, depth = self.journal.savepoint_depth() + 1, "savepoint");
        self.journal.push_savepoint(name, opened);
        Ok(())
    }

    async fn release(&mut self, name: &str) -> Result<(), SqliteDualError> {
        let opened = self.journal.release(name).ok_or_else(|| no_such_savepoint(name))?;
        if opened {
            self.run_to_completion("COMMIT", Vec::new()).await?;
            self.journal.clear();
        }
        Ok(())
    }

    /// Roll the engine back to `name` by restarting the transaction and replaying every
    /// write journaled before the savepoint.
    async fn rollback_to(&mut self, name: &str) -> Result<(), SqliteDualError> {
        let restore = self
            .journal
            .rollback_to(name)
            .ok_or_else(|| no_such_savepoint(name))?;
        for slot in self.statements.values_mut() {
            slot.rows = None;
            slot.pending = None;
            slot.stmt.reset();
        }
        if self.in_transaction()? {
            self.run_to_completion("ROLLBACK", Vec::new()).await?;
        }
        self.run_to_completion(&restore.begin_sql, Vec::new()).await?;
        debug!(savepoint = name, replayed = restore.replay.len(), "rolled back to savepoint");
        for entry in restore.replay {
            if let Err(err) = self.run_to_completion(&entry.sql, entry.params).await {
                self.journal.clear();
                if self.in_transaction()? {
                    self.run_to_completion("ROLLBACK", Vec::new()).await?;
                }
                return Err(SqliteDualError::ExecutionError(format!(
                    "failed to restore savepoint {name}; transaction rolled back: {err}"
                )));
            }
        }
        Ok(())
    }

    async fn prepare(&mut self, sql: &str) -> Result<PreparedInfo, SqliteDualError> {
        let stmt = self
            .conn
            .prepare(sql)
            .await
            .map_err(engine_error(EnginePhase::Prepare))?;
        let columns: Vec<String> = stmt.columns().iter().map(|c| c.name().to_string()).collect();
        let id = self.next_id;
        self.next_id += 1;
        self.statements.insert(
            id,
            StatementSlot {
                stmt,
                sql: sql.to_string(),
                rows: None,
                pending: None,
                writes: is_write(sql),
                yields_rows: !columns.is_empty(),
            },
        );
        Ok(PreparedInfo { id, columns })
    }

    async fn start(&mut self, id: u64, params: Vec<turso::Value>) -> Result<(), SqliteDualError> {
        let slot = self.slot(id)?;
        slot.rows = None;
        slot.stmt.reset();
        slot.pending = slot.writes.then(|| params.clone());
        let rows = slot
            .stmt
            .query(turso::params::Params::Positional(params))
            .await
            .map_err(engine_error(EnginePhase::Execute))?;
        slot.rows = Some(rows);
        Ok(())
    }

    async fn next(&mut self, id: u64) -> Result<Option<Row>, SqliteDualError> {
        let slot = self.slot(id)?;
        let Some(rows) = slot.rows.as_mut() else {
            return Ok(None);
        };
        let stepped = rows.next().await;
        let next = match stepped {
            Ok(next) => next,
            Err(err) => {
                slot.rows = None;
                slot.pending = None;
                return Err(engine_error(EnginePhase::Execute)(err));
            }
        };
        match next {
            Some(row) => Ok(Some(convert_row(&row)?)),
            None => {
                slot.rows = None;
                if let Some(params) = slot.pending.take() {
                    let sql = slot.sql.clone();
                    self.record(sql, params)?;
                }
                Ok(None)
            }
        }
    }

    async fn run(&mut self, id: u64, params: Vec<turso::Value>) -> Result<usize, SqliteDualError> {
        let slot = self.slot(id)?;
        slot.rows = None;
        slot.pending = None;
        slot.stmt.reset();
        let positional = turso::params::Params::Positional(params.clone());
        let outcome = if slot.yields_rows {
            match slot.stmt.query(positional).await {
                Ok(rows) => drain_rows(rows).await.map(|_| 0),
                Err(err) => Err(engine_error(EnginePhase::Execute)(err)),
            }
        } else {
            slot.stmt
                .execute(positional)
                .await
                .map_err(engine_error(EnginePhase::Execute))
        };
        slot.stmt.reset();
        let affected = outcome?;
        if slot.writes {
            let sql = slot.sql.clone();
            self.record(sql, params)?;
        }
        usize::try_from(affected).map_err(|e| {
            SqliteDualError::ExecutionError(format!("Turso affected rows conversion error: {e}"))
        })
    }

    fn reset(&mut self, id: u64) -> Result<(), SqliteDualError> {
        let slot = self.slot(id)?;
        slot.rows = None;
        slot.pending = None;
        slot.stmt.reset();
        Ok(())
    }

    async fn export(&mut self) -> Result<Vec<u8>, SqliteDualError> {
        if self.in_transaction()? {
            return Err(SqliteDualError::ExecutionError(
                "cannot export while a transaction is open".into(),
            ));
        }
        if is_blank_file(&self.path)? && is_blank_file(&wal_path(&self.path))? {
            return Ok(Vec::new());
        }
        let counted = self
            .run_to_completion("SELECT count(*) FROM sqlite_master", Vec::new())
            .await?;
        let objects = counted
            .values
            .first()
            .and_then(|row| row.first())
            .and_then(|value| value.as_int().copied())
            .unwrap_or(0);
        if objects == 0 {
            return Ok(Vec::new());
        }
        self.run_to_completion("PRAGMA wal_checkpoint(TRUNCATE)", Vec::new())
            .await?;
        Ok(std::fs::read(&self.path)?)
    }
}

fn no_such_savepoint(name: &str) -> SqliteDualError {
    SqliteDualError::ExecutionError(format!("no such savepoint: {name}"))
}

fn wal_path(path: &Path) -> PathBuf {
    let mut wal = path.as_os_str().to_owned();
    wal.push("-wal");
    PathBuf::from(wal)
}

/// Missing or zero-length; the engine has never written a page to it.
fn is_blank_file(path: &Path) -> Result<bool, SqliteDualError> {
    match std::fs::metadata(path) {
        Ok(meta) => Ok(meta.len() == 0),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(true),
        Err(err) => Err(err.into()),
    }
}

async fn drain_rows(mut rows: turso::Rows) -> Result<Vec<Row>, SqliteDualError> {
    let mut collected = Vec::new();
    while let Some(row) = rows.next().await.map_err(engine_error(EnginePhase::Execute))? {
        collected.push(convert_row(&row)?);
    }
    Ok(collected)
}

fn convert_row(row: &turso::Row) -> Result<Row, SqliteDualError> {
    (0..row.column_count())
        .map(|idx| {
            row.get_value(idx)
                .map(turso_value_to_row_value)
                .map_err(engine_error(EnginePhase::Execute))
        })
        .collect()
}

/// Run one command, turning an engine panic into an error reply. After a panic the
/// connection state is unknown, so every later command fails fast.
fn guarded<T>(
    poisoned: &mut Option<String>,
    op: impl FnOnce() -> Result<T, SqliteDualError>,
) -> Result<T, SqliteDualError> {
    if let Some(reason) = poisoned {
        return Err(SqliteDualError::ConnectionError(format!(
            "portable engine is unusable after an earlier panic: {reason}"
        )));
    }
    match panic::catch_unwind(AssertUnwindSafe(op)) {
        Ok(result) => result,
        Err(payload) => {
            let reason = panic_message(payload.as_ref());
            error!(reason = %reason, "portable engine panicked");
            *poisoned = Some(reason.clone());
            Err(SqliteDualError::ConnectionError(format!(
                "portable engine panicked: {reason}"
            )))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".into())
}

fn run_worker(
    path: &Path,
    receiver: &Receiver<Command>,
    ready: oneshot::Sender<Result<(), SqliteDualError>>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            let _ = ready.send(Err(SqliteDualError::ConnectionError(format!(
                "failed to build portable worker runtime: {err}"
            ))));
            return;
        }
    };

    let mut state = match runtime.block_on(WorkerState::open(path)) {
        Ok(state) => {
            let _ = ready.send(Ok(()));
            state
        }
        Err(err) => {
            let _ = ready.send(Err(err));
            return;
        }
    };

    let mut poisoned = None;
    while let Ok(command) = receiver.recv() {
        match command {
            Command::ExecSql { sql, respond_to } => {
                let reply = guarded(&mut poisoned, || runtime.block_on(state.exec_sql(&sql)));
                let _ = respond_to.send(reply);
            }
            Command::Prepare { sql, respond_to } => {
                let reply = guarded(&mut poisoned, || runtime.block_on(state.prepare(&sql)));
                let _ = respond_to.send(reply);
            }
            Command::Start {
                id,
                params,
                respond_to,
            } => {
                let reply = guarded(&mut poisoned, || runtime.block_on(state.start(id, params)));
                let _ = respond_to.send(reply);
            }
            Command::Next { id, respond_to } => {
                let reply = guarded(&mut poisoned, || runtime.block_on(state.next(id)));
                let _ = respond_to.send(reply);
            }
            Command::Run {
                id,
                params,
                respond_to,
            } => {
                let reply = guarded(&mut poisoned, || runtime.block_on(state.run(id, params)));
                let _ = respond_to.send(reply);
            }
            Command::Reset { id, respond_to } => {
                let _ = respond_to.send(guarded(&mut poisoned, || state.reset(id)));
            }
            Command::Finalize { id } => {
                let _ = guarded(&mut poisoned, || {
                    state.statements.remove(&id);
                    Ok(())
                });
            }
            Command::Export { respond_to } => {
                let reply = guarded(&mut poisoned, || runtime.block_on(state.export()));
                let _ = respond_to.send(reply);
            }
            Command::Shutdown => break,
        }
    }

    // Dropping statements of a panicked engine may panic again; leak them instead.
    if poisoned.is_some() {
        std::mem::forget(state);
    } else {
        state.statements.clear();
        drop(state);
    }
    debug!(path = %path.display(), "portable worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panics_become_connection_errors_and_poison_the_worker() {
        let mut poisoned = None;
        let first: Result<(), _> = guarded(&mut poisoned, || panic!("page 1 is empty"));
        let err = first.unwrap_err();
        assert!(matches!(err, SqliteDualError::ConnectionError(_)));
        assert!(err.to_string().contains("page 1 is empty"));

        let second = guarded(&mut poisoned, || Ok(1));
        assert!(second.unwrap_err().to_string().contains("earlier panic"));
    }

    #[test]
    fn healthy_commands_pass_through() {
        let mut poisoned = None;
        assert_eq!(guarded(&mut poisoned, || Ok(7)).unwrap(), 7);
        let err = guarded::<()>(&mut poisoned, || {
            Err(SqliteDualError::ExecutionError("no".into()))
        })
        .unwrap_err();
        assert!(matches!(err, SqliteDualError::ExecutionError(_)));
        assert!(poisoned.is_none());
    }

    #[test]
    fn blank_files_are_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.db");
        assert!(is_blank_file(&path).unwrap());
        std::fs::write(&path, b"").unwrap();
        assert!(is_blank_file(&path).unwrap());
        std::fs::write(&path, b"SQLite format 3\0").unwrap();
        assert!(!is_blank_file(&path).unwrap());
        assert_eq!(wal_path(&path), dir.path().join("main.db-wal"));
    }
}
