//! The public face of the crate: one backend plus the statement cache, transaction
//! manager, and batch processor bound to it.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::backend::{self, Backend, BackendRegistry, BackendType};
use crate::batch::{BatchProcessor, StatementSource};
use crate::cache::{CacheStats, StatementCache, StatementId};
use crate::clock::Clock;
use crate::config::DatabaseOptions;
use crate::error::SqliteDualError;
use crate::pragma::PragmaOptimizer;
use crate::results::{QueryExecResult, RowObject};
use crate::statement::Statement;
use crate::transaction::{TransactionHost, TransactionManager, run_in_transaction};
use crate::types::Params;

/// An open SQLite database on one of the two engines.
///
/// ```rust,no_run
/// use sqlite_dual::prelude::*;
///
/// # async fn demo() -> Result<(), SqliteDualError> {
/// let registry = BackendRegistry::new();
/// let mut db = Database::open(&registry, DatabaseOptions::default()).await?;
/// db.exec_sql("CREATE TABLE kv (k TEXT PRIMARY KEY, v TEXT)")?;
/// db.run("INSERT INTO kv VALUES (?, ?)", vec![RowValues::from("a"), RowValues::from("1")])?;
/// let rows = db.query("SELECT v FROM kv WHERE k = :k", Params::named([("k", "a")]))?;
/// assert_eq!(rows[0].get("v").and_then(RowValues::as_text), Some("1"));
/// let image = db.export_db()?;
/// db.close()?;
/// # let _ = image;
/// # Ok(())
/// # }
/// ```
pub struct Database {
    backend: Box<dyn Backend + Send>,
    cache: StatementCache,
    transactions: TransactionManager,
    batch: BatchProcessor,
    closed: bool,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("backend", &self.backend.backend_type())
            .field("closed", &self.closed)
            .field("transaction_depth", &self.transactions.depth())
            .field("cache", &self.cache.get_stats())
            .finish()
    }
}

impl Database {
    /// Open an empty database on the forced or detected backend.
    ///
    /// # Errors
    ///
    /// `ConfigError` for invalid options, `BackendUnavailable` if the forced backend cannot
    /// be used, or any error raised while applying pragmas.
    pub async fn open(
        registry: &BackendRegistry,
        options: DatabaseOptions,
    ) -> Result<Self, SqliteDualError> {
        options.validate()?;
        let backend = registry.create(options.force_backend, None).await?;
        Self::from_backend(backend, &options)
    }

    /// Open a database seeded from an exported image. Zero bytes open an empty database.
    ///
    /// # Errors
    ///
    /// `InvalidFormat` if `bytes` is not a SQLite database image, plus the errors of
    /// [`Database::open`].
    pub async fn open_from_bytes(
        registry: &BackendRegistry,
        options: DatabaseOptions,
        bytes: &[u8],
    ) -> Result<Self, SqliteDualError> {
        options.validate()?;
        let backend = registry.create(options.force_backend, Some(bytes)).await?;
        Self::from_backend(backend, &options)
    }

    /// Wrap an already opened backend, applying the configured pragmas.
    ///
    /// # Errors
    ///
    /// `ConfigError` for invalid options, or the first pragma failure.
    pub fn from_backend(
        mut backend: Box<dyn Backend + Send>,
        options: &DatabaseOptions,
    ) -> Result<Self, SqliteDualError> {
        options.validate()?;
        PragmaOptimizer::new(options.pragmas.clone()).apply(backend.as_mut())?;
        debug!(backend = %backend.backend_type(), "database ready");
        Ok(Self {
            backend,
            cache: StatementCache::new(options.cache_size, options.cache_ttl_ms),
            transactions: TransactionManager::new(),
            batch: BatchProcessor::new(options.batch_size),
            closed: false,
        })
    }

    /// Swap the statement cache's clock, dropping anything cached so far.
    #[must_use]
    pub fn with_cache_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        let (max_size, ttl_ms) = (self.cache.max_size(), self.cache.ttl_ms());
        self.cache = StatementCache::with_clock(max_size, ttl_ms, clock);
        self
    }

    fn ensure_open(&self) -> Result<(), SqliteDualError> {
        backend::ensure_open(self.closed, "database")
    }

    #[must_use]
    pub fn backend_type(&self) -> BackendType {
        self.backend.backend_type()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Run one or more `;`-separated statements without parameters.
    ///
    /// # Errors
    ///
    /// `ClosedResource` after close, `SqlSyntax`, or the engine's error.
    pub fn exec_sql(&mut self, sql: &str) -> Result<Vec<QueryExecResult>, SqliteDualError> {
        self.ensure_open()?;
        self.backend.exec_sql(sql)
    }

    /// Prepare, bind, execute to completion, and free one statement. Not cached.
    ///
    /// # Errors
    ///
    /// `ClosedResource` after close, `SqlSyntax`, `ParameterError`, or the engine's error.
    pub fn run(&mut self, sql: &str, params: impl Into<Params>) -> Result<usize, SqliteDualError> {
        let mut statement = self.prepare_uncached(sql)?;
        let outcome = statement.bind(params).and_then(|_| statement.run());
        let freed = statement.free();
        let changed = outcome?;
        freed?;
        Ok(changed)
    }

    /// Prepare through the statement cache and return a handle to the cached statement.
    ///
    /// A cached statement is reset before it is handed out again. One that was freed through
    /// its handle is discarded and compiled afresh.
    ///
    /// # Errors
    ///
    /// `ClosedResource` after close, or `SqlSyntax`.
    pub fn prepare(&mut self, sql: &str) -> Result<StatementId, SqliteDualError> {
        self.ensure_open()?;
        if let Some(id) = self.cache.get(sql) {
            if let Some(statement) = self.cache.statement_mut(id)
                && !statement.is_freed()
            {
                statement.reset()?;
                return Ok(id);
            }
            debug!(sql, "discarding stale cached statement");
            self.cache.delete(sql);
        }
        let statement = self.prepare_uncached(sql)?;
        Ok(self.cache.set(sql, statement))
    }

    /// The cached statement behind `id`.
    ///
    /// # Errors
    ///
    /// `ClosedResource` after close, `FreedResource` if the handle was evicted or released.
    pub fn statement(&mut self, id: StatementId) -> Result<&mut Statement, SqliteDualError> {
        self.ensure_open()?;
        self.cache.statement_mut(id).ok_or_else(|| {
            SqliteDualError::FreedResource("statement handle is no longer cached".into())
        })
    }

    /// Prepare a statement the caller owns and must free.
    ///
    /// # Errors
    ///
    /// `ClosedResource` after close, or `SqlSyntax`.
    pub fn prepare_uncached(&mut self, sql: &str) -> Result<Statement, SqliteDualError> {
        self.ensure_open()?;
        let native = self.backend.prepare(sql)?;
        Ok(Statement::new(sql, native))
    }

    /// Run a cached statement with `params` and collect every row keyed by column name.
    ///
    /// # Errors
    ///
    /// `ClosedResource` after close, `SqlSyntax`, `ParameterError`, or the engine's error.
    pub fn query(
        &mut self,
        sql: &str,
        params: impl Into<Params>,
    ) -> Result<Vec<RowObject>, SqliteDualError> {
        let id = self.prepare(sql)?;
        let statement = self.statement(id)?;
        let outcome = collect_objects(statement, params.into());
        if let Err(err) = statement.reset() {
            warn!(sql, error = %err, "failed to reset cached statement after query");
        }
        outcome
    }

    /// Drop a cached statement and free it. Returns whether the handle was still cached.
    ///
    /// # Errors
    ///
    /// `ClosedResource` after close.
    pub fn free_statement(&mut self, id: StatementId) -> Result<bool, SqliteDualError> {
        self.ensure_open()?;
        Ok(self.cache.release(id))
    }

    /// Serialize the committed database to a SQLite file image.
    ///
    /// # Errors
    ///
    /// `ClosedResource` after close, `ExecutionError` inside a transaction, or an I/O error.
    pub fn export_db(&mut self) -> Result<Vec<u8>, SqliteDualError> {
        self.ensure_open()?;
        if self.transactions.in_transaction() {
            return Err(SqliteDualError::ExecutionError(
                "cannot export while a transaction is open".into(),
            ));
        }
        self.backend.export_db()
    }

    /// Free every cached statement and close the backend. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns the backend's error if it fails to shut down; the database counts as closed
    /// regardless.
    pub fn close(&mut self) -> Result<(), SqliteDualError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.cache.clear();
        self.backend.close()
    }

    /// Insert every row atomically with one statement. Returns the number of rows inserted.
    ///
    /// # Errors
    ///
    /// `ClosedResource` after close, or the first row's error (nothing stays inserted).
    pub fn bulk_insert<R>(&mut self, sql: &str, rows: &[R]) -> Result<usize, SqliteDualError>
    where
        R: Clone + Into<Params>,
    {
        self.ensure_open()?;
        let batch = self.batch;
        batch.bulk_insert(self, sql, rows)
    }

    /// Insert rows in chunks, each chunk atomic on its own. `None` uses the configured size.
    ///
    /// # Errors
    ///
    /// `ClosedResource` after close, or the first failing chunk's error; earlier chunks stay
    /// committed.
    pub fn bulk_insert_batched<R>(
        &mut self,
        sql: &str,
        rows: &[R],
        batch_size: Option<usize>,
    ) -> Result<usize, SqliteDualError>
    where
        R: Clone + Into<Params>,
    {
        self.ensure_open()?;
        let batch = self.batch;
        batch.bulk_insert_batched(self, sql, rows, batch_size)
    }

    /// Run `f` transactionally. Nested calls become savepoints.
    ///
    /// # Errors
    ///
    /// `ClosedResource` after close, `f`'s error after rolling back, or a failing control
    /// statement.
    pub fn transaction<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Database) -> Result<T, E>,
        E: From<SqliteDualError>,
    {
        self.ensure_open()?;
        run_in_transaction(self, f)
    }

    #[must_use]
    pub fn transaction_depth(&self) -> usize {
        self.transactions.depth()
    }

    /// # Errors
    ///
    /// `ClosedResource` after close.
    pub fn get_cache_stats(&self) -> Result<CacheStats, SqliteDualError> {
        self.ensure_open()?;
        Ok(self.cache.get_stats())
    }

    /// Evict every cached statement idle for longer than the TTL.
    ///
    /// # Errors
    ///
    /// `ClosedResource` after close.
    pub fn purge_expired_statements(&mut self) -> Result<usize, SqliteDualError> {
        self.ensure_open()?;
        Ok(self.cache.purge_expired())
    }
}

fn collect_objects(statement: &mut Statement, params: Params) -> Result<Vec<RowObject>, SqliteDualError> {
    statement.bind(params)?;
    let mut rows = Vec::new();
    while let Some(row) = statement.get_as_object(None)? {
        rows.push(row);
    }
    Ok(rows)
}

impl TransactionHost for Database {
    fn transaction_manager(&mut self) -> &mut TransactionManager {
        &mut self.transactions
    }

    fn execute_control(&mut self, sql: &str) -> Result<(), SqliteDualError> {
        self.exec_sql(sql).map(|_| ())
    }
}

impl StatementSource for Database {
    fn prepare_statement(&mut self, sql: &str) -> Result<Statement, SqliteDualError> {
        self.prepare_uncached(sql)
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(error = %err, "failed to close database on drop");
        }
    }
}
