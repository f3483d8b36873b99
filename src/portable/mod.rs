//! Portable engine: `turso`, a pure-Rust SQLite-compatible database.
//!
//! Turso's API is async while the rest of this crate is synchronous after construction, so
//! the engine runs on a dedicated worker thread (see [`worker`]). Only opening the database
//! awaits; every later call blocks on the worker's reply.

mod journal;
pub mod params;
mod statement;
mod worker;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::backend::{Backend, BackendType, NativeStatement, ensure_open};
use crate::error::SqliteDualError;
use crate::image::validate_image;
use crate::results::QueryExecResult;

pub use statement::PortableStatement;
use worker::{Command, WorkerClient};

const DB_FILE_NAME: &str = "main.db";

/// Pragmas the portable engine does not honour: it always journals through its own WAL,
/// has no memory-mapped I/O, and keeps temporary tables in memory.
const UNSUPPORTED_PRAGMAS: &[&str] = &["journal_mode", "mmap_size", "temp_store"];

pub struct PortableBackend {
    client: Arc<WorkerClient>,
    closed: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    dir: Option<TempDir>,
}

impl PortableBackend {
    /// Open a fresh database, or one seeded from an existing image.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` if `existing` is not a usable SQLite image, or
    /// `ConnectionError` if the worker cannot be started.
    pub async fn open(existing: Option<&[u8]>) -> Result<Self, SqliteDualError> {
        let seed = match existing {
            Some(bytes) if validate_image(bytes)?.is_some() => Some(bytes),
            _ => None,
        };

        let dir = tempfile::Builder::new().prefix("sqlite-dual-portable").tempdir()?;
        let path: PathBuf = dir.path().join(DB_FILE_NAME);
        if let Some(bytes) = seed {
            std::fs::write(&path, bytes)?;
        }

        let (client, thread, ready) = worker::spawn(path.clone())?;
        ready.await.map_err(|_| {
            SqliteDualError::ConnectionError("portable worker exited during startup".into())
        })??;

        let mut backend = Self {
            client: Arc::new(client),
            closed: Arc::new(AtomicBool::new(false)),
            thread: Some(thread),
            dir: Some(dir),
        };
        if seed.is_some() {
            backend
                .exec_sql("SELECT count(*) FROM sqlite_master")
                .map_err(|err| match err {
                    SqliteDualError::ConnectionError(_) | SqliteDualError::InvalidFormat(_) => err,
                    other => SqliteDualError::InvalidFormat(other.to_string()),
                })?;
        }
        debug!(path = %path.display(), seeded = seed.is_some(), "opened portable backend");
        Ok(backend)
    }
}

impl Backend for PortableBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Portable
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn exec_sql(&mut self, sql: &str) -> Result<Vec<QueryExecResult>, SqliteDualError> {
        ensure_open(self.is_closed(), "portable backend")?;
        let sql = sql.to_owned();
        self.client
            .request("executing SQL", |respond_to| Command::ExecSql { sql, respond_to })
    }

    fn prepare(&mut self, sql: &str) -> Result<Box<dyn NativeStatement + Send>, SqliteDualError> {
        ensure_open(self.is_closed(), "portable backend")?;
        let owned = sql.to_owned();
        let info = self.client.request("preparing a statement", |respond_to| Command::Prepare {
            sql: owned,
            respond_to,
        })?;
        Ok(Box::new(PortableStatement::new(
            Arc::clone(&self.client),
            Arc::clone(&self.closed),
            info.id,
            sql.to_owned(),
            info.columns,
        )))
    }

    fn export_db(&mut self) -> Result<Vec<u8>, SqliteDualError> {
        ensure_open(self.is_closed(), "portable backend")?;
        self.client
            .request("exporting the database", |respond_to| Command::Export { respond_to })
    }

    fn close(&mut self) -> Result<(), SqliteDualError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.client.notify(Command::Shutdown);
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            warn!("portable worker panicked during shutdown");
        }
        // Worker has released the file; the directory can go now.
        self.dir.take();
        debug!("closed portable backend");
        Ok(())
    }

    fn supports_pragma(&self, name: &str) -> bool {
        !UNSUPPORTED_PRAGMAS.contains(&name)
    }
}

impl Drop for PortableBackend {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
