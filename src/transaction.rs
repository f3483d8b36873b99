//! Nested transactions: `BEGIN IMMEDIATE`/`COMMIT`/`ROLLBACK` at the outermost level and
//! uniquely named savepoints below it.

use tracing::warn;

use crate::error::SqliteDualError;

/// Nesting depth and savepoint numbering for one database.
#[derive(Debug, Default)]
pub struct TransactionManager {
    depth: usize,
    savepoint_counter: u64,
}

impl TransactionManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of transactions currently open (0 = none).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.depth > 0
    }

    /// Savepoints created so far. Never reset, so names stay unique for the manager's life.
    #[must_use]
    pub fn savepoint_counter(&self) -> u64 {
        self.savepoint_counter
    }

    fn next_savepoint(&mut self) -> String {
        self.savepoint_counter += 1;
        format!("sp_{}", self.savepoint_counter)
    }
}

/// Whatever owns a [`TransactionManager`] and can run control statements against its engine.
pub trait TransactionHost {
    fn transaction_manager(&mut self) -> &mut TransactionManager;

    /// Run a transaction control statement (`BEGIN`, `SAVEPOINT`, ...).
    ///
    /// # Errors
    /// Returns the engine's error.
    fn execute_control(&mut self, sql: &str) -> Result<(), SqliteDualError>;
}

/// Run `f` inside a transaction on `host`.
///
/// At depth 0 this opens `BEGIN IMMEDIATE` and commits when `f` succeeds; deeper calls
/// use a savepoint that is released on success. When `f` fails, its work is rolled back and
/// its error is returned unchanged. Failures of the rollback statements themselves are
/// logged and never replace the original error.
///
/// # Errors
///
/// Returns `f`'s error, or the error of a failed `BEGIN`/`SAVEPOINT`/`COMMIT`/`RELEASE`.
pub fn run_in_transaction<H, T, E, F>(host: &mut H, f: F) -> Result<T, E>
where
    H: TransactionHost + ?Sized,
    F: FnOnce(&mut H) -> Result<T, E>,
    E: From<SqliteDualError>,
{
    if host.transaction_manager().depth == 0 {
        run_outermost(host, f)
    } else {
        run_nested(host, f)
    }
}

fn run_outermost<H, T, E, F>(host: &mut H, f: F) -> Result<T, E>
where
    H: TransactionHost + ?Sized,
    F: FnOnce(&mut H) -> Result<T, E>,
    E: From<SqliteDualError>,
{
    host.execute_control("BEGIN IMMEDIATE")?;
    host.transaction_manager().depth += 1;
    let outcome = f(host);
    host.transaction_manager().depth -= 1;

    match outcome {
        Ok(value) => match host.execute_control("COMMIT") {
            Ok(()) => Ok(value),
            Err(err) => {
                cleanup(host, "ROLLBACK");
                Err(err.into())
            }
        },
        Err(err) => {
            cleanup(host, "ROLLBACK");
            Err(err)
        }
    }
}

fn run_nested<H, T, E, F>(host: &mut H, f: F) -> Result<T, E>
where
    H: TransactionHost + ?Sized,
    F: FnOnce(&mut H) -> Result<T, E>,
    E: From<SqliteDualError>,
{
    let name = host.transaction_manager().next_savepoint();
    host.execute_control(&format!("SAVEPOINT {name}"))?;
    host.transaction_manager().depth += 1;
    let outcome = f(host);
    host.transaction_manager().depth -= 1;

    match outcome {
        Ok(value) => {
            host.execute_control(&format!("RELEASE {name}"))?;
            Ok(value)
        }
        Err(err) => {
            cleanup(host, &format!("ROLLBACK TO {name}"));
            cleanup(host, &format!("RELEASE {name}"));
            Err(err)
        }
    }
}

fn cleanup<H: TransactionHost + ?Sized>(host: &mut H, sql: &str) {
    if let Err(err) = host.execute_control(sql) {
        warn!(sql, error = %err, "transaction cleanup statement failed");
    }
}
