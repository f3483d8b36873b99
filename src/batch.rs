//! Bulk inserts: one transaction and one prepared statement for many rows.

use tracing::{debug, warn};

use crate::error::SqliteDualError;
use crate::statement::Statement;
use crate::transaction::{TransactionHost, run_in_transaction};
use crate::types::Params;

pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// A [`TransactionHost`] that can also compile statements outside the cache.
pub trait StatementSource: TransactionHost {
    /// Prepare a caller-owned statement.
    ///
    /// # Errors
    /// Returns `SqlSyntax` when the engine rejects the text.
    fn prepare_statement(&mut self, sql: &str) -> Result<Statement, SqliteDualError>;
}

#[derive(Debug, Clone, Copy)]
pub struct BatchProcessor {
    batch_size: usize,
}

impl Default for BatchProcessor {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}

impl BatchProcessor {
    /// A `batch_size` of 0 is treated as 1.
    #[must_use]
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Insert every row atomically. Returns the number of rows processed.
    ///
    /// # Errors
    ///
    /// Returns the first error raised; no row is left inserted in that case.
    pub fn bulk_insert<H, R>(&self, host: &mut H, sql: &str, rows: &[R]) -> Result<usize, SqliteDualError>
    where
        H: StatementSource + ?Sized,
        R: Clone + Into<Params>,
    {
        insert_all(host, sql, rows)
    }

    /// Insert rows in chunks of `batch_size` (the processor's default when `None`), each chunk
    /// in its own transaction.
    ///
    /// A failing chunk is rolled back; chunks before it stay committed.
    ///
    /// # Errors
    ///
    /// Returns the first error raised.
    pub fn bulk_insert_batched<H, R>(
        &self,
        host: &mut H,
        sql: &str,
        rows: &[R],
        batch_size: Option<usize>,
    ) -> Result<usize, SqliteDualError>
    where
        H: StatementSource + ?Sized,
        R: Clone + Into<Params>,
    {
        let chunk_size = batch_size.unwrap_or(self.batch_size).max(1);
        let mut total = 0;
        for (index, chunk) in rows.chunks(chunk_size).enumerate() {
            match insert_all(host, sql, chunk) {
                Ok(count) => total += count,
                Err(err) => {
                    warn!(
                        chunk = index,
                        committed_rows = total,
                        error = %err,
                        "bulk insert chunk failed; earlier chunks remain committed"
                    );
                    return Err(err);
                }
            }
        }
        Ok(total)
    }
}

fn insert_all<H, R>(host: &mut H, sql: &str, rows: &[R]) -> Result<usize, SqliteDualError>
where
    H: StatementSource + ?Sized,
    R: Clone + Into<Params>,
{
    if rows.is_empty() {
        return Ok(0);
    }
    run_in_transaction(host, |host| {
        let mut statement = host.prepare_statement(sql)?;
        let outcome = rows.iter().try_for_each(|row| {
            statement.bind(row.clone())?;
            statement.step()?;
            statement.reset()
        });
        let freed = statement.free();
        outcome?;
        freed?;
        debug!(rows = rows.len(), "bulk insert rows written");
        Ok(rows.len())
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::statement::testing::FakeNative;
    use crate::transaction::TransactionManager;
    use crate::types::RowValues;

    #[derive(Default)]
    struct FakeSource {
        manager: TransactionManager,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl TransactionHost for FakeSource {
        fn transaction_manager(&mut self) -> &mut TransactionManager {
            &mut self.manager
        }

        fn execute_control(&mut self, sql: &str) -> Result<(), SqliteDualError> {
            self.log.lock().unwrap().push(sql.to_string());
            Ok(())
        }
    }

    impl StatementSource for FakeSource {
        fn prepare_statement(&mut self, sql: &str) -> Result<Statement, SqliteDualError> {
            self.log.lock().unwrap().push("prepare".to_string());
            Ok(Statement::new(sql, Box::new(FakeNative::with_rows(0, Arc::clone(&self.log)))))
        }
    }

    #[test]
    fn empty_input_touches_nothing() {
        let mut source = FakeSource::default();
        let rows: Vec<Vec<RowValues>> = Vec::new();
        let count = BatchProcessor::default()
            .bulk_insert(&mut source, "INSERT INTO t VALUES (?)", &rows)
            .unwrap();
        assert_eq!(count, 0);
        assert!(source.log.lock().unwrap().is_empty());
    }

    #[test]
    fn one_transaction_and_one_statement_per_batch() {
        let mut source = FakeSource::default();
        let rows: Vec<Vec<RowValues>> = (0..5).map(|i| vec![RowValues::Int(i)]).collect();
        let count = BatchProcessor::new(2)
            .bulk_insert_batched(&mut source, "INSERT INTO t VALUES (?)", &rows, None)
            .unwrap();
        assert_eq!(count, 5);

        let log = source.log.lock().unwrap();
        let begins = log.iter().filter(|e| *e == "BEGIN IMMEDIATE").count();
        let prepares = log.iter().filter(|e| *e == "prepare").count();
        let finalizes = log.iter().filter(|e| *e == "finalize").count();
        assert_eq!((begins, prepares, finalizes), (3, 3, 3));
        assert_eq!(log.iter().filter(|e| *e == "bind").count(), 5);
    }
}
