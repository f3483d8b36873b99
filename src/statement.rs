//! Stateful wrapper around one engine prepared statement.

use std::fmt;
use std::sync::Arc;

use crate::backend::{NativeStatement, ensure_not_freed};
use crate::error::SqliteDualError;
use crate::results::{Row, RowObject};
use crate::types::Params;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementState {
    /// Freshly prepared or reset; no bindings
    Unbound,
    /// Parameters bound, not yet stepped
    Bound,
    /// At least one row has been read and more may follow
    Stepping,
    /// Executed to completion
    Done,
    /// Released; terminal
    Freed,
}

/// A prepared statement with explicit state transitions.
///
/// Every operation on a freed statement fails with [`SqliteDualError::FreedResource`];
/// `free` itself is idempotent. Dropping an unfreed statement frees it.
pub struct Statement {
    sql: String,
    native: Option<Box<dyn NativeStatement + Send>>,
    state: StatementState,
    column_names: Option<Arc<Vec<String>>>,
}

impl fmt::Debug for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statement")
            .field("sql", &self.sql)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Statement {
    #[must_use]
    pub fn new(sql: impl Into<String>, native: Box<dyn NativeStatement + Send>) -> Self {
        Self {
            sql: sql.into(),
            native: Some(native),
            state: StatementState::Unbound,
            column_names: None,
        }
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    #[must_use]
    pub fn state(&self) -> StatementState {
        self.state
    }

    #[must_use]
    pub fn is_freed(&self) -> bool {
        self.state == StatementState::Freed
    }

    fn native(&mut self) -> Result<&mut (dyn NativeStatement + Send), SqliteDualError> {
        ensure_not_freed(self.is_freed(), &self.sql)?;
        match self.native.as_deref_mut() {
            Some(native) => Ok(native),
            None => Err(SqliteDualError::FreedResource(format!(
                "statement has been freed: {}",
                self.sql
            ))),
        }
    }

    /// Replace the bindings. Returns `true` once the parameters are bound.
    ///
    /// # Errors
    ///
    /// `FreedResource` after `free`, `ParameterError` if the params do not fit.
    pub fn bind(&mut self, params: impl Into<Params>) -> Result<bool, SqliteDualError> {
        let params = params.into();
        self.native()?.bind(&params)?;
        self.state = StatementState::Bound;
        Ok(true)
    }

    /// Advance one row. Returns `false` once the statement is exhausted.
    ///
    /// # Errors
    ///
    /// `FreedResource` after `free`, or the engine's error.
    pub fn step(&mut self) -> Result<bool, SqliteDualError> {
        Ok(self.next_row()?.is_some())
    }

    fn next_row(&mut self) -> Result<Option<Row>, SqliteDualError> {
        if self.state == StatementState::Done {
            ensure_not_freed(self.is_freed(), &self.sql)?;
            return Ok(None);
        }
        let row = self.native()?.step()?;
        self.state = if row.is_some() {
            StatementState::Stepping
        } else {
            StatementState::Done
        };
        Ok(row)
    }

    /// Bind `params` (when given) and fetch the next row.
    ///
    /// An unbound or freshly bound statement starts from its first row; a statement already
    /// stepping continues where it left off.
    ///
    /// # Errors
    ///
    /// `FreedResource` after `free`, `ParameterError`, or the engine's error.
    pub fn get(&mut self, params: Option<Params>) -> Result<Option<Row>, SqliteDualError> {
        if let Some(params) = params {
            self.reset()?;
            self.bind(params)?;
        }
        self.next_row()
    }

    /// Like [`Statement::get`], keyed by column name.
    ///
    /// # Errors
    ///
    /// `FreedResource` after `free`, `ParameterError`, or the engine's error.
    pub fn get_as_object(&mut self, params: Option<Params>) -> Result<Option<RowObject>, SqliteDualError> {
        let Some(row) = self.get(params)? else {
            return Ok(None);
        };
        let columns = self.shared_column_names()?;
        Ok(Some(RowObject::new(columns, row)))
    }

    /// Result column names, computed once and cached for the statement's life.
    ///
    /// # Errors
    ///
    /// `FreedResource` after `free`.
    pub fn get_column_names(&mut self) -> Result<Vec<String>, SqliteDualError> {
        Ok(self.shared_column_names()?.as_ref().clone())
    }

    fn shared_column_names(&mut self) -> Result<Arc<Vec<String>>, SqliteDualError> {
        ensure_not_freed(self.is_freed(), &self.sql)?;
        if let Some(names) = &self.column_names {
            return Ok(Arc::clone(names));
        }
        let names = Arc::new(self.native()?.column_names()?);
        self.column_names = Some(Arc::clone(&names));
        Ok(names)
    }

    /// Execute to completion with the current bindings and return the number of changed rows.
    ///
    /// # Errors
    ///
    /// `FreedResource` after `free`, or the engine's error (e.g. `ConstraintViolation`).
    pub fn run(&mut self) -> Result<usize, SqliteDualError> {
        let changed = self.native()?.run()?;
        self.state = StatementState::Done;
        Ok(changed)
    }

    /// Rewind and clear bindings.
    ///
    /// # Errors
    ///
    /// `FreedResource` after `free`.
    pub fn reset(&mut self) -> Result<(), SqliteDualError> {
        self.native()?.reset()?;
        self.state = StatementState::Unbound;
        Ok(())
    }

    /// Release the engine handle. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns the engine's error if releasing the handle fails; the statement is freed
    /// regardless.
    pub fn free(&mut self) -> Result<(), SqliteDualError> {
        self.state = StatementState::Freed;
        match self.native.take() {
            Some(mut native) => native.finalize(),
            None => Ok(()),
        }
    }
}

impl Drop for Statement {
    fn drop(&mut self) {
        let _ = self.free();
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use crate::backend::NativeStatement;
    use crate::error::SqliteDualError;
    use crate::results::Row;
    use crate::types::{Params, RowValues};

    /// Scripted engine statement that records what was done to it.
    #[derive(Default)]
    pub struct FakeNative {
        pub rows: VecDeque<Row>,
        pub log: Arc<Mutex<Vec<String>>>,
    }

    impl FakeNative {
        pub fn with_rows(count: i64, log: Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                rows: (1..=count).map(|i| vec![RowValues::Int(i)]).collect(),
                log,
            }
        }

        fn record(&self, event: &str) {
            self.log.lock().unwrap().push(event.to_string());
        }
    }

    impl NativeStatement for FakeNative {
        fn column_names(&mut self) -> Result<Vec<String>, SqliteDualError> {
            self.record("columns");
            Ok(vec!["n".into()])
        }

        fn bind(&mut self, _params: &Params) -> Result<(), SqliteDualError> {
            self.record("bind");
            Ok(())
        }

        fn step(&mut self) -> Result<Option<Row>, SqliteDualError> {
            self.record("step");
            Ok(self.rows.pop_front())
        }

        fn run(&mut self) -> Result<usize, SqliteDualError> {
            self.record("run");
            Ok(1)
        }

        fn reset(&mut self) -> Result<(), SqliteDualError> {
            self.record("reset");
            Ok(())
        }

        fn finalize(&mut self) -> Result<(), SqliteDualError> {
            self.record("finalize");
            Ok(())
        }
    }
}
