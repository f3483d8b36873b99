use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::backend::NativeStatement;
use crate::error::SqliteDualError;
use crate::results::Row;
use crate::sql_text::parameter_slots;
use crate::types::Params;

use super::params::convert_params;
use super::worker::{Command, WorkerClient};

/// Handle to a statement compiled on the portable worker.
pub struct PortableStatement {
    client: Arc<WorkerClient>,
    closed: Arc<AtomicBool>,
    id: u64,
    sql: String,
    columns: Vec<String>,
    slots: Vec<Option<String>>,
    bound: Vec<turso::Value>,
    started: bool,
    finalized: bool,
}

impl PortableStatement {
    pub(crate) fn new(
        client: Arc<WorkerClient>,
        closed: Arc<AtomicBool>,
        id: u64,
        sql: String,
        columns: Vec<String>,
    ) -> Self {
        let slots = parameter_slots(&sql);
        let bound = vec![turso::Value::Null; slots.len()];
        Self {
            client,
            closed,
            id,
            sql,
            columns,
            slots,
            bound,
            started: false,
            finalized: false,
        }
    }

    fn ensure_usable(&self) -> Result<(), SqliteDualError> {
        if self.finalized {
            return Err(SqliteDualError::FreedResource(format!(
                "statement has been finalized: {}",
                self.sql
            )));
        }
        if self.closed.load(Ordering::Acquire) {
            return Err(SqliteDualError::ClosedResource(
                "portable backend is closed; operation not permitted".into(),
            ));
        }
        Ok(())
    }
}

impl NativeStatement for PortableStatement {
    fn column_names(&mut self) -> Result<Vec<String>, SqliteDualError> {
        self.ensure_usable()?;
        Ok(self.columns.clone())
    }

    fn bind(&mut self, params: &Params) -> Result<(), SqliteDualError> {
        self.ensure_usable()?;
        self.bound = convert_params(params, &self.slots)?;
        self.started = false;
        Ok(())
    }

    fn step(&mut self) -> Result<Option<Row>, SqliteDualError> {
        self.ensure_usable()?;
        let id = self.id;
        if !self.started {
            let params = self.bound.clone();
            self.client.request("starting a statement", |respond_to| Command::Start {
                id,
                params,
                respond_to,
            })?;
            self.started = true;
        }
        self.client
            .request("stepping a statement", |respond_to| Command::Next { id, respond_to })
    }

    fn run(&mut self) -> Result<usize, SqliteDualError> {
        self.ensure_usable()?;
        let id = self.id;
        let params = self.bound.clone();
        let changed = self.client.request("running a statement", |respond_to| Command::Run {
            id,
            params,
            respond_to,
        })?;
        // Stepping a finished statement yields no rows until it is reset or rebound.
        self.started = true;
        Ok(changed)
    }

    fn reset(&mut self) -> Result<(), SqliteDualError> {
        self.ensure_usable()?;
        let id = self.id;
        self.client
            .request("resetting a statement", |respond_to| Command::Reset { id, respond_to })?;
        self.bound = vec![turso::Value::Null; self.slots.len()];
        self.started = false;
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), SqliteDualError> {
        if self.finalized {
            return Ok(());
        }
        self.finalized = true;
        if !self.closed.load(Ordering::Acquire) {
            self.client.notify(Command::Finalize { id: self.id });
        }
        Ok(())
    }
}

impl Drop for PortableStatement {
    fn drop(&mut self) {
        let _ = self.finalize();
    }
}
