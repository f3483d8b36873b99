use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::row::{Row, RowObject};

/// Result of one statement run through `exec_sql`.
///
/// Only statements that produce columns yield a `QueryExecResult`; DDL and DML
/// statements contribute nothing to the returned list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryExecResult {
    /// Column names, in select-list order
    pub columns: Vec<String>,
    /// Rows, each positionally aligned with `columns`
    pub values: Vec<Row>,
}

impl QueryExecResult {
    #[must_use]
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            values: Vec::new(),
        }
    }

    /// Create a result set with a known row capacity
    #[must_use]
    pub fn with_capacity(columns: Vec<String>, capacity: usize) -> Self {
        Self {
            columns,
            values: Vec::with_capacity(capacity),
        }
    }

    pub fn push_row(&mut self, row: Row) {
        self.values.push(row);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// View the rows as name-keyed objects sharing one column list.
    #[must_use]
    pub fn to_objects(&self) -> Vec<RowObject> {
        let columns = Arc::new(self.columns.clone());
        self.values
            .iter()
            .map(|row| RowObject::new(Arc::clone(&columns), row.clone()))
            .collect()
    }
}
