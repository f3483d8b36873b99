use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value as JsonValue};

use crate::types::RowValues;

/// One result row as a positional sequence.
pub type Row = Vec<RowValues>;

/// One result row keyed by column name.
///
/// Column names are shared across all rows produced by the same statement.
#[derive(Debug, Clone, PartialEq)]
pub struct RowObject {
    column_names: Arc<Vec<String>>,
    values: Vec<RowValues>,
    column_index: Arc<HashMap<String, usize>>,
}

impl RowObject {
    /// Create a new row object
    ///
    /// When a column name repeats, lookups by name return the first occurrence.
    #[must_use]
    pub fn new(column_names: Arc<Vec<String>>, values: Vec<RowValues>) -> Self {
        let mut index = HashMap::with_capacity(column_names.len());
        for (i, name) in column_names.iter().enumerate() {
            index.entry(name.clone()).or_insert(i);
        }
        Self {
            column_names,
            values,
            column_index: Arc::new(index),
        }
    }

    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    #[must_use]
    pub fn values(&self) -> &[RowValues] {
        &self.values
    }

    /// Get a value from the row by column name
    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&RowValues> {
        self.column_index
            .get(column_name)
            .and_then(|&idx| self.values.get(idx))
    }

    /// Get a value from the row by column index
    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&RowValues> {
        self.values.get(index)
    }

    #[must_use]
    pub fn into_values(self) -> Vec<RowValues> {
        self.values
    }

    /// Render the row as a JSON object. Blobs become arrays of bytes.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        let mut map = Map::with_capacity(self.values.len());
        for (name, value) in self.column_names.iter().zip(&self.values) {
            if map.contains_key(name) {
                continue;
            }
            map.insert(
                name.clone(),
                serde_json::to_value(value).unwrap_or(JsonValue::Null),
            );
        }
        JsonValue::Object(map)
    }
}
