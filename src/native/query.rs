use rusqlite::types::Value;

use crate::error::SqliteDualError;
use crate::results::{QueryExecResult, Row};
use crate::types::RowValues;

/// Extract a `RowValues` from a `SQLite` row.
///
/// # Errors
///
/// Returns `SqliteDualError` if the value cannot be read.
pub fn sqlite_extract_value(row: &rusqlite::Row<'_>, idx: usize) -> Result<RowValues, SqliteDualError> {
    let value: Value = row.get(idx)?;
    Ok(match value {
        Value::Null => RowValues::Null,
        Value::Integer(i) => RowValues::Int(i),
        Value::Real(f) => RowValues::Float(f),
        Value::Text(s) => RowValues::Text(s),
        Value::Blob(b) => RowValues::Blob(b),
    })
}

pub(crate) fn extract_row(row: &rusqlite::Row<'_>, column_count: usize) -> Result<Row, SqliteDualError> {
    (0..column_count)
        .map(|idx| sqlite_extract_value(row, idx))
        .collect()
}

pub(crate) fn column_names(stmt: &rusqlite::Statement<'_>) -> Vec<String> {
    stmt.column_names()
        .iter()
        .map(std::string::ToString::to_string)
        .collect()
}

/// Run an already-bound statement to completion, collecting every row it yields.
///
/// # Errors
///
/// Returns the classified engine error if stepping fails.
pub(crate) fn collect_rows(stmt: &mut rusqlite::Statement<'_>) -> Result<Vec<Row>, SqliteDualError> {
    let column_count = stmt.column_count();
    let mut rows = stmt.raw_query();
    let mut collected = Vec::new();
    while let Some(row) = rows.next()? {
        collected.push(extract_row(row, column_count)?);
    }
    Ok(collected)
}

/// Build a `QueryExecResult` for a row-producing statement.
///
/// # Errors
///
/// Returns the classified engine error if stepping fails.
pub fn build_result_set(stmt: &mut rusqlite::Statement<'_>) -> Result<QueryExecResult, SqliteDualError> {
    let mut result = QueryExecResult::new(column_names(stmt));
    for row in collect_rows(stmt)? {
        result.push_row(row);
    }
    Ok(result)
}
