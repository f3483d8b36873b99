use rusqlite::types::Value;

use crate::error::SqliteDualError;
use crate::types::{Params, RowValues, named_key_candidates};

/// Convert a single `RowValues` to a rusqlite `Value`.
#[must_use]
pub fn row_value_to_sqlite_value(value: &RowValues) -> Value {
    match value {
        RowValues::Int(i) => Value::Integer(*i),
        RowValues::Float(f) => Value::Real(*f),
        RowValues::Text(s) => Value::Text(s.clone()),
        RowValues::Bool(b) => Value::Integer(i64::from(*b)),
        RowValues::Null => Value::Null,
        RowValues::JSON(jval) => Value::Text(jval.to_string()),
        RowValues::Blob(bytes) => Value::Blob(bytes.clone()),
    }
}

/// Bind `params` onto a compiled statement, first resetting every slot to NULL so stale
/// values from an earlier execution of the cached statement never leak through.
///
/// # Errors
///
/// Returns `SqliteDualError::ParameterError` when there are more positional values than
/// slots or a named key matches no slot.
pub fn apply_bindings(
    stmt: &mut rusqlite::Statement<'_>,
    params: &Params,
) -> Result<(), SqliteDualError> {
    let count = stmt.parameter_count();
    for idx in 1..=count {
        stmt.raw_bind_parameter(idx, Value::Null)?;
    }

    match params {
        Params::None => {}
        Params::Positional(values) => {
            if values.len() > count {
                return Err(SqliteDualError::ParameterError(format!(
                    "statement takes {count} parameters but {} were supplied",
                    values.len()
                )));
            }
            for (offset, value) in values.iter().enumerate() {
                stmt.raw_bind_parameter(offset + 1, row_value_to_sqlite_value(value))?;
            }
        }
        Params::Named(pairs) => {
            for (key, value) in pairs {
                let idx = named_key_candidates(key)
                    .iter()
                    .find_map(|candidate| stmt.parameter_index(candidate).ok().flatten())
                    .ok_or_else(|| {
                        SqliteDualError::ParameterError(format!(
                            "no parameter named {key} in statement"
                        ))
                    })?;
                stmt.raw_bind_parameter(idx, row_value_to_sqlite_value(value))?;
            }
        }
    }
    Ok(())
}
