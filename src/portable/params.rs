use crate::error::SqliteDualError;
use crate::types::{Params, RowValues};

/// Convert a single `RowValues` to a Turso `Value`.
#[must_use]
pub fn row_value_to_turso_value(value: &RowValues) -> turso::Value {
    match value {
        RowValues::Int(i) => turso::Value::Integer(*i),
        RowValues::Float(f) => turso::Value::Real(*f),
        RowValues::Text(s) => turso::Value::Text(s.clone()),
        RowValues::Bool(b) => turso::Value::Integer(i64::from(*b)),
        RowValues::Null => turso::Value::Null,
        RowValues::JSON(j) => turso::Value::Text(j.to_string()),
        RowValues::Blob(bytes) => turso::Value::Blob(bytes.clone()),
    }
}

#[must_use]
pub fn turso_value_to_row_value(value: turso::Value) -> RowValues {
    match value {
        turso::Value::Null => RowValues::Null,
        turso::Value::Integer(i) => RowValues::Int(i),
        turso::Value::Real(f) => RowValues::Float(f),
        turso::Value::Text(s) => RowValues::Text(s),
        turso::Value::Blob(b) => RowValues::Blob(b),
    }
}

/// Lay `params` out over the statement's slots and convert them for Turso.
///
/// Named parameters are resolved here against the slot names discovered in the SQL text, so
/// the engine only ever sees positional values.
///
/// # Errors
///
/// Returns `SqliteDualError::ParameterError` when the params do not fit the slots.
pub fn convert_params(
    params: &Params,
    slots: &[Option<String>],
) -> Result<Vec<turso::Value>, SqliteDualError> {
    Ok(params
        .to_positional(slots)?
        .iter()
        .map(row_value_to_turso_value)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_params_become_positional_values() {
        let slots = vec![Some(":id".to_string()), None];
        let values = convert_params(&Params::named([("id", RowValues::Bool(true))]), &slots).unwrap();
        assert_eq!(values.len(), 2);
        assert!(matches!(values[0], turso::Value::Integer(1)));
        assert!(matches!(values[1], turso::Value::Null));
    }
}
