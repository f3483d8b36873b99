use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::SqliteDualError;

/// Values that can be stored in a database row or used as statement parameters.
///
/// The same enum is used by both engines so callers never branch on driver types:
/// ```rust
/// use sqlite_dual::prelude::*;
///
/// let params = vec![
///     RowValues::Int(1),
///     RowValues::Text("alice".into()),
///     RowValues::Bool(true),
/// ];
/// # let _ = params;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RowValues {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value, stored as 0/1
    Bool(bool),
    /// NULL value
    Null,
    /// JSON value, stored as its text encoding
    JSON(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
}

impl RowValues {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<&i64> {
        if let RowValues::Int(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let RowValues::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<&bool> {
        if let RowValues::Bool(value) = self {
            return Some(value);
        } else if let Some(i) = self.as_int() {
            if *i == 1 {
                return Some(&true);
            } else if *i == 0 {
                return Some(&false);
            }
        }
        None
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        if let RowValues::Float(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let RowValues::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }
}

impl From<i64> for RowValues {
    fn from(value: i64) -> Self {
        RowValues::Int(value)
    }
}

impl From<f64> for RowValues {
    fn from(value: f64) -> Self {
        RowValues::Float(value)
    }
}

impl From<&str> for RowValues {
    fn from(value: &str) -> Self {
        RowValues::Text(value.to_owned())
    }
}

impl From<String> for RowValues {
    fn from(value: String) -> Self {
        RowValues::Text(value)
    }
}

impl From<bool> for RowValues {
    fn from(value: bool) -> Self {
        RowValues::Bool(value)
    }
}

impl From<Vec<u8>> for RowValues {
    fn from(value: Vec<u8>) -> Self {
        RowValues::Blob(value)
    }
}

impl<T: Into<RowValues>> From<Option<T>> for RowValues {
    fn from(value: Option<T>) -> Self {
        value.map_or(RowValues::Null, Into::into)
    }
}

/// Parameters bound to a statement: positional (`?`, `?NNN`) or by name (`:id`, `@id`, `$id`).
///
/// Named keys may be given with or without their sigil; `"id"` matches `:id`, `@id` and `$id`.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Params {
    #[default]
    None,
    Positional(Vec<RowValues>),
    Named(Vec<(String, RowValues)>),
}

impl Params {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Params::None => true,
            Params::Positional(values) => values.is_empty(),
            Params::Named(pairs) => pairs.is_empty(),
        }
    }

    /// Build named parameters from `(name, value)` pairs.
    #[must_use]
    pub fn named<K, V, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<RowValues>,
    {
        Params::Named(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Lay the parameters out by 1-based slot, given the statement's slot names.
    ///
    /// `slots[i]` is the name of parameter `i + 1` (`None` for anonymous `?` slots).
    /// Slots that receive no value are bound to NULL.
    ///
    /// # Errors
    ///
    /// Returns `SqliteDualError::ParameterError` if more positional values than slots are
    /// supplied, or a named key matches no slot.
    pub fn to_positional(&self, slots: &[Option<String>]) -> Result<Vec<RowValues>, SqliteDualError> {
        let mut out = vec![RowValues::Null; slots.len()];
        match self {
            Params::None => {}
            Params::Positional(values) => {
                if values.len() > slots.len() {
                    return Err(SqliteDualError::ParameterError(format!(
                        "statement takes {} parameters but {} were supplied",
                        slots.len(),
                        values.len()
                    )));
                }
                for (slot, value) in out.iter_mut().zip(values) {
                    *slot = value.clone();
                }
            }
            Params::Named(pairs) => {
                for (key, value) in pairs {
                    let idx = slots
                        .iter()
                        .position(|slot| slot.as_deref().is_some_and(|name| name_matches(name, key)))
                        .ok_or_else(|| {
                            SqliteDualError::ParameterError(format!(
                                "no parameter named {key} in statement"
                            ))
                        })?;
                    out[idx] = value.clone();
                }
            }
        }
        Ok(out)
    }
}

/// Candidate spellings of a named-parameter key as SQLite would see it.
#[must_use]
pub fn named_key_candidates(key: &str) -> Vec<String> {
    if key.starts_with([':', '@', '$']) {
        vec![key.to_owned()]
    } else {
        vec![format!(":{key}"), format!("@{key}"), format!("${key}")]
    }
}

fn name_matches(slot_name: &str, key: &str) -> bool {
    if key.starts_with([':', '@', '$']) {
        slot_name == key
    } else {
        slot_name.get(1..) == Some(key)
    }
}

impl From<Vec<RowValues>> for Params {
    fn from(values: Vec<RowValues>) -> Self {
        Params::Positional(values)
    }
}

impl From<&[RowValues]> for Params {
    fn from(values: &[RowValues]) -> Self {
        Params::Positional(values.to_vec())
    }
}

impl<const N: usize> From<[RowValues; N]> for Params {
    fn from(values: [RowValues; N]) -> Self {
        Params::Positional(values.to_vec())
    }
}

impl From<()> for Params {
    fn from((): ()) -> Self {
        Params::None
    }
}
