use thiserror::Error;

#[derive(Debug, Error)]
pub enum SqliteDualError {
    #[error("Closed resource: {0}")]
    ClosedResource(String),

    #[error("Freed resource: {0}")]
    FreedResource(String),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Invalid database format: {0}")]
    InvalidFormat(String),

    #[error("SQL syntax error: {0}")]
    SqlSyntax(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    #[error("Parameter error: {0}")]
    ParameterError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Where an engine error surfaced; prepare-time rejections are reported as syntax errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EnginePhase {
    Prepare,
    Execute,
    Open,
}

impl SqliteDualError {
    #[must_use]
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Self::ConstraintViolation(_))
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::ClosedResource(_))
    }

    #[must_use]
    pub fn is_freed(&self) -> bool {
        matches!(self, Self::FreedResource(_))
    }

    /// Classify an engine error from its message text.
    ///
    /// The portable engine reports failures as strings, so constraint and format
    /// failures are recognised by the wording SQLite-compatible engines share.
    pub(crate) fn from_engine_message(message: String, phase: EnginePhase) -> Self {
        let lowered = message.to_ascii_lowercase();
        if lowered.contains("constraint failed") || lowered.contains("constraint violation") {
            SqliteDualError::ConstraintViolation(message)
        } else if lowered.contains("not a database")
            || lowered.contains("malformed")
            || lowered.contains("corrupt")
        {
            SqliteDualError::InvalidFormat(message)
        } else {
            match phase {
                EnginePhase::Prepare => SqliteDualError::SqlSyntax(message),
                EnginePhase::Open => SqliteDualError::InvalidFormat(message),
                EnginePhase::Execute => SqliteDualError::ExecutionError(message),
            }
        }
    }

    #[cfg(feature = "sqlite")]
    pub(crate) fn from_rusqlite(err: rusqlite::Error, phase: EnginePhase) -> Self {
        use rusqlite::ErrorCode;

        match err.sqlite_error_code() {
            Some(ErrorCode::ConstraintViolation) => {
                SqliteDualError::ConstraintViolation(err.to_string())
            }
            Some(ErrorCode::NotADatabase | ErrorCode::DatabaseCorrupt) => {
                SqliteDualError::InvalidFormat(err.to_string())
            }
            Some(_) if phase == EnginePhase::Prepare => SqliteDualError::SqlSyntax(err.to_string()),
            Some(_) if phase == EnginePhase::Open => {
                SqliteDualError::InvalidFormat(err.to_string())
            }
            Some(_) => SqliteDualError::ExecutionError(err.to_string()),
            None => match err {
                rusqlite::Error::InvalidParameterCount(..)
                | rusqlite::Error::InvalidParameterName(_) => {
                    SqliteDualError::ParameterError(err.to_string())
                }
                other if phase == EnginePhase::Prepare => {
                    SqliteDualError::SqlSyntax(other.to_string())
                }
                other => SqliteDualError::ExecutionError(other.to_string()),
            },
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for SqliteDualError {
    fn from(err: rusqlite::Error) -> Self {
        SqliteDualError::from_rusqlite(err, EnginePhase::Execute)
    }
}

impl From<serde_json::Error> for SqliteDualError {
    fn from(err: serde_json::Error) -> Self {
        SqliteDualError::ConfigError(format!("invalid options JSON: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_engine_messages() {
        let err = SqliteDualError::from_engine_message(
            "UNIQUE constraint failed: t.id".into(),
            EnginePhase::Execute,
        );
        assert!(err.is_constraint_violation());

        let err = SqliteDualError::from_engine_message(
            "near \"SELEC\": syntax error".into(),
            EnginePhase::Prepare,
        );
        assert!(matches!(err, SqliteDualError::SqlSyntax(_)));

        let err = SqliteDualError::from_engine_message(
            "file is not a database".into(),
            EnginePhase::Execute,
        );
        assert!(matches!(err, SqliteDualError::InvalidFormat(_)));
    }
}
