use std::fmt;

use thiserror::Error;

/// Which side of a schema-guarded call failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaDirection {
    /// The caller's input could not be encoded into the request shape.
    Request,
    /// A returned row could not be decoded into the result shape.
    Result,
}

impl fmt::Display for SchemaDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaDirection::Request => f.write_str("request"),
            SchemaDirection::Result => f.write_str("result"),
        }
    }
}

/// Why a migration run was aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationErrorReason {
    /// The tracking table holds rows this client cannot interpret.
    BadState,
    /// A migration could not be loaded from its source.
    ImportError,
    /// A migration body failed while running.
    Failed,
    /// Two migrations share the same id.
    Duplicates,
}

impl fmt::Display for MigrationErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationErrorReason::BadState => f.write_str("bad-state"),
            MigrationErrorReason::ImportError => f.write_str("import-error"),
            MigrationErrorReason::Failed => f.write_str("failed"),
            MigrationErrorReason::Duplicates => f.write_str("duplicates"),
        }
    }
}

/// Errors surfaced by every layer of the client.
///
/// The type is `Clone` because a single batch failure is delivered to every
/// request that was part of the batch.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SqlFxError {
    /// Driver, network or syntax failure surfaced from a round trip.
    #[error("SQL error: {message}")]
    Sql {
        message: String,
        code: Option<String>,
    },

    /// A positional resolver received a different number of rows than requests.
    #[error("result length mismatch: expected {expected}, got {actual}")]
    ResultLengthMismatch { expected: usize, actual: usize },

    /// Encoding a request or decoding a result row failed.
    #[error("schema error ({direction}): {}", .causes.join("; "))]
    Schema {
        direction: SchemaDirection,
        causes: Vec<String>,
    },

    #[error("migration error ({reason}): {message}")]
    Migration {
        reason: MigrationErrorReason,
        message: String,
    },

    /// A fragment tree could not be rendered for the configured dialect.
    #[error("compile error: {0}")]
    Compile(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Unimplemented feature: {0}")]
    Unimplemented(String),

    /// A handle was used after the scope or batch that owned it ended.
    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl SqlFxError {
    /// Build a `Sql` error without a vendor code.
    pub fn sql(message: impl Into<String>) -> Self {
        SqlFxError::Sql {
            message: message.into(),
            code: None,
        }
    }

    pub(crate) fn schema(direction: SchemaDirection, cause: impl fmt::Display) -> Self {
        SqlFxError::Schema {
            direction,
            causes: vec![cause.to_string()],
        }
    }

    pub(crate) fn migration(reason: MigrationErrorReason, message: impl Into<String>) -> Self {
        SqlFxError::Migration {
            reason,
            message: message.into(),
        }
    }

    /// Whether retrying the same call may succeed.
    ///
    /// Only transport and server failures qualify; shape and compile errors
    /// are deterministic.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, SqlFxError::Sql { .. })
    }
}

#[cfg(feature = "postgres")]
impl From<tokio_postgres::Error> for SqlFxError {
    fn from(err: tokio_postgres::Error) -> Self {
        SqlFxError::Sql {
            code: err.code().map(|c| c.code().to_string()),
            message: err.to_string(),
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for SqlFxError {
    fn from(err: rusqlite::Error) -> Self {
        let code = match &err {
            rusqlite::Error::SqliteFailure(failure, _) => Some(failure.extended_code.to_string()),
            _ => None,
        };
        SqlFxError::Sql {
            message: err.to_string(),
            code,
        }
    }
}

impl From<bb8::RunError<SqlFxError>> for SqlFxError {
    fn from(err: bb8::RunError<SqlFxError>) -> Self {
        match err {
            bb8::RunError::User(inner) => inner,
            bb8::RunError::TimedOut => SqlFxError::sql("timed out waiting for a pooled connection"),
        }
    }
}

impl From<std::io::Error> for SqlFxError {
    fn from(err: std::io::Error) -> Self {
        SqlFxError::sql(err.to_string())
    }
}

pub type Result<T, E = SqlFxError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_error_lists_every_cause() {
        let err = SqlFxError::Schema {
            direction: SchemaDirection::Result,
            causes: vec!["missing field `id`".into(), "invalid type".into()],
        };
        assert_eq!(
            err.to_string(),
            "schema error (result): missing field `id`; invalid type"
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn only_sql_errors_are_retryable() {
        assert!(SqlFxError::sql("connection reset").is_retryable());
        assert!(
            !SqlFxError::ResultLengthMismatch {
                expected: 3,
                actual: 2
            }
            .is_retryable()
        );
        assert!(!SqlFxError::InvalidState("transaction finished".into()).is_retryable());
    }
}
