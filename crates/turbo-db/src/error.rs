//! Database error types.

use rusqlite::ErrorCode;
use thiserror::Error;

/// Errors that can occur when using the database.
#[derive(Error, Debug)]
pub enum DbError {
    /// Failed to open the database.
    #[error("Failed to open database: {0}")]
    OpenError(String),

    /// Failed to execute a query.
    #[error("Query execution failed: {0}")]
    QueryError(String),

    /// A uniqueness, foreign key or check constraint rejected the write.
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// The database stayed locked past the busy timeout.
    #[error("Database busy: {0}")]
    Busy(String),

    /// Failed to deserialize a row.
    #[error("Deserialization error: {0}")]
    DeserializeError(String),

    /// Type conversion error.
    #[error("Type conversion error: {0}")]
    TypeError(String),

    /// The connection mutex was poisoned by a panicking holder.
    #[error("Connection poisoned")]
    Poisoned,

    /// No rows returned when one was expected.
    #[error("No rows returned")]
    NotFound,
}

impl DbError {
    /// Check if this error came from a violated constraint.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, DbError::ConstraintViolation(_))
    }

    /// Check if retrying the same statement later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, DbError::Busy(_))
    }
}

impl From<serde_json::Error> for DbError {
    fn from(e: serde_json::Error) -> Self {
        DbError::DeserializeError(e.to_string())
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(err, _) => match err.code {
                ErrorCode::ConstraintViolation => DbError::ConstraintViolation(e.to_string()),
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => {
                    DbError::Busy(e.to_string())
                }
                _ => DbError::QueryError(e.to_string()),
            },
            rusqlite::Error::QueryReturnedNoRows => DbError::NotFound,
            rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::InvalidColumnType(..)
            | rusqlite::Error::IntegralValueOutOfRange(..) => DbError::TypeError(e.to_string()),
            _ => DbError::QueryError(e.to_string()),
        }
    }
}
