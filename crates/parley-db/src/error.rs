//! Database error types

use thiserror::Error;

/// Database operation errors
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Query error: {0}")]
    Query(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Corrupt row: {0}")]
    Decode(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<parley_types::ParseStatusError> for DbError {
    fn from(e: parley_types::ParseStatusError) -> Self {
        DbError::Decode(e.to_string())
    }
}

impl From<parley_types::ParseDecisionError> for DbError {
    fn from(e: parley_types::ParseDecisionError) -> Self {
        DbError::Decode(e.to_string())
    }
}

impl From<parley_types::ParseRoleError> for DbError {
    fn from(e: parley_types::ParseRoleError) -> Self {
        DbError::Decode(e.to_string())
    }
}

/// Result type for database operations
pub type DbResult<T> = Result<T, DbError>;
