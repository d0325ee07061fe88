use super::IsRetryable;
use crate::setup::DbId;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum StudyDbError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Database {0} is not open")]
    NotOpen(DbId),

    #[error("Database setup error: {0}")]
    Setup(String),

    #[error("Connection was revoked by database close")]
    ConnectionRevoked,

    #[error("Connection is not connected")]
    NotConnected,

    #[error("Pattern delete is not supported for global properties")]
    GlobalPatternDelete,

    #[error("Ractor error: {0}")]
    RactorError(String),

    #[error("Unexpected error: {0}")]
    UnexpectedError(String),
}

impl IsRetryable for StudyDbError {
    fn is_retryable(&self) -> bool {
        match self {
            StudyDbError::DatabaseError(sqlx::Error::Database(db_err)) => {
                // SQLITE_BUSY / SQLITE_LOCKED
                matches!(db_err.code().as_deref(), Some("5" | "6"))
            }
            StudyDbError::DatabaseError(sqlx::Error::PoolTimedOut | sqlx::Error::Io(_)) => true,
            StudyDbError::IoError(_) => true,
            _ => false,
        }
    }
}
