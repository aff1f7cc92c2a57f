//! Error types for the core module

use thiserror::Error;

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in core operations
#[derive(Debug, Error)]
pub enum CoreError {
    /// Database error
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Account not found
    #[error("Account not found: {0}")]
    AccountNotFound(i64),

    /// Folder not found
    #[error("Folder not found: {0}")]
    FolderNotFound(i64),

    /// Sync error
    #[error("Sync error: {0}")]
    SyncError(String),

    /// Configuration or preferences could not be read or written
    #[error("Config error: {0}")]
    ConfigError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<sqlx::Error> for CoreError {
    fn from(e: sqlx::Error) -> Self {
        CoreError::DatabaseError(e.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::ConfigError(e.to_string())
    }
}
