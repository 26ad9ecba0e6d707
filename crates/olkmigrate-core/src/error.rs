//! Error types for the core module

use thiserror::Error;

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in core operations
#[derive(Debug, Error)]
pub enum CoreError {
    /// Profile directory is missing or malformed
    #[error("Invalid profile path: {0}")]
    InvalidProfile(String),

    /// Outlook.sqlite is missing from the profile
    #[error("Message index not found: {0}")]
    DatabaseNotFound(String),

    /// Database error
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The Message-ID of a message source could not be read
    #[error("Unable to read email {file}: {reason}")]
    ExtractError { file: String, reason: String },

    /// Mail store error
    #[error("Mail store error: {0}")]
    StoreError(String),

    /// Directory walk error
    #[error("Failed to enumerate messages: {0}")]
    WalkError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<sqlx::Error> for CoreError {
    fn from(e: sqlx::Error) -> Self {
        CoreError::DatabaseError(e.to_string())
    }
}

impl From<olkmigrate_store::StoreError> for CoreError {
    fn from(e: olkmigrate_store::StoreError) -> Self {
        CoreError::StoreError(e.to_string())
    }
}

impl From<walkdir::Error> for CoreError {
    fn from(e: walkdir::Error) -> Self {
        CoreError::WalkError(e.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::ConfigError(e.to_string())
    }
}
