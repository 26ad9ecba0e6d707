//! Error types for mail store operations

use thiserror::Error;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while talking to a mail store
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be opened
    #[error("Failed to open mail store: {0}")]
    OpenFailed(String),

    /// Folder not found
    #[error("Folder not found: {0}")]
    FolderNotFound(String),

    /// Folder name cannot be used in this store
    #[error("Invalid folder name: {0:?}")]
    InvalidFolderName(String),

    /// A saved message is no longer in its folder
    #[error("Message not found: {0}")]
    MessageNotFound(String),

    /// Maildir delivery or lookup failed
    #[error("Maildir error: {0}")]
    MaildirError(String),

    /// Operation is not implemented by this stream or store
    #[error("Operation not supported: {0}")]
    NotSupported(&'static str),

    /// Seek origin outside STREAM_SEEK_SET / STREAM_SEEK_CUR / STREAM_SEEK_END
    #[error("Invalid seek origin {0}: expected STREAM_SEEK_SET, STREAM_SEEK_CUR or STREAM_SEEK_END")]
    InvalidSeekOrigin(i32),

    /// Stream was closed before use
    #[error("Cannot access a closed stream")]
    ClosedStream,

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<maildirpp::Error> for StoreError {
    fn from(e: maildirpp::Error) -> Self {
        StoreError::MaildirError(e.to_string())
    }
}
