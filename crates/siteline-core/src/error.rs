//! Error types for siteline-core

use thiserror::Error;

/// Result type alias using siteline-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in siteline-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Remote API error
    #[error("Remote API error: {0}")]
    Remote(#[from] crate::remote::ApiError),

    /// Image upload error
    #[error("Upload error: {0}")]
    Upload(#[from] crate::upload::UploadError),
}
