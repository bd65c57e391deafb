//! Error types for Counsel

use thiserror::Error;

/// Main error type for Counsel operations
#[derive(Error, Debug)]
pub enum CounselError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database errors (SQLite, schema, queries)
    #[error("Database error: {0}")]
    Database(String),

    /// Authentication and session errors
    #[error("Auth error: {0}")]
    Auth(String),

    /// HTTP server errors
    #[error("Server error: {0}")]
    Server(String),

    /// AI relay errors
    #[error("Relay error: {0}")]
    Relay(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<rusqlite::Error> for CounselError {
    fn from(e: rusqlite::Error) -> Self {
        CounselError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for CounselError {
    fn from(e: serde_json::Error) -> Self {
        CounselError::Serialization(e.to_string())
    }
}

/// Result type alias for Counsel operations
pub type Result<T> = std::result::Result<T, CounselError>;
