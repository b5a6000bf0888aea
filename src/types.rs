//! Error types shared across the crate

use thiserror::Error;

/// Errors surfaced by Kalike services and routes
#[derive(Debug, Error)]
pub enum KalikeError {
    /// Configuration problem (missing or malformed settings)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Authentication or authorization failure
    #[error("Auth error: {0}")]
    Auth(String),

    /// Request failed input validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Referenced entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Write conflicts with existing state (duplicate, overlap)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// MongoDB read or write failure
    #[error("Database error: {0}")]
    Database(String),

    /// Malformed HTTP request (bad body, oversized payload)
    #[error("HTTP error: {0}")]
    Http(String),

    /// Upstream service (language-model API) failure
    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, KalikeError>;
