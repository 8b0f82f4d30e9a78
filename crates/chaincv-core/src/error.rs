//! Error types for chaincv.

use thiserror::Error;

/// Result type alias using chaincv's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for chaincv operations.
///
/// `Extraction` and `Analysis` are business failures: task executors turn them
/// into a soft `Failure` outcome. Everything else is infrastructure and
/// propagates to the caller of the boundary that hit it.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Document not found
    #[error("Document not found: {0}")]
    DocumentNotFound(uuid::Uuid),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Task queue service error
    #[error("Queue error: {0}")]
    Queue(String),

    /// Generation backend failed
    #[error("Inference error: {0}")]
    Inference(String),

    /// Binary document could not be turned into text
    #[error("Extraction failed: {0}")]
    Extraction(String),

    /// Model response could not be turned into a valid analysis
    #[error("AI analysis failed: {0}")]
    Analysis(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error is a business-logic failure rather than an
    /// infrastructure one.
    pub fn is_business(&self) -> bool {
        matches!(
            self,
            Error::Extraction(_) | Error::Analysis(_) | Error::InvalidInput(_)
        )
    }

    /// Message recorded on a failed document. Business failures keep their
    /// bare message so clients see e.g. `File not found at path: ...`.
    pub fn failure_message(&self) -> String {
        match self {
            Error::Extraction(msg)
            | Error::Analysis(msg)
            | Error::InvalidInput(msg)
            | Error::NotFound(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}
