//! Error types and handling for the replication target
//!
//! Every core operation fails by returning one of these variants. The HTTP
//! layer maps them onto status codes; `bulk_docs` reports them inline.

use thiserror::Error;

/// Main result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the replication target
#[derive(Error, Debug)]
pub enum Error {
    /// Referenced document or revision is absent
    #[error("{0}")]
    NotFound(String),

    /// Optimistic-concurrency violation
    #[error("{0}")]
    Conflict(String),

    /// Revision string does not have the `<generation>-<fingerprint>` shape
    #[error("Invalid rev format: {0}")]
    MalformedRevision(String),

    /// Invalid input
    #[error("{0}")]
    InvalidArgument(String),

    /// Multipart body violates the framing rules
    #[error("Malformed multipart body: {0}")]
    MalformedMultipart(String),

    /// Store with this name already exists
    #[error("The database could not be created, the file already exists: {0}")]
    DatabaseExists(String),

    /// Store with this name is not registered
    #[error("Database does not exist: {0}")]
    DatabaseMissing(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors from std
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Prometheus metrics errors
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl Error {
    /// Create a not found error
    pub fn not_found(reason: impl Into<String>) -> Self {
        Self::NotFound(reason.into())
    }

    /// Create a conflict error with the protocol's standard reason
    pub fn conflict() -> Self {
        Self::Conflict("Document update conflict.".to_string())
    }

    /// Create a malformed revision error
    pub fn malformed_revision(rev: impl Into<String>) -> Self {
        Self::MalformedRevision(rev.into())
    }

    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a malformed multipart error
    pub fn malformed_multipart(msg: impl Into<String>) -> Self {
        Self::MalformedMultipart(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Protocol error kind reported in `{"error": ..}` bodies
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotFound(_) | Error::DatabaseMissing(_) => "not_found",
            Error::Conflict(_) => "conflict",
            Error::MalformedRevision(_)
            | Error::InvalidArgument(_)
            | Error::MalformedMultipart(_)
            | Error::Json(_) => "bad_request",
            Error::DatabaseExists(_) => "db_exists",
            Error::Config(_) | Error::Io(_) | Error::Metrics(_) => "internal_server_error",
        }
    }

    /// Human readable reason reported in `{"reason": ..}` bodies
    pub fn reason(&self) -> String {
        self.to_string()
    }

    /// Check if this is a client error (4xx equivalent)
    pub fn is_client_error(&self) -> bool {
        !self.is_server_error()
    }

    /// Check if this is a server error (5xx equivalent)
    pub fn is_server_error(&self) -> bool {
        matches!(self, Error::Config(_) | Error::Io(_) | Error::Metrics(_))
    }
}
