use std::time::Duration;

use thiserror::Error;

/// Infrastructure failures that stop a validation call from completing.
///
/// These never describe the message content. At the engine boundary every
/// `ServiceError` becomes a single `InternalServiceError` diagnostic.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timed out after {} seconds waiting for the message body", .waited.as_secs_f64())]
    Timeout { waited: Duration },

    #[error("Schema not found: {path}")]
    SchemaNotFound { path: String },

    #[error("Schema parsing error: {path} - {details}")]
    SchemaParsing { path: String, details: String },

    #[error("Schema compilation failed for message type {code}: {details}")]
    SchemaCompilation { code: String, details: String },

    #[error("Message body is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("Message body is not well-formed JSON: {0}")]
    MalformedJson(#[from] serde_json::Error),

    #[error("Message body has already been consumed")]
    StreamConsumed,

    #[error("Temporary spool file error: {details}")]
    Spool { details: String },

    #[error("LibXML2 internal error: {details}")]
    LibXml2Internal { details: String },

    #[error("Concurrent operation error: {details}")]
    Concurrency { details: String },
}

/// LibXML2-specific error types
#[derive(Error, Debug)]
pub enum LibXml2Error {
    #[error("Schema parsing failed: {details}")]
    SchemaParseFailed { details: String },

    #[error("Validation context creation failed")]
    ValidationContextCreationFailed,

    #[error("Input buffer creation failed")]
    InputBufferCreationFailed,

    #[error("Invalid path for libxml2: {path}")]
    InvalidPath { path: String },

    #[error("Memory allocation failed in libxml2")]
    MemoryAllocation,
}

impl From<LibXml2Error> for ServiceError {
    fn from(err: LibXml2Error) -> Self {
        ServiceError::LibXml2Internal {
            details: err.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for ServiceError {
    fn from(err: tokio::task::JoinError) -> Self {
        ServiceError::Concurrency {
            details: format!("Join error: {}", err),
        }
    }
}

impl ServiceError {
    /// Map a read failure from the body bridge, keeping timeouts distinct.
    pub(crate) fn from_read_error(err: std::io::Error, waited: Duration) -> Self {
        if err.kind() == std::io::ErrorKind::TimedOut {
            ServiceError::Timeout { waited }
        } else {
            ServiceError::Io(err)
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ServiceError>;

/// LibXML2 result type alias
pub type LibXml2Result<T> = std::result::Result<T, LibXml2Error>;
