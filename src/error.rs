//! Error types for athena-audit.
//!
//! Defines the main error enum used throughout the crate.

use thiserror::Error;

use crate::service::ExecutionStatus;

/// Main error type for athena-audit operations.
#[derive(Error, Debug)]
pub enum AuditError {
    /// A single service call failed in transit (throttling, network, 5xx).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The service rejected the client's credentials as expired.
    #[error("Credential expired: {0}")]
    CredentialExpired(String),

    /// The service reported FAILED or CANCELLED, or the status could not be read.
    #[error("Query failed: {0}")]
    QueryFailed(Box<ExecutionStatus>),

    /// One or more statements of a batch never succeeded.
    #[error("Batch failed: {succeeded} of {submitted} statements succeeded, {failed} failed")]
    BatchFailed {
        submitted: usize,
        succeeded: usize,
        failed: usize,
    },

    /// A response did not have the expected shape.
    #[error("Malformed result: {0}")]
    MalformedResult(String),

    /// Configuration errors (invalid config file, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Local file errors.
    #[error("I/O error: {0}")]
    Io(String),

    /// Result upload errors.
    #[error("Upload error: {0}")]
    Upload(String),

    /// Internal errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuditError {
    /// Creates a transport error with the given message.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Creates a credential-expired error with the given message.
    pub fn credential_expired(msg: impl Into<String>) -> Self {
        Self::CredentialExpired(msg.into())
    }

    /// Creates a query-failed error carrying the terminal status.
    pub fn query_failed(status: ExecutionStatus) -> Self {
        Self::QueryFailed(Box::new(status))
    }

    /// Creates a malformed-result error with the given message.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedResult(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an I/O error with the given message.
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    /// Creates an upload error with the given message.
    pub fn upload(msg: impl Into<String>) -> Self {
        Self::Upload(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns true for errors the poller absorbs and retries.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::CredentialExpired(_))
    }

    /// Returns the terminal status for `QueryFailed`, if this is one.
    pub fn status(&self) -> Option<&ExecutionStatus> {
        match self {
            Self::QueryFailed(status) => Some(&**status),
            _ => None,
        }
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Transport(_) => "Transport Error",
            Self::CredentialExpired(_) => "Credential Error",
            Self::QueryFailed(_) => "Query Error",
            Self::BatchFailed { .. } => "Batch Error",
            Self::MalformedResult(_) => "Result Error",
            Self::Config(_) => "Configuration Error",
            Self::Io(_) => "I/O Error",
            Self::Upload(_) => "Upload Error",
            Self::Internal(_) => "Internal Error",
        }
    }
}

impl From<std::io::Error> for AuditError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// Result type alias using AuditError.
pub type Result<T> = std::result::Result<T, AuditError>;
