//! Error types for session authentication operations

/// Errors from session authentication operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("refresh rejected: {0}")]
    RefreshRejected(String),

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("token cache parse error: {0}")]
    CacheParse(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
