//! Error types for remote store operations.

use std::io;
use thiserror::Error;

/// Result type for remote store operations.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Errors returned by a remote file store.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The path does not exist on the remote.
    #[error("remote path not found: {0}")]
    NotFound(String),

    /// The remote rejected the supplied credentials.
    #[error("authentication failed for {0}")]
    AuthenticationFailed(String),

    /// The remote could not be reached.
    #[error("remote unreachable: {0}")]
    Unreachable(String),

    /// The path cannot be mapped onto the remote.
    #[error("invalid remote path: {0}")]
    InvalidPath(String),

    /// An I/O error occurred while talking to the remote.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl RemoteError {
    /// Returns true if the same request may succeed later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RemoteError::Unreachable(_) | RemoteError::Io(_))
    }
}
