//! Error types for the sync engine.

use snapsync_remote::RemoteError;
use snapsync_storage::StorageError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// No remote credentials have been saved.
    #[error("remote is not configured")]
    NotConfigured,

    /// The remote could not be reached, rejected the credentials, or the
    /// root directory could not be created.
    #[error("connection error: {0}")]
    Connection(String),

    /// A file name does not follow the snapshot naming convention.
    #[error("malformed snapshot name: {0}")]
    MalformedName(String),

    /// The local database rejected a snapshot.
    #[error("import error: {0}")]
    Import(String),

    /// The local database could not be exported.
    #[error("export error: {0}")]
    Export(String),

    /// A remote store operation failed.
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Local settings could not be read or written.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// JSON encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error outside the remote store (for example writing an export file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// Returns true if the next scheduled tick may succeed without any
    /// change on the caller's side.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Connection(_) => true,
            SyncError::Remote(e) => e.is_retryable(),
            _ => false,
        }
    }
}
