//! Remote file-store trait definition.

use crate::config::RemoteConfig;
use crate::error::RemoteResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// One entry of a remote directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    /// Full remote path (for example `/notes/notes-export_2024-01-01_A.json`).
    pub filename: String,
    /// Last path component.
    pub basename: String,
    /// Last-modified time as reported by the remote.
    pub last_modified: DateTime<Utc>,
    /// Size in bytes (zero for directories).
    pub size: u64,
    /// True for collections/directories.
    pub is_directory: bool,
}

/// A remote file store.
///
/// This trait abstracts the shared folder that devices synchronize through,
/// allowing different implementations (a WebDAV share, a mounted folder, an
/// in-memory fake for tests).
///
/// Paths are `/`-separated and absolute from the store root.
#[async_trait]
pub trait RemoteFileStore: Send + Sync {
    /// Returns true if `path` exists.
    async fn exists(&self, path: &str) -> RemoteResult<bool>;

    /// Creates the directory at `path`, including missing parents.
    async fn create_directory(&self, path: &str) -> RemoteResult<()>;

    /// Lists the direct children of the directory at `path`.
    async fn list(&self, path: &str) -> RemoteResult<Vec<RemoteEntry>>;

    /// Reads the full contents of the file at `path`.
    async fn read(&self, path: &str) -> RemoteResult<Vec<u8>>;

    /// Writes `data` to `path`, replacing any existing file.
    async fn write(&self, path: &str, data: &[u8]) -> RemoteResult<()>;

    /// Moves the file at `from` to `to`, replacing any file at `to`.
    ///
    /// The moved file's last-modified time is refreshed.
    async fn rename(&self, from: &str, to: &str) -> RemoteResult<()>;

    /// Deletes the file at `path`.
    async fn delete(&self, path: &str) -> RemoteResult<()>;
}

/// Builds live [`RemoteFileStore`] clients from a [`RemoteConfig`].
#[async_trait]
pub trait RemoteConnector: Send + Sync {
    /// Constructs a client for `config`.
    ///
    /// Constructing a client does not imply the remote is reachable; callers
    /// probe it with [`RemoteFileStore::exists`].
    async fn connect(&self, config: &RemoteConfig) -> RemoteResult<Arc<dyn RemoteFileStore>>;
}

/// Normalizes a remote path: leading `/`, no trailing `/`, no empty segments.
///
/// ```rust
/// use snapsync_remote::normalize_path;
///
/// assert_eq!(normalize_path("notes//sync/"), "/notes/sync");
/// assert_eq!(normalize_path(""), "/");
/// ```
pub fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    format!("/{}", segments.join("/"))
}

/// Joins a file name onto a remote directory path.
///
/// ```rust
/// use snapsync_remote::join_path;
///
/// assert_eq!(join_path("/", "a.json"), "/a.json");
/// assert_eq!(join_path("/sync/", "a.json"), "/sync/a.json");
/// ```
pub fn join_path(dir: &str, name: &str) -> String {
    let dir = normalize_path(dir);
    if dir == "/" {
        format!("/{name}")
    } else {
        format!("{dir}/{name}")
    }
}

pub(crate) fn basename(path: &str) -> String {
    path.rsplit('/').next().unwrap_or_default().to_string()
}

pub(crate) fn parent(path: &str) -> String {
    let normalized = normalize_path(path);
    match normalized.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(i) => normalized[..i].to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_helpers() {
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("a/b"), "/a/b");
        assert_eq!(join_path("", "x"), "/x");
        assert_eq!(basename("/a/b/c.json"), "c.json");
        assert_eq!(parent("/a/b/c.json"), "/a/b");
        assert_eq!(parent("/c.json"), "/");
        assert_eq!(parent("/"), "/");
    }
}
