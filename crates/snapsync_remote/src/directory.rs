//! Remote store backed by a shared folder on the local filesystem.
//!
//! Useful when the share is mounted (WebDAV via davfs, SMB, a synced
//! cloud folder) or for running several devices against one directory.

use crate::config::RemoteConfig;
use crate::error::{RemoteError, RemoteResult};
use crate::store::{basename, normalize_path, RemoteConnector, RemoteEntry, RemoteFileStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

/// A remote file store rooted at a local directory.
///
/// Remote paths map onto paths below `base`; `..` segments are rejected.
/// Writes go to a hidden `.partial` file first and are renamed into place so
/// other devices never observe a half-written snapshot.
#[derive(Debug, Clone)]
pub struct DirectoryRemote {
    base: PathBuf,
}

impl DirectoryRemote {
    /// Creates a store rooted at `base`.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Returns the local directory backing the store root.
    #[must_use]
    pub fn base(&self) -> &Path {
        &self.base
    }

    fn local_path(&self, path: &str) -> RemoteResult<PathBuf> {
        let normalized = normalize_path(path);
        let mut local = self.base.clone();
        for segment in normalized.split('/').filter(|s| !s.is_empty()) {
            if segment == ".." || segment == "." {
                return Err(RemoteError::InvalidPath(path.to_string()));
            }
            local.push(segment);
        }
        Ok(local)
    }
}

fn map_io(err: io::Error, path: &str) -> RemoteError {
    if err.kind() == io::ErrorKind::NotFound {
        RemoteError::NotFound(normalize_path(path))
    } else {
        RemoteError::Io(err)
    }
}

async fn require_directory(local: &Path, path: &str) -> RemoteResult<()> {
    match tokio::fs::metadata(local).await {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(RemoteError::InvalidPath(format!("{path} is not a directory"))),
        Err(e) => Err(map_io(e, path)),
    }
}

#[async_trait]
impl RemoteFileStore for DirectoryRemote {
    async fn exists(&self, path: &str) -> RemoteResult<bool> {
        let local = self.local_path(path)?;
        Ok(tokio::fs::try_exists(&local).await?)
    }

    async fn create_directory(&self, path: &str) -> RemoteResult<()> {
        let local = self.local_path(path)?;
        tokio::fs::create_dir_all(&local).await?;
        Ok(())
    }

    async fn list(&self, path: &str) -> RemoteResult<Vec<RemoteEntry>> {
        let local = self.local_path(path)?;
        let dir = normalize_path(path);
        let mut reader = tokio::fs::read_dir(&local)
            .await
            .map_err(|e| map_io(e, path))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let meta = entry.metadata().await?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let filename = if dir == "/" {
                format!("/{name}")
            } else {
                format!("{dir}/{name}")
            };

            entries.push(RemoteEntry {
                basename: basename(&filename),
                filename,
                last_modified: DateTime::<Utc>::from(meta.modified()?),
                size: if meta.is_dir() { 0 } else { meta.len() },
                is_directory: meta.is_dir(),
            });
        }

        entries.sort_by(|a, b| a.basename.cmp(&b.basename));
        Ok(entries)
    }

    async fn read(&self, path: &str) -> RemoteResult<Vec<u8>> {
        let local = self.local_path(path)?;
        tokio::fs::read(&local).await.map_err(|e| map_io(e, path))
    }

    async fn write(&self, path: &str, data: &[u8]) -> RemoteResult<()> {
        let local = self.local_path(path)?;
        let parent = local
            .parent()
            .ok_or_else(|| RemoteError::InvalidPath(path.to_string()))?;
        require_directory(parent, path).await?;

        let name = basename(&normalize_path(path));
        let partial = parent.join(format!(".{name}.partial"));
        tokio::fs::write(&partial, data).await?;
        tokio::fs::rename(&partial, &local).await?;
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> RemoteResult<()> {
        let source = self.local_path(from)?;
        let target = self.local_path(to)?;

        let meta = tokio::fs::metadata(&source)
            .await
            .map_err(|e| map_io(e, from))?;
        if meta.is_dir() {
            return Err(RemoteError::InvalidPath(format!("{from} is a directory")));
        }

        tokio::fs::rename(&source, &target)
            .await
            .map_err(|e| map_io(e, to))?;

        tracing::debug!(from, to, "moved file, refreshing mtime");
        // A filesystem move keeps the old mtime; ownership claims need a fresh one.
        tokio::task::spawn_blocking(move || -> io::Result<()> {
            let file = std::fs::OpenOptions::new().write(true).open(&target)?;
            file.set_modified(SystemTime::now())
        })
        .await
        .map_err(io::Error::other)??;

        Ok(())
    }

    async fn delete(&self, path: &str) -> RemoteResult<()> {
        let local = self.local_path(path)?;
        tokio::fs::remove_file(&local)
            .await
            .map_err(|e| map_io(e, path))
    }
}

/// Connects to a [`DirectoryRemote`] named by the configured URL.
///
/// The URL is either a plain path or a `file://` URL. Credentials are
/// ignored; access control is whatever the filesystem enforces.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectoryConnector;

impl DirectoryConnector {
    /// Creates a new directory connector.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RemoteConnector for DirectoryConnector {
    async fn connect(&self, config: &RemoteConfig) -> RemoteResult<Arc<dyn RemoteFileStore>> {
        let raw = config.url.strip_prefix("file://").unwrap_or(&config.url);
        if raw.is_empty() {
            return Err(RemoteError::InvalidPath(config.url.clone()));
        }

        let base = PathBuf::from(raw);
        match tokio::fs::metadata(&base).await {
            Ok(meta) if meta.is_dir() => {
                tracing::debug!(base = %base.display(), "connected to directory remote");
                Ok(Arc::new(DirectoryRemote::new(base)))
            }
            Ok(_) => Err(RemoteError::InvalidPath(format!(
                "{} is not a directory",
                base.display()
            ))),
            Err(e) => Err(RemoteError::Unreachable(format!("{}: {e}", base.display()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn directory_write_read_list() {
        let dir = tempdir().unwrap();
        let remote = DirectoryRemote::new(dir.path());

        remote.create_directory("/sync").await.unwrap();
        remote.write("/sync/b.json", b"two").await.unwrap();
        remote.write("/sync/a.json", b"one").await.unwrap();

        let entries = remote.list("/sync").await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.basename.as_str()).collect();
        assert_eq!(names, vec!["a.json", "b.json"]);
        assert_eq!(entries[0].filename, "/sync/a.json");
        assert_eq!(remote.read("/sync/b.json").await.unwrap(), b"two");
    }

    #[tokio::test]
    async fn directory_rejects_parent_segments() {
        let dir = tempdir().unwrap();
        let remote = DirectoryRemote::new(dir.path());
        let result = remote.read("/../etc/passwd").await;
        assert!(matches!(result, Err(RemoteError::InvalidPath(_))));
    }

    #[tokio::test]
    async fn directory_missing_paths_are_not_found() {
        let dir = tempdir().unwrap();
        let remote = DirectoryRemote::new(dir.path());

        assert!(!remote.exists("/nothing").await.unwrap());
        assert!(matches!(
            remote.read("/nothing").await,
            Err(RemoteError::NotFound(_))
        ));
        assert!(matches!(
            remote.write("/missing/a.json", b"x").await,
            Err(RemoteError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn directory_rename_refreshes_mtime() {
        let dir = tempdir().unwrap();
        let remote = DirectoryRemote::new(dir.path());
        remote.write("/a.json", b"data").await.unwrap();

        let old = SystemTime::now() - std::time::Duration::from_secs(3600);
        std::fs::OpenOptions::new()
            .write(true)
            .open(dir.path().join("a.json"))
            .unwrap()
            .set_modified(old)
            .unwrap();

        remote.rename("/a.json", "/b.json").await.unwrap();

        let entries = remote.list("/").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].basename, "b.json");
        assert!(entries[0].last_modified > DateTime::<Utc>::from(old));
    }

    #[tokio::test]
    async fn connector_requires_existing_directory() {
        let dir = tempdir().unwrap();
        let connector = DirectoryConnector::new();

        let ok = RemoteConfig::new(format!("file://{}", dir.path().display()), "", "");
        assert!(connector.connect(&ok).await.is_ok());

        let missing = RemoteConfig::new(dir.path().join("gone").display().to_string(), "", "");
        assert!(matches!(
            connector.connect(&missing).await,
            Err(RemoteError::Unreachable(_))
        ));
    }
    #[tokio::test]
    async fn connector_does_not_speak_http() {
        let config = RemoteConfig::new("https://dav.example.com/remote.php/webdav", "u", "p");
        assert!(matches!(
            DirectoryConnector::new().connect(&config).await,
            Err(RemoteError::Unreachable(_))
        ));
    }
}
