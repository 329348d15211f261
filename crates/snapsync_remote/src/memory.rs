//! In-memory remote store for tests and simulations.

use crate::config::RemoteConfig;
use crate::error::{RemoteError, RemoteResult};
use crate::store::{basename, normalize_path, parent, RemoteConnector, RemoteEntry, RemoteFileStore};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Node {
    Directory { modified: DateTime<Utc> },
    File { data: Vec<u8>, modified: DateTime<Utc> },
}

impl Node {
    fn modified(&self) -> DateTime<Utc> {
        match self {
            Node::Directory { modified } | Node::File { modified, .. } => *modified,
        }
    }
}

#[derive(Debug)]
struct Inner {
    nodes: RwLock<BTreeMap<String, Node>>,
    last_stamp: Mutex<DateTime<Utc>>,
    online: AtomicBool,
    requests: AtomicU64,
}

/// An in-memory remote file store.
///
/// Clones share the same underlying tree, so several simulated devices can
/// synchronize through one `MemoryRemote`.
///
/// Modification times are strictly increasing across all writes and moves,
/// which keeps "most recently modified" well defined even when operations
/// land within the same clock tick.
#[derive(Debug, Clone)]
pub struct MemoryRemote {
    inner: Arc<Inner>,
}

impl MemoryRemote {
    /// Creates an empty store containing only the root directory.
    #[must_use]
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        let now = Utc::now();
        nodes.insert("/".to_string(), Node::Directory { modified: now });

        Self {
            inner: Arc::new(Inner {
                nodes: RwLock::new(nodes),
                last_stamp: Mutex::new(now),
                online: AtomicBool::new(true),
                requests: AtomicU64::new(0),
            }),
        }
    }

    /// Simulates the remote going offline or coming back.
    pub fn set_online(&self, online: bool) {
        self.inner.online.store(online, Ordering::SeqCst);
        tracing::debug!(online, "memory remote availability changed");
    }

    /// Returns the number of requests served so far.
    #[must_use]
    pub fn request_count(&self) -> u64 {
        self.inner.requests.load(Ordering::SeqCst)
    }

    /// Seeds a file with an explicit modification time.
    ///
    /// Parent directories are created as needed.
    pub fn insert_file(&self, path: &str, data: &[u8], modified: DateTime<Utc>) {
        let path = normalize_path(path);
        let mut nodes = self.inner.nodes.write();
        create_parents(&mut nodes, &path, modified);
        nodes.insert(
            path,
            Node::File {
                data: data.to_vec(),
                modified,
            },
        );
    }

    /// Returns the names of the files directly inside `dir`, in listing order.
    #[must_use]
    pub fn file_names(&self, dir: &str) -> Vec<String> {
        let dir = normalize_path(dir);
        self.inner
            .nodes
            .read()
            .iter()
            .filter(|(path, node)| matches!(node, Node::File { .. }) && parent(path) == dir)
            .map(|(path, _)| basename(path))
            .collect()
    }

    /// Returns the contents of the file at `path`, if any.
    #[must_use]
    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        match self.inner.nodes.read().get(&normalize_path(path)) {
            Some(Node::File { data, .. }) => Some(data.clone()),
            _ => None,
        }
    }

    fn begin_request(&self) -> RemoteResult<()> {
        self.inner.requests.fetch_add(1, Ordering::SeqCst);
        if self.inner.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RemoteError::Unreachable("memory remote is offline".into()))
        }
    }

    fn next_stamp(&self) -> DateTime<Utc> {
        let mut last = self.inner.last_stamp.lock();
        let now = Utc::now();
        let stamp = if now > *last {
            now
        } else {
            *last + Duration::milliseconds(1)
        };
        *last = stamp;
        stamp
    }
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

fn create_parents(nodes: &mut BTreeMap<String, Node>, path: &str, modified: DateTime<Utc>) {
    let mut dir = parent(path);
    let mut missing = Vec::new();
    while !nodes.contains_key(&dir) {
        missing.push(dir.clone());
        dir = parent(&dir);
    }
    for dir in missing {
        nodes.insert(dir, Node::Directory { modified });
    }
}

#[async_trait]
impl RemoteFileStore for MemoryRemote {
    async fn exists(&self, path: &str) -> RemoteResult<bool> {
        self.begin_request()?;
        Ok(self.inner.nodes.read().contains_key(&normalize_path(path)))
    }

    async fn create_directory(&self, path: &str) -> RemoteResult<()> {
        self.begin_request()?;
        let path = normalize_path(path);
        let stamp = self.next_stamp();
        let mut nodes = self.inner.nodes.write();

        match nodes.get(&path) {
            Some(Node::Directory { .. }) => Ok(()),
            Some(Node::File { .. }) => Err(RemoteError::InvalidPath(format!(
                "{path} exists and is a file"
            ))),
            None => {
                create_parents(&mut nodes, &path, stamp);
                nodes.insert(path, Node::Directory { modified: stamp });
                Ok(())
            }
        }
    }

    async fn list(&self, path: &str) -> RemoteResult<Vec<RemoteEntry>> {
        self.begin_request()?;
        let dir = normalize_path(path);
        let nodes = self.inner.nodes.read();

        if !matches!(nodes.get(&dir), Some(Node::Directory { .. })) {
            return Err(RemoteError::NotFound(dir));
        }

        Ok(nodes
            .iter()
            .filter(|(child, _)| child.as_str() != "/" && parent(child) == dir)
            .map(|(child, node)| RemoteEntry {
                filename: child.clone(),
                basename: basename(child),
                last_modified: node.modified(),
                size: match node {
                    Node::File { data, .. } => data.len() as u64,
                    Node::Directory { .. } => 0,
                },
                is_directory: matches!(node, Node::Directory { .. }),
            })
            .collect())
    }

    async fn read(&self, path: &str) -> RemoteResult<Vec<u8>> {
        self.begin_request()?;
        let path = normalize_path(path);
        match self.inner.nodes.read().get(&path) {
            Some(Node::File { data, .. }) => Ok(data.clone()),
            _ => Err(RemoteError::NotFound(path)),
        }
    }

    async fn write(&self, path: &str, data: &[u8]) -> RemoteResult<()> {
        self.begin_request()?;
        let path = normalize_path(path);
        let stamp = self.next_stamp();
        let mut nodes = self.inner.nodes.write();

        let dir = parent(&path);
        if !matches!(nodes.get(&dir), Some(Node::Directory { .. })) {
            return Err(RemoteError::NotFound(dir));
        }
        if matches!(nodes.get(&path), Some(Node::Directory { .. })) {
            return Err(RemoteError::InvalidPath(format!("{path} is a directory")));
        }

        nodes.insert(
            path,
            Node::File {
                data: data.to_vec(),
                modified: stamp,
            },
        );
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> RemoteResult<()> {
        self.begin_request()?;
        let from = normalize_path(from);
        let to = normalize_path(to);
        let stamp = self.next_stamp();
        let mut nodes = self.inner.nodes.write();

        let dir = parent(&to);
        if !matches!(nodes.get(&dir), Some(Node::Directory { .. })) {
            return Err(RemoteError::NotFound(dir));
        }

        match nodes.remove(&from) {
            Some(Node::File { data, .. }) => {
                nodes.insert(
                    to,
                    Node::File {
                        data,
                        modified: stamp,
                    },
                );
                Ok(())
            }
            Some(node) => {
                nodes.insert(from.clone(), node);
                Err(RemoteError::InvalidPath(format!("{from} is a directory")))
            }
            None => Err(RemoteError::NotFound(from)),
        }
    }

    async fn delete(&self, path: &str) -> RemoteResult<()> {
        self.begin_request()?;
        let path = normalize_path(path);
        let mut nodes = self.inner.nodes.write();
        match nodes.get(&path) {
            Some(Node::File { .. }) => {
                nodes.remove(&path);
                Ok(())
            }
            Some(Node::Directory { .. }) => {
                Err(RemoteError::InvalidPath(format!("{path} is a directory")))
            }
            None => Err(RemoteError::NotFound(path)),
        }
    }
}

/// Connects to a shared [`MemoryRemote`], optionally checking credentials.
#[derive(Debug)]
pub struct MemoryConnector {
    remote: MemoryRemote,
    credentials: Option<(String, String)>,
    connects: AtomicU64,
}

impl MemoryConnector {
    /// Creates a connector that accepts any credentials.
    pub fn new(remote: MemoryRemote) -> Self {
        Self {
            remote,
            credentials: None,
            connects: AtomicU64::new(0),
        }
    }

    /// Requires the given user name and password on connect.
    #[must_use]
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// Returns how many times [`RemoteConnector::connect`] was called.
    #[must_use]
    pub fn connect_count(&self) -> u64 {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteConnector for MemoryConnector {
    async fn connect(&self, config: &RemoteConfig) -> RemoteResult<Arc<dyn RemoteFileStore>> {
        self.connects.fetch_add(1, Ordering::SeqCst);

        if let Some((username, password)) = &self.credentials {
            if &config.username != username || &config.password != password {
                return Err(RemoteError::AuthenticationFailed(config.url.clone()));
            }
        }

        Ok(Arc::new(self.remote.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_write_read_roundtrip() {
        let remote = MemoryRemote::new();
        remote.write("/a.json", b"hello").await.unwrap();
        assert_eq!(remote.read("/a.json").await.unwrap(), b"hello");
        assert!(remote.exists("/a.json").await.unwrap());
    }

    #[tokio::test]
    async fn memory_write_requires_parent() {
        let remote = MemoryRemote::new();
        let result = remote.write("/missing/a.json", b"x").await;
        assert!(matches!(result, Err(RemoteError::NotFound(_))));

        remote.create_directory("/missing").await.unwrap();
        remote.write("/missing/a.json", b"x").await.unwrap();
    }

    #[tokio::test]
    async fn memory_list_returns_direct_children_only() {
        let remote = MemoryRemote::new();
        remote.create_directory("/sync/nested").await.unwrap();
        remote.write("/sync/a.json", b"1").await.unwrap();
        remote.write("/sync/nested/b.json", b"2").await.unwrap();

        let entries = remote.list("/sync").await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.basename.as_str()).collect();
        assert_eq!(names, vec!["a.json", "nested"]);
        assert!(entries[1].is_directory);
        assert_eq!(entries[0].size, 1);
    }

    #[tokio::test]
    async fn memory_list_missing_directory_fails() {
        let remote = MemoryRemote::new();
        let result = remote.list("/nope").await;
        assert!(matches!(result, Err(RemoteError::NotFound(_))));
    }

    #[tokio::test]
    async fn memory_modification_times_increase() {
        let remote = MemoryRemote::new();
        remote.write("/a", b"1").await.unwrap();
        remote.write("/b", b"2").await.unwrap();

        let entries = remote.list("/").await.unwrap();
        assert!(entries[1].last_modified > entries[0].last_modified);
    }

    #[tokio::test]
    async fn memory_rename_refreshes_timestamp() {
        let remote = MemoryRemote::new();
        remote.write("/a", b"1").await.unwrap();
        remote.write("/b", b"2").await.unwrap();
        remote.rename("/a", "/c").await.unwrap();

        let entries = remote.list("/").await.unwrap();
        let b = entries.iter().find(|e| e.basename == "b").unwrap();
        let c = entries.iter().find(|e| e.basename == "c").unwrap();
        assert!(c.last_modified > b.last_modified);
        assert_eq!(remote.contents("/c").unwrap(), b"1");
        assert!(remote.contents("/a").is_none());
    }

    #[tokio::test]
    async fn memory_rename_overwrites_target() {
        let remote = MemoryRemote::new();
        remote.write("/a", b"new").await.unwrap();
        remote.write("/b", b"old").await.unwrap();
        remote.rename("/a", "/b").await.unwrap();
        assert_eq!(remote.file_names("/"), vec!["b"]);
        assert_eq!(remote.contents("/b").unwrap(), b"new");
    }

    #[tokio::test]
    async fn memory_offline_rejects_requests() {
        let remote = MemoryRemote::new();
        remote.set_online(false);
        let result = remote.exists("/").await;
        assert!(matches!(result, Err(RemoteError::Unreachable(_))));
        assert_eq!(remote.request_count(), 1);
    }

    #[tokio::test]
    async fn memory_delete() {
        let remote = MemoryRemote::new();
        remote.write("/a", b"1").await.unwrap();
        remote.delete("/a").await.unwrap();
        assert!(!remote.exists("/a").await.unwrap());
        assert!(matches!(
            remote.delete("/a").await,
            Err(RemoteError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn connector_checks_credentials() {
        let connector =
            MemoryConnector::new(MemoryRemote::new()).with_credentials("alice", "secret");

        let bad = RemoteConfig::new("memory://", "alice", "wrong");
        assert!(matches!(
            connector.connect(&bad).await,
            Err(RemoteError::AuthenticationFailed(_))
        ));

        let good = RemoteConfig::new("memory://", "alice", "secret");
        assert!(connector.connect(&good).await.is_ok());
        assert_eq!(connector.connect_count(), 2);
    }
}
