//! Remote store adapter: connection caching and snapshot listing.

use crate::error::{SyncError, SyncResult};
use crate::settings::ConfigStore;
use crate::snapshot::RemoteSnapshot;
use parking_lot::RwLock;
use snapsync_remote::{join_path, normalize_path, RemoteConfig, RemoteConnector, RemoteError, RemoteFileStore};
use std::fmt;
use std::sync::Arc;

/// A live client bound to the snapshot root directory.
#[derive(Clone)]
pub struct Connection {
    client: Arc<dyn RemoteFileStore>,
    root_path: String,
}

impl Connection {
    /// Binds `client` to `root_path`.
    pub fn new(client: Arc<dyn RemoteFileStore>, root_path: impl Into<String>) -> Self {
        Self {
            client,
            root_path: normalize_path(&root_path.into()),
        }
    }

    /// The snapshot root directory.
    pub fn root_path(&self) -> &str {
        &self.root_path
    }

    /// Full remote path for a file name under the root.
    pub fn path_for(&self, file_name: &str) -> String {
        join_path(&self.root_path, file_name)
    }

    /// Lists the snapshots of `namespace` under the root, in listing order.
    ///
    /// Directories, names that are not snapshot names, and snapshots of
    /// other namespaces are skipped. A missing root yields an empty list.
    pub async fn list(&self, namespace: &str) -> SyncResult<Vec<RemoteSnapshot>> {
        let entries = match self.client.list(&self.root_path).await {
            Ok(entries) => entries,
            Err(RemoteError::NotFound(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut snapshots = Vec::with_capacity(entries.len());
        for entry in entries {
            if entry.is_directory {
                continue;
            }
            match RemoteSnapshot::from_entry(entry) {
                Ok(snapshot) if snapshot.name.namespace == namespace => snapshots.push(snapshot),
                Ok(snapshot) => {
                    tracing::debug!(path = %snapshot.path(), "skipping snapshot of another namespace");
                }
                Err(e) => tracing::debug!(error = %e, "skipping foreign file"),
            }
        }
        Ok(snapshots)
    }

    /// Reads a snapshot's content.
    pub async fn read(&self, snapshot: &RemoteSnapshot) -> SyncResult<Vec<u8>> {
        Ok(self.client.read(snapshot.path()).await?)
    }

    /// Writes `data` as `file_name` under the root; returns the full path.
    pub async fn write(&self, file_name: &str, data: &[u8]) -> SyncResult<String> {
        let path = self.path_for(file_name);
        self.client.write(&path, data).await?;
        Ok(path)
    }

    /// Renames a snapshot to `file_name` under the root; returns the new path.
    pub async fn rename(&self, snapshot: &RemoteSnapshot, file_name: &str) -> SyncResult<String> {
        let path = self.path_for(file_name);
        self.client.rename(snapshot.path(), &path).await?;
        Ok(path)
    }

    /// Deletes a snapshot.
    pub async fn delete(&self, snapshot: &RemoteSnapshot) -> SyncResult<()> {
        Ok(self.client.delete(snapshot.path()).await?)
    }

    /// The underlying client.
    pub fn client(&self) -> &Arc<dyn RemoteFileStore> {
        &self.client
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("root_path", &self.root_path)
            .finish_non_exhaustive()
    }
}

/// Owns the cached remote connection and the remote configuration.
///
/// The connection is created lazily from the saved configuration and
/// dropped whenever the configuration is removed. A tick that already holds
/// a [`Connection`] keeps using it until it finishes.
pub struct RemoteAdapter {
    connector: Arc<dyn RemoteConnector>,
    settings: ConfigStore,
    root_path: String,
    cached: RwLock<Option<Connection>>,
}

impl RemoteAdapter {
    /// Creates an adapter that builds clients with `connector`.
    pub fn new(
        connector: Arc<dyn RemoteConnector>,
        settings: ConfigStore,
        root_path: impl Into<String>,
    ) -> Self {
        Self {
            connector,
            settings,
            root_path: normalize_path(&root_path.into()),
            cached: RwLock::new(None),
        }
    }

    /// The snapshot root directory.
    pub fn root_path(&self) -> &str {
        &self.root_path
    }

    /// The settings this adapter reads its configuration from.
    pub fn settings(&self) -> &ConfigStore {
        &self.settings
    }

    /// Connects with `config` and caches the connection.
    ///
    /// Creates the root directory if it is missing. Failures are logged and
    /// yield `None`; nothing is cached.
    pub async fn connect(&self, config: &RemoteConfig) -> Option<Connection> {
        match self.establish(config).await {
            Ok(connection) => Some(connection),
            Err(e) => {
                tracing::warn!(url = %config.url, error = %e, "remote connection failed");
                None
            }
        }
    }

    /// Returns the cached connection, connecting from the saved
    /// configuration if needed.
    ///
    /// # Errors
    ///
    /// - [`SyncError::NotConfigured`] if no configuration is saved
    /// - [`SyncError::Connection`] if connecting fails
    pub async fn connection(&self) -> SyncResult<Connection> {
        let cached = self.cached.read().clone();
        if let Some(connection) = cached {
            return Ok(connection);
        }

        let config = self.settings.load()?.ok_or(SyncError::NotConfigured)?;
        self.establish(&config)
            .await
            .inspect_err(|e| tracing::warn!(url = %config.url, error = %e, "remote connection failed"))
    }

    /// Drops the cached connection.
    pub fn invalidate(&self) {
        *self.cached.write() = None;
    }

    /// Returns true if a connection is cached.
    pub fn is_connected(&self) -> bool {
        self.cached.read().is_some()
    }

    /// Persists the remote configuration.
    ///
    /// The cached connection, if any, keeps serving until it is invalidated.
    pub fn save_config(&self, config: &RemoteConfig) -> SyncResult<()> {
        self.settings.save(config)
    }

    /// Removes the remote configuration and drops the cached connection.
    pub fn remove_config(&self) -> SyncResult<()> {
        self.invalidate();
        self.settings.remove()
    }

    /// Returns true if a remote configuration is saved.
    pub fn is_configured(&self) -> bool {
        self.settings.is_configured()
    }

    /// Returns the configured URL, or an empty string.
    pub fn url(&self) -> String {
        self.settings.url()
    }

    async fn establish(&self, config: &RemoteConfig) -> SyncResult<Connection> {
        let client = self
            .connector
            .connect(config)
            .await
            .map_err(|e| SyncError::Connection(e.to_string()))?;

        let root_exists = client
            .exists(&self.root_path)
            .await
            .map_err(|e| SyncError::Connection(e.to_string()))?;
        if !root_exists {
            client
                .create_directory(&self.root_path)
                .await
                .map_err(|e| SyncError::Connection(format!("cannot create {}: {e}", self.root_path)))?;
            tracing::info!(root = %self.root_path, "created remote root directory");
        }

        let connection = Connection::new(client, self.root_path.clone());
        *self.cached.write() = Some(connection.clone());
        tracing::debug!(url = %config.url, root = %self.root_path, "remote connected");
        Ok(connection)
    }
}

impl fmt::Debug for RemoteAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteAdapter")
            .field("root_path", &self.root_path)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use snapsync_remote::{MemoryConnector, MemoryRemote};
    use snapsync_storage::InMemoryStore;

    fn adapter(remote: &MemoryRemote) -> (RemoteAdapter, Arc<MemoryConnector>) {
        let connector = Arc::new(
            MemoryConnector::new(remote.clone()).with_credentials("alice", "secret"),
        );
        let settings = ConfigStore::new(Arc::new(InMemoryStore::new()));
        let adapter = RemoteAdapter::new(connector.clone(), settings, "/ext");
        (adapter, connector)
    }

    fn config() -> RemoteConfig {
        RemoteConfig::new("memory://dav", "alice", "secret")
    }

    #[tokio::test]
    async fn connection_requires_config() {
        let remote = MemoryRemote::new();
        let (adapter, _) = adapter(&remote);
        assert!(matches!(
            adapter.connection().await,
            Err(SyncError::NotConfigured)
        ));
    }

    #[tokio::test]
    async fn connection_creates_root_and_is_cached() {
        let remote = MemoryRemote::new();
        let (adapter, connector) = adapter(&remote);
        adapter.save_config(&config()).unwrap();

        let connection = adapter.connection().await.unwrap();
        assert_eq!(connection.root_path(), "/ext");
        assert!(remote.exists("/ext").await.unwrap());
        assert!(adapter.is_connected());

        adapter.connection().await.unwrap();
        assert_eq!(connector.connect_count(), 1);
    }

    #[tokio::test]
    async fn remove_config_invalidates_connection() {
        let remote = MemoryRemote::new();
        let (adapter, _) = adapter(&remote);
        adapter.save_config(&config()).unwrap();
        adapter.connection().await.unwrap();

        adapter.remove_config().unwrap();
        assert!(!adapter.is_connected());
        assert!(!adapter.is_configured());
        assert_eq!(adapter.url(), "");
        assert!(matches!(
            adapter.connection().await,
            Err(SyncError::NotConfigured)
        ));
    }

    #[tokio::test]
    async fn failed_connect_is_not_cached() {
        let remote = MemoryRemote::new();
        let (adapter, _) = adapter(&remote);

        let wrong = RemoteConfig::new("memory://dav", "alice", "nope");
        assert!(adapter.connect(&wrong).await.is_none());
        assert!(!adapter.is_connected());

        adapter.save_config(&wrong).unwrap();
        assert!(matches!(
            adapter.connection().await,
            Err(SyncError::Connection(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_remote_is_a_connection_error() {
        let remote = MemoryRemote::new();
        let (adapter, _) = adapter(&remote);
        adapter.save_config(&config()).unwrap();
        remote.set_online(false);

        assert!(matches!(
            adapter.connection().await,
            Err(SyncError::Connection(_))
        ));
    }

    #[tokio::test]
    async fn list_skips_foreign_entries() {
        let remote = MemoryRemote::new();
        let now = Utc::now();
        remote.insert_file("/ext/ext-export_2024-01-01_A.json", b"{}", now);
        remote.insert_file("/ext/other-export_2024-01-01_B.json", b"{}", now);
        remote.insert_file("/ext/readme.txt", b"hi", now);
        remote.insert_file("/ext/archive/ext-export_2023-01-01_C.json", b"{}", now);

        let connection = Connection::new(Arc::new(remote), "/ext");
        let snapshots = connection.list("ext").await.unwrap();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].name.device_id, "A");
        assert_eq!(snapshots[0].path(), "/ext/ext-export_2024-01-01_A.json");
    }

    #[tokio::test]
    async fn list_of_missing_root_is_empty() {
        let connection = Connection::new(Arc::new(MemoryRemote::new()), "/nowhere");
        assert!(connection.list("ext").await.unwrap().is_empty());
    }
}
