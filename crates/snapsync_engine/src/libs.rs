//! Host-facing bundle of sync services.
//!
//! [`SyncLibs`] wires the settings store, local database and remote
//! connector into the identity, remote adapter and lazily created engine a
//! host needs, plus a few database helpers.

use crate::clock::{Clock, SystemClock};
use crate::config::SyncConfig;
use crate::database::{ImportOptions, LocalDatabase};
use crate::engine::SyncEngine;
use crate::error::{SyncError, SyncResult};
use crate::identity::DeviceIdentity;
use crate::remote::RemoteAdapter;
use crate::resolver::SyncResolver;
use crate::settings::ConfigStore;
use crate::snapshot::SnapshotCodec;
use crate::watch::MutationSubscription;
use snapsync_remote::RemoteConnector;
use snapsync_storage::KeyValueStore;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

/// Sync services for one installation.
pub struct SyncLibs {
    config: SyncConfig,
    database: Arc<dyn LocalDatabase>,
    identity: Arc<DeviceIdentity>,
    settings: ConfigStore,
    adapter: Arc<RemoteAdapter>,
    clock: Arc<dyn Clock>,
    engine: OnceLock<Arc<SyncEngine>>,
}

impl SyncLibs {
    /// Wires the services together. Nothing touches the network until the
    /// engine is requested.
    ///
    /// A namespace rejected by [`SyncConfig::validate`] is logged here; ticks
    /// then fail with [`SyncError::MalformedName`].
    pub fn new(
        config: SyncConfig,
        store: Arc<dyn KeyValueStore>,
        database: Arc<dyn LocalDatabase>,
        connector: Arc<dyn RemoteConnector>,
    ) -> Self {
        if let Err(e) = config.validate() {
            tracing::warn!(error = %e, "invalid sync configuration; every tick will fail");
        }
        let identity = Arc::new(DeviceIdentity::with_key(
            Arc::clone(&store),
            config.identity_key.clone(),
        ));
        let settings = ConfigStore::with_auto_sync_key(store, config.auto_sync_key.clone());
        let adapter = Arc::new(RemoteAdapter::new(
            connector,
            settings.clone(),
            config.root_path.clone(),
        ));

        Self {
            config,
            database,
            identity,
            settings,
            adapter,
            clock: Arc::new(SystemClock),
            engine: OnceLock::new(),
        }
    }

    /// Replaces the date source used for snapshot names.
    ///
    /// Has no effect once the engine exists.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Configuration in use.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// This device's identifier, created on first use.
    pub fn device_id(&self) -> SyncResult<String> {
        self.identity.device_id()
    }

    /// Device identity service.
    pub fn identity(&self) -> &Arc<DeviceIdentity> {
        &self.identity
    }

    /// Remote configuration and connection service.
    pub fn remote(&self) -> &Arc<RemoteAdapter> {
        &self.adapter
    }

    /// Local database.
    pub fn database(&self) -> &Arc<dyn LocalDatabase> {
        &self.database
    }

    /// Returns the engine, creating and starting it on first call.
    ///
    /// # Panics
    ///
    /// The first call panics if made outside a tokio runtime.
    pub fn sync(&self) -> Arc<SyncEngine> {
        let engine = self.engine.get_or_init(|| {
            tracing::debug!(namespace = %self.config.namespace, "creating sync engine");
            Arc::new(SyncEngine::new(
                &self.config,
                self.resolver(),
                Arc::clone(&self.database),
            ))
        });
        Arc::clone(engine)
    }

    /// Builds a resolver for running ticks without the engine's timer.
    pub fn resolver(&self) -> SyncResolver {
        SyncResolver::new(
            Arc::clone(&self.adapter),
            Arc::clone(&self.identity),
            SnapshotCodec::new(Arc::clone(&self.database), self.import_options()),
            Arc::clone(&self.clock),
            self.config.namespace.clone(),
        )
        .with_retention(self.config.retention.clone())
    }

    /// Returns true if local writes should trigger a sync.
    pub fn is_auto_sync(&self) -> bool {
        self.settings.is_auto_sync()
    }

    /// Enables or disables sync on local writes.
    pub fn set_auto_sync(&self, enabled: bool) -> SyncResult<()> {
        self.settings.set_auto_sync(enabled)
    }

    /// Exports the database as a JSON string.
    pub async fn export_json(&self) -> SyncResult<String> {
        let bytes = self
            .database
            .export()
            .await
            .map_err(|e| SyncError::Export(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| SyncError::Export(e.to_string()))
    }

    /// Writes a full export to `{namespace}-export.json` inside `dir`.
    pub async fn export_to_file(&self, dir: &Path) -> SyncResult<PathBuf> {
        let json = self.export_json().await?;
        let path = dir.join(format!("{}-export.json", self.config.namespace));
        tokio::fs::write(&path, json).await?;
        tracing::info!(path = %path.display(), "database exported");
        Ok(path)
    }

    /// Replaces the database content with an exported blob.
    pub async fn import_blob(&self, blob: &[u8]) -> SyncResult<()> {
        self.database
            .import(blob, self.import_options())
            .await
            .map_err(|e| SyncError::Import(e.to_string()))
    }

    /// Calls `callback` after local writes, at most once per mutation
    /// throttle window.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn on_db_update<F>(&self, callback: F) -> MutationSubscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        MutationSubscription::spawn(
            self.database.as_ref(),
            self.config.mutation_throttle,
            callback,
        )
    }

    fn import_options(&self) -> ImportOptions {
        ImportOptions {
            clear_tables_before_import: self.config.clear_tables_before_import,
        }
    }
}

impl std::fmt::Debug for SyncLibs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncLibs")
            .field("namespace", &self.config.namespace)
            .field("engine_started", &self.engine.get().is_some())
            .finish_non_exhaustive()
    }
}
