//! Persisted remote credentials and the auto-sync flag.

use crate::config::{DEFAULT_AUTO_SYNC_KEY, REMOTE_CONFIG_KEY};
use crate::error::SyncResult;
use snapsync_remote::RemoteConfig;
use snapsync_storage::{KeyValueExt, KeyValueStore};
use std::sync::Arc;

/// Reads and writes the installation's sync settings.
///
/// The presence of a saved [`RemoteConfig`] is the only "is configured"
/// signal. Mutations return their outcome so callers can react to a failed
/// write; they are also logged.
#[derive(Clone)]
pub struct ConfigStore {
    store: Arc<dyn KeyValueStore>,
    auto_sync_key: String,
}

impl ConfigStore {
    /// Creates a config store using the default auto-sync key.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_auto_sync_key(store, DEFAULT_AUTO_SYNC_KEY)
    }

    /// Creates a config store using `auto_sync_key` for the auto-sync flag.
    pub fn with_auto_sync_key(store: Arc<dyn KeyValueStore>, auto_sync_key: impl Into<String>) -> Self {
        Self {
            store,
            auto_sync_key: auto_sync_key.into(),
        }
    }

    /// Persists the remote credentials.
    pub fn save(&self, config: &RemoteConfig) -> SyncResult<()> {
        self.store
            .set_json(REMOTE_CONFIG_KEY, config)
            .inspect_err(|e| tracing::warn!(error = %e, "failed to save remote config"))?;
        tracing::info!(url = %config.url, "saved remote config");
        Ok(())
    }

    /// Deletes the remote credentials.
    pub fn remove(&self) -> SyncResult<()> {
        self.store
            .remove(REMOTE_CONFIG_KEY)
            .inspect_err(|e| tracing::warn!(error = %e, "failed to remove remote config"))?;
        tracing::info!("removed remote config");
        Ok(())
    }

    /// Loads the remote credentials, if any.
    pub fn load(&self) -> SyncResult<Option<RemoteConfig>> {
        Ok(self.store.get_json(REMOTE_CONFIG_KEY)?)
    }

    /// Returns true if remote credentials are saved.
    ///
    /// A store that cannot be read counts as not configured.
    pub fn is_configured(&self) -> bool {
        match self.store.contains(REMOTE_CONFIG_KEY) {
            Ok(present) => present,
            Err(e) => {
                tracing::warn!(error = %e, "cannot read remote config");
                false
            }
        }
    }

    /// Returns the configured remote URL, or an empty string.
    pub fn url(&self) -> String {
        match self.load() {
            Ok(Some(config)) => config.url,
            Ok(None) => String::new(),
            Err(e) => {
                tracing::warn!(error = %e, "cannot read remote config");
                String::new()
            }
        }
    }

    /// Returns true if local mutations should trigger a sync.
    ///
    /// The flag is stored as `0|1`; anything else, including a missing or
    /// unreadable value, means off.
    pub fn is_auto_sync(&self) -> bool {
        match self.store.get_json::<serde_json::Value>(&self.auto_sync_key) {
            Ok(Some(value)) => value.as_u64() == Some(1),
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(error = %e, key = %self.auto_sync_key, "cannot read auto-sync flag");
                false
            }
        }
    }

    /// Persists the auto-sync flag.
    pub fn set_auto_sync(&self, enabled: bool) -> SyncResult<()> {
        self.store
            .set_json(&self.auto_sync_key, &u8::from(enabled))
            .inspect_err(|e| tracing::warn!(error = %e, "failed to save auto-sync flag"))?;
        Ok(())
    }
}

impl std::fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigStore")
            .field("auto_sync_key", &self.auto_sync_key)
            .finish_non_exhaustive()
    }
}
