//! Per-installation device identity.

use crate::config::DEFAULT_IDENTITY_KEY;
use crate::error::SyncResult;
use crate::snapshot::validate_name_field;
use parking_lot::Mutex;
use snapsync_storage::{KeyValueExt, KeyValueStore};
use std::sync::Arc;
use uuid::Uuid;

/// A stable random identifier for this installation.
///
/// The identifier is generated on first use, persisted under the identity
/// key, and never changes afterwards. Read-or-create runs under a lock, so
/// concurrent first calls within one process agree on a single id. Two
/// processes sharing a non-linearizable store can still race.
pub struct DeviceIdentity {
    store: Arc<dyn KeyValueStore>,
    key: Mutex<String>,
    cached: Mutex<Option<String>>,
}

impl DeviceIdentity {
    /// Creates an identity persisted under the default key.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_key(store, DEFAULT_IDENTITY_KEY)
    }

    /// Creates an identity persisted under `key`.
    pub fn with_key(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: Mutex::new(key.into()),
            cached: Mutex::new(None),
        }
    }

    /// Changes the persistence key.
    ///
    /// Lets several independent engines share one settings store. Takes
    /// effect on the next read; an id already read under the old key is
    /// forgotten.
    pub fn set_key(&self, key: impl Into<String>) {
        *self.key.lock() = key.into();
        *self.cached.lock() = None;
    }

    /// Returns the persistence key.
    pub fn key(&self) -> String {
        self.key.lock().clone()
    }

    /// Returns the device id, generating and persisting one if absent.
    ///
    /// A stored id that cannot appear in snapshot names is an error and is
    /// left in place.
    pub fn device_id(&self) -> SyncResult<String> {
        let mut cached = self.cached.lock();
        if let Some(id) = cached.as_ref() {
            return Ok(id.clone());
        }

        let key = self.key();
        let id = match self.store.get_json::<String>(&key)? {
            Some(id) if !id.is_empty() => {
                validate_name_field("device id", &id).inspect_err(|e| {
                    tracing::warn!(error = %e, key = %key, "stored device id is unusable");
                })?;
                id
            }
            _ => {
                let id = Uuid::new_v4().to_string();
                self.store.set_json(&key, &id)?;
                tracing::info!(device_id = %id, key = %key, "generated device identity");
                id
            }
        };

        *cached = Some(id.clone());
        Ok(id)
    }
}

impl std::fmt::Debug for DeviceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceIdentity")
            .field("key", &self.key())
            .field("cached", &*self.cached.lock())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snapsync_storage::InMemoryStore;

    #[test]
    fn device_id_is_stable() {
        let store = Arc::new(InMemoryStore::new());
        let identity = DeviceIdentity::new(store.clone());

        let first = identity.device_id().unwrap();
        let second = identity.device_id().unwrap();
        assert_eq!(first, second);

        // A fresh handle over the same store reads the persisted id.
        let reopened = DeviceIdentity::new(store);
        assert_eq!(reopened.device_id().unwrap(), first);
    }

    #[test]
    fn separate_installations_differ() {
        let a = DeviceIdentity::new(Arc::new(InMemoryStore::new()));
        let b = DeviceIdentity::new(Arc::new(InMemoryStore::new()));
        assert_ne!(a.device_id().unwrap(), b.device_id().unwrap());
    }

    #[test]
    fn device_id_has_no_name_separators() {
        let identity = DeviceIdentity::new(Arc::new(InMemoryStore::new()));
        let id = identity.device_id().unwrap();
        assert!(!id.contains('_'));
        assert!(!id.contains(".json"));
    }

    #[test]
    fn stored_id_with_separator_is_rejected() {
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
        store.set_json(DEFAULT_IDENTITY_KEY, "device_1").unwrap();
        let identity = DeviceIdentity::new(store.clone());

        assert!(matches!(
            identity.device_id(),
            Err(crate::error::SyncError::MalformedName(_))
        ));
        // The stored value is left for the host to repair.
        assert_eq!(
            store.get_json::<String>(DEFAULT_IDENTITY_KEY).unwrap().as_deref(),
            Some("device_1")
        );
    }

    #[test]
    fn keys_isolate_instances() {
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
        let notes = DeviceIdentity::with_key(store.clone(), "notes_cuid");
        let todos = DeviceIdentity::new(store.clone());
        todos.set_key("todos_cuid");

        assert_ne!(notes.device_id().unwrap(), todos.device_id().unwrap());
        assert!(store.contains("notes_cuid").unwrap());
        assert!(store.contains("todos_cuid").unwrap());
        assert!(!store.contains(DEFAULT_IDENTITY_KEY).unwrap());
    }

    #[test]
    fn concurrent_first_reads_agree() {
        let identity = Arc::new(DeviceIdentity::new(Arc::new(InMemoryStore::new())));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let identity = Arc::clone(&identity);
                std::thread::spawn(move || identity.device_id().unwrap())
            })
            .collect();

        let ids: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
    }
}
