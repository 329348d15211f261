//! In-memory key-value store for testing.

use crate::error::StorageResult;
use crate::store::KeyValueStore;
use parking_lot::RwLock;
use std::collections::HashMap;

/// An in-memory key-value store.
///
/// Suitable for unit tests, simulated devices and installations that do not
/// need to remember their identity across restarts.
///
/// # Example
///
/// ```rust
/// use snapsync_storage::{InMemoryStore, KeyValueStore};
///
/// let store = InMemoryStore::new();
/// store.set("cuid", b"\"abc\"").unwrap();
/// assert!(store.contains("cuid").unwrap());
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of keys currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if the store holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KeyValueStore for InMemoryStore {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        self.entries.write().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.entries.write().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::KeyValueExt;

    #[test]
    fn memory_new_is_empty() {
        let store = InMemoryStore::new();
        assert!(store.is_empty());
        assert_eq!(store.get("missing").unwrap(), None);
    }

    #[test]
    fn memory_set_then_get() {
        let store = InMemoryStore::new();
        store.set("key", b"value").unwrap();
        assert_eq!(store.get("key").unwrap(), Some(b"value".to_vec()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn memory_set_overwrites() {
        let store = InMemoryStore::new();
        store.set("key", b"one").unwrap();
        store.set("key", b"two").unwrap();
        assert_eq!(store.get("key").unwrap(), Some(b"two".to_vec()));
    }

    #[test]
    fn memory_remove_missing_key_succeeds() {
        let store = InMemoryStore::new();
        store.remove("never-set").unwrap();
        store.set("key", b"v").unwrap();
        store.remove("key").unwrap();
        assert!(!store.contains("key").unwrap());
    }

    #[test]
    fn memory_json_helpers() {
        let store = InMemoryStore::new();
        store.set_json("flag", &1u8).unwrap();
        assert_eq!(store.get_json::<u8>("flag").unwrap(), Some(1));

        store.set("broken", b"{not json").unwrap();
        assert!(store.get_json::<u8>("broken").is_err());
    }
}
