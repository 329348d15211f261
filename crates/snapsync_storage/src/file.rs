//! File-based key-value store for persistent settings.

use crate::error::{StorageError, StorageResult};
use crate::store::KeyValueStore;
use fs2::FileExt;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// A file-backed key-value store.
///
/// All entries live in one JSON document that is loaded on open and
/// rewritten on every mutation.
///
/// # Durability
///
/// Writes use the write-then-rename pattern:
/// 1. Write the whole document to `<path>.tmp`
/// 2. Sync the temporary file to disk
/// 3. Rename it over `<path>`
///
/// # Locking
///
/// An advisory lock on `<path>.lock` is held for the lifetime of the store,
/// so two processes cannot interleave writes to the same settings file.
///
/// # Example
///
/// ```no_run
/// use snapsync_storage::{FileStore, KeyValueStore};
/// use std::path::Path;
///
/// let store = FileStore::open(Path::new("settings.json")).unwrap();
/// store.set("cuid", b"\"device-1\"").unwrap();
/// ```
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
    _lock_file: File,
}

impl FileStore {
    /// Opens or creates a store at `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Another process holds the lock (`Locked`)
    /// - The existing file is not a valid store document (`Corrupted`)
    /// - I/O errors occur
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let lock_path = sibling(path, "lock");
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked(path.display().to_string()));
        }

        let entries = load_entries(path)?;
        tracing::debug!(path = %path.display(), keys = entries.len(), "opened settings store");

        Ok(Self {
            path: path.to_path_buf(),
            entries: RwLock::new(entries),
            _lock_file: lock_file,
        })
    }

    /// Returns the path to the store document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, Vec<u8>>) -> StorageResult<()> {
        let data = serde_json::to_vec_pretty(entries)
            .map_err(|e| StorageError::Corrupted(format!("cannot encode store: {e}")))?;

        let temp_path = sibling(&self.path, "tmp");
        let mut file = File::create(&temp_path)?;
        file.write_all(&data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        let mut entries = self.entries.write();
        let previous = entries.insert(key.to_string(), value.to_vec());

        if let Err(e) = self.persist(&entries) {
            // Keep memory consistent with disk.
            match previous {
                Some(old) => entries.insert(key.to_string(), old),
                None => entries.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let mut entries = self.entries.write();
        let Some(previous) = entries.remove(key) else {
            return Ok(());
        };

        if let Err(e) = self.persist(&entries) {
            entries.insert(key.to_string(), previous);
            return Err(e);
        }
        Ok(())
    }
}

fn sibling(path: &Path, extension: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(extension);
    path.with_file_name(name)
}

fn load_entries(path: &Path) -> StorageResult<BTreeMap<String, Vec<u8>>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }

    let data = fs::read(path)?;
    if data.is_empty() {
        return Ok(BTreeMap::new());
    }

    serde_json::from_slice(&data)
        .map_err(|e| StorageError::Corrupted(format!("{}: {e}", path.display())))
}
