//! Snapshot naming convention and database export/import.
//!
//! A snapshot is a full export of the local database stored remotely as
//!
//! ```text
//! {namespace}-export_{YYYY-MM-DD}_{deviceId}.json
//! ```
//!
//! The device id in the name marks which device last held the snapshot;
//! it is a freshness marker, not an access-control concept.

use crate::database::{ImportOptions, LocalDatabase};
use crate::error::{SyncError, SyncResult};
use snapsync_remote::RemoteEntry;
use std::fmt;
use std::sync::Arc;

const EXPORT_MARKER: &str = "-export";
const EXTENSION: &str = ".json";

/// The fields encoded in a snapshot file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotName {
    /// Namespace (extension name).
    pub namespace: String,
    /// Date stamp, `YYYY-MM-DD`.
    pub date: String,
    /// Device that last wrote or claimed the snapshot.
    pub device_id: String,
}

impl SnapshotName {
    /// Creates a snapshot name.
    pub fn new(
        namespace: impl Into<String>,
        date: impl Into<String>,
        device_id: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            date: date.into(),
            device_id: device_id.into(),
        }
    }

    /// Returns the file name for these fields.
    pub fn file_name(&self) -> String {
        build_file_name(&self.namespace, &self.device_id, &self.date)
    }
}

impl fmt::Display for SnapshotName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name())
    }
}

/// Builds `"{namespace}-export_{date}_{device_id}.json"`.
pub fn build_file_name(namespace: &str, device_id: &str, date: &str) -> String {
    format!("{namespace}{EXPORT_MARKER}_{date}_{device_id}{EXTENSION}")
}

/// Checks that `value` can be used as the `kind` field of a snapshot name.
///
/// A field must be non-empty and free of `_`, `/` and `.json`; otherwise
/// the file built from it would not parse back.
///
/// # Errors
///
/// Returns [`SyncError::MalformedName`] naming the field and value.
pub fn validate_name_field(kind: &str, value: &str) -> SyncResult<()> {
    if value.is_empty() || value.contains('_') || value.contains('/') || value.contains(EXTENSION) {
        return Err(SyncError::MalformedName(format!(
            "{kind} {value:?} cannot appear in a snapshot name"
        )));
    }
    Ok(())
}

/// Parses a snapshot file name back into its fields.
///
/// The name must end in `.json` with no other `.json` occurrence, and the
/// stem must split on `_` into exactly three non-empty fields, the first of
/// which ends in `-export`.
///
/// # Errors
///
/// Returns [`SyncError::MalformedName`] for anything else.
pub fn parse_file_name(name: &str) -> SyncResult<SnapshotName> {
    let malformed = || SyncError::MalformedName(name.to_string());

    let (stem, rest) = name.split_once(EXTENSION).ok_or_else(malformed)?;
    if !rest.is_empty() {
        return Err(malformed());
    }

    let fields: Vec<&str> = stem.split('_').collect();
    let [base, date, device_id] = fields.as_slice() else {
        return Err(malformed());
    };

    let namespace = base.strip_suffix(EXPORT_MARKER).ok_or_else(malformed)?;
    if namespace.is_empty() || date.is_empty() || device_id.is_empty() {
        return Err(malformed());
    }

    Ok(SnapshotName::new(namespace, *date, *device_id))
}

/// A snapshot file found in the remote directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSnapshot {
    /// The listing entry (path, timestamps).
    pub entry: RemoteEntry,
    /// Fields parsed from the file name.
    pub name: SnapshotName,
}

impl RemoteSnapshot {
    /// Parses a listing entry; fails if the name is not a snapshot name.
    pub fn from_entry(entry: RemoteEntry) -> SyncResult<Self> {
        let name = parse_file_name(&entry.basename)?;
        Ok(Self { entry, name })
    }

    /// Full remote path.
    pub fn path(&self) -> &str {
        &self.entry.filename
    }

    /// Returns true if `device_id` last wrote or claimed this snapshot.
    pub fn is_owned_by(&self, device_id: &str) -> bool {
        self.name.device_id == device_id
    }
}

/// Moves whole-database snapshots between the local database and bytes.
#[derive(Clone)]
pub struct SnapshotCodec {
    database: Arc<dyn LocalDatabase>,
    import_options: ImportOptions,
}

impl SnapshotCodec {
    /// Creates a codec over `database`.
    pub fn new(database: Arc<dyn LocalDatabase>, import_options: ImportOptions) -> Self {
        Self {
            database,
            import_options,
        }
    }

    /// Serializes the full local database.
    pub async fn export_snapshot(&self) -> SyncResult<Vec<u8>> {
        self.database
            .export()
            .await
            .map_err(|e| SyncError::Export(e.to_string()))
    }

    /// Replaces the local database content with `bytes`.
    pub async fn import_snapshot(&self, bytes: &[u8]) -> SyncResult<()> {
        self.database
            .import(bytes, self.import_options)
            .await
            .map_err(|e| SyncError::Import(e.to_string()))
    }

    /// The underlying database.
    pub fn database(&self) -> &Arc<dyn LocalDatabase> {
        &self.database
    }
}

impl fmt::Debug for SnapshotCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotCodec")
            .field("database", &self.database.name())
            .field("import_options", &self.import_options)
            .finish()
    }
}
