//! Local database contract and an in-memory implementation.
//!
//! The engine replicates whole databases, so it needs three things from
//! the local store: a full export, a destructive full import, and a feed
//! of local mutations to drive auto-sync.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;
use tokio::sync::broadcast;

/// Name written into every export produced by [`MemoryDatabase`].
pub const EXPORT_FORMAT_NAME: &str = "snapsync";

/// Current export format version.
pub const EXPORT_FORMAT_VERSION: u32 = 1;

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Result type for local database operations.
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Errors raised by a local database.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// The table is not part of this database.
    #[error("unknown table: {0}")]
    UnknownTable(String),

    /// The blob is not an export this database understands.
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    /// JSON encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Type of a local mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    /// A row was inserted.
    Create,
    /// An existing row was replaced.
    Update,
    /// A row was removed.
    Delete,
}

/// A single local mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    /// Table the row belongs to.
    pub table: String,
    /// Primary key of the row.
    pub key: String,
    /// What happened to the row.
    pub kind: MutationKind,
}

/// How an import treats existing content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportOptions {
    /// Empty every table before loading the snapshot (full replace).
    pub clear_tables_before_import: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            clear_tables_before_import: true,
        }
    }
}

/// The local database being replicated.
///
/// Implementations must be `Send + Sync`; the engine calls them from
/// spawned tasks.
#[async_trait]
pub trait LocalDatabase: Send + Sync {
    /// Database name, used for export file names and diagnostics.
    fn name(&self) -> &str;

    /// Serializes the entire database.
    async fn export(&self) -> DatabaseResult<Vec<u8>>;

    /// Loads a blob produced by [`LocalDatabase::export`].
    ///
    /// With `clear_tables_before_import` this replaces the whole content.
    /// Imports do not produce [`Mutation`] events.
    async fn import(&self, blob: &[u8], options: ImportOptions) -> DatabaseResult<()>;

    /// Subscribes to create/update/delete events across all tables.
    ///
    /// Dropping the receiver unsubscribes.
    fn subscribe(&self) -> broadcast::Receiver<Mutation>;
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExportDocument {
    format_name: String,
    format_version: u32,
    data: ExportData,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExportData {
    database_name: String,
    tables: Vec<ExportTable>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ExportTable {
    name: String,
    rows: Vec<ExportRow>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ExportRow {
    key: String,
    value: Value,
}

type Tables = BTreeMap<String, BTreeMap<String, Value>>;

/// An in-memory database of JSON rows grouped into named tables.
///
/// The table set is fixed at construction, mirroring a schema; imports may
/// add tables present in the snapshot.
///
/// # Example
///
/// ```rust
/// use snapsync_engine::MemoryDatabase;
/// use serde_json::json;
///
/// let db = MemoryDatabase::new("notes", ["notes", "tags"]);
/// db.put("notes", "n1", json!({"title": "hello"})).unwrap();
/// assert_eq!(db.get("notes", "n1"), Some(json!({"title": "hello"})));
/// ```
#[derive(Debug)]
pub struct MemoryDatabase {
    name: String,
    tables: RwLock<Tables>,
    changes: broadcast::Sender<Mutation>,
}

impl MemoryDatabase {
    /// Creates an empty database with the given tables.
    pub fn new<I, S>(name: impl Into<String>, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tables = tables
            .into_iter()
            .map(|t| (t.into(), BTreeMap::new()))
            .collect();
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);

        Self {
            name: name.into(),
            tables: RwLock::new(tables),
            changes,
        }
    }

    /// Inserts or replaces a row.
    pub fn put(&self, table: &str, key: &str, value: Value) -> DatabaseResult<MutationKind> {
        let kind = {
            let mut tables = self.tables.write();
            let rows = tables
                .get_mut(table)
                .ok_or_else(|| DatabaseError::UnknownTable(table.to_string()))?;
            match rows.insert(key.to_string(), value) {
                Some(_) => MutationKind::Update,
                None => MutationKind::Create,
            }
        };

        self.notify(table, key, kind);
        Ok(kind)
    }

    /// Removes a row; returns true if it existed.
    pub fn delete(&self, table: &str, key: &str) -> DatabaseResult<bool> {
        let removed = {
            let mut tables = self.tables.write();
            let rows = tables
                .get_mut(table)
                .ok_or_else(|| DatabaseError::UnknownTable(table.to_string()))?;
            rows.remove(key).is_some()
        };

        if removed {
            self.notify(table, key, MutationKind::Delete);
        }
        Ok(removed)
    }

    /// Reads a row.
    pub fn get(&self, table: &str, key: &str) -> Option<Value> {
        self.tables.read().get(table)?.get(key).cloned()
    }

    /// Returns all rows of a table ordered by key.
    pub fn rows(&self, table: &str) -> Vec<(String, Value)> {
        self.tables
            .read()
            .get(table)
            .map(|rows| rows.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    }

    /// Returns the table names.
    pub fn table_names(&self) -> Vec<String> {
        self.tables.read().keys().cloned().collect()
    }

    /// Total number of rows across all tables.
    pub fn row_count(&self) -> usize {
        self.tables.read().values().map(BTreeMap::len).sum()
    }

    fn notify(&self, table: &str, key: &str, kind: MutationKind) {
        // No subscribers is fine.
        let _ = self.changes.send(Mutation {
            table: table.to_string(),
            key: key.to_string(),
            kind,
        });
    }
}

#[async_trait]
impl LocalDatabase for MemoryDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    async fn export(&self) -> DatabaseResult<Vec<u8>> {
        let tables = self
            .tables
            .read()
            .iter()
            .map(|(name, rows)| ExportTable {
                name: name.clone(),
                rows: rows
                    .iter()
                    .map(|(key, value)| ExportRow {
                        key: key.clone(),
                        value: value.clone(),
                    })
                    .collect(),
            })
            .collect();

        let document = ExportDocument {
            format_name: EXPORT_FORMAT_NAME.to_string(),
            format_version: EXPORT_FORMAT_VERSION,
            data: ExportData {
                database_name: self.name.clone(),
                tables,
            },
        };

        Ok(serde_json::to_vec(&document)?)
    }

    async fn import(&self, blob: &[u8], options: ImportOptions) -> DatabaseResult<()> {
        let document: ExportDocument = serde_json::from_slice(blob)?;

        if document.format_name != EXPORT_FORMAT_NAME {
            return Err(DatabaseError::InvalidSnapshot(format!(
                "unexpected format {:?}",
                document.format_name
            )));
        }
        if document.format_version > EXPORT_FORMAT_VERSION {
            return Err(DatabaseError::InvalidSnapshot(format!(
                "unsupported format version {}",
                document.format_version
            )));
        }

        let mut tables = self.tables.write();
        if options.clear_tables_before_import {
            for rows in tables.values_mut() {
                rows.clear();
            }
        }

        for table in document.data.tables {
            let rows = tables.entry(table.name).or_default();
            for row in table.rows {
                rows.insert(row.key, row.value);
            }
        }

        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<Mutation> {
        self.changes.subscribe()
    }
}
