//! The conflict resolver: one synchronization attempt.
//!
//! Without a central authority the only ordering signal is the remote
//! last-modified time, so the most recently modified snapshot is the
//! current state. Its file name says which device holds it:
//!
//! - nothing on the remote: upload a first snapshot
//! - latest is ours: we are current, upload a fresh snapshot so other
//!   devices see us as most recent
//! - latest is someone else's: import it (full replace), then rename it to
//!   carry our device id, which claims it and refreshes its timestamp

use crate::clock::Clock;
use crate::config::RetentionPolicy;
use crate::error::{SyncError, SyncResult};
use crate::identity::DeviceIdentity;
use crate::remote::{Connection, RemoteAdapter};
use crate::snapshot::{build_file_name, validate_name_field, RemoteSnapshot, SnapshotCodec};
use chrono::Utc;
use snapsync_remote::RemoteError;
use std::sync::Arc;

/// What a tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The remote held no snapshot; the first one was uploaded.
    Seeded {
        /// Path of the uploaded snapshot.
        path: String,
    },
    /// The latest snapshot was ours; a fresh one was uploaded.
    Refreshed {
        /// Path of the uploaded snapshot.
        path: String,
    },
    /// Another device's snapshot was imported and claimed.
    Received {
        /// Device that held the snapshot before the claim.
        from_device: String,
        /// Path of the claimed snapshot.
        path: String,
    },
    /// The latest snapshot was empty or vanished; nothing changed.
    Skipped {
        /// Path of the skipped snapshot.
        path: String,
    },
}

impl TickOutcome {
    /// Returns true if remote data was imported into the local database.
    pub fn received(&self) -> bool {
        matches!(self, TickOutcome::Received { .. })
    }

    /// Returns the path of the snapshot uploaded by this tick, if any.
    pub fn uploaded_path(&self) -> Option<&str> {
        match self {
            TickOutcome::Seeded { path } | TickOutcome::Refreshed { path } => Some(path),
            _ => None,
        }
    }
}

/// Runs ticks of the resolution algorithm.
pub struct SyncResolver {
    adapter: Arc<RemoteAdapter>,
    identity: Arc<DeviceIdentity>,
    codec: SnapshotCodec,
    clock: Arc<dyn Clock>,
    namespace: String,
    retention: RetentionPolicy,
}

impl SyncResolver {
    /// Creates a resolver.
    pub fn new(
        adapter: Arc<RemoteAdapter>,
        identity: Arc<DeviceIdentity>,
        codec: SnapshotCodec,
        clock: Arc<dyn Clock>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            adapter,
            identity,
            codec,
            clock,
            namespace: namespace.into(),
            retention: RetentionPolicy::default(),
        }
    }

    /// Sets the retention policy.
    #[must_use]
    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    /// The remote adapter.
    pub fn adapter(&self) -> &Arc<RemoteAdapter> {
        &self.adapter
    }

    /// Runs one tick to completion.
    ///
    /// # Errors
    ///
    /// Fails with [`SyncError::NotConfigured`] or [`SyncError::Connection`]
    /// before touching anything, and with remote, export or import errors
    /// from the step that failed. An import failure leaves the remote
    /// snapshot unclaimed.
    pub async fn run_tick(&self) -> SyncResult<TickOutcome> {
        let device_id = self.identity.device_id()?;
        let file_name = self.file_name(&device_id)?;
        let connection = self.adapter.connection().await?;
        let mut snapshots = connection.list(&self.namespace).await?;

        // Stable: equal timestamps keep listing order.
        snapshots.sort_by(|a, b| b.entry.last_modified.cmp(&a.entry.last_modified));

        let Some(latest) = snapshots.first() else {
            let path = self.upload(&connection, &file_name).await?;
            tracing::info!(%path, "seeded remote with first snapshot");
            return Ok(TickOutcome::Seeded { path });
        };

        if latest.is_owned_by(&device_id) {
            let path = self.upload(&connection, &file_name).await?;
            tracing::debug!(%path, "local device is current; refreshed snapshot");
            self.prune(&connection, &snapshots, &path, &device_id).await;
            return Ok(TickOutcome::Refreshed { path });
        }

        let content = match connection.read(latest).await {
            Ok(content) => content,
            Err(SyncError::Remote(RemoteError::NotFound(path))) => {
                tracing::warn!(%path, "latest snapshot vanished before it could be read");
                return Ok(TickOutcome::Skipped { path });
            }
            Err(e) => return Err(e),
        };

        if content.is_empty() {
            tracing::warn!(path = %latest.path(), "latest snapshot is empty; not importing");
            return Ok(TickOutcome::Skipped {
                path: latest.path().to_string(),
            });
        }

        self.codec.import_snapshot(&content).await?;

        let from_device = latest.name.device_id.clone();
        let path = connection
            .rename(latest, &file_name)
            .await?;
        tracing::info!(from = %from_device, %path, bytes = content.len(), "imported remote snapshot");

        self.prune(&connection, &snapshots[1..], &path, &device_id).await;
        Ok(TickOutcome::Received { from_device, path })
    }

    /// Name this device writes and claims under today.
    ///
    /// Fails unless the name parses back to the same fields, since other
    /// devices would skip it as a foreign file.
    fn file_name(&self, device_id: &str) -> SyncResult<String> {
        validate_name_field("namespace", &self.namespace)?;
        validate_name_field("device id", device_id)?;
        let date = self.clock.date_stamp();
        validate_name_field("date", &date)?;
        Ok(build_file_name(&self.namespace, device_id, &date))
    }

    async fn upload(&self, connection: &Connection, file_name: &str) -> SyncResult<String> {
        let data = self.codec.export_snapshot().await?;
        connection.write(file_name, &data).await
    }

    /// Deletes snapshots the retention policy no longer wants.
    ///
    /// `candidates` must not contain paths that no longer exist.
    async fn prune(
        &self,
        connection: &Connection,
        candidates: &[RemoteSnapshot],
        current: &str,
        device_id: &str,
    ) {
        if self.retention.is_keep_all() {
            return;
        }

        let cutoff = self
            .retention
            .max_age
            .and_then(|age| chrono::Duration::from_std(age).ok())
            .map(|age| Utc::now() - age);

        for snapshot in candidates.iter().filter(|s| s.path() != current) {
            let superseded = self.retention.prune_superseded && snapshot.is_owned_by(device_id);
            let expired = cutoff.is_some_and(|cutoff| snapshot.entry.last_modified < cutoff);
            if !superseded && !expired {
                continue;
            }

            match connection.delete(snapshot).await {
                Ok(()) => tracing::info!(path = %snapshot.path(), superseded, expired, "pruned snapshot"),
                Err(e) => tracing::warn!(path = %snapshot.path(), error = %e, "failed to prune snapshot"),
            }
        }
    }
}

impl std::fmt::Debug for SyncResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncResolver")
            .field("namespace", &self.namespace)
            .field("retention", &self.retention)
            .finish_non_exhaustive()
    }
}
