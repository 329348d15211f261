//! Configuration for the sync engine.

use crate::error::SyncResult;
use crate::snapshot::validate_name_field;
use std::time::Duration;

/// Lower bound for the polling interval, and the spacing of the start
/// trigger.
pub const MIN_SYNC_INTERVAL: Duration = Duration::from_secs(10);

/// Upper bound for the polling interval, and its default.
pub const MAX_SYNC_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Minimum spacing between local-mutation notifications.
pub const DEFAULT_MUTATION_THROTTLE: Duration = Duration::from_secs(1);

/// Settings key holding the remote credentials.
pub const REMOTE_CONFIG_KEY: &str = "webdav_config";

/// Default settings key for the device identifier.
pub const DEFAULT_IDENTITY_KEY: &str = "cuid";

/// Default settings key for the auto-sync flag.
pub const DEFAULT_AUTO_SYNC_KEY: &str = "auto_sync";

/// Configuration for a sync installation.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Namespace (extension name) encoded in every snapshot file name.
    pub namespace: String,
    /// Remote directory holding the snapshots.
    pub root_path: String,
    /// Settings key for the device identifier.
    pub identity_key: String,
    /// Settings key for the auto-sync flag.
    pub auto_sync_key: String,
    /// Polling interval between ticks.
    pub sync_interval: Duration,
    /// Minimum spacing between effective start requests.
    pub throttle_window: Duration,
    /// Minimum spacing between local-mutation notifications.
    pub mutation_throttle: Duration,
    /// Cleanup of superseded snapshots.
    pub retention: RetentionPolicy,
    /// Whether imports clear every table before loading the snapshot.
    pub clear_tables_before_import: bool,
}

impl SyncConfig {
    /// Creates a configuration for `namespace` with default settings.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            root_path: "/".into(),
            identity_key: DEFAULT_IDENTITY_KEY.into(),
            auto_sync_key: DEFAULT_AUTO_SYNC_KEY.into(),
            sync_interval: MAX_SYNC_INTERVAL,
            throttle_window: MIN_SYNC_INTERVAL,
            mutation_throttle: DEFAULT_MUTATION_THROTTLE,
            retention: RetentionPolicy::default(),
            clear_tables_before_import: true,
        }
    }

    /// Sets the remote root directory.
    #[must_use]
    pub fn with_root_path(mut self, root_path: impl Into<String>) -> Self {
        self.root_path = root_path.into();
        self
    }

    /// Sets the settings key for the device identifier.
    #[must_use]
    pub fn with_identity_key(mut self, key: impl Into<String>) -> Self {
        self.identity_key = key.into();
        self
    }

    /// Sets the settings key for the auto-sync flag.
    #[must_use]
    pub fn with_auto_sync_key(mut self, key: impl Into<String>) -> Self {
        self.auto_sync_key = key.into();
        self
    }

    /// Sets the polling interval, clamped to
    /// `[MIN_SYNC_INTERVAL, MAX_SYNC_INTERVAL]`.
    #[must_use]
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = clamp_interval(interval);
        self
    }

    /// Sets the spacing of the start trigger.
    #[must_use]
    pub fn with_throttle_window(mut self, window: Duration) -> Self {
        self.throttle_window = window;
        self
    }

    /// Sets the spacing of local-mutation notifications.
    #[must_use]
    pub fn with_mutation_throttle(mut self, throttle: Duration) -> Self {
        self.mutation_throttle = throttle;
        self
    }

    /// Sets the retention policy.
    #[must_use]
    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    /// Sets whether imports clear every table first.
    #[must_use]
    pub fn with_clear_tables_before_import(mut self, clear: bool) -> Self {
        self.clear_tables_before_import = clear;
        self
    }

    /// Checks that the namespace can be encoded in snapshot file names.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::MalformedName`](crate::SyncError::MalformedName)
    /// if it is empty or contains
    /// `_`, `/` or `.json`.
    pub fn validate(&self) -> SyncResult<()> {
        validate_name_field("namespace", &self.namespace)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("extension")
    }
}

/// Clamps a polling interval into `[MIN_SYNC_INTERVAL, MAX_SYNC_INTERVAL]`.
pub fn clamp_interval(interval: Duration) -> Duration {
    interval.clamp(MIN_SYNC_INTERVAL, MAX_SYNC_INTERVAL)
}

/// What the resolver deletes from the remote after a successful upload or
/// claim.
///
/// The default keeps everything: the protocol itself never needs deletes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Delete this device's older snapshots once it holds a newer one.
    pub prune_superseded: bool,
    /// Delete any device's snapshots not modified within this window.
    pub max_age: Option<Duration>,
}

impl RetentionPolicy {
    /// Keeps every snapshot.
    pub fn keep_all() -> Self {
        Self::default()
    }

    /// Enables pruning of this device's superseded snapshots.
    #[must_use]
    pub fn with_prune_superseded(mut self, prune: bool) -> Self {
        self.prune_superseded = prune;
        self
    }

    /// Deletes snapshots older than `max_age`.
    #[must_use]
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Returns true if the policy never deletes anything.
    pub fn is_keep_all(&self) -> bool {
        !self.prune_superseded && self.max_age.is_none()
    }
}
