//! # snapsync Engine
//!
//! Snapshot-based, last-writer-wins synchronization of a local database
//! across devices sharing a dumb remote folder.
//!
//! This crate provides:
//! - Device identity generation and persistence
//! - Remote configuration and connection management
//! - Snapshot naming, export and import
//! - The tick resolver deciding whether to upload or import
//! - A periodic engine with throttled start requests and auto-sync on
//!   local writes
//!
//! ## Protocol
//!
//! Every device publishes its whole database as one file named
//! `{namespace}-export_{YYYY-MM-DD}_{deviceId}.json`. On each tick a device
//! lists the remote folder and looks at the most recently modified snapshot:
//! 1. None exists: upload one
//! 2. It is ours: upload a fresh one
//! 3. It belongs to another device: import it, replacing local content,
//!    then rename it to carry our id
//!
//! ## Key Invariants
//!
//! - Remote recency decides; local content is never merged
//! - A snapshot is claimed only after a successful import
//! - At most one tick runs at a time per engine
//! - Tick failures are reported through status, never propagated to the
//!   timer

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod config;
mod database;
mod engine;
mod error;
mod events;
mod identity;
mod libs;
mod remote;
mod resolver;
mod settings;
mod snapshot;
mod trigger;
mod watch;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{
    clamp_interval, RetentionPolicy, SyncConfig, DEFAULT_AUTO_SYNC_KEY, DEFAULT_IDENTITY_KEY,
    DEFAULT_MUTATION_THROTTLE, MAX_SYNC_INTERVAL, MIN_SYNC_INTERVAL, REMOTE_CONFIG_KEY,
};
pub use database::{
    DatabaseError, DatabaseResult, ImportOptions, LocalDatabase, MemoryDatabase, Mutation,
    MutationKind, EXPORT_FORMAT_NAME, EXPORT_FORMAT_VERSION,
};
pub use engine::{SyncEngine, SyncStats, SyncStatus};
pub use error::{SyncError, SyncResult};
pub use events::{EventBus, EventHandler, EventKind, SubscriptionId, SyncEvent};
pub use identity::DeviceIdentity;
pub use libs::SyncLibs;
pub use remote::{Connection, RemoteAdapter};
pub use resolver::{SyncResolver, TickOutcome};
pub use settings::ConfigStore;
pub use snapshot::{
    build_file_name, parse_file_name, validate_name_field, RemoteSnapshot, SnapshotCodec,
    SnapshotName,
};
pub use trigger::DebouncedTrigger;
pub use watch::MutationSubscription;

pub use snapsync_remote as remote_store;
pub use snapsync_storage as storage;
