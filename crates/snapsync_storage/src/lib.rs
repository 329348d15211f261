//! # snapsync Storage
//!
//! Persistent key-value storage for snapsync.
//!
//! This crate holds the small amount of state a sync installation keeps
//! locally besides the database itself: the device identifier, the remote
//! endpoint credentials and the auto-sync flag. Stores are **opaque byte
//! maps**; the typed layer ([`KeyValueExt`]) encodes values as JSON.
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing and ephemeral installations
//! - [`FileStore`] - A single JSON document on disk, written atomically
//!
//! ## Example
//!
//! ```rust
//! use snapsync_storage::{InMemoryStore, KeyValueExt, KeyValueStore};
//!
//! let store = InMemoryStore::new();
//! store.set_json("auto_sync", &1u8).unwrap();
//! assert_eq!(store.get_json::<u8>("auto_sync").unwrap(), Some(1));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod memory;
mod store;

pub use error::{StorageError, StorageResult};
pub use file::FileStore;
pub use memory::InMemoryStore;
pub use store::{KeyValueExt, KeyValueStore};
