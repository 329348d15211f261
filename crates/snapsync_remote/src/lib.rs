//! # snapsync Remote
//!
//! The remote side of snapsync: a dumb shared file store.
//!
//! The sync protocol assumes nothing of the remote beyond what a plain
//! WebDAV share offers: list a directory, read, write and move files, and
//! create directories. There is no server-side logic, no locking and no
//! transactions; every consistency decision is made by the clients.
//!
//! ## Available Stores
//!
//! - [`MemoryRemote`] - In-process store shared between simulated devices
//! - [`DirectoryRemote`] - A shared or mounted folder on the local filesystem
//!
//! Stores are obtained from a [`RemoteConnector`], which turns a persisted
//! [`RemoteConfig`] into a live client.
//!
//! No network client ships with this crate. An `https://` WebDAV URL works
//! only through a share mounted on the local filesystem and reached with
//! [`DirectoryConnector`], or through a host-provided [`RemoteConnector`]
//! implementing [`RemoteFileStore`] over HTTP.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod directory;
mod error;
mod memory;
mod store;

pub use config::RemoteConfig;
pub use directory::{DirectoryConnector, DirectoryRemote};
pub use error::{RemoteError, RemoteResult};
pub use memory::{MemoryConnector, MemoryRemote};
pub use store::{join_path, normalize_path, RemoteConnector, RemoteEntry, RemoteFileStore};
