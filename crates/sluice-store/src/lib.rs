//! Content-addressed storage backend interface for sluice.
//!
//! The pipeline is a client of a backend it does not implement. This crate
//! pins down the three calls it needs (usage query, streamed push, metadata
//! lookup) plus per-request handle acquisition, and ships an in-memory
//! backend for tests and local runs.
//!
//! # Traits
//!
//! - [`BackendConnector`] -- acquires a fresh [`StorageBackend`] handle for a
//!   principal and bucket; called once per request and again for verification
//! - [`StorageBackend`] -- usage, open a streamed write, metadata
//! - [`WriteHandle`] -- one in-flight write: chunks in, path out (or abort)
//!
//! # Design Rules
//!
//! 1. Paths are derived from content; identical bytes produce the same path.
//! 2. A write becomes visible only when [`WriteHandle::finish`] returns.
//! 3. An aborted or dropped write leaves nothing behind.
//! 4. Handles are never shared across requests.
//! 5. Backend errors are returned as-is; retrying is the caller's decision.

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{BackendError, BackendResult};
pub use memory::{InMemoryBackend, InMemoryConnector};
pub use traits::{
    BackendConnector, BucketUsage, ContentMetadata, StorageBackend, WriteHandle, WriteOptions,
};
