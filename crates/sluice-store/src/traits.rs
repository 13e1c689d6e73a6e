use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sluice_types::{BucketName, ContentPath, FileId, Principal};

use crate::error::BackendResult;

/// Occupied size of a bucket as reported by the backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketUsage {
    pub size_bytes: u64,
}

/// Canonical metadata of stored content.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentMetadata {
    pub path: ContentPath,
    pub size_bytes: u64,
}

/// Options passed when opening a streamed write.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Backend root the write is applied against, if the backend uses one.
    pub root: Option<String>,
}

/// Acquires per-request backend handles.
///
/// Returns `Ok(None)` when the principal has no such bucket. Every call
/// yields a fresh handle; callers must not cache it across requests.
#[async_trait]
pub trait BackendConnector: Send + Sync {
    async fn connect(
        &self,
        principal: &Principal,
        bucket: &BucketName,
    ) -> BackendResult<Option<Arc<dyn StorageBackend>>>;
}

/// Content-addressed storage backend.
///
/// All implementations must satisfy these invariants:
/// - Content paths are derived from the written bytes.
/// - Nothing written through an unfinished handle is observable.
/// - Errors are surfaced to the caller, never retried internally.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Current occupied size of `bucket`. Must reflect the backend's live
    /// state at call time.
    async fn usage(&self, bucket: &BucketName) -> BackendResult<BucketUsage>;

    /// Start a streamed write of a new file into `bucket`.
    async fn open_write(
        &self,
        bucket: &BucketName,
        file_id: &FileId,
        options: &WriteOptions,
    ) -> BackendResult<Box<dyn WriteHandle>>;

    /// Canonical metadata for previously written content.
    async fn metadata(&self, path: &ContentPath) -> BackendResult<ContentMetadata>;
}

/// A single in-flight write.
///
/// `write_chunk` resolves only once the backend has accepted the chunk, which
/// is what lets the push client apply backpressure to its source.
#[async_trait]
pub trait WriteHandle: Send {
    /// Hand one chunk to the backend and wait for acceptance.
    async fn write_chunk(&mut self, chunk: Bytes) -> BackendResult<()>;

    /// Seal the write and return the backend-assigned content path.
    async fn finish(self: Box<Self>) -> BackendResult<ContentPath>;

    /// Discard everything written through this handle.
    async fn abort(self: Box<Self>);

    /// Bytes accepted so far.
    fn bytes_written(&self) -> u64;
}
