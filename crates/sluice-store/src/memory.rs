use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use sluice_types::{BucketName, ContentPath, FileId, Principal};
use tracing::debug;

use crate::error::{BackendError, BackendResult};
use crate::traits::{
    BackendConnector, BucketUsage, ContentMetadata, StorageBackend, WriteHandle, WriteOptions,
};

/// Injected failures and latency for exercising error paths.
#[derive(Clone, Debug, Default)]
struct Faults {
    usage: Option<String>,
    metadata: Option<String>,
    write_after: Option<u64>,
    capacity: Option<u64>,
    chunk_delay: Option<Duration>,
    usage_delay: Option<Duration>,
    metadata_delay: Option<Duration>,
}

#[derive(Debug, Default)]
struct BucketState {
    /// Bytes counted against the bucket that did not come through a write.
    baseline: u64,
    objects: HashMap<ContentPath, u64>,
    files: HashMap<FileId, ContentPath>,
}

impl BucketState {
    fn used(&self) -> u64 {
        self.baseline + self.objects.values().sum::<u64>()
    }
}

#[derive(Debug, Default)]
struct Shared {
    buckets: RwLock<HashMap<BucketName, BucketState>>,
    contents: RwLock<HashMap<ContentPath, Bytes>>,
    faults: Mutex<Faults>,
    usage_queries: AtomicUsize,
    writes_opened: AtomicUsize,
    open_writes: AtomicUsize,
    aborted_writes: AtomicUsize,
    bytes_received: AtomicU64,
}

impl Shared {
    fn faults(&self) -> Faults {
        self.faults.lock().expect("faults lock poisoned").clone()
    }
}

/// In-memory, content-addressed storage backend.
///
/// Intended for tests and local runs. Content paths are BLAKE3 digests of
/// the written bytes. Cloning yields another handle onto the same storage.
#[derive(Clone, Debug, Default)]
pub struct InMemoryBackend {
    shared: Arc<Shared>,
}

impl InMemoryBackend {
    /// Create a new empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count `bytes` as already occupied in `bucket`.
    pub fn set_usage(&self, bucket: &BucketName, bytes: u64) {
        let mut buckets = self.shared.buckets.write().expect("bucket lock poisoned");
        buckets.entry(bucket.clone()).or_default().baseline = bytes;
    }

    /// Make every usage query fail with `message`.
    pub fn fail_usage(&self, message: impl Into<String>) {
        self.shared.faults.lock().expect("faults lock poisoned").usage = Some(message.into());
    }

    /// Make every metadata lookup fail with `message`.
    pub fn fail_metadata(&self, message: impl Into<String>) {
        self.shared.faults.lock().expect("faults lock poisoned").metadata = Some(message.into());
    }

    /// Fail any write once it would exceed `bytes` in total.
    pub fn fail_writes_after(&self, bytes: u64) {
        self.shared.faults.lock().expect("faults lock poisoned").write_after = Some(bytes);
    }

    /// Reject finishing a write that would push a bucket above `bytes`.
    pub fn set_capacity(&self, bytes: u64) {
        self.shared.faults.lock().expect("faults lock poisoned").capacity = Some(bytes);
    }

    /// Delay acceptance of every chunk by `delay`.
    pub fn set_chunk_delay(&self, delay: Duration) {
        self.shared.faults.lock().expect("faults lock poisoned").chunk_delay = Some(delay);
    }

    /// Delay every usage query by `delay`.
    pub fn set_usage_delay(&self, delay: Duration) {
        self.shared.faults.lock().expect("faults lock poisoned").usage_delay = Some(delay);
    }

    /// Delay every metadata lookup by `delay`.
    pub fn set_metadata_delay(&self, delay: Duration) {
        self.shared.faults.lock().expect("faults lock poisoned").metadata_delay = Some(delay);
    }

    /// Remove all injected faults.
    pub fn clear_faults(&self) {
        *self.shared.faults.lock().expect("faults lock poisoned") = Faults::default();
    }

    /// Number of usage queries served.
    pub fn usage_queries(&self) -> usize {
        self.shared.usage_queries.load(Ordering::SeqCst)
    }

    /// Number of writes ever opened.
    pub fn writes_opened(&self) -> usize {
        self.shared.writes_opened.load(Ordering::SeqCst)
    }

    /// Number of writes currently open.
    pub fn open_writes(&self) -> usize {
        self.shared.open_writes.load(Ordering::SeqCst)
    }

    /// Number of writes that were explicitly aborted.
    pub fn aborted_writes(&self) -> usize {
        self.shared.aborted_writes.load(Ordering::SeqCst)
    }

    /// Total chunk bytes accepted across all writes, finished or not.
    pub fn bytes_received(&self) -> u64 {
        self.shared.bytes_received.load(Ordering::SeqCst)
    }

    /// Number of distinct stored contents.
    pub fn object_count(&self) -> usize {
        self.shared.contents.read().expect("contents lock poisoned").len()
    }

    /// Stored bytes under `path`, if any.
    pub fn read(&self, path: &ContentPath) -> Option<Bytes> {
        self.shared
            .contents
            .read()
            .expect("contents lock poisoned")
            .get(path)
            .cloned()
    }

    /// The path a finished write of `file_id` landed at.
    pub fn path_for(&self, bucket: &BucketName, file_id: &FileId) -> Option<ContentPath> {
        self.shared
            .buckets
            .read()
            .expect("bucket lock poisoned")
            .get(bucket)
            .and_then(|b| b.files.get(file_id).cloned())
    }
}

#[async_trait]
impl StorageBackend for InMemoryBackend {
    async fn usage(&self, bucket: &BucketName) -> BackendResult<BucketUsage> {
        self.shared.usage_queries.fetch_add(1, Ordering::SeqCst);
        let faults = self.shared.faults();
        if let Some(delay) = faults.usage_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = faults.usage {
            return Err(BackendError::Unavailable(message));
        }
        let buckets = self.shared.buckets.read().expect("bucket lock poisoned");
        let size_bytes = buckets.get(bucket).map(BucketState::used).unwrap_or(0);
        Ok(BucketUsage { size_bytes })
    }

    async fn open_write(
        &self,
        bucket: &BucketName,
        file_id: &FileId,
        options: &WriteOptions,
    ) -> BackendResult<Box<dyn WriteHandle>> {
        self.shared.writes_opened.fetch_add(1, Ordering::SeqCst);
        self.shared.open_writes.fetch_add(1, Ordering::SeqCst);
        debug!(bucket = %bucket, file_id = %file_id, root = ?options.root, "write opened");
        Ok(Box::new(MemoryWrite {
            shared: Arc::clone(&self.shared),
            bucket: bucket.clone(),
            file_id: *file_id,
            hasher: blake3::Hasher::new(),
            data: Vec::new(),
        }))
    }

    async fn metadata(&self, path: &ContentPath) -> BackendResult<ContentMetadata> {
        let faults = self.shared.faults();
        if let Some(delay) = faults.metadata_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = faults.metadata {
            return Err(BackendError::Unavailable(message));
        }
        let contents = self.shared.contents.read().expect("contents lock poisoned");
        let data = contents
            .get(path)
            .ok_or_else(|| BackendError::NotFound(path.clone()))?;
        Ok(ContentMetadata {
            path: path.clone(),
            size_bytes: data.len() as u64,
        })
    }
}

/// Write handle of the in-memory backend. Buffers until `finish`.
struct MemoryWrite {
    shared: Arc<Shared>,
    bucket: BucketName,
    file_id: FileId,
    hasher: blake3::Hasher,
    data: Vec<u8>,
}

#[async_trait]
impl WriteHandle for MemoryWrite {
    async fn write_chunk(&mut self, chunk: Bytes) -> BackendResult<()> {
        let faults = self.shared.faults();
        if let Some(delay) = faults.chunk_delay {
            tokio::time::sleep(delay).await;
        }
        let total = self.data.len() as u64 + chunk.len() as u64;
        if faults.write_after.is_some_and(|limit| total > limit) {
            return Err(BackendError::Io(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "backend connection reset",
            )));
        }
        self.hasher.update(&chunk);
        self.data.extend_from_slice(&chunk);
        self.shared
            .bytes_received
            .fetch_add(chunk.len() as u64, Ordering::SeqCst);
        Ok(())
    }

    async fn finish(self: Box<Self>) -> BackendResult<ContentPath> {
        let path = ContentPath::from_digest(self.hasher.finalize().as_bytes());
        let size = self.data.len() as u64;
        let capacity = self.shared.faults().capacity;

        let mut buckets = self.shared.buckets.write().expect("bucket lock poisoned");
        let state = buckets.entry(self.bucket.clone()).or_default();
        if let Some(capacity) = capacity {
            let after = state.used() + if state.objects.contains_key(&path) { 0 } else { size };
            if after > capacity {
                return Err(BackendError::WriteRejected(format!(
                    "bucket {} would hold {after} bytes, capacity is {capacity}",
                    self.bucket
                )));
            }
        }
        state.objects.insert(path.clone(), size);
        state.files.insert(self.file_id, path.clone());
        drop(buckets);

        // Idempotent: identical content maps to the same path.
        self.shared
            .contents
            .write()
            .expect("contents lock poisoned")
            .entry(path.clone())
            .or_insert_with(|| Bytes::from(self.data.clone()));

        debug!(file_id = %self.file_id, path = %path, size, "write finished");
        Ok(path)
    }

    async fn abort(self: Box<Self>) {
        self.shared.aborted_writes.fetch_add(1, Ordering::SeqCst);
        debug!(file_id = %self.file_id, discarded = self.data.len(), "write aborted");
    }

    fn bytes_written(&self) -> u64 {
        self.data.len() as u64
    }
}

impl Drop for MemoryWrite {
    fn drop(&mut self) {
        self.shared.open_writes.fetch_sub(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// InMemoryConnector
// ---------------------------------------------------------------------------

/// Connector handing out handles onto one [`InMemoryBackend`].
#[derive(Debug)]
pub struct InMemoryConnector {
    backend: InMemoryBackend,
    /// Principals that own buckets; `None` means everyone does.
    known: RwLock<Option<HashSet<String>>>,
    fail_after: Mutex<Option<(usize, String)>>,
    connections: AtomicUsize,
}

impl InMemoryConnector {
    pub fn new(backend: InMemoryBackend) -> Self {
        Self {
            backend,
            known: RwLock::new(None),
            fail_after: Mutex::new(None),
            connections: AtomicUsize::new(0),
        }
    }

    /// The backend behind every handed-out handle.
    pub fn backend(&self) -> &InMemoryBackend {
        &self.backend
    }

    /// Only these principal IDs get a handle; everyone else gets `None`.
    pub fn restrict_to<I, S>(&self, principal_ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids = principal_ids.into_iter().map(Into::into).collect();
        *self.known.write().expect("known lock poisoned") = Some(ids);
    }

    /// Let the first `n` connections succeed, then fail with `message`.
    pub fn fail_connections_after(&self, n: usize, message: impl Into<String>) {
        *self.fail_after.lock().expect("fail lock poisoned") = Some((n, message.into()));
    }

    /// Number of connection attempts so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackendConnector for InMemoryConnector {
    async fn connect(
        &self,
        principal: &Principal,
        bucket: &BucketName,
    ) -> BackendResult<Option<Arc<dyn StorageBackend>>> {
        let attempt = self.connections.fetch_add(1, Ordering::SeqCst);
        if let Some((n, message)) = self.fail_after.lock().expect("fail lock poisoned").clone() {
            if attempt >= n {
                return Err(BackendError::Unavailable(message));
            }
        }
        let known = self.known.read().expect("known lock poisoned");
        if let Some(ids) = known.as_ref() {
            if !ids.contains(&principal.id) {
                debug!(user = %principal, bucket = %bucket, "no bucket for principal");
                return Ok(None);
            }
        }
        Ok(Some(Arc::new(self.backend.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket() -> BucketName {
        BucketName::new("data").unwrap()
    }

    async fn write_all(backend: &InMemoryBackend, chunks: &[&[u8]]) -> BackendResult<ContentPath> {
        let mut w = backend
            .open_write(&bucket(), &FileId::new(), &WriteOptions::default())
            .await?;
        for c in chunks {
            w.write_chunk(Bytes::copy_from_slice(c)).await?;
        }
        w.finish().await
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn write_then_metadata() {
        let backend = InMemoryBackend::new();
        let path = write_all(&backend, &[b"hello ", b"world"]).await.unwrap();
        let meta = backend.metadata(&path).await.unwrap();
        assert_eq!(meta.size_bytes, 11);
        assert_eq!(backend.read(&path).unwrap(), Bytes::from_static(b"hello world"));
        assert_eq!(backend.open_writes(), 0);
    }

    #[tokio::test]
    async fn same_content_same_path() {
        let backend = InMemoryBackend::new();
        let a = write_all(&backend, &[b"abc"]).await.unwrap();
        let b = write_all(&backend, &[b"a", b"bc"]).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(backend.object_count(), 1);
    }

    #[tokio::test]
    async fn aborted_write_leaves_nothing() {
        let backend = InMemoryBackend::new();
        let mut w = backend
            .open_write(&bucket(), &FileId::new(), &WriteOptions::default())
            .await
            .unwrap();
        w.write_chunk(Bytes::from_static(b"partial")).await.unwrap();
        assert_eq!(backend.open_writes(), 1);
        w.abort().await;
        assert_eq!(backend.open_writes(), 0);
        assert_eq!(backend.aborted_writes(), 1);
        assert_eq!(backend.object_count(), 0);
        assert_eq!(backend.usage(&bucket()).await.unwrap().size_bytes, 0);
    }

    #[tokio::test]
    async fn write_fault_after_limit() {
        let backend = InMemoryBackend::new();
        backend.fail_writes_after(4);
        let err = write_all(&backend, &[b"abc", b"def"]).await.unwrap_err();
        assert!(matches!(err, BackendError::Io(_)));
    }

    #[tokio::test]
    async fn capacity_rejects_finish() {
        let backend = InMemoryBackend::new();
        backend.set_usage(&bucket(), 8);
        backend.set_capacity(10);
        let err = write_all(&backend, &[b"abc"]).await.unwrap_err();
        assert!(matches!(err, BackendError::WriteRejected(_)));
    }

    // -----------------------------------------------------------------------
    // Usage and metadata
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn usage_counts_baseline_and_objects() {
        let backend = InMemoryBackend::new();
        backend.set_usage(&bucket(), 100);
        write_all(&backend, &[b"12345"]).await.unwrap();
        assert_eq!(backend.usage(&bucket()).await.unwrap().size_bytes, 105);
        assert_eq!(backend.usage_queries(), 1);
    }

    #[tokio::test]
    async fn usage_fault() {
        let backend = InMemoryBackend::new();
        backend.fail_usage("down");
        assert!(backend.usage(&bucket()).await.is_err());
        backend.clear_faults();
        assert!(backend.usage(&bucket()).await.is_ok());
    }

    #[tokio::test]
    async fn injected_query_latency() {
        let backend = InMemoryBackend::new();
        let path = write_all(&backend, &[b"abc"]).await.unwrap();
        backend.set_usage_delay(Duration::from_millis(30));
        backend.set_metadata_delay(Duration::from_millis(30));

        let started = std::time::Instant::now();
        backend.usage(&bucket()).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(30));

        let started = std::time::Instant::now();
        assert_eq!(backend.metadata(&path).await.unwrap().size_bytes, 3);
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn metadata_missing_path() {
        let backend = InMemoryBackend::new();
        let path = ContentPath::parse("/ipfs/missing").unwrap();
        assert!(matches!(
            backend.metadata(&path).await,
            Err(BackendError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn path_for_tracks_file_id() {
        let backend = InMemoryBackend::new();
        let id = FileId::new();
        let mut w = backend
            .open_write(&bucket(), &id, &WriteOptions::default())
            .await
            .unwrap();
        w.write_chunk(Bytes::from_static(b"x")).await.unwrap();
        let path = w.finish().await.unwrap();
        assert_eq!(backend.path_for(&bucket(), &id), Some(path));
    }

    // -----------------------------------------------------------------------
    // Connector
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn connector_restricts_principals() {
        let connector = InMemoryConnector::new(InMemoryBackend::new());
        connector.restrict_to(["u-1"]);
        let alice = Principal::new("u-1", "alice");
        let bob = Principal::new("u-2", "bob");
        assert!(connector.connect(&alice, &bucket()).await.unwrap().is_some());
        assert!(connector.connect(&bob, &bucket()).await.unwrap().is_none());
        assert_eq!(connector.connections(), 2);
    }

    #[tokio::test]
    async fn connector_fails_after_n() {
        let connector = InMemoryConnector::new(InMemoryBackend::new());
        connector.fail_connections_after(1, "token expired");
        let p = Principal::new("u-1", "alice");
        assert!(connector.connect(&p, &bucket()).await.is_ok());
        assert!(connector.connect(&p, &bucket()).await.is_err());
    }
}
