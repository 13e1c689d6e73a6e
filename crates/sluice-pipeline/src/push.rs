use bytes::Bytes;
use futures_util::StreamExt;
use sluice_store::{StorageBackend, WriteOptions};
use sluice_types::{BucketName, ByteStream, ContentPath, FileId};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::IngestConfig;
use crate::error::PushError;

/// What a completed push hands back.
///
/// `bytes_sent` is informational only; the authoritative size comes from
/// verification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PushResult {
    pub path: ContentPath,
    pub bytes_sent: u64,
}

/// Emits a progress sample each time the running total crosses another
/// multiple of `interval`.
#[derive(Clone, Debug)]
pub struct ProgressSampler {
    interval: u64,
    next: u64,
}

impl ProgressSampler {
    pub fn new(interval: u64) -> Self {
        let interval = interval.max(1);
        Self {
            interval,
            next: interval,
        }
    }

    /// Feed the running total; returns it when a sample is due.
    pub fn observe(&mut self, total: u64) -> Option<u64> {
        if total < self.next {
            return None;
        }
        self.next = (total / self.interval + 1) * self.interval;
        Some(total)
    }
}

enum Step {
    Chunk(Bytes),
    SourceFailed(std::io::Error),
    Exhausted,
    Cancelled,
}

/// Streams one file part into the backend.
#[derive(Clone, Debug)]
pub struct PushClient {
    max_chunk: usize,
    progress_interval: u64,
    root: Option<String>,
}

impl PushClient {
    pub fn new(max_chunk: usize, progress_interval: u64) -> Self {
        Self {
            max_chunk: max_chunk.max(1),
            progress_interval,
            root: None,
        }
    }

    pub fn from_config(config: &IngestConfig) -> Self {
        Self {
            root: config.root.clone(),
            ..Self::new(config.high_water_mark, config.progress_interval)
        }
    }

    /// Push `source` into `bucket` as `file_id`.
    ///
    /// The next chunk is pulled from `source` only after the backend has
    /// accepted the previous one. On cancellation or any error the backend
    /// write is aborted and `source` is dropped, which detaches the reader.
    /// Nothing is retried.
    pub async fn push<P>(
        &self,
        backend: &dyn StorageBackend,
        bucket: &BucketName,
        file_id: &FileId,
        mut source: ByteStream,
        cancel: &CancellationToken,
        mut on_progress: P,
    ) -> Result<PushResult, PushError>
    where
        P: FnMut(u64) + Send,
    {
        let options = WriteOptions {
            root: self.root.clone(),
        };
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            opened = backend.open_write(bucket, file_id, &options) => Some(opened),
        };
        let mut writer = match opened {
            None => return Err(PushError::Aborted),
            Some(opened) => opened?,
        };

        let mut sampler = ProgressSampler::new(self.progress_interval);
        let mut sent: u64 = 0;

        loop {
            let step = tokio::select! {
                biased;
                _ = cancel.cancelled() => Step::Cancelled,
                next = source.next() => match next {
                    Some(Ok(chunk)) => Step::Chunk(chunk),
                    Some(Err(e)) => Step::SourceFailed(e),
                    None => Step::Exhausted,
                },
            };

            let mut chunk = match step {
                Step::Chunk(chunk) => chunk,
                Step::Exhausted => break,
                Step::Cancelled => {
                    drop(source);
                    writer.abort().await;
                    debug!(file_id = %file_id, sent, "push cancelled");
                    return Err(PushError::Aborted);
                }
                Step::SourceFailed(e) => {
                    drop(source);
                    writer.abort().await;
                    return Err(PushError::Source(e));
                }
            };

            while !chunk.is_empty() {
                let piece = chunk.split_to(chunk.len().min(self.max_chunk));
                let len = piece.len() as u64;
                let written = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    written = writer.write_chunk(piece) => Some(written),
                };
                match written {
                    Some(Ok(())) => {
                        sent += len;
                        if let Some(total) = sampler.observe(sent) {
                            on_progress(total);
                        }
                    }
                    Some(Err(e)) => {
                        drop(source);
                        writer.abort().await;
                        return Err(PushError::Backend(e));
                    }
                    None => {
                        drop(source);
                        writer.abort().await;
                        debug!(file_id = %file_id, sent, "push cancelled mid-write");
                        return Err(PushError::Aborted);
                    }
                }
            }
        }

        if cancel.is_cancelled() {
            writer.abort().await;
            return Err(PushError::Aborted);
        }
        let path = writer.finish().await?;
        info!(file_id = %file_id, bucket = %bucket, path = %path, bytes = sent, "push finished");
        Ok(PushResult {
            path,
            bytes_sent: sent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use sluice_store::{BackendError, InMemoryBackend};
    use sluice_types::bytes_stream;
    use tokio::sync::mpsc;

    fn body_of(chunks: &[&'static str]) -> ByteStream {
        bytes_stream(
            chunks
                .iter()
                .map(|c| Bytes::from_static(c.as_bytes()))
                .collect::<Vec<_>>(),
        )
    }

    #[test]
    fn sampler_fires_on_interval_crossings() {
        let mut s = ProgressSampler::new(10);
        assert_eq!(s.observe(4), None);
        assert_eq!(s.observe(10), Some(10));
        assert_eq!(s.observe(15), None);
        assert_eq!(s.observe(35), Some(35));
        assert_eq!(s.observe(39), None);
        assert_eq!(s.observe(40), Some(40));
    }

    #[tokio::test]
    async fn pushes_all_bytes_and_samples_progress() {
        let backend = InMemoryBackend::new();
        let bucket = BucketName::default();
        let file_id = FileId::new();
        let client = PushClient::new(4, 8);
        let samples = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&samples);

        let result = client
            .push(
                &backend,
                &bucket,
                &file_id,
                body_of(&["0123456789", "abcdef"]),
                &CancellationToken::new(),
                move |n| seen.lock().unwrap().push(n),
            )
            .await
            .unwrap();

        assert_eq!(result.bytes_sent, 16);
        assert_eq!(
            backend.read(&result.path).unwrap(),
            Bytes::from_static(b"0123456789abcdef")
        );
        assert_eq!(backend.path_for(&bucket, &file_id), Some(result.path));
        // Writes of 4,4,2,4,2 bytes: totals 4,8,10,14,16.
        assert_eq!(*samples.lock().unwrap(), vec![8, 16]);
    }

    #[tokio::test]
    async fn splits_chunks_to_high_water_mark() {
        let backend = InMemoryBackend::new();
        let client = PushClient::new(3, 1);
        let samples = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&samples);
        client
            .push(
                &backend,
                &BucketName::default(),
                &FileId::new(),
                body_of(&["abcdefgh"]),
                &CancellationToken::new(),
                move |n| seen.lock().unwrap().push(n),
            )
            .await
            .unwrap();
        assert_eq!(*samples.lock().unwrap(), vec![3, 6, 8]);
    }

    #[tokio::test]
    async fn backend_error_aborts_write() {
        let backend = InMemoryBackend::new();
        backend.fail_writes_after(5);
        let client = PushClient::new(4, 1024);
        let err = client
            .push(
                &backend,
                &BucketName::default(),
                &FileId::new(),
                body_of(&["abcd", "efgh"]),
                &CancellationToken::new(),
                |_| {},
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PushError::Backend(BackendError::Io(_))));
        assert_eq!(backend.aborted_writes(), 1);
        assert_eq!(backend.open_writes(), 0);
        assert_eq!(backend.object_count(), 0);
    }

    #[tokio::test]
    async fn source_error_aborts_write() {
        let backend = InMemoryBackend::new();
        let source: ByteStream = Box::pin(futures_util::stream::iter(vec![
            Ok(Bytes::from_static(b"abc")),
            Err(io::Error::new(io::ErrorKind::UnexpectedEof, "client went away")),
        ]));
        let err = PushClient::new(16, 16)
            .push(
                &backend,
                &BucketName::default(),
                &FileId::new(),
                source,
                &CancellationToken::new(),
                |_| {},
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PushError::Source(_)));
        assert_eq!(backend.aborted_writes(), 1);
        assert_eq!(backend.object_count(), 0);
    }

    #[tokio::test]
    async fn cancellation_mid_stream_detaches_source() {
        let backend = InMemoryBackend::new();
        let (tx, rx) = mpsc::channel::<io::Result<Bytes>>(1);
        let source: ByteStream = Box::pin(futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        }));
        let cancel = CancellationToken::new();

        let driver = {
            let cancel = cancel.clone();
            let tx = tx.clone();
            async move {
                tx.send(Ok(Bytes::from_static(b"first"))).await.unwrap();
                tokio::time::sleep(Duration::from_millis(10)).await;
                cancel.cancel();
            }
        };
        let client = PushClient::new(16, 16);
        let (bucket, file_id) = (BucketName::default(), FileId::new());
        let push = client.push(&backend, &bucket, &file_id, source, &cancel, |_| {});

        let ((), result) = tokio::join!(driver, push);
        assert!(matches!(result, Err(PushError::Aborted)));
        assert!(tx.is_closed());
        assert_eq!(backend.bytes_received(), 5);
        assert_eq!(backend.aborted_writes(), 1);
        assert_eq!(backend.object_count(), 0);
    }

    #[tokio::test]
    async fn cancelled_before_start_opens_nothing() {
        let backend = InMemoryBackend::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = PushClient::new(16, 16)
            .push(
                &backend,
                &BucketName::default(),
                &FileId::new(),
                body_of(&["x"]),
                &cancel,
                |_| {},
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PushError::Aborted));
        assert_eq!(backend.writes_opened(), 0);
    }

    #[tokio::test]
    async fn rejected_finish_surfaces_backend_error() {
        let backend = InMemoryBackend::new();
        backend.set_capacity(4);
        let err = PushClient::new(16, 16)
            .push(
                &backend,
                &BucketName::default(),
                &FileId::new(),
                body_of(&["too large"]),
                &CancellationToken::new(),
                |_| {},
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PushError::Backend(BackendError::WriteRejected(_))));
        assert_eq!(backend.object_count(), 0);
    }

    #[test]
    fn from_config_carries_root() {
        let config = IngestConfig {
            root: Some("root-key".into()),
            ..IngestConfig::default()
        };
        let client = PushClient::from_config(&config);
        assert_eq!(client.root.as_deref(), Some("root-key"));
        assert_eq!(client.max_chunk, config.high_water_mark);
    }
}
