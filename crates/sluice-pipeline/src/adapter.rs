//! Reference stream adapters.
//!
//! The pipeline consumes [`PartEvents`]; these helpers produce them from a
//! raw body or from a push-style event source.

use std::io;

use bytes::Bytes;
use futures_util::stream;
use sluice_flight::{FilePart, PartEvent, PartEvents};
use sluice_types::ByteStream;
use tokio::sync::mpsc;

/// Form field name reported for raw, non-multipart bodies.
pub const RAW_FIELD: &str = "file";

/// Treat a whole request body as a single file part.
///
/// Emits `Started` followed by `Finished`. Read errors inside `body` surface
/// through the push, not as an `Errored` event.
pub fn single_part(
    file_name: impl Into<String>,
    mime: impl Into<String>,
    body: ByteStream,
) -> PartEvents {
    let part = FilePart::new(RAW_FIELD, file_name, mime, body);
    Box::pin(stream::iter([PartEvent::Started(part), PartEvent::Finished]))
}

/// Sending half of [`part_channel`].
#[derive(Clone, Debug)]
pub struct PartSender {
    tx: mpsc::Sender<PartEvent>,
}

impl PartSender {
    /// Returns `false` once the pipeline has stopped listening.
    pub async fn send(&self, event: PartEvent) -> bool {
        self.tx.send(event).await.is_ok()
    }

    pub async fn started(&self, part: FilePart) -> bool {
        self.send(PartEvent::Started(part)).await
    }

    pub async fn finished(&self) -> bool {
        self.send(PartEvent::Finished).await
    }

    pub async fn errored(&self, error: io::Error) -> bool {
        self.send(PartEvent::Errored(error)).await
    }

    /// `true` once the pipeline dropped the event stream.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Event stream fed by a push-style parser.
pub fn part_channel(buffer: usize) -> (PartSender, PartEvents) {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    let events = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (event, rx))
    });
    (PartSender { tx }, Box::pin(events))
}

/// A part body fed chunk by chunk.
pub fn body_channel(buffer: usize) -> (mpsc::Sender<io::Result<Bytes>>, ByteStream) {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    let body = stream::unfold(rx, |mut rx: mpsc::Receiver<io::Result<Bytes>>| async move {
        rx.recv().await.map(|chunk| (chunk, rx))
    });
    (tx, Box::pin(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use sluice_types::bytes_stream;

    #[tokio::test]
    async fn single_part_emits_started_then_finished() {
        let mut events = single_part("a.txt", "text/plain", bytes_stream(vec![Bytes::from_static(b"hi")]));
        match events.next().await {
            Some(PartEvent::Started(part)) => {
                assert_eq!(part.field, RAW_FIELD);
                assert_eq!(part.file_name, "a.txt");
                assert_eq!(part.mime, "text/plain");
            }
            other => panic!("expected Started, got {other:?}"),
        }
        assert!(matches!(events.next().await, Some(PartEvent::Finished)));
        assert!(events.next().await.is_none());
    }

    #[tokio::test]
    async fn part_channel_delivers_and_reports_close() {
        let (sender, mut events) = part_channel(4);
        assert!(sender.finished().await);
        assert!(matches!(events.next().await, Some(PartEvent::Finished)));
        drop(events);
        assert!(sender.is_closed());
        assert!(!sender.errored(io::Error::other("late")).await);
    }

    #[tokio::test]
    async fn body_channel_streams_chunks() {
        let (tx, mut body) = body_channel(2);
        tx.send(Ok(Bytes::from_static(b"ab"))).await.unwrap();
        drop(tx);
        assert_eq!(body.next().await.unwrap().unwrap(), Bytes::from_static(b"ab"));
        assert!(body.next().await.is_none());
    }
}
