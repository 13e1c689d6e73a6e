use std::io;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::stream::{self, Stream};

/// Inbound bytes of a single file part.
///
/// Produced by the stream adapter and consumed exactly once by the push
/// client. Dropping it detaches the reader from the caller's connection.
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Build a [`ByteStream`] over an in-memory list of chunks.
pub fn bytes_stream<I>(chunks: I) -> ByteStream
where
    I: IntoIterator<Item = Bytes>,
    I::IntoIter: Send + 'static,
{
    Box::pin(stream::iter(chunks.into_iter().map(Ok::<Bytes, io::Error>)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn bytes_stream_yields_chunks_in_order() {
        let mut s = bytes_stream(vec![Bytes::from_static(b"ab"), Bytes::from_static(b"cd")]);
        assert_eq!(s.next().await.unwrap().unwrap(), Bytes::from_static(b"ab"));
        assert_eq!(s.next().await.unwrap().unwrap(), Bytes::from_static(b"cd"));
        assert!(s.next().await.is_none());
    }
}
