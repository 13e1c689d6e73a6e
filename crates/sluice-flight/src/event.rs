use std::fmt;
use std::io;
use std::pin::Pin;

use futures_util::Stream;
use sluice_types::ByteStream;

/// One file part emitted by the stream adapter.
pub struct FilePart {
    /// Form field the part arrived under.
    pub field: String,
    /// Client-supplied file name.
    pub file_name: String,
    /// Client-declared MIME type.
    pub mime: String,
    /// The part's bytes. Consumed exactly once by the push client.
    pub body: ByteStream,
}

impl FilePart {
    pub fn new(
        field: impl Into<String>,
        file_name: impl Into<String>,
        mime: impl Into<String>,
        body: ByteStream,
    ) -> Self {
        Self {
            field: field.into(),
            file_name: file_name.into(),
            mime: mime.into(),
            body,
        }
    }
}

impl fmt::Debug for FilePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilePart")
            .field("field", &self.field)
            .field("file_name", &self.file_name)
            .field("mime", &self.mime)
            .finish_non_exhaustive()
    }
}

/// Events raised by the stream adapter for one request.
#[derive(Debug)]
pub enum PartEvent {
    /// A file part began; its body is ready to be streamed.
    Started(FilePart),
    /// The inbound stream ended cleanly.
    Finished,
    /// The adapter failed to parse or read the inbound stream.
    Errored(io::Error),
}

impl PartEvent {
    /// Stable label used for queue tasks and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Started(_) => "part-started",
            Self::Finished => "stream-finished",
            Self::Errored(_) => "stream-errored",
        }
    }
}

/// The adapter's event sequence for one request.
pub type PartEvents = Pin<Box<dyn Stream<Item = PartEvent> + Send>>;
