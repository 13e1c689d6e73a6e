use std::io;
use std::sync::Arc;

use sluice_flight::{AbortCoordinator, FilePart};
use sluice_store::StorageBackend;
use sluice_types::{ContentPath, FileDescriptor, UploadRequest};
use tracing::{debug, info};

use crate::error::StreamError;
use crate::outcome::StreamCompletion;
use crate::push::PushClient;

/// State shared by the stream-phase handlers of one request.
///
/// Owned by the queue worker and lent to one handler at a time, so no
/// handler ever observes another mid-flight.
pub struct RequestContext {
    request: UploadRequest,
    backend: Arc<dyn StorageBackend>,
    push: PushClient,
    abort: AbortCoordinator,
    descriptor: Option<FileDescriptor>,
    origin: Option<String>,
    pushed: Option<ContentPath>,
    completion: Option<StreamCompletion>,
}

impl RequestContext {
    pub fn new(
        request: UploadRequest,
        backend: Arc<dyn StorageBackend>,
        push: PushClient,
        abort: AbortCoordinator,
    ) -> Self {
        Self {
            request,
            backend,
            push,
            abort,
            descriptor: None,
            origin: None,
            pushed: None,
            completion: None,
        }
    }

    /// `<user>-<file name>` of the current part, or the username before any
    /// part arrived.
    pub fn origin(&self) -> String {
        self.origin
            .clone()
            .unwrap_or_else(|| self.request.principal().username.clone())
    }

    pub fn completion(&self) -> Option<&StreamCompletion> {
        self.completion.as_ref()
    }

    pub fn into_completion(self) -> Option<StreamCompletion> {
        self.completion
    }

    /// A file part started: stream its body into the backend.
    pub async fn on_part(&mut self, part: FilePart) -> Result<(), StreamError> {
        if self.descriptor.is_some() {
            return Err(StreamError::ExtraPart);
        }
        let descriptor = FileDescriptor::incomplete(part.file_name, part.mime);
        let origin = self.request.origin_for(&descriptor.name);
        info!(origin = %origin, file_id = %descriptor.id, field = %part.field, "part started");

        let token = self.abort.token();
        let progress_origin = origin.clone();
        self.origin = Some(origin);
        let file_id = descriptor.id;
        self.descriptor = Some(descriptor);

        let pushed = self
            .push
            .push(
                self.backend.as_ref(),
                self.request.bucket(),
                &file_id,
                part.body,
                &token,
                move |bytes| debug!(origin = %progress_origin, bytes, "upload progress"),
            )
            .await?;
        self.pushed = Some(pushed.path);
        Ok(())
    }

    /// The inbound stream ended: settle the stream-phase result.
    ///
    /// The request stays abortable; it only completes once verified.
    pub async fn on_finish(&mut self) -> Result<(), StreamError> {
        let (Some(path), Some(descriptor)) = (self.pushed.clone(), self.descriptor.clone()) else {
            return Err(StreamError::MissingContentPath);
        };
        let completion = StreamCompletion { descriptor, path };
        info!(
            origin = %self.origin(),
            path = %completion.path,
            decorator = %completion.decorator(),
            "stream phase finished"
        );
        self.completion = Some(completion);
        Ok(())
    }

    /// The adapter failed to read the inbound stream.
    pub async fn on_error(&mut self, error: io::Error) -> Result<(), StreamError> {
        Err(StreamError::Inbound(error))
    }
}
