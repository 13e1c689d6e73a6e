use sluice_types::{BucketName, ContentPath};

/// Errors from storage backend operations.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The backend could not be reached or refused the handle.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// The bucket does not exist for this principal.
    #[error("bucket not found: {0}")]
    BucketNotFound(BucketName),

    /// No content is stored under the requested path.
    #[error("content not found: {0}")]
    NotFound(ContentPath),

    /// The backend refused a write (capacity, permissions, ...).
    #[error("write rejected: {0}")]
    WriteRejected(String),

    /// The write handle was already finished or aborted.
    #[error("write handle is closed")]
    Closed,

    /// I/O error from the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;
