//! Foundation types for sluice, the upload ingestion pipeline.
//!
//! Every other sluice crate depends on `sluice-types`. Nothing in here
//! performs I/O; these are the values that flow between the quota guard, the
//! push client, the verifier, and the caller.
//!
//! # Key Types
//!
//! - [`FileId`] — locally generated identifier (UUID v7) assigned before any
//!   bytes are transferred
//! - [`ContentPath`] — backend-assigned, content-derived path of stored data
//! - [`BucketName`] / [`Principal`] — where the upload goes and who sends it
//! - [`UploadRequest`] — the immutable, caller-declared shape of one upload
//! - [`FileDescriptor`] — the file record whose size is filled by verification
//! - [`Decorator`] — stable string tags surfaced on every outcome
//! - [`ByteStream`] — the per-part inbound byte stream

pub mod decorator;
pub mod error;
pub mod ids;
pub mod request;
pub mod stream;

pub use decorator::Decorator;
pub use error::TypeError;
pub use ids::{BucketName, ContentPath, FileId, Principal};
pub use request::{FileDescriptor, UploadRequest};
pub use stream::{bytes_stream, ByteStream};
