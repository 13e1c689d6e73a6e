//! Upload ingestion pipeline for sluice.
//!
//! Takes one uploaded file from a stream of part events to a verified,
//! content-addressed artifact, and reports exactly one [`UploadOutcome`].
//!
//! # Flow
//!
//! 1. The declared size is checked against the bucket limit, before any I/O.
//! 2. A backend handle is acquired for the principal and bucket.
//! 3. Live bucket usage is queried and the quota re-checked.
//! 4. Part events run through a single-flight queue: the part's bytes are
//!    pushed with backpressure and sampled progress; the finish event settles
//!    the stream-phase result.
//! 5. A fresh handle confirms the stored size; only then is the upload a
//!    success.
//!
//! Any failure trips the request's abort coordinator, which stops the push
//! at its next chunk boundary and detaches the inbound stream. Stream and
//! verification failures are also sent to the [`AlertSink`]. Nothing is
//! retried.
//!
//! # Key Types
//!
//! - [`UploadPipeline`] -- the orchestrator
//! - [`PushClient`] -- streams one part into the backend
//! - [`Verifier`] -- post-write metadata round-trip
//! - [`IngestConfig`] -- limits, chunking, progress cadence, timeout
//! - [`UploadOutcome`] / [`FailureKind`] -- what callers get back

pub mod adapter;
pub mod alert;
pub mod config;
pub mod context;
pub mod error;
pub mod outcome;
pub mod pipeline;
pub mod push;
pub mod verify;

pub use adapter::{body_channel, part_channel, single_part, PartSender};
pub use alert::{Alert, AlertSink, ChannelAlertSink, MemoryAlertSink, TracingAlertSink};
pub use config::IngestConfig;
pub use context::RequestContext;
pub use error::{PipelineError, PipelineResult, PushError, StreamError, VerifyError};
pub use outcome::{FailureKind, StreamCompletion, UploadFailure, UploadOutcome};
pub use pipeline::UploadPipeline;
pub use push::{ProgressSampler, PushClient, PushResult};
pub use verify::Verifier;
