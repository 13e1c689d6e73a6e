//! Per-request coordination primitives for sluice.
//!
//! An upload is driven by events from the stream adapter (a part started,
//! the stream finished, the stream errored) that may arrive from independent
//! sources. This crate makes their handling safe:
//!
//! - [`AbortCoordinator`] -- one terminal cancellation signal per request,
//!   with exactly-once observer notification
//! - [`SingleFlightQueue`] -- runs event handlers one at a time in
//!   submission order; the first failure pauses it for good and trips the
//!   coordinator
//! - [`PartEvent`] -- the closed set of events the adapter can raise
//!
//! Nothing here is global: each request builds its own coordinator and queue.

pub mod abort;
pub mod error;
pub mod event;
pub mod queue;

pub use abort::{AbortCoordinator, AbortReason, AbortState};
pub use error::{FlightError, FlightResult};
pub use event::{FilePart, PartEvent, PartEvents};
pub use queue::{QueueFailure, QueueReport, QueueWorker, SingleFlightQueue, TaskFuture};
