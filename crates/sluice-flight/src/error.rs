/// Errors produced when scheduling work on a single-flight queue.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FlightError {
    /// A previous task failed; the queue accepts nothing further.
    #[error("queue is paused after task '{0}' failed")]
    Paused(String),

    /// The worker has shut down.
    #[error("queue worker is closed")]
    Closed,
}

/// Convenience alias used throughout the flight crate.
pub type FlightResult<T> = Result<T, FlightError>;
