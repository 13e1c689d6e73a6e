use std::io;

use sluice_store::BackendError;

/// Errors from building or loading pipeline configuration.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Why a push did not produce a content path.
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    /// The request's abort signal tripped mid-transfer.
    #[error("push aborted")]
    Aborted,

    #[error("backend write failed: {0}")]
    Backend(#[from] BackendError),

    /// Reading the inbound part failed.
    #[error("inbound stream failed: {0}")]
    Source(#[source] io::Error),
}

/// Failure of a stream-phase handler. The first one pauses the queue.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error(transparent)]
    Push(#[from] PushError),

    /// The adapter reported a parse or read error.
    #[error("inbound stream errored: {0}")]
    Inbound(#[source] io::Error),

    /// The stream finished without a completed push.
    #[error("missing content path")]
    MissingContentPath,

    #[error("only one file part is accepted per upload")]
    ExtraPart,
}

impl StreamError {
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Push(PushError::Aborted))
    }

    /// Short machine-readable code carried on alerts.
    pub fn code(&self) -> String {
        match self {
            Self::Push(PushError::Aborted) => "ABORTED".into(),
            Self::Push(PushError::Backend(BackendError::Io(e))) => format!("{:?}", e.kind()),
            Self::Push(PushError::Backend(_)) => "BACKEND".into(),
            Self::Push(PushError::Source(e)) | Self::Inbound(e) => format!("{:?}", e.kind()),
            Self::MissingContentPath | Self::ExtraPart => "N/A".into(),
        }
    }
}

/// Why verification could not confirm a stored artifact.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("failed to reconnect for verification: {0}")]
    Connect(#[source] BackendError),

    #[error("no bucket handle available for verification")]
    NoBackend,

    #[error("metadata lookup failed: {0}")]
    Metadata(#[source] BackendError),
}

impl VerifyError {
    /// The fresh handle could not be acquired; nothing was looked up.
    pub fn is_reconnect(&self) -> bool {
        matches!(self, Self::Connect(_) | Self::NoBackend)
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Connect(_) => "CONNECT",
            Self::NoBackend => "NO_BACKEND",
            Self::Metadata(BackendError::NotFound(_)) => "NOT_FOUND",
            Self::Metadata(_) => "METADATA",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_error_codes() {
        let reset = io::Error::new(io::ErrorKind::ConnectionReset, "reset");
        assert_eq!(
            StreamError::Push(PushError::Backend(BackendError::Io(reset))).code(),
            "ConnectionReset"
        );
        assert_eq!(StreamError::MissingContentPath.code(), "N/A");
        assert!(StreamError::Push(PushError::Aborted).is_abort());
        assert!(!StreamError::ExtraPart.is_abort());
    }

    #[test]
    fn reconnect_errors_are_distinguished_from_lookups() {
        let down = || BackendError::Unavailable("down".into());
        assert!(VerifyError::Connect(down()).is_reconnect());
        assert!(VerifyError::NoBackend.is_reconnect());
        assert!(!VerifyError::Metadata(down()).is_reconnect());
    }

    #[test]
    fn push_error_display_is_transparent() {
        let e = StreamError::from(PushError::Backend(BackendError::WriteRejected("full".into())));
        assert_eq!(e.to_string(), "backend write failed: write rejected: full");
    }
}
