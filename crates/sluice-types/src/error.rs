use thiserror::Error;

/// Errors produced by type construction and parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid bucket name: {0}")]
    InvalidBucket(String),

    #[error("invalid content path: {0}")]
    InvalidContentPath(String),

    #[error("invalid file id: {0}")]
    InvalidFileId(String),

    #[error("unknown decorator: {0}")]
    UnknownDecorator(String),
}
