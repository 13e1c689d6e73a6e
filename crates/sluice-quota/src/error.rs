use sluice_types::BucketName;

/// Errors that can occur while evaluating a quota.
///
/// Capacity denials are not errors; they are [`QuotaDecision::Deny`]. This
/// covers infrastructure failure only.
///
/// [`QuotaDecision::Deny`]: crate::QuotaDecision::Deny
#[derive(Debug, thiserror::Error)]
pub enum QuotaError {
    /// The backend usage query failed.
    #[error("usage query for bucket {bucket} failed: {source}")]
    CheckFailed {
        bucket: BucketName,
        #[source]
        source: sluice_store::BackendError,
    },
}

pub type QuotaResult<T> = Result<T, QuotaError>;
