use serde::{Deserialize, Serialize};
use sluice_store::StorageBackend;
use sluice_types::BucketName;
use tracing::{debug, warn};

use crate::config::QuotaConfig;
use crate::error::{QuotaError, QuotaResult};

// ---------------------------------------------------------------------------
// Decision types
// ---------------------------------------------------------------------------

/// Why an upload was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum QuotaDenial {
    /// The file alone is larger than a whole bucket.
    SizeTooLarge { declared: u64, limit: u64 },
    /// The file does not fit in what is left of the bucket.
    NotEnoughSpace { declared: u64, remaining: u64 },
}

impl std::fmt::Display for QuotaDenial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SizeTooLarge { declared, limit } => {
                write!(f, "declared size {declared} exceeds the {limit} byte limit")
            }
            Self::NotEnoughSpace {
                declared,
                remaining,
            } => write!(
                f,
                "declared size {declared} exceeds the {remaining} bytes remaining"
            ),
        }
    }
}

/// Outcome of a quota check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuotaDecision {
    Allow,
    Deny(QuotaDenial),
}

impl QuotaDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Capacity of one bucket at the instant its usage was read.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketQuotaState {
    pub limit: u64,
    pub used: u64,
}

impl BucketQuotaState {
    /// Bytes still free. Zero when the bucket is already over its limit.
    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.used)
    }

    pub fn admits(&self, declared: u64) -> QuotaDecision {
        check_quota(declared, self.used, self.limit)
    }
}

/// Decide whether `declared` bytes fit in a bucket of `limit` with `used`
/// already occupied.
///
/// The single-file cap wins over the remaining-space check: a file larger
/// than `limit` is `SizeTooLarge` whatever `used` is.
pub fn check_quota(declared: u64, used: u64, limit: u64) -> QuotaDecision {
    if declared > limit {
        return QuotaDecision::Deny(QuotaDenial::SizeTooLarge { declared, limit });
    }
    let remaining = limit.saturating_sub(used);
    if declared > remaining {
        return QuotaDecision::Deny(QuotaDenial::NotEnoughSpace {
            declared,
            remaining,
        });
    }
    QuotaDecision::Allow
}

// ---------------------------------------------------------------------------
// QuotaGuard
// ---------------------------------------------------------------------------

/// A quota decision together with the usage it was computed from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuotaCheck {
    pub decision: QuotaDecision,
    pub state: BucketQuotaState,
}

/// Gates uploads on declared size.
#[derive(Clone, Debug, Default)]
pub struct QuotaGuard {
    config: QuotaConfig,
}

impl QuotaGuard {
    pub fn new(config: QuotaConfig) -> Self {
        Self { config }
    }

    pub fn limit(&self) -> u64 {
        self.config.limit_bytes
    }

    /// Single-file cap only. Needs no backend, so it runs before a handle is
    /// acquired.
    pub fn check_declared(&self, declared: u64) -> QuotaDecision {
        check_quota(declared, 0, self.config.limit_bytes)
    }

    /// Query live usage of `bucket` and check `declared` against it.
    ///
    /// Usage is never cached; every call costs one backend round-trip.
    pub async fn evaluate(
        &self,
        backend: &dyn StorageBackend,
        bucket: &BucketName,
        declared: u64,
    ) -> QuotaResult<QuotaCheck> {
        let usage = backend
            .usage(bucket)
            .await
            .map_err(|source| QuotaError::CheckFailed {
                bucket: bucket.clone(),
                source,
            })?;

        let state = BucketQuotaState {
            limit: self.config.limit_bytes,
            used: usage.size_bytes,
        };
        let decision = state.admits(declared);
        match decision {
            QuotaDecision::Allow => debug!(
                bucket = %bucket,
                declared,
                remaining = state.remaining(),
                "quota check passed"
            ),
            QuotaDecision::Deny(denial) => {
                warn!(bucket = %bucket, declared, %denial, "quota check denied")
            }
        }
        Ok(QuotaCheck { decision, state })
    }
}
