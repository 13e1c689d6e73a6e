use serde::{Deserialize, Serialize};

/// Default bucket capacity: 30 GiB.
pub const DEFAULT_BUCKET_LIMIT: u64 = 30 * 1024 * 1024 * 1024;

/// Configuration for the quota guard.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Hard capacity of a bucket in bytes. Also the largest single upload.
    pub limit_bytes: u64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            limit_bytes: DEFAULT_BUCKET_LIMIT,
        }
    }
}

impl QuotaConfig {
    pub fn with_limit(limit_bytes: u64) -> Self {
        Self { limit_bytes }
    }
}
