use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sluice_quota::config::DEFAULT_BUCKET_LIMIT;
use sluice_quota::QuotaConfig;

use crate::error::{PipelineError, PipelineResult};

/// Largest single write handed to the backend: 3 MiB.
pub const DEFAULT_HIGH_WATER_MARK: usize = 3 * 1024 * 1024;

/// Progress is reported every five high-water marks.
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 5 * DEFAULT_HIGH_WATER_MARK as u64;

/// Configuration for the ingestion pipeline.
///
/// Every field has a default, so a TOML file only needs the keys it changes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Hard capacity of a bucket, and the largest accepted upload.
    pub bucket_limit_bytes: u64,
    /// Inbound chunks larger than this are split before being written.
    pub high_water_mark: usize,
    /// Byte cadence of progress reports.
    pub progress_interval: u64,
    /// Backend root passed along with every push.
    pub root: Option<String>,
    /// Abort the stream phase after this many seconds.
    pub stream_timeout_secs: Option<u64>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            bucket_limit_bytes: DEFAULT_BUCKET_LIMIT,
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            root: None,
            stream_timeout_secs: None,
        }
    }
}

impl IngestConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> PipelineResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a TOML file.
    pub fn load(path: &Path) -> PipelineResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if self.bucket_limit_bytes == 0 {
            return Err(PipelineError::Config("bucket_limit_bytes must be positive".into()));
        }
        if self.high_water_mark == 0 {
            return Err(PipelineError::Config("high_water_mark must be positive".into()));
        }
        if self.progress_interval == 0 {
            return Err(PipelineError::Config("progress_interval must be positive".into()));
        }
        if self.stream_timeout_secs == Some(0) {
            return Err(PipelineError::Config("stream_timeout_secs must be positive".into()));
        }
        Ok(())
    }

    pub fn quota(&self) -> QuotaConfig {
        QuotaConfig::with_limit(self.bucket_limit_bytes)
    }

    pub fn stream_timeout(&self) -> Option<Duration> {
        self.stream_timeout_secs.map(Duration::from_secs)
    }
}
