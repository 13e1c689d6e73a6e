use std::net::SocketAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sluice_pipeline::IngestConfig;

use crate::error::{ServerError, ServerResult};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Uploads declaring a larger body are refused as too large before the
    /// pipeline sees them.
    pub max_body_bytes: u64,
    pub ingest: IngestConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let ingest = IngestConfig::default();
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 4400)),
            max_body_bytes: ingest.bucket_limit_bytes,
            ingest,
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(text: &str) -> ServerResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> ServerResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> ServerResult<()> {
        if self.max_body_bytes == 0 {
            return Err(ServerError::Config("max_body_bytes must be positive".into()));
        }
        self.ingest.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config() {
        let c = ServerConfig::default();
        assert_eq!(c.bind_addr, "127.0.0.1:4400".parse::<SocketAddr>().unwrap());
        assert_eq!(c.max_body_bytes, c.ingest.bucket_limit_bytes);
        c.validate().unwrap();
    }

    #[test]
    fn nested_ingest_table() {
        let c = ServerConfig::from_toml_str(
            r#"
            bind_addr = "0.0.0.0:8080"
            max_body_bytes = 1048576

            [ingest]
            bucket_limit_bytes = 2097152
            stream_timeout_secs = 600
            "#,
        )
        .unwrap();
        assert_eq!(c.bind_addr.port(), 8080);
        assert_eq!(c.max_body_bytes, 1_048_576);
        assert_eq!(c.ingest.bucket_limit_bytes, 2_097_152);
        assert_eq!(c.ingest.stream_timeout_secs, Some(600));
    }

    #[test]
    fn invalid_ingest_is_rejected() {
        let err = ServerConfig::from_toml_str("[ingest]\nprogress_interval = 0\n").unwrap_err();
        assert!(matches!(err, ServerError::Pipeline(_)));
        let err = ServerConfig::from_toml_str("max_body_bytes = 0").unwrap_err();
        assert!(matches!(err, ServerError::Config(_)));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "bind_addr = \"127.0.0.1:9000\"").unwrap();
        let c = ServerConfig::load(file.path()).unwrap();
        assert_eq!(c.bind_addr.port(), 9000);
        assert_eq!(c.ingest, IngestConfig::default());
    }
}
