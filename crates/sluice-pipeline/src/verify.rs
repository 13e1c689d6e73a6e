use std::sync::Arc;

use sluice_store::{BackendConnector, ContentMetadata};
use sluice_types::{BucketName, ContentPath, Principal};
use tracing::{debug, info};

use crate::error::VerifyError;

/// Confirms a pushed artifact with a fresh backend round-trip.
///
/// Always reconnects: the handle used for the push is never reused, so a
/// verification reflects what the backend reports now.
#[derive(Clone)]
pub struct Verifier {
    connector: Arc<dyn BackendConnector>,
}

impl Verifier {
    pub fn new(connector: Arc<dyn BackendConnector>) -> Self {
        Self { connector }
    }

    pub async fn verify(
        &self,
        principal: &Principal,
        bucket: &BucketName,
        path: &ContentPath,
    ) -> Result<ContentMetadata, VerifyError> {
        debug!(user = %principal, bucket = %bucket, path = %path, "reconnecting for verification");
        let backend = self
            .connector
            .connect(principal, bucket)
            .await
            .map_err(VerifyError::Connect)?
            .ok_or(VerifyError::NoBackend)?;

        let metadata = backend.metadata(path).await.map_err(VerifyError::Metadata)?;
        info!(path = %metadata.path, size = metadata.size_bytes, "content verified");
        Ok(metadata)
    }
}
