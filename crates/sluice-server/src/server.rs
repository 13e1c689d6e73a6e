use std::sync::Arc;

use sluice_pipeline::{AlertSink, TracingAlertSink, UploadPipeline};
use sluice_store::{BackendConnector, InMemoryBackend, InMemoryConnector};
use tokio::net::TcpListener;

use crate::auth::{AllowAllKeys, KeyResolver};
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::AppState;
use crate::router::build_router;

/// Sluice ingestion server.
pub struct SluiceServer {
    config: ServerConfig,
    state: AppState,
}

impl SluiceServer {
    pub fn new(
        config: ServerConfig,
        connector: Arc<dyn BackendConnector>,
        alerts: Arc<dyn AlertSink>,
        keys: Arc<dyn KeyResolver>,
    ) -> Self {
        let pipeline = UploadPipeline::new(config.ingest.clone(), connector, alerts);
        let max_body_bytes = config.max_body_bytes;
        Self {
            config,
            state: AppState {
                pipeline,
                keys,
                max_body_bytes,
            },
        }
    }

    /// A server over a fresh in-memory backend that accepts any API key.
    /// Returns the backend so callers can inspect what was stored.
    pub fn in_memory(config: ServerConfig) -> (Self, InMemoryBackend) {
        let backend = InMemoryBackend::new();
        let server = Self::new(
            config,
            Arc::new(InMemoryConnector::new(backend.clone())),
            Arc::new(TracingAlertSink),
            Arc::new(AllowAllKeys),
        );
        (server, backend)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(self.state.clone())
    }

    /// Start serving requests.
    pub async fn serve(self) -> ServerResult<()> {
        let app = self.router();
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        tracing::info!("sluice server listening on {}", self.config.bind_addr);
        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_construction() {
        let (server, backend) = SluiceServer::in_memory(ServerConfig::default());
        assert_eq!(server.config().bind_addr, "127.0.0.1:4400".parse().unwrap());
        assert_eq!(backend.object_count(), 0);
    }

    #[test]
    fn router_builds() {
        let (server, _) = SluiceServer::in_memory(ServerConfig::default());
        let _router = server.router();
    }
}
