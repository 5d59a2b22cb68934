use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ApiConfig;
use crate::routes::create_router;
use crate::state::AppState;

/// Ingestion and live-feed HTTP server.
pub struct ApiServer {
    config: ApiConfig,
    state: Arc<AppState>,
}

impl ApiServer {
    pub fn new(config: ApiConfig, state: Arc<AppState>) -> Self {
        Self { config, state }
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Run the server until the shutdown future resolves.
    pub async fn run_with_shutdown(
        self,
        shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let addr = self.config.bind_address();
        let app = create_router(self.state).layer(TraceLayer::new_for_http());

        let socket_addr: SocketAddr = addr
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid bind address {addr}: {e}"))?;

        let listener = TcpListener::bind(socket_addr)
            .await
            .map_err(|e| anyhow::anyhow!("failed to bind to {addr}: {e}"))?;

        info!(address = %addr, "API server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| anyhow::anyhow!("server error: {e}"))?;

        info!("API server shut down");
        Ok(())
    }
}
