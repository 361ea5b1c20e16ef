// Gateway server module
// Startup selection, shared state and the HTTP listener

mod error;
mod handlers;

pub use error::{ApiError, PHASES_HEADER};
pub use handlers::{
    create_router, degraded_router, degraded_health, handle_ask, health_check, metrics_endpoint,
    AskParams, AskRequest, AskResponse,
};

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::GatewayConfig;
use crate::controller::FallbackController;
use crate::inference::ClientFactory;
use crate::metrics::GatewayMetrics;
use crate::models::ModelSelector;
use crate::monitoring::MemoryProbe;

/// Questions are short; anything bigger than this is rejected by axum.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// State shared by every request after a successful startup
pub struct AppState {
    controller: Arc<FallbackController>,
    memory: Arc<dyn MemoryProbe>,
    metrics: GatewayMetrics,
}

impl AppState {
    pub fn new(
        controller: Arc<FallbackController>,
        memory: Arc<dyn MemoryProbe>,
        metrics: GatewayMetrics,
    ) -> Self {
        Self {
            controller,
            memory,
            metrics,
        }
    }

    pub fn controller(&self) -> &Arc<FallbackController> {
        &self.controller
    }

    pub fn memory(&self) -> &Arc<dyn MemoryProbe> {
        &self.memory
    }

    pub fn metrics(&self) -> &GatewayMetrics {
        &self.metrics
    }
}

/// Outcome of startup: serving, or reporting why it cannot
pub enum Gateway {
    Ready(Arc<AppState>),
    /// Startup failed; only `/healthz` is served, with `reason`.
    Degraded { reason: String },
}

impl Gateway {
    /// Select a tier from the memory available right now and bind the
    /// controller. Failures produce `Degraded` instead of an error.
    pub fn bootstrap(
        config: &GatewayConfig,
        memory: Arc<dyn MemoryProbe>,
        factory: Arc<dyn ClientFactory>,
    ) -> Self {
        let tiers = config.tier_table();
        let available = memory.available_gib();

        let tier = match ModelSelector::select(&tiers, available) {
            Ok(tier) => tier,
            Err(e) => return Self::degraded(e.to_string()),
        };

        let controller = match FallbackController::new(tier, tiers, factory, config.timeout) {
            Ok(controller) => controller,
            Err(e) => return Self::degraded(format!("Failed to create inference client: {}", e)),
        };

        let metrics = match GatewayMetrics::new() {
            Ok(metrics) => metrics,
            Err(e) => return Self::degraded(format!("Failed to register metrics: {}", e)),
        };

        Gateway::Ready(Arc::new(AppState::new(
            Arc::new(controller),
            memory,
            metrics,
        )))
    }

    fn degraded(reason: String) -> Self {
        tracing::error!("Startup failed, serving health only: {}", reason);
        Gateway::Degraded { reason }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Gateway::Ready(_))
    }

    /// Router for this startup outcome, with tracing and a body size limit
    pub fn router(&self) -> axum::Router {
        let router = match self {
            Gateway::Ready(state) => create_router(Arc::clone(state)),
            Gateway::Degraded { reason } => degraded_router(Arc::from(reason.as_str())),
        };

        router
            .layer(axum::extract::DefaultBodyLimit::max(MAX_BODY_BYTES))
            .layer(TraceLayer::new_for_http())
    }

    /// Bind `addr` and serve until Ctrl-C
    pub async fn serve(self, addr: SocketAddr) -> Result<()> {
        let app = self.router();

        tracing::info!("Starting gateway on {}", addr);
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("HTTP server error")?;

        tracing::info!("Gateway stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
