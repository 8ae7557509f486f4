//! Health check endpoints and Prometheus metrics server
//!
//! This module provides HTTP endpoints for health checks and Prometheus
//! metrics for the rally-point matchmaking service using Axum.

use crate::metrics::collector::MetricsCollector;
use crate::service::app::AppState;
use crate::service::health::{HealthCheck, HealthStatus};
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Health server configuration
#[derive(Debug, Clone)]
pub struct HealthServerConfig {
    /// Port to bind the health server to
    pub port: u16,
    /// Host to bind to (typically "0.0.0.0" for all interfaces)
    pub host: String,
}

impl Default for HealthServerConfig {
    fn default() -> Self {
        Self {
            port: 9090,
            host: "0.0.0.0".to_string(),
        }
    }
}

/// Shared state for the health server
#[derive(Clone)]
pub struct HealthServerState {
    pub metrics_collector: Arc<MetricsCollector>,
    pub app_state: Option<Arc<AppState>>,
}

/// Health server that provides HTTP endpoints for monitoring
pub struct HealthServer {
    config: HealthServerConfig,
    state: HealthServerState,
    shutdown_tx: broadcast::Sender<()>,
}

impl HealthServer {
    /// Create a new health server
    pub fn new(config: HealthServerConfig, metrics_collector: Arc<MetricsCollector>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            state: HealthServerState {
                metrics_collector,
                app_state: None,
            },
            shutdown_tx,
        }
    }

    /// Set the application state for health checks
    pub fn with_app_state(mut self, app_state: Arc<AppState>) -> Self {
        self.state.app_state = Some(app_state);
        self
    }

    /// Start the health server
    pub async fn start(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .context("Invalid health server address")?;

        let app = self.create_router();
        let listener = TcpListener::bind(addr).await?;

        info!("Health server listening on http://{}", addr);

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("Health server shutdown signal received");
            })
            .await?;

        info!("Health server stopped");
        Ok(())
    }

    /// Create the Axum router with all health endpoints
    fn create_router(&self) -> Router {
        Router::new()
            .route("/", get(root_handler))
            .route("/health", get(health_handler))
            .route("/ready", get(ready_handler))
            .route("/alive", get(alive_handler))
            .route("/metrics", get(metrics_handler))
            .route("/stats", get(stats_handler))
            .with_state(self.state.clone())
    }

    /// Stop the health server
    pub async fn stop(&self) -> Result<()> {
        info!("Stopping health server...");

        if let Err(e) = self.shutdown_tx.send(()) {
            warn!("Failed to send shutdown signal to health server: {}", e);
        }

        Ok(())
    }
}

/// Root endpoint handler - shows service information
async fn root_handler() -> impl IntoResponse {
    let info = json!({
        "service": "rally-point",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            "/health",
            "/ready",
            "/alive",
            "/metrics",
            "/stats"
        ]
    });

    Json(info)
}

/// Lightweight health check endpoint handler
async fn health_handler(State(state): State<HealthServerState>) -> Response {
    debug!("Health check requested");

    match &state.app_state {
        Some(app_state) => match HealthCheck::check(app_state.clone()).await {
            Ok(health) => {
                let code = match health.status {
                    HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
                    HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
                };
                (code, Json(json!(health))).into_response()
            }
            Err(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "status": "error", "message": e.to_string() })),
            )
                .into_response(),
        },
        None => (
            StatusCode::OK,
            Json(json!({
                "status": "starting",
                "service": "rally-point",
                "version": env!("CARGO_PKG_VERSION")
            })),
        )
            .into_response(),
    }
}

/// Readiness probe handler
async fn ready_handler(State(state): State<HealthServerState>) -> Response {
    match &state.app_state {
        Some(app_state) => match HealthCheck::readiness_check(app_state.clone()).await {
            Ok(HealthStatus::Healthy) | Ok(HealthStatus::Degraded) => {
                (StatusCode::OK, Json(json!({ "ready": true }))).into_response()
            }
            _ => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "ready": false })),
            )
                .into_response(),
        },
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "ready": false })),
        )
            .into_response(),
    }
}

/// Liveness probe handler
async fn alive_handler(State(state): State<HealthServerState>) -> Response {
    match &state.app_state {
        Some(app_state) => match HealthCheck::liveness_check(app_state.clone()).await {
            Ok(HealthStatus::Healthy) => {
                (StatusCode::OK, Json(json!({ "alive": true }))).into_response()
            }
            _ => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "alive": false })),
            )
                .into_response(),
        },
        None => (StatusCode::OK, Json(json!({ "alive": true }))).into_response(),
    }
}

/// Prometheus metrics endpoint handler
async fn metrics_handler(State(state): State<HealthServerState>) -> Response {
    let registry = state.metrics_collector.registry();
    let metric_families = registry.gather();

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => match String::from_utf8(buffer) {
            Ok(body) => (StatusCode::OK, body).into_response(),
            Err(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
                .into_response(),
        },
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to gather metrics: {}", e),
        )
            .into_response(),
    }
}

/// Engine statistics endpoint handler
async fn stats_handler(State(state): State<HealthServerState>) -> Response {
    match &state.app_state {
        Some(app_state) => match app_state.engine().stats() {
            Ok(stats) => (
                StatusCode::OK,
                Json(json!({
                    "passes_run": stats.passes_run,
                    "groups_formed": stats.groups_formed,
                    "party_groups": stats.party_groups,
                    "filled_groups": stats.filled_groups,
                    "solo_groups": stats.solo_groups,
                    "players_queued": stats.players_queued,
                    "players_matched": stats.players_matched,
                    "players_left": stats.players_left,
                    "entries_expired": stats.entries_expired,
                    "commits_aborted": stats.commits_aborted,
                })),
            )
                .into_response(),
            Err(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response(),
        },
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "service not started" })),
        )
            .into_response(),
    }
}
