//! HTTP API for the queue operations
//!
//! Thin transport adapter over the matchmaking engine: request bodies map
//! one-to-one onto engine operations and typed errors map onto status codes.
//! No semantics live here.

use crate::error::MatchmakingError;
use crate::matchmaking::MatchmakingEngine;
use crate::types::{JoinQueueRequest, PartyId, QueuePartyRequest};
use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Port to bind the API server to
    pub port: u16,
    /// Host to bind to
    pub host: String,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
        }
    }
}

/// HTTP server exposing the queue operations
pub struct ApiServer {
    config: ApiServerConfig,
    engine: Arc<MatchmakingEngine>,
    shutdown_tx: broadcast::Sender<()>,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig, engine: Arc<MatchmakingEngine>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            engine,
            shutdown_tx,
        }
    }

    /// Start serving requests until a shutdown signal arrives
    pub async fn start(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .context("Invalid API server address")?;

        let app = create_router(self.engine.clone());
        let listener = TcpListener::bind(addr).await?;

        info!("Queue API listening on http://{}", addr);

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("API server shutdown signal received");
            })
            .await?;

        info!("API server stopped");
        Ok(())
    }

    /// Stop the API server
    pub async fn stop(&self) -> Result<()> {
        info!("Stopping API server...");
        if let Err(e) = self.shutdown_tx.send(()) {
            warn!("Failed to send shutdown signal to API server: {}", e);
        }
        Ok(())
    }
}

/// Build the API router; public so tests can drive it without a socket
pub fn create_router(engine: Arc<MatchmakingEngine>) -> Router {
    Router::new()
        .route("/queue/join", post(join_handler))
        .route("/queue/party", post(queue_party_handler))
        .route("/queue/leave", post(leave_handler))
        .route("/queue/status/{player_id}", get(status_handler))
        .route("/queue/party/{party_id}/cancel", post(cancel_party_handler))
        .with_state(engine)
}

#[derive(Debug, Deserialize)]
struct LeaveBody {
    player_id: String,
}

#[derive(Debug, Deserialize)]
struct CancelBody {
    requester_id: String,
}

async fn join_handler(
    State(engine): State<Arc<MatchmakingEngine>>,
    Json(request): Json<JoinQueueRequest>,
) -> Response {
    debug!("Join request - player: '{}'", request.player_id);

    match engine.join_queue(request).await {
        Ok(entry_id) => (StatusCode::OK, Json(json!({ "queue_id": entry_id }))).into_response(),
        Err(e) => error_response(e),
    }
}

async fn queue_party_handler(
    State(engine): State<Arc<MatchmakingEngine>>,
    Json(request): Json<QueuePartyRequest>,
) -> Response {
    debug!("Party queue request - party: {}", request.party_id);

    match engine.queue_party(request).await {
        Ok(outcome) => (StatusCode::OK, Json(json!(outcome))).into_response(),
        Err(e) => error_response(e),
    }
}

async fn leave_handler(
    State(engine): State<Arc<MatchmakingEngine>>,
    Json(body): Json<LeaveBody>,
) -> Response {
    match engine.leave_queue(&body.player_id).await {
        Ok(()) => (StatusCode::OK, Json(json!({}))).into_response(),
        Err(e) => error_response(e),
    }
}

async fn status_handler(
    State(engine): State<Arc<MatchmakingEngine>>,
    Path(player_id): Path<String>,
) -> Response {
    match engine.queue_status(&player_id).await {
        Ok(status) => (StatusCode::OK, Json(json!(status))).into_response(),
        Err(e) => error_response(e),
    }
}

async fn cancel_party_handler(
    State(engine): State<Arc<MatchmakingEngine>>,
    Path(party_id): Path<PartyId>,
    Json(body): Json<CancelBody>,
) -> Response {
    match engine.cancel_party_queue(party_id, &body.requester_id).await {
        Ok(removed) => (StatusCode::OK, Json(json!({ "removed": removed }))).into_response(),
        Err(e) => error_response(e),
    }
}

/// Map typed matchmaking errors onto HTTP status codes
fn error_response(err: anyhow::Error) -> Response {
    let (code, kind) = match err.downcast_ref::<MatchmakingError>() {
        Some(MatchmakingError::AlreadyQueued { .. }) => (StatusCode::CONFLICT, "already_queued"),
        Some(MatchmakingError::NotQueued { .. }) => (StatusCode::NOT_FOUND, "not_queued"),
        Some(MatchmakingError::PartyNotQueued { .. }) => {
            (StatusCode::NOT_FOUND, "party_not_queued")
        }
        Some(MatchmakingError::NotPartyLeader { .. }) => {
            (StatusCode::FORBIDDEN, "not_party_leader")
        }
        Some(MatchmakingError::PartyNotFound { .. }) => (StatusCode::NOT_FOUND, "party_not_found"),
        Some(MatchmakingError::HeroNotFound { .. }) => (StatusCode::NOT_FOUND, "hero_not_found"),
        Some(MatchmakingError::UnknownInstanceKind { .. }) => {
            (StatusCode::NOT_FOUND, "unknown_instance_kind")
        }
        Some(MatchmakingError::InvalidJoinRequest { .. })
        | Some(MatchmakingError::GroupSizeOutOfBounds { .. })
        | Some(MatchmakingError::InvalidPartyTransition { .. })
        | Some(MatchmakingError::ConfigurationError { .. }) => {
            (StatusCode::BAD_REQUEST, "validation_failed")
        }
        Some(MatchmakingError::StoreUnavailable { .. }) => {
            (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable")
        }
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
    };

    warn!("Request failed ({}): {}", kind, err);
    (
        code,
        Json(json!({ "error": kind, "message": err.to_string() })),
    )
        .into_response()
}
