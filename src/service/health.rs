//! Health check reporting
//!
//! This module provides health check functionality for the rally-point
//! matchmaking service, including readiness and liveness probes.

use crate::service::app::AppState;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

/// Health check status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Overall service status
    pub status: HealthStatus,
    /// Service name
    pub service: String,
    /// Service version
    pub version: String,
    /// Current timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Detailed component checks
    pub checks: Vec<ComponentCheck>,
    /// Service statistics
    pub stats: ServiceStats,
}

/// Individual component health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    /// Component name
    pub name: String,
    /// Component status
    pub status: HealthStatus,
    /// Optional error message if unhealthy
    pub message: Option<String>,
    /// Check duration in milliseconds
    pub duration_ms: u64,
}

/// Service statistics for health reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStats {
    /// Live queue entries
    pub queue_depth: usize,
    /// Matchmaking passes run since service start
    pub passes_run: u64,
    /// Groups formed since service start
    pub groups_formed: u64,
    /// Players consumed into instances since service start
    pub players_matched: u64,
}

impl HealthCheck {
    /// Perform a comprehensive health check of the service
    pub async fn check(app_state: Arc<AppState>) -> Result<Self> {
        let mut checks = Vec::new();
        let mut overall_status = HealthStatus::Healthy;

        let service_check = Self::check_service_running(&app_state).await;
        if service_check.status != HealthStatus::Healthy {
            overall_status = HealthStatus::Unhealthy;
        }
        checks.push(service_check);

        let engine_check = Self::check_engine(&app_state).await;
        if engine_check.status == HealthStatus::Unhealthy {
            overall_status = HealthStatus::Unhealthy;
        } else if engine_check.status == HealthStatus::Degraded
            && overall_status == HealthStatus::Healthy
        {
            overall_status = HealthStatus::Degraded;
        }
        checks.push(engine_check);

        let stats = Self::gather_service_stats(&app_state).await;

        Ok(HealthCheck {
            status: overall_status,
            service: app_state.config().service.name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now(),
            checks,
            stats,
        })
    }

    /// Simple liveness check - just verify service is running
    pub async fn liveness_check(app_state: Arc<AppState>) -> Result<HealthStatus> {
        if app_state.is_running().await {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy)
        }
    }

    /// Readiness check - verify service can handle requests
    pub async fn readiness_check(app_state: Arc<AppState>) -> Result<HealthStatus> {
        if !app_state.is_running().await {
            return Ok(HealthStatus::Unhealthy);
        }

        Ok(Self::check_engine(&app_state).await.status)
    }

    /// Check if service is running
    async fn check_service_running(app_state: &AppState) -> ComponentCheck {
        let start = std::time::Instant::now();

        let (status, message) = if app_state.is_running().await {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Unhealthy,
                Some("Service is not running".to_string()),
            )
        };

        ComponentCheck {
            name: "service_running".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Check engine health via its stats and queue store
    async fn check_engine(app_state: &AppState) -> ComponentCheck {
        let start = std::time::Instant::now();
        let engine = app_state.engine();

        let (status, message) = match engine.stats() {
            Ok(_) => match engine.queue_depth().await {
                Ok(_) => (HealthStatus::Healthy, None),
                Err(e) => {
                    error!("Queue store check failed: {}", e);
                    (
                        HealthStatus::Degraded,
                        Some(format!("Queue store check failed: {}", e)),
                    )
                }
            },
            Err(e) => {
                error!("Engine stats check failed: {}", e);
                (
                    HealthStatus::Unhealthy,
                    Some(format!("Stats check failed: {}", e)),
                )
            }
        };

        ComponentCheck {
            name: "matchmaking_engine".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Gather current service statistics
    async fn gather_service_stats(app_state: &AppState) -> ServiceStats {
        let engine = app_state.engine();

        let queue_depth = engine.queue_depth().await.unwrap_or(0);
        match engine.stats() {
            Ok(stats) => ServiceStats {
                queue_depth,
                passes_run: stats.passes_run,
                groups_formed: stats.groups_formed,
                players_matched: stats.players_matched,
            },
            Err(_) => ServiceStats {
                queue_depth,
                passes_run: 0,
                groups_formed: 0,
                players_matched: 0,
            },
        }
    }
}

/// Convert health check to JSON string
impl HealthCheck {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize health check: {}", e))
    }
}
