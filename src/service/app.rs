//! Main application state and service coordination
//!
//! This module contains the production AppState that wires the stores,
//! catalog, engine, servers, and background tasks together.

use crate::catalog::StaticInstanceCatalog;
use crate::config::AppConfig;
use crate::hero::InMemoryHeroDirectory;
use crate::http::{ApiServer, ApiServerConfig};
use crate::instance::InMemoryInstanceRepository;
use crate::matchmaking::MatchmakingEngine;
use crate::metrics::{HealthServer, HealthServerConfig, MetricsCollector};
use crate::party::InMemoryPartyRegistry;
use crate::queue::InMemoryQueueStore;
use anyhow::Result;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("Background task error: {message}")]
    BackgroundTask { message: String },
}

/// Main application state containing all service components
pub struct AppState {
    /// Application configuration
    config: AppConfig,

    /// Core matchmaking engine
    engine: Arc<MatchmakingEngine>,

    /// Hero directory, exposed for seeding by tooling
    hero_directory: Arc<InMemoryHeroDirectory>,

    /// Party registry, exposed for seeding by tooling
    party_registry: Arc<InMemoryPartyRegistry>,

    /// Metrics collector shared by the engine and the health server
    metrics_collector: Arc<MetricsCollector>,

    /// Ops server (health + metrics), created at start
    health_server: Mutex<Option<Arc<HealthServer>>>,

    /// Queue API server, created at start
    api_server: Mutex<Option<Arc<ApiServer>>>,

    /// Background task handles
    background_tasks: Mutex<Vec<JoinHandle<()>>>,

    /// Service status
    is_running: Arc<RwLock<bool>>,
}

impl AppState {
    /// Initialize the application with all dependencies
    pub fn new(config: AppConfig) -> Result<Self, ServiceError> {
        info!("Initializing rally-point matchmaking service");
        info!(
            "Configuration: service={}, api_port={}, metrics_port={}",
            config.service.name, config.service.api_port, config.service.metrics_port
        );

        let metrics_collector =
            Arc::new(
                MetricsCollector::new().map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to create metrics collector: {}", e),
                })?,
            );

        let queue_store = Arc::new(InMemoryQueueStore::new());
        let party_registry = Arc::new(InMemoryPartyRegistry::new());
        let hero_directory = Arc::new(InMemoryHeroDirectory::new());
        let instance_repository = Arc::new(InMemoryInstanceRepository::new());
        let catalog = Arc::new(StaticInstanceCatalog::new());

        let engine = MatchmakingEngine::with_metrics(
            queue_store,
            party_registry.clone(),
            hero_directory.clone(),
            instance_repository,
            catalog,
            config.engine_config(),
            metrics_collector.clone(),
        )
        .map_err(|e| ServiceError::Initialization {
            message: format!("Failed to create matchmaking engine: {}", e),
        })?;

        Ok(Self {
            config,
            engine: Arc::new(engine),
            hero_directory,
            party_registry,
            metrics_collector,
            health_server: Mutex::new(None),
            api_server: Mutex::new(None),
            background_tasks: Mutex::new(Vec::new()),
            is_running: Arc::new(RwLock::new(false)),
        })
    }

    /// Start all servers and background tasks
    pub async fn start(self: Arc<Self>) -> Result<(), ServiceError> {
        info!("Starting rally-point matchmaking service");

        *self.is_running.write().await = true;

        Self::start_health_server(&self).await?;
        self.start_api_server().await?;
        self.start_background_tasks().await?;

        info!("Rally-point matchmaking service started successfully");
        Ok(())
    }

    /// Perform graceful shutdown
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of rally-point service");

        *self.is_running.write().await = false;

        if let Some(api_server) = self.locked_api_server() {
            if let Err(e) = api_server.stop().await {
                warn!("Failed to stop API server: {}", e);
            }
        }
        if let Some(health_server) = self.locked_health_server() {
            if let Err(e) = health_server.stop().await {
                warn!("Failed to stop health server: {}", e);
            }
        }

        self.stop_background_tasks().await;

        match self.engine.stats() {
            Ok(stats) => info!("Final service statistics: {:?}", stats),
            Err(e) => warn!("Failed to read final stats: {}", e),
        }

        info!("Rally-point service shutdown completed");
        Ok(())
    }

    /// Get service configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Check if service is running
    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    /// Get the matchmaking engine
    pub fn engine(&self) -> Arc<MatchmakingEngine> {
        self.engine.clone()
    }

    /// Get the hero directory for seeding
    pub fn hero_directory(&self) -> Arc<InMemoryHeroDirectory> {
        self.hero_directory.clone()
    }

    /// Get the party registry for seeding
    pub fn party_registry(&self) -> Arc<InMemoryPartyRegistry> {
        self.party_registry.clone()
    }

    /// Get the metrics collector
    pub fn metrics_collector(&self) -> Arc<MetricsCollector> {
        self.metrics_collector.clone()
    }

    fn locked_api_server(&self) -> Option<Arc<ApiServer>> {
        self.api_server.lock().ok().and_then(|guard| guard.clone())
    }

    fn locked_health_server(&self) -> Option<Arc<HealthServer>> {
        self.health_server
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
    }

    /// Start the health and metrics server
    async fn start_health_server(this: &Arc<Self>) -> Result<(), ServiceError> {
        let health_config = HealthServerConfig {
            port: this.config.service.metrics_port,
            host: "0.0.0.0".to_string(),
        };

        let health_server = Arc::new(
            HealthServer::new(health_config, this.metrics_collector.clone())
                .with_app_state(this.clone()),
        );

        {
            let mut guard =
                this.health_server
                    .lock()
                    .map_err(|_| ServiceError::Initialization {
                        message: "Failed to store health server handle".to_string(),
                    })?;
            *guard = Some(health_server.clone());
        }

        let handle = tokio::spawn(async move {
            if let Err(e) = health_server.start().await {
                error!("Health server failed: {}", e);
            }
        });
        this.push_task(handle)?;

        info!(
            "Health endpoints started on port {}",
            this.config.service.metrics_port
        );
        Ok(())
    }

    /// Start the queue API server
    async fn start_api_server(&self) -> Result<(), ServiceError> {
        let api_config = ApiServerConfig {
            port: self.config.service.api_port,
            host: "0.0.0.0".to_string(),
        };

        let api_server = Arc::new(ApiServer::new(api_config, self.engine.clone()));

        {
            let mut guard = self
                .api_server
                .lock()
                .map_err(|_| ServiceError::Initialization {
                    message: "Failed to store API server handle".to_string(),
                })?;
            *guard = Some(api_server.clone());
        }

        let handle = tokio::spawn(async move {
            if let Err(e) = api_server.start().await {
                error!("API server failed: {}", e);
            }
        });
        self.push_task(handle)?;

        info!("Queue API started on port {}", self.config.service.api_port);
        Ok(())
    }

    /// Start background maintenance tasks
    async fn start_background_tasks(&self) -> Result<(), ServiceError> {
        info!("Starting background maintenance tasks...");

        // Expiry sweep task: evicts stale entries even when no joins arrive.
        let sweep_task = {
            let engine = self.engine.clone();
            let interval = self.config.sweep_interval();
            let is_running = self.is_running.clone();

            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                info!("Expiry sweep task started ({}s interval)", interval.as_secs());

                while *is_running.read().await {
                    ticker.tick().await;

                    match engine.sweep_expired().await {
                        Ok(0) => debug!("Expiry sweep found nothing to evict"),
                        Ok(evicted) => info!("Expiry sweep evicted {} entries", evicted),
                        Err(e) => warn!("Expiry sweep failed: {}", e),
                    }
                }

                info!("Expiry sweep task stopped");
            })
        };

        // Health metrics task: uptime, health status, queue depth gauges.
        let health_metrics_task = {
            let engine = self.engine.clone();
            let metrics_collector = self.metrics_collector.clone();
            let is_running = self.is_running.clone();

            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(Duration::from_secs(30));
                let start_time = tokio::time::Instant::now();
                info!("Health metrics task started");

                while *is_running.read().await {
                    ticker.tick().await;

                    let uptime_seconds = start_time.elapsed().as_secs() as i64;
                    metrics_collector
                        .service()
                        .uptime_seconds
                        .set(uptime_seconds);

                    match engine.queue_depth().await {
                        Ok(depth) => {
                            metrics_collector.set_queue_depth(depth as i64);
                            metrics_collector.update_component_health("queue_store", true);
                        }
                        Err(e) => {
                            warn!("Queue depth read failed: {}", e);
                            metrics_collector.update_component_health("queue_store", false);
                        }
                    }

                    metrics_collector.update_health_status(2);
                    metrics_collector.update_component_health("engine", true);

                    debug!("Updated service health metrics - uptime: {}s", uptime_seconds);
                }

                info!("Health metrics task stopped");
            })
        };

        self.push_task(sweep_task)?;
        self.push_task(health_metrics_task)?;

        info!("2 background maintenance tasks started successfully");
        Ok(())
    }

    fn push_task(&self, handle: JoinHandle<()>) -> Result<(), ServiceError> {
        let mut tasks = self
            .background_tasks
            .lock()
            .map_err(|_| ServiceError::BackgroundTask {
                message: "Failed to record background task handle".to_string(),
            })?;
        tasks.push(handle);
        Ok(())
    }

    /// Stop all background tasks
    async fn stop_background_tasks(&self) {
        let handles: Vec<JoinHandle<()>> = match self.background_tasks.lock() {
            Ok(mut tasks) => tasks.drain(..).collect(),
            Err(_) => {
                warn!("Failed to take background task handles");
                return;
            }
        };

        let task_count = handles.len();
        if task_count == 0 {
            info!("No background tasks to stop");
            return;
        }

        info!("Stopping {} background tasks...", task_count);
        for handle in handles {
            handle.abort();
        }

        // Give tasks time to observe the abort.
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        info!("All {} background tasks stopped", task_count);
    }
}
