//! Main application configuration
//!
//! This module defines the primary configuration structures for the
//! rally-point matchmaking service, including environment variable loading,
//! TOML file loading, and validation.

use crate::matchmaking::EngineConfig;
use crate::wait_time::WaitTimeConfig;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub service: ServiceSettings,
    #[serde(default)]
    pub matchmaking: MatchmakingSettings,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Port for the queue API
    pub api_port: u16,
    /// Port for health and metrics endpoints
    pub metrics_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

/// Matchmaking-specific settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchmakingSettings {
    /// Queue entry time-to-live in seconds
    pub entry_ttl_seconds: u64,
    /// Interval of the background expiry sweep in seconds
    pub sweep_interval_seconds: u64,
    /// Wait estimate reported while match history is sparse
    pub default_wait_seconds: u64,
    /// Upper clamp on reported wait estimates
    pub max_wait_seconds: u64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "rally-point".to_string(),
            log_level: "info".to_string(),
            api_port: 8080,
            metrics_port: 9090,
            shutdown_timeout_seconds: 30,
        }
    }
}

impl Default for MatchmakingSettings {
    fn default() -> Self {
        Self {
            entry_ttl_seconds: 600,     // 10 minutes
            sweep_interval_seconds: 60, // 1 minute
            default_wait_seconds: 90,
            max_wait_seconds: 600,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            config.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            config.service.log_level = log_level;
        }
        if let Ok(port) = env::var("API_PORT") {
            config.service.api_port = port
                .parse()
                .map_err(|_| anyhow!("Invalid API_PORT value: {}", port))?;
        }
        if let Ok(port) = env::var("METRICS_PORT") {
            config.service.metrics_port = port
                .parse()
                .map_err(|_| anyhow!("Invalid METRICS_PORT value: {}", port))?;
        }
        if let Ok(timeout) = env::var("SHUTDOWN_TIMEOUT_SECONDS") {
            config.service.shutdown_timeout_seconds = timeout
                .parse()
                .map_err(|_| anyhow!("Invalid SHUTDOWN_TIMEOUT_SECONDS value: {}", timeout))?;
        }

        // Matchmaking settings
        if let Ok(ttl) = env::var("ENTRY_TTL_SECONDS") {
            config.matchmaking.entry_ttl_seconds = ttl
                .parse()
                .map_err(|_| anyhow!("Invalid ENTRY_TTL_SECONDS value: {}", ttl))?;
        }
        if let Ok(interval) = env::var("SWEEP_INTERVAL_SECONDS") {
            config.matchmaking.sweep_interval_seconds = interval
                .parse()
                .map_err(|_| anyhow!("Invalid SWEEP_INTERVAL_SECONDS value: {}", interval))?;
        }
        if let Ok(wait) = env::var("DEFAULT_WAIT_SECONDS") {
            config.matchmaking.default_wait_seconds = wait
                .parse()
                .map_err(|_| anyhow!("Invalid DEFAULT_WAIT_SECONDS value: {}", wait))?;
        }
        if let Ok(wait) = env::var("MAX_WAIT_SECONDS") {
            config.matchmaking.max_wait_seconds = wait
                .parse()
                .map_err(|_| anyhow!("Invalid MAX_WAIT_SECONDS value: {}", wait))?;
        }

        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        validate_config(&config)?;
        Ok(config)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }

    /// Get expiry sweep interval as Duration
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.matchmaking.sweep_interval_seconds)
    }

    /// Derive the engine configuration
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            entry_ttl_seconds: self.matchmaking.entry_ttl_seconds,
            wait_time: WaitTimeConfig {
                default_wait_seconds: self.matchmaking.default_wait_seconds,
                max_wait_seconds: self.matchmaking.max_wait_seconds,
                ..WaitTimeConfig::default()
            },
        }
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    // Validate ports
    if config.service.api_port == 0 {
        return Err(anyhow!("API port cannot be 0"));
    }
    if config.service.metrics_port == 0 {
        return Err(anyhow!("Metrics port cannot be 0"));
    }
    if config.service.api_port == config.service.metrics_port {
        return Err(anyhow!("API and metrics ports must differ"));
    }

    // Validate timeouts
    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }

    // Validate matchmaking settings
    if config.matchmaking.entry_ttl_seconds == 0 {
        return Err(anyhow!("Entry TTL must be greater than 0"));
    }
    if config.matchmaking.sweep_interval_seconds == 0 {
        return Err(anyhow!("Sweep interval must be greater than 0"));
    }
    if config.matchmaking.max_wait_seconds <= config.matchmaking.default_wait_seconds {
        return Err(anyhow!(
            "Max wait must be greater than the default wait estimate"
        ));
    }

    Ok(())
}
