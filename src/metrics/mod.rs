//! Metrics and monitoring for the matchmaking service

pub mod collector;
pub mod health;

pub use collector::MetricsCollector;
pub use health::{HealthServer, HealthServerConfig};
