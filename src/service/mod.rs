//! Service coordination and health checks

pub mod app;
pub mod health;

pub use app::AppState;
pub use health::{HealthCheck, HealthStatus};
