//! Rally Point - Matchmaking service for instanced group content
//!
//! This crate groups players waiting for dungeons and raids into valid
//! parties and launches a game instance for each formed group, with
//! priority-tiered matching, partial-fill policies, and an atomic match
//! commit across queue, party, instance, and hero records.

pub mod catalog;
pub mod config;
pub mod error;
pub mod hero;
pub mod http;
pub mod instance;
pub mod matchmaking;
pub mod metrics;
pub mod party;
pub mod queue;
pub mod role;
pub mod service;
pub mod types;
pub mod utils;
pub mod wait_time;

// Re-export commonly used types and traits
pub use error::{MatchmakingError, Result};
pub use types::*;

// Re-export key components
pub use catalog::{EligibilityCatalog, StaticInstanceCatalog};
pub use instance::InstanceFactory;
pub use matchmaking::{EngineConfig, MatchmakingEngine};
pub use queue::{InMemoryQueueStore, QueueStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
