//! Matchmaking engine and pass orchestration

pub mod engine;

pub use engine::{EngineConfig, EngineStats, MatchmakingEngine};
