//! Error types for the matchmaking service
//!
//! This module defines all error types using anyhow for consistent error handling
//! throughout the application.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific matchmaking scenarios
#[derive(Debug, thiserror::Error)]
pub enum MatchmakingError {
    #[error("Player already queued: {player_id}")]
    AlreadyQueued { player_id: String },

    #[error("Player not queued: {player_id}")]
    NotQueued { player_id: String },

    #[error("Invalid join request: {reason}")]
    InvalidJoinRequest { reason: String },

    #[error("Party not found: {party_id}")]
    PartyNotFound { party_id: String },

    #[error("Party not queued: {party_id}")]
    PartyNotQueued { party_id: String },

    #[error("Player {player_id} is not the leader of party {party_id}")]
    NotPartyLeader { party_id: String, player_id: String },

    #[error("Hero not found: {hero_id}")]
    HeroNotFound { hero_id: String },

    #[error("Unknown instance kind: {kind_id}")]
    UnknownInstanceKind { kind_id: String },

    #[error("Group size {size} outside bounds [{min}, {max}]")]
    GroupSizeOutOfBounds { size: usize, min: usize, max: usize },

    #[error("Queue entry claim failed: {reason}")]
    EntryClaimFailed { reason: String },

    #[error("Invalid party state transition: {reason}")]
    InvalidPartyTransition { reason: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Store unavailable: {message}")]
    StoreUnavailable { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}
