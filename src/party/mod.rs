//! Party records and registry
//!
//! Parties are formed elsewhere in the stack; this service reads membership
//! and drives the status transitions that queueing and match commits require.
//! Parties and queue entries reference each other by id only.

use crate::error::{MatchmakingError, Result};
use crate::types::{HeroId, InstanceKindId, PartyId, PlayerId, QueueKind, Role};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Lifecycle states of a party
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartyStatus {
    /// Accepting invites, not yet queued
    Forming,
    /// Members are in the matchmaking queue
    Queued,
    /// Consumed into a running instance; terminal until the instance ends
    InInstance,
    /// Disbanded by the leader; terminal
    Disbanded,
}

impl PartyStatus {
    /// Allowed transitions: forming -> queued -> in_instance, queued -> forming
    /// (cancel), and anything -> disbanded.
    fn can_transition_to(self, next: PartyStatus) -> bool {
        matches!(
            (self, next),
            (PartyStatus::Forming, PartyStatus::Queued)
                | (PartyStatus::Queued, PartyStatus::InInstance)
                | (PartyStatus::Queued, PartyStatus::Forming)
                | (_, PartyStatus::Disbanded)
        )
    }
}

impl std::fmt::Display for PartyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PartyStatus::Forming => write!(f, "forming"),
            PartyStatus::Queued => write!(f, "queued"),
            PartyStatus::InInstance => write!(f, "in_instance"),
            PartyStatus::Disbanded => write!(f, "disbanded"),
        }
    }
}

/// Denormalized per-member display data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartyMember {
    pub player_id: PlayerId,
    pub hero_id: HeroId,
    pub display_name: String,
    pub role: Role,
    pub level: u32,
    pub item_score: u32,
}

/// A set of players queueing together
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Party {
    pub id: PartyId,
    pub leader_id: PlayerId,
    pub members: Vec<PlayerId>,
    pub member_data: Vec<PartyMember>,
    pub status: PartyStatus,
    /// When true the party wants solo players added up to the roster cap
    pub fill_to_max: bool,
    pub queue_kind: QueueKind,
    pub instance_kind_hint: Option<InstanceKindId>,
}

impl Party {
    pub fn size(&self) -> usize {
        self.members.len()
    }
}

/// Trait for party lookup and status transitions
#[async_trait]
pub trait PartyRegistry: Send + Sync {
    /// Fetch a party by id
    async fn get(&self, party_id: PartyId) -> Result<Party>;

    /// Transition a party's status, enforcing the state machine
    async fn set_status(&self, party_id: PartyId, status: PartyStatus) -> Result<()>;
}

/// In-memory party registry
#[derive(Debug, Clone, Default)]
pub struct InMemoryPartyRegistry {
    parties: Arc<Mutex<HashMap<PartyId, Party>>>,
}

impl InMemoryPartyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a party record
    pub fn insert(&self, party: Party) -> Result<()> {
        let mut parties = self.lock()?;
        parties.insert(party.id, party);
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<PartyId, Party>>> {
        self.parties.lock().map_err(|_| {
            MatchmakingError::InternalError {
                message: "Failed to acquire party registry lock".to_string(),
            }
            .into()
        })
    }
}

#[async_trait]
impl PartyRegistry for InMemoryPartyRegistry {
    async fn get(&self, party_id: PartyId) -> Result<Party> {
        let parties = self.lock()?;
        parties.get(&party_id).cloned().ok_or_else(|| {
            MatchmakingError::PartyNotFound {
                party_id: party_id.to_string(),
            }
            .into()
        })
    }

    async fn set_status(&self, party_id: PartyId, status: PartyStatus) -> Result<()> {
        let mut parties = self.lock()?;

        let party = parties.get_mut(&party_id).ok_or_else(|| {
            anyhow::Error::from(MatchmakingError::PartyNotFound {
                party_id: party_id.to_string(),
            })
        })?;

        if !party.status.can_transition_to(status) {
            return Err(MatchmakingError::InvalidPartyTransition {
                reason: format!(
                    "party {} cannot move from {} to {}",
                    party_id, party.status, status
                ),
            }
            .into());
        }

        party.status = status;
        Ok(())
    }
}
