//! Common types used throughout the matchmaking service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for players
pub type PlayerId = String;

/// Unique identifier for heroes (a player's character)
pub type HeroId = String;

/// Identifier for an instance kind in the catalog (e.g. "emberfall-depths")
pub type InstanceKindId = String;

/// Unique identifier for queue entries
pub type EntryId = Uuid;

/// Unique identifier for parties
pub type PartyId = Uuid;

/// Unique identifier for running instances
pub type InstanceId = Uuid;

/// Coarse role category a hero fills in a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Tank,
    Healer,
    Dps,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Tank => write!(f, "tank"),
            Role::Healer => write!(f, "healer"),
            Role::Dps => write!(f, "dps"),
        }
    }
}

/// Category of instanced content a group queues for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueKind {
    Dungeon,
    Raid,
}

impl std::fmt::Display for QueueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueKind::Dungeon => write!(f, "dungeon"),
            QueueKind::Raid => write!(f, "raid"),
        }
    }
}

/// One player's pending intent to enter group content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: EntryId,
    pub player_id: PlayerId,
    pub hero_id: HeroId,
    /// Normalized role category
    pub role: Role,
    /// Raw class/role label as submitted, kept for display only
    pub original_role: String,
    /// Hero level snapshot taken at join time, used for eligibility aggregation
    pub level: u32,
    pub item_score: u32,
    /// Optional request for a specific dungeon/raid
    pub instance_kind_hint: Option<InstanceKindId>,
    /// Set when the entry was enqueued as part of a party
    pub party_id: Option<PartyId>,
    pub queued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl QueueEntry {
    /// Whether this entry has outlived its time-to-live
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Whether this entry queued without a party
    pub fn is_solo(&self) -> bool {
        self.party_id.is_none()
    }
}

/// Request to join the queue as an individual player
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinQueueRequest {
    pub player_id: PlayerId,
    pub hero_id: HeroId,
    /// Free-text class/role label; normalized by the role resolver
    pub role: String,
    pub item_score: u32,
    pub instance_kind_hint: Option<InstanceKindId>,
}

/// Request to enqueue every current member of a party
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuePartyRequest {
    pub party_id: PartyId,
    pub queue_kind: QueueKind,
    pub instance_kind_hint: Option<InstanceKindId>,
}

/// Per-member outcome of a party queue request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberQueueError {
    pub player_id: PlayerId,
    pub reason: String,
}

/// Result of enqueueing a party; partial success is allowed and reported per member
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartyQueueOutcome {
    pub queued_count: usize,
    pub total: usize,
    pub member_errors: Vec<MemberQueueError>,
}

/// Per-role composition of the current queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleCounts {
    pub tank: usize,
    pub healer: usize,
    pub dps: usize,
}

impl RoleCounts {
    pub fn record(&mut self, role: Role) {
        match role {
            Role::Tank => self.tank += 1,
            Role::Healer => self.healer += 1,
            Role::Dps => self.dps += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.tank + self.healer + self.dps
    }
}

/// Snapshot of one player's queue position, as returned by `QueueStatus`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStatusView {
    pub in_queue: bool,
    pub role: Option<Role>,
    pub instance_kind_hint: Option<InstanceKindId>,
    pub role_counts: RoleCounts,
    pub estimated_wait_seconds: Option<u64>,
}

impl QueueStatusView {
    /// Status for a player with no live entry
    pub fn not_queued() -> Self {
        Self {
            in_queue: false,
            role: None,
            instance_kind_hint: None,
            role_counts: RoleCounts::default(),
            estimated_wait_seconds: None,
        }
    }
}

/// Per-hero pointer to the running instance that owns the hero's session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveInstancePointer {
    pub kind: QueueKind,
    pub instance_id: InstanceId,
}
