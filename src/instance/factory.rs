//! Instance factory: the atomic match commit
//!
//! Turning a matched group into a running instance touches four record sets:
//! the queue (entries consumed), the party registry (status), the instance
//! repository (new record), and the hero directory (session pointers). The
//! factory sequences these so that the queue claim is the single commit
//! point: everything before it is read-only, and the claim itself is
//! all-or-nothing, so a group either launches with every consumed entry
//! removed or leaves the queue untouched.

use crate::catalog::InstanceDefinition;
use crate::error::{MatchmakingError, Result};
use crate::hero::HeroDirectory;
use crate::instance::{
    Difficulty, Instance, InstanceParticipant, InstanceRepository, InstanceStatus,
};
use crate::party::{PartyRegistry, PartyStatus};
use crate::queue::QueueStore;
use crate::role;
use crate::types::{ActiveInstancePointer, InstanceId, PartyId, QueueEntry};
use crate::utils::{current_timestamp, generate_instance_id};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of a commit attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The group launched; entries were consumed
    Launched(InstanceId),
    /// The group could not launch; the queue was left untouched
    Aborted { reason: String },
}

impl CommitOutcome {
    pub fn instance_id(&self) -> Option<InstanceId> {
        match self {
            CommitOutcome::Launched(id) => Some(*id),
            CommitOutcome::Aborted { .. } => None,
        }
    }
}

/// Creates instances from validated groups and applies the dependent record
/// updates as one unit
pub struct InstanceFactory {
    queue_store: Arc<dyn QueueStore>,
    party_registry: Arc<dyn PartyRegistry>,
    hero_directory: Arc<dyn HeroDirectory>,
    instance_repository: Arc<dyn InstanceRepository>,
}

impl InstanceFactory {
    pub fn new(
        queue_store: Arc<dyn QueueStore>,
        party_registry: Arc<dyn PartyRegistry>,
        hero_directory: Arc<dyn HeroDirectory>,
        instance_repository: Arc<dyn InstanceRepository>,
    ) -> Self {
        Self {
            queue_store,
            party_registry,
            hero_directory,
            instance_repository,
        }
    }

    /// Commit a matched group: hydrate, claim, create, update dependents.
    ///
    /// A member whose hero no longer resolves is dropped with a warning; if
    /// the group then falls below the definition's minimum the whole commit
    /// aborts and no queue entry is removed. A failed claim (an entry left
    /// the queue since the caller's snapshot) likewise aborts with no side
    /// effects.
    pub async fn commit(
        &self,
        members: &[QueueEntry],
        party_id: Option<PartyId>,
        definition: &InstanceDefinition,
    ) -> Result<CommitOutcome> {
        if !definition.accepts_group_size(members.len()) {
            return Err(MatchmakingError::GroupSizeOutOfBounds {
                size: members.len(),
                min: definition.min_players,
                max: definition.max_players,
            }
            .into());
        }

        // Hydration is read-only; misses shrink the group before anything
        // is claimed.
        let mut participants = Vec::with_capacity(members.len());
        let mut surviving = Vec::with_capacity(members.len());
        for entry in members {
            match self.hero_directory.get(&entry.hero_id).await {
                Ok(hero) => {
                    // The hero's current class wins over the queued role if
                    // they diverged while the entry waited. Roles are
                    // bookkeeping only and never gate the group.
                    let role = role::normalize(&hero.class_name);
                    if role != entry.role {
                        debug!(
                            "Role drift for player '{}': queued as {}, hydrated as {}",
                            entry.player_id, entry.role, role
                        );
                    }
                    participants.push(InstanceParticipant {
                        player_id: entry.player_id.clone(),
                        hero_id: entry.hero_id.clone(),
                        display_name: hero.display_name,
                        role,
                        level: hero.level,
                        current_hp: hero.current_hp,
                        max_hp: hero.max_hp,
                        alive: true,
                    });
                    surviving.push(entry.clone());
                }
                Err(e) => {
                    warn!(
                        "Dropping member from group - player: '{}', hero: '{}': {}",
                        entry.player_id, entry.hero_id, e
                    );
                }
            }
        }

        if surviving.len() < definition.min_players {
            warn!(
                "Commit aborted - {} of {} members hydrated, below minimum {} for '{}'",
                surviving.len(),
                members.len(),
                definition.min_players,
                definition.id
            );
            return Ok(CommitOutcome::Aborted {
                reason: "group below minimum after hydration".to_string(),
            });
        }

        // Commit point. All-or-nothing: a concurrent leave fails the whole
        // claim and the group stays queued.
        let entry_ids: Vec<_> = surviving.iter().map(|e| e.id).collect();
        let claimed = match self.queue_store.claim(&entry_ids).await {
            Ok(claimed) => claimed,
            Err(e) => {
                if let Some(MatchmakingError::EntryClaimFailed { reason }) =
                    e.downcast_ref::<MatchmakingError>()
                {
                    warn!("Commit aborted - claim failed: {}", reason);
                    return Ok(CommitOutcome::Aborted {
                        reason: reason.clone(),
                    });
                }
                return Err(e);
            }
        };

        let instance = Instance {
            id: generate_instance_id(),
            instance_kind_id: definition.id.clone(),
            difficulty: Difficulty::Normal,
            status: InstanceStatus::Active,
            participants,
            current_stage: 0,
            max_stages: definition.stages.len(),
            stage_definitions: definition.stages.clone(),
            created_at: current_timestamp(),
        };
        let instance_id = self.instance_repository.create(instance).await?;

        if let Some(party_id) = party_id {
            self.party_registry
                .set_status(party_id, PartyStatus::InInstance)
                .await?;
        }

        let pointer = ActiveInstancePointer {
            kind: definition.kind,
            instance_id,
        };
        for entry in &claimed {
            self.hero_directory
                .set_active_instance(&entry.hero_id, pointer.clone())
                .await?;
        }

        info!(
            "Instance launched - id: {}, kind: '{}', players: {}, party: {}",
            instance_id,
            definition.id,
            claimed.len(),
            party_id.map_or_else(|| "none".to_string(), |id| id.to_string())
        );

        Ok(CommitOutcome::Launched(instance_id))
    }
}
