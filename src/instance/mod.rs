//! Instance records, repository, and the commit factory

pub mod factory;

use crate::catalog::StageDefinition;
use crate::error::{MatchmakingError, Result};
use crate::types::{HeroId, InstanceId, InstanceKindId, PlayerId, Role};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub use factory::{CommitOutcome, InstanceFactory};

/// Difficulty a created instance runs at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Normal,
    Heroic,
}

/// Lifecycle states of a running instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    Active,
    Completed,
    Failed,
}

/// Hydrated snapshot of one group member, fixed at creation time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceParticipant {
    pub player_id: PlayerId,
    pub hero_id: HeroId,
    pub display_name: String,
    pub role: Role,
    pub level: u32,
    pub current_hp: u32,
    pub max_hp: u32,
    pub alive: bool,
}

/// A running occurrence of a dungeon or raid
///
/// The roster is fixed once created; only the combat engine mutates stage
/// progress and participant vitals afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub id: InstanceId,
    pub instance_kind_id: InstanceKindId,
    pub difficulty: Difficulty,
    pub status: InstanceStatus,
    pub participants: Vec<InstanceParticipant>,
    pub current_stage: usize,
    pub max_stages: usize,
    pub stage_definitions: Vec<StageDefinition>,
    pub created_at: DateTime<Utc>,
}

/// Trait for instance record persistence
#[async_trait]
pub trait InstanceRepository: Send + Sync {
    /// Persist a newly created instance
    async fn create(&self, instance: Instance) -> Result<InstanceId>;

    /// Fetch an instance by id
    async fn get(&self, instance_id: InstanceId) -> Result<Instance>;

    /// Number of stored instances
    async fn count(&self) -> Result<usize>;
}

/// In-memory instance repository
#[derive(Debug, Clone, Default)]
pub struct InMemoryInstanceRepository {
    instances: Arc<Mutex<HashMap<InstanceId, Instance>>>,
}

impl InMemoryInstanceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<InstanceId, Instance>>> {
        self.instances.lock().map_err(|_| {
            MatchmakingError::InternalError {
                message: "Failed to acquire instance repository lock".to_string(),
            }
            .into()
        })
    }
}

#[async_trait]
impl InstanceRepository for InMemoryInstanceRepository {
    async fn create(&self, instance: Instance) -> Result<InstanceId> {
        let mut instances = self.lock()?;
        let instance_id = instance.id;
        instances.insert(instance_id, instance);
        Ok(instance_id)
    }

    async fn get(&self, instance_id: InstanceId) -> Result<Instance> {
        let instances = self.lock()?;
        instances.get(&instance_id).cloned().ok_or_else(|| {
            MatchmakingError::InternalError {
                message: format!("instance {} not found", instance_id),
            }
            .into()
        })
    }

    async fn count(&self) -> Result<usize> {
        let instances = self.lock()?;
        Ok(instances.len())
    }
}
