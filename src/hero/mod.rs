//! Hero directory
//!
//! Resolves hero ids to current stats for hydration at commit time and owns
//! the per-hero active-instance pointer. The directory is an external
//! collaborator in production; the in-memory implementation backs tests and
//! the load driver.

use crate::error::{MatchmakingError, Result};
use crate::types::{ActiveInstancePointer, HeroId, PlayerId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Current stats and session state of one hero
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hero {
    pub id: HeroId,
    pub player_id: PlayerId,
    pub display_name: String,
    pub class_name: String,
    pub level: u32,
    pub item_score: u32,
    pub max_hp: u32,
    pub current_hp: u32,
    /// Points at the running instance that owns this hero's session, if any
    pub active_instance: Option<ActiveInstancePointer>,
}

/// Trait for hero lookup and session pointer updates
#[async_trait]
pub trait HeroDirectory: Send + Sync {
    /// Resolve a hero id to its current record
    async fn get(&self, hero_id: &str) -> Result<Hero>;

    /// Point the hero's session at a running instance
    async fn set_active_instance(
        &self,
        hero_id: &str,
        pointer: ActiveInstancePointer,
    ) -> Result<()>;

    /// Clear the hero's session pointer (instance teardown path)
    async fn clear_active_instance(&self, hero_id: &str) -> Result<()>;
}

/// In-memory hero directory
#[derive(Debug, Clone, Default)]
pub struct InMemoryHeroDirectory {
    heroes: Arc<Mutex<HashMap<HeroId, Hero>>>,
}

impl InMemoryHeroDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a hero record
    pub fn insert(&self, hero: Hero) -> Result<()> {
        let mut heroes = self.lock()?;
        heroes.insert(hero.id.clone(), hero);
        Ok(())
    }

    /// Remove a hero record, for tests exercising hydration misses
    pub fn remove(&self, hero_id: &str) -> Result<Option<Hero>> {
        let mut heroes = self.lock()?;
        Ok(heroes.remove(hero_id))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<HeroId, Hero>>> {
        self.heroes.lock().map_err(|_| {
            MatchmakingError::InternalError {
                message: "Failed to acquire hero directory lock".to_string(),
            }
            .into()
        })
    }
}

#[async_trait]
impl HeroDirectory for InMemoryHeroDirectory {
    async fn get(&self, hero_id: &str) -> Result<Hero> {
        let heroes = self.lock()?;
        heroes.get(hero_id).cloned().ok_or_else(|| {
            MatchmakingError::HeroNotFound {
                hero_id: hero_id.to_string(),
            }
            .into()
        })
    }

    async fn set_active_instance(
        &self,
        hero_id: &str,
        pointer: ActiveInstancePointer,
    ) -> Result<()> {
        let mut heroes = self.lock()?;
        let hero = heroes.get_mut(hero_id).ok_or_else(|| {
            anyhow::Error::from(MatchmakingError::HeroNotFound {
                hero_id: hero_id.to_string(),
            })
        })?;
        hero.active_instance = Some(pointer);
        Ok(())
    }

    async fn clear_active_instance(&self, hero_id: &str) -> Result<()> {
        let mut heroes = self.lock()?;
        let hero = heroes.get_mut(hero_id).ok_or_else(|| {
            anyhow::Error::from(MatchmakingError::HeroNotFound {
                hero_id: hero_id.to_string(),
            })
        })?;
        hero.active_instance = None;
        Ok(())
    }
}
