//! Test fixtures shared by the integration and concurrency test suites
#![allow(dead_code)]

use rally_point::catalog::StaticInstanceCatalog;
use rally_point::hero::{Hero, InMemoryHeroDirectory};
use rally_point::instance::InMemoryInstanceRepository;
use rally_point::matchmaking::{EngineConfig, MatchmakingEngine};
use rally_point::party::{InMemoryPartyRegistry, Party, PartyMember, PartyStatus};
use rally_point::queue::InMemoryQueueStore;
use rally_point::types::{JoinQueueRequest, PartyId, QueueKind, Role};
use rally_point::utils::generate_party_id;
use std::sync::Arc;

/// A complete in-memory matchmaking stack for tests
pub struct TestService {
    pub engine: Arc<MatchmakingEngine>,
    pub queue: Arc<InMemoryQueueStore>,
    pub parties: Arc<InMemoryPartyRegistry>,
    pub heroes: Arc<InMemoryHeroDirectory>,
    pub instances: Arc<InMemoryInstanceRepository>,
}

impl TestService {
    pub fn new() -> Self {
        let queue = Arc::new(InMemoryQueueStore::new());
        let parties = Arc::new(InMemoryPartyRegistry::new());
        let heroes = Arc::new(InMemoryHeroDirectory::new());
        let instances = Arc::new(InMemoryInstanceRepository::new());
        let catalog = Arc::new(StaticInstanceCatalog::new());

        let engine = MatchmakingEngine::new(
            queue.clone(),
            parties.clone(),
            heroes.clone(),
            instances.clone(),
            catalog,
            EngineConfig::default(),
        )
        .expect("engine construction");

        Self {
            engine: Arc::new(engine),
            queue,
            parties,
            heroes,
            instances,
        }
    }

    /// Register a hero for a player and return the hero id
    pub fn seed_hero(&self, player_id: &str) -> String {
        self.seed_hero_with_stats(player_id, 10, 60)
    }

    /// Register a hero with explicit level and item score
    pub fn seed_hero_with_stats(&self, player_id: &str, level: u32, item_score: u32) -> String {
        let hero_id = format!("hero-{}", player_id);
        self.heroes
            .insert(Hero {
                id: hero_id.clone(),
                player_id: player_id.to_string(),
                display_name: format!("Hero {}", player_id),
                class_name: "mage".to_string(),
                level,
                item_score,
                max_hp: 180,
                current_hp: 180,
                active_instance: None,
            })
            .expect("hero insert");
        hero_id
    }

    /// Build a join request, seeding the hero first
    pub fn join_request(&self, player_id: &str) -> JoinQueueRequest {
        let hero_id = self.seed_hero(player_id);
        JoinQueueRequest {
            player_id: player_id.to_string(),
            hero_id,
            role: "mage".to_string(),
            item_score: 60,
            instance_kind_hint: None,
        }
    }

    /// Register a forming party with seeded heroes and return its id
    pub fn seed_party(&self, player_ids: &[&str], fill_to_max: bool) -> PartyId {
        let party_id = generate_party_id();
        let member_data: Vec<PartyMember> = player_ids
            .iter()
            .map(|player_id| {
                let hero_id = self.seed_hero(player_id);
                PartyMember {
                    player_id: player_id.to_string(),
                    hero_id,
                    display_name: format!("Hero {}", player_id),
                    role: Role::Dps,
                    level: 10,
                    item_score: 60,
                }
            })
            .collect();

        self.parties
            .insert(Party {
                id: party_id,
                leader_id: player_ids[0].to_string(),
                members: player_ids.iter().map(|s| s.to_string()).collect(),
                member_data,
                status: PartyStatus::Forming,
                fill_to_max,
                queue_kind: QueueKind::Dungeon,
                instance_kind_hint: None,
            })
            .expect("party insert");

        party_id
    }
}
