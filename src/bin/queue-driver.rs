//! Load driver for the matchmaking engine
//!
//! Seeds a hero directory, enqueues synthetic solo players and parties
//! against an in-process engine, and reports what the matching passes
//! formed. Useful for smoke-testing matching behavior without a deployment.

use anyhow::Result;
use clap::Parser;
use rally_point::catalog::StaticInstanceCatalog;
use rally_point::hero::{Hero, InMemoryHeroDirectory};
use rally_point::instance::{InMemoryInstanceRepository, InstanceRepository};
use rally_point::matchmaking::{EngineConfig, MatchmakingEngine};
use rally_point::party::{InMemoryPartyRegistry, Party, PartyMember, PartyStatus};
use rally_point::queue::InMemoryQueueStore;
use rally_point::role;
use rally_point::types::{JoinQueueRequest, QueueKind, QueuePartyRequest};
use rally_point::utils::generate_party_id;
use std::sync::Arc;
use tracing::info;

/// Queue driver for exercising the matchmaking engine
#[derive(Parser)]
#[command(name = "queue-driver", version, about = "Drive the matchmaking engine with synthetic load")]
struct Args {
    /// Number of solo players to enqueue
    #[arg(long, default_value_t = 12)]
    solos: usize,

    /// Number of parties to enqueue
    #[arg(long, default_value_t = 2)]
    parties: usize,

    /// Members per party
    #[arg(long, default_value_t = 2)]
    party_size: usize,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

const CLASSES: &[&str] = &["warrior", "cleric", "mage", "rogue", "paladin", "druid"];

fn seed_hero(directory: &InMemoryHeroDirectory, player_id: &str, index: usize) -> Result<String> {
    let hero_id = format!("hero-{}", player_id);
    let class_name = CLASSES[index % CLASSES.len()].to_string();
    directory.insert(Hero {
        id: hero_id.clone(),
        player_id: player_id.to_string(),
        display_name: format!("Driver {}", player_id),
        class_name,
        level: 10 + (index % 5) as u32,
        item_score: 50 + (index % 30) as u32,
        max_hp: 200,
        current_hp: 200,
        active_instance: None,
    })?;
    Ok(hero_id)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with_target(false)
        .init();

    let queue_store = Arc::new(InMemoryQueueStore::new());
    let party_registry = Arc::new(InMemoryPartyRegistry::new());
    let hero_directory = Arc::new(InMemoryHeroDirectory::new());
    let instance_repository = Arc::new(InMemoryInstanceRepository::new());
    let catalog = Arc::new(StaticInstanceCatalog::new());

    let engine = MatchmakingEngine::new(
        queue_store.clone(),
        party_registry.clone(),
        hero_directory.clone(),
        instance_repository.clone(),
        catalog,
        EngineConfig::default(),
    )?;

    info!(
        "Driving engine with {} solos and {} parties of {}",
        args.solos, args.parties, args.party_size
    );

    // Parties first so fill-seeking behavior is visible against the solos.
    for party_index in 0..args.parties {
        let party_id = generate_party_id();
        let mut members = Vec::new();
        let mut member_data = Vec::new();

        for member_index in 0..args.party_size {
            let player_id = format!("party{}-member{}", party_index, member_index);
            let hero_id = seed_hero(&hero_directory, &player_id, member_index)?;
            let class_name = CLASSES[member_index % CLASSES.len()];
            members.push(player_id.clone());
            member_data.push(PartyMember {
                player_id,
                hero_id,
                display_name: format!("Driver party{}-{}", party_index, member_index),
                role: role::normalize(class_name),
                level: 10,
                item_score: 60,
            });
        }

        party_registry.insert(Party {
            id: party_id,
            leader_id: members[0].clone(),
            members,
            member_data,
            status: PartyStatus::Forming,
            fill_to_max: true,
            queue_kind: QueueKind::Dungeon,
            instance_kind_hint: None,
        })?;

        let outcome = engine
            .queue_party(QueuePartyRequest {
                party_id,
                queue_kind: QueueKind::Dungeon,
                instance_kind_hint: None,
            })
            .await?;
        info!(
            "Party {} queued - {}/{} members",
            party_id, outcome.queued_count, outcome.total
        );
    }

    for index in 0..args.solos {
        let player_id = format!("solo{}", index);
        let hero_id = seed_hero(&hero_directory, &player_id, index)?;

        engine
            .join_queue(JoinQueueRequest {
                player_id: player_id.clone(),
                hero_id,
                role: CLASSES[index % CLASSES.len()].to_string(),
                item_score: 50 + (index % 30) as u32,
                instance_kind_hint: None,
            })
            .await?;
    }

    let stats = engine.stats()?;
    let instances = instance_repository.count().await?;
    let remaining = engine.queue_depth().await?;

    println!("--- queue-driver summary ---");
    println!("passes run:       {}", stats.passes_run);
    println!("groups formed:    {}", stats.groups_formed);
    println!("  party tier:     {}", stats.party_groups);
    println!("  fill tier:      {}", stats.filled_groups);
    println!("  solo tier:      {}", stats.solo_groups);
    println!("players matched:  {}", stats.players_matched);
    println!("instances:        {}", instances);
    println!("still queued:     {}", remaining);

    Ok(())
}
