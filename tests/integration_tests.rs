//! Integration tests for the rally-point matchmaking service
//!
//! These tests validate the entire system working together, including:
//! - The queue entry lifecycle (join, leave, expiry)
//! - Three-tier group formation over parties and solo players
//! - The atomic match commit across queue, party, instance, and hero records
//! - Error surfaces of the queue operations

// Modules for organizing tests
mod fixtures;

use fixtures::TestService;
use rally_point::hero::HeroDirectory;
use rally_point::instance::{InstanceRepository, InstanceStatus};
use rally_point::party::{PartyRegistry, PartyStatus};
use rally_point::queue::QueueStore;
use rally_point::types::{QueueKind, QueuePartyRequest};
use rally_point::MatchmakingError;

#[tokio::test]
async fn test_pair_of_solo_joins_launches_an_instance() {
    let service = TestService::new();

    // First player waits alone.
    service
        .engine
        .join_queue(service.join_request("alice"))
        .await
        .unwrap();
    let status = service.engine.queue_status("alice").await.unwrap();
    assert!(status.in_queue);
    assert_eq!(service.instances.count().await.unwrap(), 0);

    // Second player completes the minimum group.
    service
        .engine
        .join_queue(service.join_request("bob"))
        .await
        .unwrap();

    assert_eq!(service.instances.count().await.unwrap(), 1);
    assert_eq!(service.queue.len().await.unwrap(), 0);

    // Both players discover their match through the active-instance pointer.
    let alice = service.heroes.get("hero-alice").await.unwrap();
    let bob = service.heroes.get("hero-bob").await.unwrap();
    let instance_id = alice.active_instance.unwrap().instance_id;
    assert_eq!(bob.active_instance.unwrap().instance_id, instance_id);

    // The instance carries a fixed hydrated roster.
    let instance = service.instances.get(instance_id).await.unwrap();
    assert_eq!(instance.status, InstanceStatus::Active);
    assert_eq!(instance.current_stage, 0);
    assert_eq!(instance.participants.len(), 2);
    assert_eq!(instance.max_stages, instance.stage_definitions.len());
    assert!(instance.participants.iter().all(|p| p.alive));

    // Matched players are no longer reported as queued.
    let status = service.engine.queue_status("alice").await.unwrap();
    assert!(!status.in_queue);
}

#[tokio::test]
async fn test_double_join_is_a_conflict_without_side_effects() {
    let service = TestService::new();

    service
        .engine
        .join_queue(service.join_request("solo"))
        .await
        .unwrap();

    let err = service
        .engine
        .join_queue(service.join_request("solo"))
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<MatchmakingError>(),
        Some(MatchmakingError::AlreadyQueued { .. })
    ));

    // Exactly one live entry remains.
    assert_eq!(service.queue.len().await.unwrap(), 1);
}

#[tokio::test]
async fn test_filling_party_plus_solos_forms_one_full_group() {
    let service = TestService::new();

    // A party of two with fill enabled and three solos queued before the
    // pass commit as a single group of five.
    let party_id = service.seed_party(&["m1", "m2"], true);
    service
        .engine
        .queue_party(QueuePartyRequest {
            party_id,
            queue_kind: QueueKind::Dungeon,
            instance_kind_hint: None,
        })
        .await
        .unwrap();

    for player_id in ["s1", "s2", "s3"] {
        let hero_id = service.seed_hero(player_id);
        service
            .queue
            .add(rally_point::types::QueueEntry {
                id: rally_point::utils::generate_entry_id(),
                player_id: player_id.to_string(),
                hero_id,
                role: rally_point::types::Role::Dps,
                original_role: "mage".to_string(),
                level: 10,
                item_score: 60,
                instance_kind_hint: None,
                party_id: None,
                queued_at: rally_point::utils::current_timestamp(),
                expires_at: rally_point::utils::current_timestamp()
                    + chrono::Duration::minutes(10),
            })
            .await
            .unwrap();
    }

    let formed = service.engine.run_pass().await.unwrap();
    assert_eq!(formed, 1);
    assert_eq!(service.queue.len().await.unwrap(), 0);
    assert_eq!(service.instances.count().await.unwrap(), 1);

    let party = service.parties.get(party_id).await.unwrap();
    assert_eq!(party.status, PartyStatus::InInstance);

    let hero = service.heroes.get("hero-s1").await.unwrap();
    let instance_id = hero.active_instance.unwrap().instance_id;
    let instance = service.instances.get(instance_id).await.unwrap();
    assert_eq!(instance.participants.len(), 5);
}

#[tokio::test]
async fn test_lone_party_member_stays_queued() {
    let service = TestService::new();

    let party_id = service.seed_party(&["lone"], true);
    let outcome = service
        .engine
        .queue_party(QueuePartyRequest {
            party_id,
            queue_kind: QueueKind::Dungeon,
            instance_kind_hint: None,
        })
        .await
        .unwrap();

    assert_eq!(outcome.queued_count, 1);
    assert_eq!(outcome.total, 1);

    // No group forms, the entry stays, the party remains queued.
    assert_eq!(service.instances.count().await.unwrap(), 0);
    assert_eq!(service.queue.len().await.unwrap(), 1);
    let party = service.parties.get(party_id).await.unwrap();
    assert_eq!(party.status, PartyStatus::Queued);
}

#[tokio::test]
async fn test_hydration_failure_aborts_commit_without_consuming_entries() {
    let service = TestService::new();

    service
        .engine
        .join_queue(service.join_request("keeper"))
        .await
        .unwrap();

    // The second player's hero disappears after their entry is accepted but
    // before matching can hydrate the group.
    let request = service.join_request("phantom");
    service
        .queue
        .add(rally_point::types::QueueEntry {
            id: rally_point::utils::generate_entry_id(),
            player_id: request.player_id.clone(),
            hero_id: request.hero_id.clone(),
            role: rally_point::types::Role::Dps,
            original_role: "mage".to_string(),
            level: 10,
            item_score: 60,
            instance_kind_hint: None,
            party_id: None,
            queued_at: rally_point::utils::current_timestamp(),
            expires_at: rally_point::utils::current_timestamp() + chrono::Duration::minutes(10),
        })
        .await
        .unwrap();
    service.heroes.remove("hero-phantom").unwrap();

    let formed = service.engine.run_pass().await.unwrap();
    assert_eq!(formed, 0);

    // Both entries remain eligible for the next pass; nothing was mutated.
    assert_eq!(service.queue.len().await.unwrap(), 2);
    assert_eq!(service.instances.count().await.unwrap(), 0);
    let keeper = service.heroes.get("hero-keeper").await.unwrap();
    assert!(keeper.active_instance.is_none());
}

#[tokio::test]
async fn test_leave_then_status_then_rejoin() {
    let service = TestService::new();

    service
        .engine
        .join_queue(service.join_request("drifter"))
        .await
        .unwrap();
    service.engine.leave_queue("drifter").await.unwrap();

    let status = service.engine.queue_status("drifter").await.unwrap();
    assert!(!status.in_queue);

    let err = service.engine.leave_queue("drifter").await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<MatchmakingError>(),
        Some(MatchmakingError::NotQueued { .. })
    ));

    // A fresh join after leaving is accepted.
    let request = rally_point::types::JoinQueueRequest {
        player_id: "drifter".to_string(),
        hero_id: "hero-drifter".to_string(),
        role: "mage".to_string(),
        item_score: 60,
        instance_kind_hint: None,
    };
    service.engine.join_queue(request).await.unwrap();
    assert_eq!(service.queue.len().await.unwrap(), 1);
}

#[tokio::test]
async fn test_party_cancel_restores_forming_state() {
    let service = TestService::new();

    let party_id = service.seed_party(&["captain", "mate"], true);
    service
        .engine
        .queue_party(QueuePartyRequest {
            party_id,
            queue_kind: QueueKind::Dungeon,
            instance_kind_hint: None,
        })
        .await
        .unwrap();

    // Only the leader may cancel.
    let err = service
        .engine
        .cancel_party_queue(party_id, "mate")
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<MatchmakingError>(),
        Some(MatchmakingError::NotPartyLeader { .. })
    ));

    let removed = service
        .engine
        .cancel_party_queue(party_id, "captain")
        .await
        .unwrap();
    assert_eq!(removed, 2);
    assert_eq!(service.queue.len().await.unwrap(), 0);

    let party = service.parties.get(party_id).await.unwrap();
    assert_eq!(party.status, PartyStatus::Forming);

    // The party can queue again after cancelling.
    let outcome = service
        .engine
        .queue_party(QueuePartyRequest {
            party_id,
            queue_kind: QueueKind::Dungeon,
            instance_kind_hint: None,
        })
        .await
        .unwrap();
    assert_eq!(outcome.queued_count, 2);
}

#[tokio::test]
async fn test_every_committed_group_respects_definition_bounds() {
    let service = TestService::new();

    // A mixed queue: two parties and a pile of solos, all parked before one
    // pass. Bounds for the launch dungeon are [2, 5].
    let party_a = service.seed_party(&["a1", "a2", "a3"], false);
    service
        .engine
        .queue_party(QueuePartyRequest {
            party_id: party_a,
            queue_kind: QueueKind::Dungeon,
            instance_kind_hint: None,
        })
        .await
        .unwrap();

    for i in 0..11 {
        service
            .engine
            .join_queue(service.join_request(&format!("s{}", i)))
            .await
            .unwrap();
    }

    // Drain whatever is left.
    service.engine.run_pass().await.unwrap();

    let stats = service.engine.stats().unwrap();
    assert!(stats.groups_formed >= 3);

    // Every launched instance respects the definition's size bounds.
    let remaining = service.queue.len().await.unwrap();
    let matched = stats.players_matched as usize;
    assert_eq!(matched + remaining, 14);

    let mut seen_players = std::collections::HashSet::new();
    for instance in all_instances(&service).await {
        assert!(instance.participants.len() >= 2 && instance.participants.len() <= 5);
        for participant in &instance.participants {
            // No player appears in two instances.
            assert!(seen_players.insert(participant.player_id.clone()));
        }
    }
    assert_eq!(seen_players.len(), matched);
}

/// Collect every stored instance by following hero pointers
async fn all_instances(service: &TestService) -> Vec<rally_point::instance::Instance> {
    let mut instances = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for i in 0..32 {
        for prefix in ["s", "a"] {
            let hero_id = format!("hero-{}{}", prefix, i);
            if let Ok(hero) = service.heroes.get(&hero_id).await {
                if let Some(pointer) = hero.active_instance {
                    if seen.insert(pointer.instance_id) {
                        instances.push(service.instances.get(pointer.instance_id).await.unwrap());
                    }
                }
            }
        }
    }

    instances
}
