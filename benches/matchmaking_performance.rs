//! Benchmarks for matchmaking pass throughput

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rally_point::catalog::StaticInstanceCatalog;
use rally_point::hero::{Hero, InMemoryHeroDirectory};
use rally_point::instance::InMemoryInstanceRepository;
use rally_point::matchmaking::{EngineConfig, MatchmakingEngine};
use rally_point::party::InMemoryPartyRegistry;
use rally_point::queue::{InMemoryQueueStore, QueueStore};
use rally_point::types::{QueueEntry, Role};
use rally_point::utils::{current_timestamp, generate_entry_id};
use std::sync::Arc;
use tokio::runtime::Runtime;

struct BenchRig {
    engine: MatchmakingEngine,
    queue: Arc<InMemoryQueueStore>,
    heroes: Arc<InMemoryHeroDirectory>,
}

fn build_rig() -> BenchRig {
    let queue = Arc::new(InMemoryQueueStore::new());
    let parties = Arc::new(InMemoryPartyRegistry::new());
    let heroes = Arc::new(InMemoryHeroDirectory::new());
    let instances = Arc::new(InMemoryInstanceRepository::new());
    let catalog = Arc::new(StaticInstanceCatalog::new());

    let engine = MatchmakingEngine::new(
        queue.clone(),
        parties,
        heroes.clone(),
        instances,
        catalog,
        EngineConfig::default(),
    )
    .expect("engine construction");

    BenchRig {
        engine,
        queue,
        heroes,
    }
}

async fn park_solos(rig: &BenchRig, count: usize) {
    let now = current_timestamp();
    for i in 0..count {
        let player_id = format!("bench{}", i);
        let hero_id = format!("hero-{}", player_id);
        rig.heroes
            .insert(Hero {
                id: hero_id.clone(),
                player_id: player_id.clone(),
                display_name: player_id.clone(),
                class_name: "mage".to_string(),
                level: 10,
                item_score: 60,
                max_hp: 150,
                current_hp: 150,
                active_instance: None,
            })
            .expect("hero insert");

        rig.queue
            .add(QueueEntry {
                id: generate_entry_id(),
                player_id,
                hero_id,
                role: Role::Dps,
                original_role: "mage".to_string(),
                level: 10,
                item_score: 60,
                instance_kind_hint: None,
                party_id: None,
                queued_at: now,
                expires_at: now + chrono::Duration::minutes(10),
            })
            .await
            .expect("queue add");
    }
}

fn bench_full_pass(c: &mut Criterion) {
    let runtime = Runtime::new().expect("tokio runtime");

    let mut group = c.benchmark_group("matchmaking_pass");
    for queue_size in [10usize, 50, 200] {
        group.bench_with_input(
            BenchmarkId::from_parameter(queue_size),
            &queue_size,
            |b, &queue_size| {
                b.iter(|| {
                    runtime.block_on(async {
                        let rig = build_rig();
                        park_solos(&rig, queue_size).await;
                        rig.engine.run_pass().await.expect("pass")
                    })
                });
            },
        );
    }
    group.finish();
}

fn bench_empty_pass(c: &mut Criterion) {
    let runtime = Runtime::new().expect("tokio runtime");
    let rig = build_rig();

    c.bench_function("empty_pass", |b| {
        b.iter(|| runtime.block_on(async { rig.engine.run_pass().await.expect("pass") }));
    });
}

criterion_group!(benches, bench_full_pass, bench_empty_pass);
criterion_main!(benches);
