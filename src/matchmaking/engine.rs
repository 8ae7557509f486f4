//! Matchmaking engine: queue operations and the three-tier pass
//!
//! This module provides the core MatchmakingEngine that owns the queue-facing
//! operations (join, leave, status, party queue/cancel) and runs the matching
//! pass that turns queued entries into launched instances.
//!
//! A pass is a single synchronous scan triggered by a join event. It works in
//! three tiers, re-reading the queue between tiers so earlier commits are
//! visible to later tiers:
//!
//! 1. complete parties that are ready at their current size;
//! 2. parties below minimum or seeking fill, topped up with solo players;
//! 3. remaining solo players, batched in queue order.
//!
//! Only one pass runs at a time (the engine is a single-writer behind a pass
//! lock), and every group is consumed through the store's all-or-nothing
//! claim, so concurrent joins and leaves can never double-consume an entry.

use crate::catalog::{EligibilityCatalog, GroupProfile, InstanceDefinition};
use crate::error::{MatchmakingError, Result};
use crate::hero::HeroDirectory;
use crate::instance::factory::{CommitOutcome, InstanceFactory};
use crate::instance::InstanceRepository;
use crate::metrics::MetricsCollector;
use crate::party::{Party, PartyRegistry, PartyStatus};
use crate::queue::QueueStore;
use crate::role;
use crate::types::{
    EntryId, JoinQueueRequest, MemberQueueError, PartyId, PartyQueueOutcome, QueueEntry,
    QueuePartyRequest, QueueStatusView, RoleCounts,
};
use crate::utils::{current_timestamp, generate_entry_id};
use crate::wait_time::{WaitTimeConfig, WaitTimeTracker};
use chrono::Duration as ChronoDuration;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Engine tuning knobs
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Time-to-live of a queue entry before the expiry sweep evicts it
    pub entry_ttl_seconds: u64,
    /// Wait estimation settings
    pub wait_time: WaitTimeConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            entry_ttl_seconds: 600,
            wait_time: WaitTimeConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.entry_ttl_seconds == 0 {
            return Err(MatchmakingError::ConfigurationError {
                message: "entry_ttl_seconds must be greater than 0".to_string(),
            }
            .into());
        }
        self.wait_time.validate()
    }
}

/// Statistics about engine operations
#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    /// Total matchmaking passes run
    pub passes_run: u64,
    /// Total groups committed across all tiers
    pub groups_formed: u64,
    /// Groups committed from complete parties (Tier 1)
    pub party_groups: u64,
    /// Groups committed from parties topped up with solo players (Tier 2)
    pub filled_groups: u64,
    /// Groups committed from solo batches (Tier 3)
    pub solo_groups: u64,
    /// Total players consumed into instances
    pub players_matched: u64,
    /// Total individual join operations accepted
    pub players_queued: u64,
    /// Total explicit leaves
    pub players_left: u64,
    /// Entries evicted by expiry sweeps
    pub entries_expired: u64,
    /// Commits that aborted (hydration miss or claim race)
    pub commits_aborted: u64,
}

/// The matchmaking engine
pub struct MatchmakingEngine {
    queue_store: Arc<dyn QueueStore>,
    party_registry: Arc<dyn PartyRegistry>,
    hero_directory: Arc<dyn HeroDirectory>,
    catalog: Arc<dyn EligibilityCatalog>,
    factory: InstanceFactory,
    wait_times: WaitTimeTracker,
    entry_ttl: ChronoDuration,
    /// Serializes passes: the engine is the queue's single writer during a scan
    pass_lock: tokio::sync::Mutex<()>,
    stats: Arc<RwLock<EngineStats>>,
    metrics: Arc<MetricsCollector>,
}

impl MatchmakingEngine {
    /// Create an engine with a fresh metrics collector
    pub fn new(
        queue_store: Arc<dyn QueueStore>,
        party_registry: Arc<dyn PartyRegistry>,
        hero_directory: Arc<dyn HeroDirectory>,
        instance_repository: Arc<dyn InstanceRepository>,
        catalog: Arc<dyn EligibilityCatalog>,
        config: EngineConfig,
    ) -> Result<Self> {
        let metrics = Arc::new(MetricsCollector::new()?);
        Self::with_metrics(
            queue_store,
            party_registry,
            hero_directory,
            instance_repository,
            catalog,
            config,
            metrics,
        )
    }

    /// Create an engine with an externally owned metrics collector
    pub fn with_metrics(
        queue_store: Arc<dyn QueueStore>,
        party_registry: Arc<dyn PartyRegistry>,
        hero_directory: Arc<dyn HeroDirectory>,
        instance_repository: Arc<dyn InstanceRepository>,
        catalog: Arc<dyn EligibilityCatalog>,
        config: EngineConfig,
        metrics: Arc<MetricsCollector>,
    ) -> Result<Self> {
        config.validate()?;

        let factory = InstanceFactory::new(
            queue_store.clone(),
            party_registry.clone(),
            hero_directory.clone(),
            instance_repository,
        );
        let wait_times = WaitTimeTracker::new(config.wait_time.clone())?;

        Ok(Self {
            queue_store,
            party_registry,
            hero_directory,
            catalog,
            factory,
            wait_times,
            entry_ttl: ChronoDuration::seconds(config.entry_ttl_seconds as i64),
            pass_lock: tokio::sync::Mutex::new(()),
            stats: Arc::new(RwLock::new(EngineStats::default())),
            metrics,
        })
    }

    /// Enqueue one player and trigger a matchmaking pass.
    ///
    /// The entry write and the pass are sequential: the call returns once the
    /// pass completes, so the caller observes either a queued entry or an
    /// active-instance pointer on their hero.
    pub async fn join_queue(&self, request: JoinQueueRequest) -> Result<EntryId> {
        if request.player_id.is_empty() || request.hero_id.is_empty() {
            return Err(MatchmakingError::InvalidJoinRequest {
                reason: "player_id and hero_id are required".to_string(),
            }
            .into());
        }

        if let Some(hint) = &request.instance_kind_hint {
            // Reject unknown kinds up front rather than at match time.
            self.catalog.instance_by_id(hint)?;
        }

        let hero = self.hero_directory.get(&request.hero_id).await?;

        let now = current_timestamp();
        let entry = QueueEntry {
            id: generate_entry_id(),
            player_id: request.player_id.clone(),
            hero_id: request.hero_id.clone(),
            role: role::normalize(&request.role),
            original_role: request.role.clone(),
            level: hero.level,
            item_score: request.item_score,
            instance_kind_hint: request.instance_kind_hint.clone(),
            party_id: None,
            queued_at: now,
            expires_at: now + self.entry_ttl,
        };
        let entry_id = self.queue_store.add(entry).await?;

        info!(
            "Player queued - player: '{}', hero: '{}', role: {}, hint: {:?}",
            request.player_id,
            request.hero_id,
            role::normalize(&request.role),
            request.instance_kind_hint
        );

        {
            let mut stats = self.write_stats()?;
            stats.players_queued += 1;
        }
        self.metrics.record_join();
        self.update_depth_gauge().await;

        // The join itself already succeeded; a pass failure only delays
        // matching until the next trigger.
        if let Err(e) = self.run_pass().await {
            warn!("Matchmaking pass after join failed: {}", e);
        }

        Ok(entry_id)
    }

    /// Enqueue every current member of a party in one call.
    ///
    /// Partial success is allowed: members that cannot be enqueued (for
    /// example, one already queued solo) are reported individually and the
    /// rest proceed.
    pub async fn queue_party(&self, request: QueuePartyRequest) -> Result<PartyQueueOutcome> {
        let party = self.party_registry.get(request.party_id).await?;

        if party.status != PartyStatus::Forming {
            return Err(MatchmakingError::InvalidJoinRequest {
                reason: format!(
                    "party {} is {} and cannot queue",
                    party.id, party.status
                ),
            }
            .into());
        }

        let hint = request
            .instance_kind_hint
            .clone()
            .or_else(|| party.instance_kind_hint.clone());
        if let Some(hint) = &hint {
            self.catalog.instance_by_id(hint)?;
        }

        let now = current_timestamp();
        let mut queued_count = 0;
        let mut member_errors = Vec::new();

        for member in &party.member_data {
            let entry = QueueEntry {
                id: generate_entry_id(),
                player_id: member.player_id.clone(),
                hero_id: member.hero_id.clone(),
                role: member.role,
                original_role: member.role.to_string(),
                level: member.level,
                item_score: member.item_score,
                instance_kind_hint: hint.clone(),
                party_id: Some(party.id),
                queued_at: now,
                expires_at: now + self.entry_ttl,
            };

            match self.queue_store.add(entry).await {
                Ok(_) => queued_count += 1,
                Err(e) => {
                    warn!(
                        "Failed to enqueue party member - party: {}, player: '{}': {}",
                        party.id, member.player_id, e
                    );
                    member_errors.push(MemberQueueError {
                        player_id: member.player_id.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if queued_count > 0 {
            self.party_registry
                .set_status(party.id, PartyStatus::Queued)
                .await?;

            info!(
                "Party queued - party: {}, kind: {}, members: {}/{}",
                party.id,
                request.queue_kind,
                queued_count,
                party.member_data.len()
            );

            {
                let mut stats = self.write_stats()?;
                stats.players_queued += queued_count as u64;
            }
            for _ in 0..queued_count {
                self.metrics.record_join();
            }
            self.update_depth_gauge().await;

            if let Err(e) = self.run_pass().await {
                warn!("Matchmaking pass after party queue failed: {}", e);
            }
        }

        Ok(PartyQueueOutcome {
            queued_count,
            total: party.member_data.len(),
            member_errors,
        })
    }

    /// Remove the caller's entry from the queue.
    pub async fn leave_queue(&self, player_id: &str) -> Result<()> {
        let removed = self.queue_store.remove_player(player_id).await?;

        match removed {
            Some(entry) => {
                info!(
                    "Player left queue - player: '{}', waited: {}s",
                    player_id,
                    (current_timestamp() - entry.queued_at).num_seconds()
                );
                {
                    let mut stats = self.write_stats()?;
                    stats.players_left += 1;
                }
                self.metrics.record_leave();
                self.update_depth_gauge().await;
                Ok(())
            }
            None => Err(MatchmakingError::NotQueued {
                player_id: player_id.to_string(),
            }
            .into()),
        }
    }

    /// Report a player's queue position and the queue's composition.
    pub async fn queue_status(&self, player_id: &str) -> Result<QueueStatusView> {
        let entries = self.queue_store.list().await?;

        let Some(entry) = entries.iter().find(|e| e.player_id == player_id) else {
            return Ok(QueueStatusView::not_queued());
        };

        let mut role_counts = RoleCounts::default();
        for queued in &entries {
            role_counts.record(queued.role);
        }

        Ok(QueueStatusView {
            in_queue: true,
            role: Some(entry.role),
            instance_kind_hint: entry.instance_kind_hint.clone(),
            role_counts,
            estimated_wait_seconds: Some(self.wait_times.estimate_seconds()),
        })
    }

    /// Dequeue an entire party. Leader only.
    pub async fn cancel_party_queue(
        &self,
        party_id: PartyId,
        requester_id: &str,
    ) -> Result<usize> {
        let party = self.party_registry.get(party_id).await?;

        if party.leader_id != requester_id {
            return Err(MatchmakingError::NotPartyLeader {
                party_id: party_id.to_string(),
                player_id: requester_id.to_string(),
            }
            .into());
        }

        let removed = self.queue_store.remove_party(party_id).await?;
        if removed.is_empty() {
            return Err(MatchmakingError::PartyNotQueued {
                party_id: party_id.to_string(),
            }
            .into());
        }

        self.party_registry
            .set_status(party_id, PartyStatus::Forming)
            .await?;

        info!(
            "Party queue cancelled - party: {}, removed entries: {}",
            party_id,
            removed.len()
        );
        self.update_depth_gauge().await;

        Ok(removed.len())
    }

    /// Run one matchmaking pass over the current queue.
    ///
    /// Returns the number of groups committed. A pass over an empty or
    /// unmatchable queue is a valid no-op.
    pub async fn run_pass(&self) -> Result<usize> {
        let _guard = self.pass_lock.lock().await;
        let started = Instant::now();
        let now = current_timestamp();

        // Expired entries never reach a tier.
        let expired = self.queue_store.evict_expired(now).await?;
        if !expired.is_empty() {
            info!("Evicted {} expired queue entries before matching", expired.len());
            let mut stats = self.write_stats()?;
            stats.entries_expired += expired.len() as u64;
            self.metrics.record_expired(expired.len() as u64);
        }

        let queue = self.queue_store.list().await?;
        if queue.is_empty() {
            debug!("Matchmaking pass skipped - queue is empty");
            self.finish_pass(started, 0)?;
            return Ok(0);
        }

        let Some(default_definition) = self.resolve_target_definition(&queue)? else {
            debug!(
                "Matchmaking pass formed no groups - no eligible instance for {} queued entries",
                queue.len()
            );
            self.finish_pass(started, 0)?;
            return Ok(0);
        };

        debug!(
            "Matchmaking pass targeting '{}' ({}-{} players) over {} entries",
            default_definition.id,
            default_definition.min_players,
            default_definition.max_players,
            queue.len()
        );

        let mut groups_formed = 0;
        groups_formed += self.run_complete_party_tier(&default_definition).await?;
        groups_formed += self.run_fill_tier(&default_definition).await?;
        groups_formed += self.run_solo_tier(&default_definition).await?;

        if groups_formed > 0 {
            info!("Matchmaking pass formed {} group(s)", groups_formed);
        } else {
            debug!("Matchmaking pass formed no groups");
        }

        self.finish_pass(started, groups_formed)?;
        self.update_depth_gauge().await;
        Ok(groups_formed)
    }

    /// Evict expired entries outside a full pass (periodic sweep task).
    pub async fn sweep_expired(&self) -> Result<usize> {
        let _guard = self.pass_lock.lock().await;

        let expired = self.queue_store.evict_expired(current_timestamp()).await?;
        if !expired.is_empty() {
            info!("Expiry sweep evicted {} queue entries", expired.len());
            let mut stats = self.write_stats()?;
            stats.entries_expired += expired.len() as u64;
            self.metrics.record_expired(expired.len() as u64);
            self.update_depth_gauge().await;
        }
        Ok(expired.len())
    }

    /// Get current engine statistics
    pub fn stats(&self) -> Result<EngineStats> {
        let stats = self.stats.read().map_err(|_| {
            anyhow::Error::from(MatchmakingError::InternalError {
                message: "Failed to acquire stats lock".to_string(),
            })
        })?;
        Ok(stats.clone())
    }

    /// Number of live queue entries
    pub async fn queue_depth(&self) -> Result<usize> {
        self.queue_store.len().await
    }

    /// Resolve the definition this pass matches toward.
    ///
    /// Hinted entries take precedence; otherwise eligibility is computed over
    /// the whole queue and the designated launch instance is preferred.
    fn resolve_target_definition(
        &self,
        queue: &[QueueEntry],
    ) -> Result<Option<InstanceDefinition>> {
        for entry in queue {
            if let Some(hint) = &entry.instance_kind_hint {
                match self.catalog.instance_by_id(hint) {
                    Ok(definition) => return Ok(Some(definition)),
                    Err(e) => {
                        warn!(
                            "Ignoring unresolvable instance hint '{}' from player '{}': {}",
                            hint, entry.player_id, e
                        );
                    }
                }
            }
        }

        let members: Vec<(u32, u32)> = queue.iter().map(|e| (e.level, e.item_score)).collect();
        let eligible = self
            .catalog
            .eligible_for_group(GroupProfile::from_members(&members));
        if eligible.is_empty() {
            return Ok(None);
        }

        let launch_id = self.catalog.launch_instance_id();
        Ok(Some(
            eligible
                .iter()
                .find(|d| d.id == launch_id)
                .cloned()
                .unwrap_or_else(|| eligible[0].clone()),
        ))
    }

    /// Tier 1: parties that are ready at their current size.
    async fn run_complete_party_tier(
        &self,
        default_definition: &InstanceDefinition,
    ) -> Result<usize> {
        let queue = self.queue_store.list().await?;
        let (parties, _) = partition_queue(&queue);

        let mut formed = 0;
        for (party_id, entries) in parties {
            let party = match self.party_registry.get(party_id).await {
                Ok(party) => party,
                Err(e) => {
                    warn!("Skipping entries of unresolvable party {}: {}", party_id, e);
                    continue;
                }
            };
            let definition = self.definition_for_party(&party, default_definition);

            if party.fill_to_max && entries.len() < definition.max_players {
                debug!(
                    "Party {} holds for fill - size {}, cap {}",
                    party_id,
                    entries.len(),
                    definition.max_players
                );
                continue;
            }

            if !definition.accepts_group_size(entries.len()) {
                warn!(
                    "Party {} size {} outside [{}, {}] for '{}' - leaving queued",
                    party_id,
                    entries.len(),
                    definition.min_players,
                    definition.max_players,
                    definition.id
                );
                continue;
            }

            if self
                .commit_group(&entries, Some(party_id), &definition, Tier::Party)
                .await?
            {
                formed += 1;
            }
        }

        Ok(formed)
    }

    /// Tier 2: incomplete or fill-seeking parties topped up with solo players.
    async fn run_fill_tier(&self, default_definition: &InstanceDefinition) -> Result<usize> {
        let queue = self.queue_store.list().await?;
        let (parties, solos) = partition_queue(&queue);

        let mut solo_pool = solos;
        let mut formed = 0;

        for (party_id, entries) in parties {
            let party = match self.party_registry.get(party_id).await {
                Ok(party) => party,
                Err(e) => {
                    warn!("Skipping entries of unresolvable party {}: {}", party_id, e);
                    continue;
                }
            };
            let definition = self.definition_for_party(&party, default_definition);
            let size = entries.len();

            let needed = if size < definition.min_players {
                let needed = definition.min_players - size;
                if solo_pool.len() < needed || size + needed > definition.max_players {
                    continue;
                }
                needed
            } else if party.fill_to_max && size < definition.max_players {
                let needed = definition.max_players - size;
                if solo_pool.len() < needed {
                    continue;
                }
                needed
            } else {
                continue;
            };

            // Fillers are taken in queue order.
            let fillers: Vec<QueueEntry> = solo_pool.drain(..needed).collect();
            let mut group = entries.clone();
            group.extend(fillers.iter().cloned());

            if self
                .commit_group(&group, Some(party_id), &definition, Tier::Fill)
                .await?
            {
                formed += 1;
            } else {
                // Aborted commits leave the fillers queued; put them back in
                // front so later parties still see them in order.
                for filler in fillers.into_iter().rev() {
                    solo_pool.insert(0, filler);
                }
            }
        }

        Ok(formed)
    }

    /// Tier 3: remaining solo players batched in queue order.
    async fn run_solo_tier(&self, default_definition: &InstanceDefinition) -> Result<usize> {
        let queue = self.queue_store.list().await?;
        let (_, solos) = partition_queue(&queue);

        let mut pool = solos;
        let mut formed = 0;

        while pool.len() >= default_definition.min_players {
            let take = default_definition.max_players.min(pool.len());
            let batch: Vec<QueueEntry> = pool.drain(..take).collect();

            if self
                .commit_group(&batch, None, default_definition, Tier::Solo)
                .await?
            {
                formed += 1;
            }
        }

        Ok(formed)
    }

    /// A party's own hint overrides the pass target when it resolves.
    fn definition_for_party(
        &self,
        party: &Party,
        default_definition: &InstanceDefinition,
    ) -> InstanceDefinition {
        if let Some(hint) = &party.instance_kind_hint {
            match self.catalog.instance_by_id(hint) {
                Ok(definition) => return definition,
                Err(e) => {
                    warn!(
                        "Party {} hint '{}' does not resolve, using pass target: {}",
                        party.id, hint, e
                    );
                }
            }
        }
        default_definition.clone()
    }

    /// Commit one candidate group and record the outcome.
    async fn commit_group(
        &self,
        entries: &[QueueEntry],
        party_id: Option<PartyId>,
        definition: &InstanceDefinition,
        tier: Tier,
    ) -> Result<bool> {
        match self.factory.commit(entries, party_id, definition).await? {
            CommitOutcome::Launched(_) => {
                let now = current_timestamp();
                for entry in entries {
                    if let Ok(waited) = (now - entry.queued_at).to_std() {
                        self.wait_times.record_time_to_match(waited);
                    }
                }

                {
                    let mut stats = self.write_stats()?;
                    stats.groups_formed += 1;
                    stats.players_matched += entries.len() as u64;
                    match tier {
                        Tier::Party => stats.party_groups += 1,
                        Tier::Fill => stats.filled_groups += 1,
                        Tier::Solo => stats.solo_groups += 1,
                    }
                }
                self.metrics.record_group_formed(tier.label(), entries.len());
                Ok(true)
            }
            CommitOutcome::Aborted { reason } => {
                warn!("Group commit aborted ({} tier): {}", tier.label(), reason);
                let mut stats = self.write_stats()?;
                stats.commits_aborted += 1;
                self.metrics.record_commit_abort();
                Ok(false)
            }
        }
    }

    fn finish_pass(&self, started: Instant, groups_formed: usize) -> Result<()> {
        {
            let mut stats = self.write_stats()?;
            stats.passes_run += 1;
        }
        self.metrics.record_pass(started.elapsed(), groups_formed);
        Ok(())
    }

    async fn update_depth_gauge(&self) {
        if let Ok(depth) = self.queue_store.len().await {
            self.metrics.set_queue_depth(depth as i64);
        }
    }

    fn write_stats(&self) -> Result<std::sync::RwLockWriteGuard<'_, EngineStats>> {
        self.stats.write().map_err(|_| {
            MatchmakingError::InternalError {
                message: "Failed to acquire stats lock".to_string(),
            }
            .into()
        })
    }
}

/// Which tier committed a group, for stats and metrics labels
#[derive(Debug, Clone, Copy)]
enum Tier {
    Party,
    Fill,
    Solo,
}

impl Tier {
    fn label(self) -> &'static str {
        match self {
            Tier::Party => "party",
            Tier::Fill => "fill",
            Tier::Solo => "solo",
        }
    }
}

/// Split a queue snapshot into party groups (first-seen order) and solo
/// entries (queue order).
fn partition_queue(queue: &[QueueEntry]) -> (Vec<(PartyId, Vec<QueueEntry>)>, Vec<QueueEntry>) {
    let mut party_order = Vec::new();
    let mut parties: HashMap<PartyId, Vec<QueueEntry>> = HashMap::new();
    let mut solos = Vec::new();

    for entry in queue {
        match entry.party_id {
            Some(party_id) => {
                let members = parties.entry(party_id).or_default();
                if members.is_empty() {
                    party_order.push(party_id);
                }
                members.push(entry.clone());
            }
            None => solos.push(entry.clone()),
        }
    }

    let grouped = party_order
        .into_iter()
        .map(|party_id| {
            let members = parties.remove(&party_id).unwrap_or_default();
            (party_id, members)
        })
        .collect();

    (grouped, solos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{StaticInstanceCatalog, LAUNCH_INSTANCE_ID};
    use crate::hero::{Hero, InMemoryHeroDirectory};
    use crate::instance::{InMemoryInstanceRepository, InstanceRepository};
    use crate::party::{InMemoryPartyRegistry, PartyMember};
    use crate::types::{QueueKind, Role};
    use crate::utils::generate_party_id;
    use proptest::prelude::*;

    struct TestRig {
        engine: MatchmakingEngine,
        queue: Arc<crate::queue::InMemoryQueueStore>,
        parties: Arc<InMemoryPartyRegistry>,
        heroes: Arc<InMemoryHeroDirectory>,
        instances: Arc<InMemoryInstanceRepository>,
    }

    fn test_rig() -> TestRig {
        let queue = Arc::new(crate::queue::InMemoryQueueStore::new());
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
        .unwrap();

        TestRig {
            engine,
            queue,
            parties,
            heroes,
            instances,
        }
    }

    fn seed_hero(rig: &TestRig, player_id: &str) -> String {
        let hero_id = format!("hero-{}", player_id);
        rig.heroes
            .insert(Hero {
                id: hero_id.clone(),
                player_id: player_id.to_string(),
                display_name: format!("Hero {}", player_id),
                class_name: "mage".to_string(),
                level: 10,
                item_score: 60,
                max_hp: 150,
                current_hp: 150,
                active_instance: None,
            })
            .unwrap();
        hero_id
    }

    fn join_request(rig: &TestRig, player_id: &str) -> JoinQueueRequest {
        let hero_id = seed_hero(rig, player_id);
        JoinQueueRequest {
            player_id: player_id.to_string(),
            hero_id,
            role: "mage".to_string(),
            item_score: 60,
            instance_kind_hint: None,
        }
    }

    fn seed_party(rig: &TestRig, player_ids: &[&str], fill_to_max: bool) -> PartyId {
        let party_id = generate_party_id();
        let member_data: Vec<PartyMember> = player_ids
            .iter()
            .map(|player_id| {
                let hero_id = seed_hero(rig, player_id);
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

        rig.parties
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
            .unwrap();

        party_id
    }

    /// Add a solo entry directly to the store, without triggering a pass.
    async fn park_solo(rig: &TestRig, player_id: &str) {
        let hero_id = seed_hero(rig, player_id);
        let now = current_timestamp();
        rig.queue
            .add(QueueEntry {
                id: generate_entry_id(),
                player_id: player_id.to_string(),
                hero_id,
                role: Role::Dps,
                original_role: "mage".to_string(),
                level: 10,
                item_score: 60,
                instance_kind_hint: None,
                party_id: None,
                queued_at: now,
                expires_at: now + ChronoDuration::minutes(10),
            })
            .await
            .unwrap();
    }

    /// Register a party and park its entries, without triggering a pass.
    async fn park_party(rig: &TestRig, player_ids: &[&str], fill_to_max: bool) -> PartyId {
        let party_id = seed_party(rig, player_ids, fill_to_max);
        let now = current_timestamp();
        for player_id in player_ids {
            rig.queue
                .add(QueueEntry {
                    id: generate_entry_id(),
                    player_id: player_id.to_string(),
                    hero_id: format!("hero-{}", player_id),
                    role: Role::Dps,
                    original_role: "mage".to_string(),
                    level: 10,
                    item_score: 60,
                    instance_kind_hint: None,
                    party_id: Some(party_id),
                    queued_at: now,
                    expires_at: now + ChronoDuration::minutes(10),
                })
                .await
                .unwrap();
        }
        rig.parties
            .set_status(party_id, PartyStatus::Queued)
            .await
            .unwrap();
        party_id
    }

    #[tokio::test]
    async fn test_empty_pass_is_a_noop() {
        let rig = test_rig();

        assert_eq!(rig.engine.run_pass().await.unwrap(), 0);
        assert_eq!(rig.instances.count().await.unwrap(), 0);

        let stats = rig.engine.stats().unwrap();
        assert_eq!(stats.passes_run, 1);
        assert_eq!(stats.groups_formed, 0);
    }

    #[tokio::test]
    async fn test_second_join_is_rejected() {
        let rig = test_rig();

        // One player alone cannot match, so the entry stays live.
        rig.engine
            .join_queue(join_request(&rig, "solo"))
            .await
            .unwrap();

        let err = rig
            .engine
            .join_queue(join_request(&rig, "solo"))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MatchmakingError>(),
            Some(MatchmakingError::AlreadyQueued { .. })
        ));
        assert_eq!(rig.queue.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_join_with_unknown_hero_is_rejected() {
        let rig = test_rig();
        let request = JoinQueueRequest {
            player_id: "ghost".to_string(),
            hero_id: "hero-ghost".to_string(),
            role: "mage".to_string(),
            item_score: 60,
            instance_kind_hint: None,
        };

        let err = rig.engine.join_queue(request).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MatchmakingError>(),
            Some(MatchmakingError::HeroNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_join_with_unknown_hint_is_rejected() {
        let rig = test_rig();
        let mut request = join_request(&rig, "p1");
        request.instance_kind_hint = Some("no-such-dungeon".to_string());

        let err = rig.engine.join_queue(request).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MatchmakingError>(),
            Some(MatchmakingError::UnknownInstanceKind { .. })
        ));
    }

    #[tokio::test]
    async fn test_solo_batch_forms_when_minimum_reached() {
        let rig = test_rig();

        // First join: below minimum, nothing forms.
        rig.engine
            .join_queue(join_request(&rig, "p1"))
            .await
            .unwrap();
        assert_eq!(rig.instances.count().await.unwrap(), 0);

        // Second join triggers a pass that batches both.
        rig.engine
            .join_queue(join_request(&rig, "p2"))
            .await
            .unwrap();

        assert_eq!(rig.instances.count().await.unwrap(), 1);
        assert_eq!(rig.queue.len().await.unwrap(), 0);

        let hero = rig.heroes.get("hero-p1").await.unwrap();
        assert!(hero.active_instance.is_some());
    }

    #[tokio::test]
    async fn test_solo_batches_cap_at_max_players() {
        let rig = test_rig();

        // Park seven players, then run one pass over the whole set.
        for i in 0..7 {
            park_solo(&rig, &format!("p{}", i)).await;
        }

        let formed = rig.engine.run_pass().await.unwrap();

        // 7 solos with bounds [2, 5]: one batch of 5 and one of 2.
        assert_eq!(formed, 2);
        assert_eq!(rig.queue.len().await.unwrap(), 0);
        assert_eq!(rig.instances.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_filling_party_grows_to_max() {
        let rig = test_rig();

        // Party of two holding for fill plus three solos, all queued before
        // the pass: one pass commits a single group of five.
        let party_id = park_party(&rig, &["m1", "m2"], true).await;
        for player_id in ["s1", "s2", "s3"] {
            park_solo(&rig, player_id).await;
        }

        let formed = rig.engine.run_pass().await.unwrap();
        assert_eq!(formed, 1);
        assert_eq!(rig.queue.len().await.unwrap(), 0);
        assert_eq!(rig.instances.count().await.unwrap(), 1);

        let party = rig.parties.get(party_id).await.unwrap();
        assert_eq!(party.status, PartyStatus::InInstance);

        let stats = rig.engine.stats().unwrap();
        assert_eq!(stats.filled_groups, 1);
        assert_eq!(stats.players_matched, 5);
    }

    #[tokio::test]
    async fn test_single_member_party_waits() {
        let rig = test_rig();

        let party_id = seed_party(&rig, &["lone"], true);
        let outcome = rig
            .engine
            .queue_party(QueuePartyRequest {
                party_id,
                queue_kind: QueueKind::Dungeon,
                instance_kind_hint: None,
            })
            .await
            .unwrap();

        assert_eq!(outcome.queued_count, 1);
        assert!(outcome.member_errors.is_empty());

        // No solos available: the entry stays queued, no instance launches.
        assert_eq!(rig.queue.len().await.unwrap(), 1);
        assert_eq!(rig.instances.count().await.unwrap(), 0);

        let party = rig.parties.get(party_id).await.unwrap();
        assert_eq!(party.status, PartyStatus::Queued);
    }

    #[tokio::test]
    async fn test_below_minimum_party_is_topped_up() {
        let rig = test_rig();

        let party_id = seed_party(&rig, &["lone"], false);
        rig.engine
            .queue_party(QueuePartyRequest {
                party_id,
                queue_kind: QueueKind::Dungeon,
                instance_kind_hint: None,
            })
            .await
            .unwrap();

        // One solo supplies the missing member (min_players = 2).
        rig.engine
            .join_queue(join_request(&rig, "helper"))
            .await
            .unwrap();

        assert_eq!(rig.queue.len().await.unwrap(), 0);
        let party = rig.parties.get(party_id).await.unwrap();
        assert_eq!(party.status, PartyStatus::InInstance);

        let stats = rig.engine.stats().unwrap();
        assert_eq!(stats.filled_groups, 1);
    }

    #[tokio::test]
    async fn test_non_filling_party_and_solos_form_in_one_pass() {
        let rig = test_rig();

        // A non-filling party at exactly min_players commits in Tier 1...
        let party_id = seed_party(&rig, &["m1", "m2"], false);
        rig.engine
            .queue_party(QueuePartyRequest {
                party_id,
                queue_kind: QueueKind::Dungeon,
                instance_kind_hint: None,
            })
            .await
            .unwrap();
        assert_eq!(rig.instances.count().await.unwrap(), 1);

        // ...and enough solos form their own Tier 3 group in a single pass.
        park_solo(&rig, "s0").await;
        park_solo(&rig, "s1").await;
        park_party(&rig, &["n1", "n2"], false).await;

        let formed = rig.engine.run_pass().await.unwrap();
        assert_eq!(formed, 2);
        assert_eq!(rig.queue.len().await.unwrap(), 0);

        let stats = rig.engine.stats().unwrap();
        assert_eq!(stats.party_groups, 2);
        assert_eq!(stats.solo_groups, 1);
    }

    #[tokio::test]
    async fn test_expired_entries_are_evicted_before_matching() {
        let rig = test_rig();

        // A stale entry that would otherwise complete the pair.
        let hero_id = seed_hero(&rig, "stale");
        let now = current_timestamp();
        rig.queue
            .add(QueueEntry {
                id: generate_entry_id(),
                player_id: "stale".to_string(),
                hero_id,
                role: Role::Dps,
                original_role: String::new(),
                level: 10,
                item_score: 60,
                instance_kind_hint: None,
                party_id: None,
                queued_at: now - ChronoDuration::hours(1),
                expires_at: now - ChronoDuration::minutes(1),
            })
            .await
            .unwrap();

        rig.engine
            .join_queue(join_request(&rig, "fresh"))
            .await
            .unwrap();

        // The stale entry was evicted, so no group formed.
        assert_eq!(rig.instances.count().await.unwrap(), 0);
        let remaining = rig.queue.list().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].player_id, "fresh");

        let stats = rig.engine.stats().unwrap();
        assert_eq!(stats.entries_expired, 1);
    }

    #[tokio::test]
    async fn test_hinted_entries_steer_the_pass() {
        let rig = test_rig();

        let mut request = join_request(&rig, "p1");
        request.instance_kind_hint = Some("gloomroot-hollow".to_string());
        rig.engine.join_queue(request).await.unwrap();

        let mut request = join_request(&rig, "p2");
        request.instance_kind_hint = Some("gloomroot-hollow".to_string());
        rig.engine.join_queue(request).await.unwrap();

        assert_eq!(rig.instances.count().await.unwrap(), 1);
        let hero = rig.heroes.get("hero-p1").await.unwrap();
        let instance_id = hero.active_instance.unwrap().instance_id;
        let instance = rig.instances.get(instance_id).await.unwrap();
        assert_eq!(instance.instance_kind_id, "gloomroot-hollow");
    }

    #[tokio::test]
    async fn test_leave_queue() {
        let rig = test_rig();

        rig.engine
            .join_queue(join_request(&rig, "p1"))
            .await
            .unwrap();
        rig.engine.leave_queue("p1").await.unwrap();
        assert_eq!(rig.queue.len().await.unwrap(), 0);

        let err = rig.engine.leave_queue("p1").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MatchmakingError>(),
            Some(MatchmakingError::NotQueued { .. })
        ));
    }

    #[tokio::test]
    async fn test_queue_status() {
        let rig = test_rig();

        let status = rig.engine.queue_status("p1").await.unwrap();
        assert!(!status.in_queue);

        let mut request = join_request(&rig, "p1");
        request.role = "Paladin".to_string();
        rig.engine.join_queue(request).await.unwrap();

        let status = rig.engine.queue_status("p1").await.unwrap();
        assert!(status.in_queue);
        assert_eq!(status.role, Some(Role::Tank));
        assert_eq!(status.role_counts.tank, 1);
        assert_eq!(status.role_counts.total(), 1);
        assert!(status.estimated_wait_seconds.is_some());
    }

    #[tokio::test]
    async fn test_cancel_party_queue_requires_leader() {
        let rig = test_rig();

        let party_id = seed_party(&rig, &["leader", "ally"], true);
        rig.engine
            .queue_party(QueuePartyRequest {
                party_id,
                queue_kind: QueueKind::Dungeon,
                instance_kind_hint: None,
            })
            .await
            .unwrap();

        let err = rig
            .engine
            .cancel_party_queue(party_id, "ally")
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MatchmakingError>(),
            Some(MatchmakingError::NotPartyLeader { .. })
        ));

        let removed = rig
            .engine
            .cancel_party_queue(party_id, "leader")
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(rig.queue.len().await.unwrap(), 0);

        let party = rig.parties.get(party_id).await.unwrap();
        assert_eq!(party.status, PartyStatus::Forming);

        // Cancelling again reports the party as not queued.
        let err = rig
            .engine
            .cancel_party_queue(party_id, "leader")
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MatchmakingError>(),
            Some(MatchmakingError::PartyNotQueued { .. })
        ));
    }

    #[tokio::test]
    async fn test_queue_party_reports_member_conflicts() {
        let rig = test_rig();

        // One member is already queued solo under the same player id.
        rig.engine
            .join_queue(join_request(&rig, "dual"))
            .await
            .unwrap();

        let party_id = seed_party(&rig, &["dual", "clean"], true);
        let outcome = rig
            .engine
            .queue_party(QueuePartyRequest {
                party_id,
                queue_kind: QueueKind::Dungeon,
                instance_kind_hint: None,
            })
            .await
            .unwrap();

        assert_eq!(outcome.total, 2);
        assert_eq!(outcome.queued_count, 1);
        assert_eq!(outcome.member_errors.len(), 1);
        assert_eq!(outcome.member_errors[0].player_id, "dual");
    }

    fn batch_sizes(solo_count: usize, min: usize, max: usize) -> Vec<usize> {
        // Mirrors the Tier 3 batching loop.
        let mut remaining = solo_count;
        let mut sizes = Vec::new();
        while remaining >= min {
            let take = max.min(remaining);
            sizes.push(take);
            remaining -= take;
        }
        sizes
    }

    proptest! {
        #[test]
        fn prop_solo_batches_stay_within_bounds(solo_count in 0usize..64) {
            let sizes = batch_sizes(solo_count, 2, 5);
            for size in &sizes {
                prop_assert!(*size >= 2 && *size <= 5);
            }
            // Everything batchable is batched: the remainder is below minimum.
            let consumed: usize = sizes.iter().sum();
            prop_assert!(solo_count - consumed < 2);
        }
    }
}
