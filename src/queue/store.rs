//! Queue store trait and in-memory implementation
//!
//! The store owns every live `QueueEntry` and is the single point where
//! entries are created, claimed, and removed. All mutating operations are
//! atomic with respect to each other, which is what makes the matchmaking
//! pass safe against concurrent joins and leaves: a pass claims the entries
//! of a candidate group in one conditional step, and the claim fails cleanly
//! if any entry was removed in the meantime.

use crate::error::{MatchmakingError, Result};
use crate::types::{EntryId, PartyId, PlayerId, QueueEntry};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Trait for queue entry storage
///
/// Implementations must guarantee that each mutating call is atomic relative
/// to the others, and that `claim` is all-or-nothing.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Add a new entry. Fails with `AlreadyQueued` if the player already has
    /// a live entry.
    async fn add(&self, entry: QueueEntry) -> Result<EntryId>;

    /// Remove the entry belonging to a player, returning it if present.
    async fn remove_player(&self, player_id: &str) -> Result<Option<QueueEntry>>;

    /// Remove every entry carrying the given party id, returning them.
    async fn remove_party(&self, party_id: PartyId) -> Result<Vec<QueueEntry>>;

    /// Atomically claim a set of entries for consumption into a group.
    ///
    /// Either every listed entry is still present and all are removed, or
    /// none are and the call fails with `EntryClaimFailed`.
    async fn claim(&self, entry_ids: &[EntryId]) -> Result<Vec<QueueEntry>>;

    /// Snapshot of all live entries, in queue order.
    async fn list(&self) -> Result<Vec<QueueEntry>>;

    /// Look up a player's live entry without removing it.
    async fn entry_for_player(&self, player_id: &str) -> Result<Option<QueueEntry>>;

    /// Remove and return every entry whose `expires_at` has passed.
    async fn evict_expired(&self, now: DateTime<Utc>) -> Result<Vec<QueueEntry>>;

    /// Number of live entries.
    async fn len(&self) -> Result<usize>;
}

#[derive(Debug, Default)]
struct QueueStoreInner {
    /// Entries in join order; order drives matching fairness
    entries: Vec<QueueEntry>,
    /// Player id -> entry id, enforcing single occupancy
    by_player: HashMap<PlayerId, EntryId>,
}

/// In-memory queue store backed by a mutex-guarded join-ordered list
#[derive(Debug, Clone, Default)]
pub struct InMemoryQueueStore {
    inner: Arc<Mutex<QueueStoreInner>>,
}

impl InMemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, QueueStoreInner>> {
        self.inner.lock().map_err(|_| {
            MatchmakingError::InternalError {
                message: "Failed to acquire queue store lock".to_string(),
            }
            .into()
        })
    }
}

#[async_trait]
impl QueueStore for InMemoryQueueStore {
    async fn add(&self, entry: QueueEntry) -> Result<EntryId> {
        let mut inner = self.lock()?;

        if inner.by_player.contains_key(&entry.player_id) {
            return Err(MatchmakingError::AlreadyQueued {
                player_id: entry.player_id.clone(),
            }
            .into());
        }

        let entry_id = entry.id;
        inner.by_player.insert(entry.player_id.clone(), entry_id);
        inner.entries.push(entry);

        Ok(entry_id)
    }

    async fn remove_player(&self, player_id: &str) -> Result<Option<QueueEntry>> {
        let mut inner = self.lock()?;

        let Some(entry_id) = inner.by_player.remove(player_id) else {
            return Ok(None);
        };

        let position = inner.entries.iter().position(|e| e.id == entry_id);
        Ok(position.map(|idx| inner.entries.remove(idx)))
    }

    async fn remove_party(&self, party_id: PartyId) -> Result<Vec<QueueEntry>> {
        let mut inner = self.lock()?;

        let mut removed = Vec::new();
        inner.entries.retain(|entry| {
            if entry.party_id == Some(party_id) {
                removed.push(entry.clone());
                false
            } else {
                true
            }
        });

        for entry in &removed {
            inner.by_player.remove(&entry.player_id);
        }

        Ok(removed)
    }

    async fn claim(&self, entry_ids: &[EntryId]) -> Result<Vec<QueueEntry>> {
        let mut inner = self.lock()?;

        // Conditional step: verify every entry is still live before touching
        // anything, so a concurrent leave aborts the whole claim.
        for entry_id in entry_ids {
            if !inner.entries.iter().any(|e| e.id == *entry_id) {
                return Err(MatchmakingError::EntryClaimFailed {
                    reason: format!("entry {} no longer in queue", entry_id),
                }
                .into());
            }
        }

        let mut claimed = Vec::with_capacity(entry_ids.len());
        for entry_id in entry_ids {
            // Position is guaranteed by the check above; the lock is held
            // across both steps.
            if let Some(idx) = inner.entries.iter().position(|e| e.id == *entry_id) {
                let entry = inner.entries.remove(idx);
                inner.by_player.remove(&entry.player_id);
                claimed.push(entry);
            }
        }

        Ok(claimed)
    }

    async fn list(&self) -> Result<Vec<QueueEntry>> {
        let inner = self.lock()?;
        Ok(inner.entries.clone())
    }

    async fn entry_for_player(&self, player_id: &str) -> Result<Option<QueueEntry>> {
        let inner = self.lock()?;
        Ok(inner
            .entries
            .iter()
            .find(|e| e.player_id == player_id)
            .cloned())
    }

    async fn evict_expired(&self, now: DateTime<Utc>) -> Result<Vec<QueueEntry>> {
        let mut inner = self.lock()?;

        let mut evicted = Vec::new();
        inner.entries.retain(|entry| {
            if entry.is_expired(now) {
                evicted.push(entry.clone());
                false
            } else {
                true
            }
        });

        for entry in &evicted {
            inner.by_player.remove(&entry.player_id);
            debug!(
                "Evicted expired queue entry - player: '{}', queued_at: {}",
                entry.player_id, entry.queued_at
            );
        }

        Ok(evicted)
    }

    async fn len(&self) -> Result<usize> {
        let inner = self.lock()?;
        Ok(inner.entries.len())
    }
}
