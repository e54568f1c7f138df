//! In-memory event store
//!
//! Suitable for tests and simulation. Patches run under the DashMap shard
//! lock of the entry, so each one is atomic with respect to its guard.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use modlog_core::{ActionType, EntryId, EventEntry, GuildId};
use tracing::trace;

use crate::error::StorageError;
use crate::{EntryPatch, EventStore, PatchOutcome, newest_first, oldest_first};

/// In-memory implementation of [`EventStore`]
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    entries: DashMap<EntryId, EventEntry>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn insert(&self, entry: EventEntry) -> Result<(), StorageError> {
        trace!(entry = %entry.id, guild = %entry.guild_id, "Inserting entry");
        match self.entries.entry(entry.id) {
            Entry::Occupied(_) => Err(StorageError::Duplicate(entry.id)),
            Entry::Vacant(slot) => {
                slot.insert(entry);
                Ok(())
            }
        }
    }

    async fn find_pending(
        &self,
        guild: GuildId,
        target_id: &str,
        actions: &[ActionType],
    ) -> Result<Vec<EventEntry>, StorageError> {
        let mut matches: Vec<EventEntry> = self
            .entries
            .iter()
            .filter(|e| {
                e.waiting_for_backfill
                    && e.guild_id == guild
                    && e.target_id == target_id
                    && actions.contains(&e.action_type)
            })
            .map(|e| e.value().clone())
            .collect();
        matches.sort_by(oldest_first);
        Ok(matches)
    }

    async fn patch(&self, id: EntryId, patch: EntryPatch) -> Result<PatchOutcome, StorageError> {
        let mut entry = self
            .entries
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(id))?;
        let outcome = patch.apply_to(entry.value_mut());
        trace!(entry = %id, ?outcome, "Patched entry");
        Ok(outcome)
    }

    async fn get(&self, id: EntryId) -> Result<Option<EventEntry>, StorageError> {
        Ok(self.entries.get(&id).map(|e| e.value().clone()))
    }

    async fn list_for_guild(
        &self,
        guild: GuildId,
        limit: usize,
    ) -> Result<Vec<EventEntry>, StorageError> {
        let mut entries: Vec<EventEntry> = self
            .entries
            .iter()
            .filter(|e| e.guild_id == guild)
            .map(|e| e.value().clone())
            .collect();
        entries.sort_by(newest_first);
        entries.truncate(limit);
        Ok(entries)
    }
}
