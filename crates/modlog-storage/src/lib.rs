//! # Modlog Storage
//!
//! Event store abstractions for the guild event log.
//!
//! ## Features
//!
//! - **EventStore trait**: Insert, pending lookup, guarded patch, and read path
//! - **InMemoryEventStore**: DashMap-backed implementation for tests and simulation
//! - **RedbEventStore**: Embedded-file implementation for production
//!
//! ## Example
//!
//! ```rust,ignore
//! use modlog_storage::{EntryPatch, EventStore, InMemoryEventStore};
//!
//! let store = InMemoryEventStore::new();
//! store.insert(entry.clone()).await?;
//!
//! // Fill in the actor once the audit log catches up
//! let patch = EntryPatch::backfill(actor).with_reason("spam");
//! store.patch(entry.id, patch).await?;
//! ```

pub mod error;
pub mod memory;
pub mod persistent;

// Re-exports
pub use error::StorageError;
pub use memory::InMemoryEventStore;
pub use persistent::{RedbEventStore, RedbStoreConfig};

use std::cmp::Ordering;

use async_trait::async_trait;
use modlog_core::{
    ActionType, Change, EntryId, EventEntry, EventOption, GuildId, UserId, merge_options,
};

/// Persistent store of event log entries
///
/// Entries are never deleted. After insertion they change only through
/// [`patch`](EventStore::patch), which refuses to complete a backfill twice
/// or revert an entry twice.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Insert a new entry
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Duplicate`] if an entry with the same id exists.
    async fn insert(&self, entry: EventEntry) -> Result<(), StorageError>;

    /// Entries of `guild` about `target_id` with one of `actions` that are
    /// still waiting for backfill, oldest first (ties broken by id)
    async fn find_pending(
        &self,
        guild: GuildId,
        target_id: &str,
        actions: &[ActionType],
    ) -> Result<Vec<EventEntry>, StorageError>;

    /// Apply `patch` to an entry atomically
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if no entry has this id.
    async fn patch(&self, id: EntryId, patch: EntryPatch) -> Result<PatchOutcome, StorageError>;

    /// Fetch one entry
    async fn get(&self, id: EntryId) -> Result<Option<EventEntry>, StorageError>;

    /// Up to `limit` entries of `guild`, newest first
    async fn list_for_guild(
        &self,
        guild: GuildId,
        limit: usize,
    ) -> Result<Vec<EventEntry>, StorageError>;
}

/// Partial update applied to a stored entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryPatch {
    /// Set the responsible user
    pub actor_user_id: Option<UserId>,
    /// Replace the reason when present and non-empty
    pub reason: Option<String>,
    /// Merged into the entry's options (existing keys are replaced)
    pub options: Vec<EventOption>,
    /// Appended to the entry's changes when their key is not yet present
    pub changes: Vec<Change>,
    /// Flip `waiting_for_backfill` to false; stale if already false
    pub complete_backfill: bool,
    /// Flip `reverted` to true; stale if already true
    pub mark_reverted: bool,
}

impl EntryPatch {
    /// Patch completing a backfill with the resolved actor
    pub fn backfill(actor: UserId) -> Self {
        Self {
            actor_user_id: Some(actor),
            complete_backfill: true,
            ..Default::default()
        }
    }

    /// Patch flagging an entry as reverted
    pub fn revert() -> Self {
        Self {
            mark_reverted: true,
            ..Default::default()
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_option(mut self, option: EventOption) -> Self {
        self.options.push(option);
        self
    }

    pub fn with_options(mut self, options: Vec<EventOption>) -> Self {
        self.options.extend(options);
        self
    }

    pub fn with_changes(mut self, changes: Vec<Change>) -> Self {
        self.changes.extend(changes);
        self
    }

    /// Apply to `entry` in place unless the entry already moved past the
    /// state this patch expects
    pub fn apply_to(&self, entry: &mut EventEntry) -> PatchOutcome {
        if self.complete_backfill && !entry.waiting_for_backfill {
            return PatchOutcome::Stale;
        }
        if self.mark_reverted && entry.reverted {
            return PatchOutcome::Stale;
        }

        if let Some(actor) = self.actor_user_id {
            entry.actor_user_id = Some(actor);
        }
        if let Some(reason) = &self.reason
            && !reason.is_empty()
        {
            entry.reason = reason.clone();
        }
        merge_options(&mut entry.options, self.options.clone());
        for change in &self.changes {
            if entry.change(&change.key).is_none() {
                entry.changes.push(change.clone());
            }
        }
        if self.complete_backfill {
            entry.waiting_for_backfill = false;
        }
        if self.mark_reverted {
            entry.reverted = true;
        }

        PatchOutcome::Applied
    }
}

/// Result of a guarded patch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    /// The patch was written
    Applied,
    /// The entry was already backfilled or reverted; nothing was written
    Stale,
}

impl PatchOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, PatchOutcome::Applied)
    }
}

/// Ordering used by `find_pending`: oldest first, then by id
pub(crate) fn oldest_first(a: &EventEntry, b: &EventEntry) -> Ordering {
    a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id))
}

/// Ordering used by `list_for_guild`: newest first, then by id
pub(crate) fn newest_first(a: &EventEntry, b: &EventEntry) -> Ordering {
    oldest_first(b, a)
}
