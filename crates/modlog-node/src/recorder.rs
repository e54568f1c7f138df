//! Event recorder
//!
//! Turns a [`NewEvent`] into a stored [`EventEntry`]. Recording never fails
//! from the caller's point of view: suppressed occurrences and store errors
//! both come back as `created = false`.

use std::sync::Arc;
use std::time::Duration;

use modlog_core::{Clock, EntryId, EventEntry, NewEvent, clean_changes, clean_options};
use modlog_storage::EventStore;
use tracing::{debug, instrument, warn};

use crate::guard::Guard;
use crate::queue::BackfillQueue;

/// Outcome of one `record_event` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordOutcome {
    /// Id of the stored entry, when one was written
    pub entry_id: Option<EntryId>,
    pub created: bool,
}

impl RecordOutcome {
    fn created(id: EntryId) -> Self {
        Self {
            entry_id: Some(id),
            created: true,
        }
    }

    pub(crate) fn skipped() -> Self {
        Self {
            entry_id: None,
            created: false,
        }
    }
}

/// Appends event entries to the store
#[derive(Clone)]
pub struct EventRecorder {
    store: Arc<dyn EventStore>,
    guard: Guard,
    queue: Arc<BackfillQueue>,
    clock: Arc<dyn Clock>,
    store_timeout: Duration,
}

impl EventRecorder {
    pub fn new(
        store: Arc<dyn EventStore>,
        guard: Guard,
        queue: Arc<BackfillQueue>,
        clock: Arc<dyn Clock>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            guard,
            queue,
            clock,
            store_timeout,
        }
    }

    /// Record an occurrence
    ///
    /// Normalizes changes and options, runs the guard, writes one entry, and
    /// requests a backfill when the entry waits for its actor.
    #[instrument(skip_all, fields(guild = %event.guild_id, action = %event.action_type))]
    pub async fn record(&self, event: NewEvent) -> RecordOutcome {
        let backfill = event.backfill_type();
        let changes = clean_changes(event.changes);
        let options = clean_options(event.options);

        if !self
            .guard
            .should_record(event.guild_id, event.action_type, &changes, &options)
            .await
        {
            return RecordOutcome::skipped();
        }

        let entry = EventEntry {
            id: EntryId::new(),
            created_at: event.created_at.unwrap_or_else(|| self.clock.now_utc()),
            guild_id: event.guild_id,
            target_id: event.target_id,
            target_type: event.target_type,
            actor_user_id: event.actor_user_id,
            action_type: event.action_type,
            reason: event.reason,
            changes,
            options,
            waiting_for_backfill: event.waiting_for_backfill,
            reverted: false,
        };
        let id = entry.id;
        let guild = entry.guild_id;

        match tokio::time::timeout(self.store_timeout, self.store.insert(entry)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(error = %e, "Failed to store event");
                return RecordOutcome::skipped();
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.store_timeout.as_millis() as u64,
                    "Event store insert timed out"
                );
                return RecordOutcome::skipped();
            }
        }

        if let Some(backfill) = backfill {
            self.queue.request(guild, backfill);
        }

        debug!(entry = %id, ?backfill, "Recorded event");
        RecordOutcome::created(id)
    }
}
