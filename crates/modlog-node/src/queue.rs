//! Pending backfill requests
//!
//! One set of guilds per backfill category. Requests are idempotent and the
//! correlator drains everything at once at the start of a cycle.

use std::collections::{BTreeMap, BTreeSet};

use modlog_core::{BackfillType, GuildId};
use parking_lot::Mutex;
use tracing::trace;

/// Deduplicated backfill requests keyed by category
///
/// A single lock covers every category so a drain never interleaves with an
/// enqueue. The lock is only held for map operations, never across an await.
#[derive(Debug, Default)]
pub struct BackfillQueue {
    pending: Mutex<BTreeMap<BackfillType, BTreeSet<GuildId>>>,
}

impl BackfillQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `guild` as needing a `backfill` pass
    ///
    /// Returns `false` when the request was already pending or the guild id
    /// is zero.
    pub fn request(&self, guild: GuildId, backfill: BackfillType) -> bool {
        if guild.is_zero() {
            return false;
        }
        let added = self
            .pending
            .lock()
            .entry(backfill)
            .or_default()
            .insert(guild);
        trace!(guild = %guild, %backfill, added, "Backfill requested");
        added
    }

    /// Take every pending request, leaving the queue empty
    ///
    /// Guild ids come back in ascending order within each category.
    pub fn drain_all(&self) -> BTreeMap<BackfillType, Vec<GuildId>> {
        let taken = std::mem::take(&mut *self.pending.lock());
        taken
            .into_iter()
            .filter(|(_, guilds)| !guilds.is_empty())
            .map(|(backfill, guilds)| (backfill, guilds.into_iter().collect()))
            .collect()
    }

    /// Number of pending (category, guild) pairs
    pub fn pending_count(&self) -> usize {
        self.pending.lock().values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pending_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modlog_core::Snowflake;
    use std::sync::Arc;

    #[test]
    fn test_requests_collapse() {
        let queue = BackfillQueue::new();
        assert!(queue.request(Snowflake(5), BackfillType::BanAdd));
        assert!(!queue.request(Snowflake(5), BackfillType::BanAdd));
        assert!(queue.request(Snowflake(5), BackfillType::RoleCreate));
        assert!(!queue.request(Snowflake(0), BackfillType::RoleCreate));
        assert_eq!(queue.pending_count(), 2);
    }

    #[test]
    fn test_drain_sorts_and_clears() {
        let queue = BackfillQueue::new();
        queue.request(Snowflake(9), BackfillType::ChannelDelete);
        queue.request(Snowflake(3), BackfillType::ChannelDelete);
        queue.request(Snowflake(7), BackfillType::EmojiCreate);

        let drained = queue.drain_all();
        assert_eq!(
            drained.get(&BackfillType::ChannelDelete),
            Some(&vec![Snowflake(3), Snowflake(9)])
        );
        assert_eq!(
            drained.get(&BackfillType::EmojiCreate),
            Some(&vec![Snowflake(7)])
        );
        assert!(queue.is_empty());
        assert!(queue.drain_all().is_empty());
    }

    #[test]
    fn test_concurrent_enqueue_and_drain_lose_nothing() {
        let queue = Arc::new(BackfillQueue::new());
        let producers: Vec<_> = (1..=4u64)
            .map(|t| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || {
                    for g in 1..=250u64 {
                        queue.request(Snowflake(t * 1000 + g), BackfillType::RoleUpdate);
                    }
                })
            })
            .collect();

        let mut seen = BTreeSet::new();
        while producers.iter().any(|p| !p.is_finished()) {
            for guilds in queue.drain_all().into_values() {
                seen.extend(guilds);
            }
        }
        for producer in producers {
            producer.join().unwrap();
        }
        for guilds in queue.drain_all().into_values() {
            seen.extend(guilds);
        }

        assert_eq!(seen.len(), 1000);
    }
}
