//! Audit-log backfill correlator
//!
//! Periodically drains the backfill queue, reads the recent audit log of each
//! requested (category, guild) pair and fills in the actor, reason and extra
//! options of the pending entries it can match.
//!
//! ## Supervision
//!
//! The cycle loop runs in its own task under a supervisor. If the loop task
//! dies (panic), the supervisor logs it and starts a fresh loop after the
//! configured restart backoff. Both stop on the node's shutdown broadcast.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::StreamExt;
use futures::stream;
use modlog_core::{AuditEntry, AuditLogSource, BackfillType, EntryId, GuildId};
use modlog_storage::{EntryPatch, EventStore, PatchOutcome, StorageError};
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use crate::backfill_rules::{BackfillRule, MatchTarget, rule_for};
use crate::config::ModlogConfig;
use crate::error::{EventlogError, EventlogResult};
use crate::queue::BackfillQueue;
use crate::settings_cache::SettingsCache;

/// How long the supervisor waits for a running cycle at shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Summary of one backfill cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// (category, guild) pairs drained from the queue
    pub pairs: usize,
    /// Pairs skipped for settings or missing permissions
    pub skipped: usize,
    /// Pairs abandoned after a fetch or store failure
    pub failed: usize,
    pub audit_requests: usize,
    /// Entries whose backfill was completed
    pub patched: usize,
    pub elapsed: Duration,
}

/// Cumulative correlator counters
#[derive(Debug, Default)]
pub struct CorrelatorStats {
    cycles: AtomicU64,
    restarts: AtomicU64,
    audit_requests: AtomicU64,
    patched: AtomicU64,
    failed: AtomicU64,
    last_cycle_ms: AtomicU64,
}

impl CorrelatorStats {
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    /// Times the supervisor restarted a dead cycle loop
    pub fn restarts(&self) -> u64 {
        self.restarts.load(Ordering::Relaxed)
    }

    pub fn audit_requests(&self) -> u64 {
        self.audit_requests.load(Ordering::Relaxed)
    }

    pub fn patched(&self) -> u64 {
        self.patched.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Duration of the most recent cycle
    pub fn last_cycle(&self) -> Duration {
        Duration::from_millis(self.last_cycle_ms.load(Ordering::Relaxed))
    }

    fn record(&self, report: &CycleReport) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.audit_requests
            .fetch_add(report.audit_requests as u64, Ordering::Relaxed);
        self.patched.fetch_add(report.patched as u64, Ordering::Relaxed);
        self.failed.fetch_add(report.failed as u64, Ordering::Relaxed);
        self.last_cycle_ms
            .store(report.elapsed.as_millis() as u64, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PairStatus {
    Completed,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Copy)]
struct PairResult {
    status: PairStatus,
    audit_requested: bool,
    patched: usize,
}

impl PairResult {
    fn skipped(audit_requested: bool) -> Self {
        Self {
            status: PairStatus::Skipped,
            audit_requested,
            patched: 0,
        }
    }

    fn failed(audit_requested: bool, patched: usize) -> Self {
        Self {
            status: PairStatus::Failed,
            audit_requested,
            patched,
        }
    }
}

/// Matches pending entries against the platform audit log
pub struct Correlator {
    queue: Arc<BackfillQueue>,
    store: Arc<dyn EventStore>,
    audit: Arc<dyn AuditLogSource>,
    settings: Arc<SettingsCache>,
    interval: Duration,
    restart_backoff: Duration,
    page_size: usize,
    max_concurrent_pairs: usize,
    fetch_timeout: Duration,
    store_timeout: Duration,
    match_window: Option<chrono::Duration>,
    /// Serializes patches to the same entry within this correlator
    entry_locks: DashMap<EntryId, Arc<Mutex<()>>>,
    stats: CorrelatorStats,
}

impl Correlator {
    pub fn new(
        queue: Arc<BackfillQueue>,
        store: Arc<dyn EventStore>,
        audit: Arc<dyn AuditLogSource>,
        settings: Arc<SettingsCache>,
        config: &ModlogConfig,
    ) -> Self {
        Self {
            queue,
            store,
            audit,
            settings,
            interval: config.backfill_interval(),
            restart_backoff: config.restart_backoff(),
            page_size: config.audit_page_size,
            max_concurrent_pairs: config.max_concurrent_pairs.max(1),
            fetch_timeout: config.fetch_timeout(),
            store_timeout: config.store_timeout(),
            match_window: config.match_window(),
            entry_locks: DashMap::new(),
            stats: CorrelatorStats::default(),
        }
    }

    pub fn stats(&self) -> &CorrelatorStats {
        &self.stats
    }

    /// Run one backfill cycle over everything currently queued
    #[instrument(skip_all)]
    pub async fn run_cycle(&self) -> CycleReport {
        let started = Instant::now();

        let pairs: Vec<(BackfillType, GuildId)> = self
            .queue
            .drain_all()
            .into_iter()
            .flat_map(|(backfill, guilds)| guilds.into_iter().map(move |g| (backfill, g)))
            .collect();

        let results: Vec<PairResult> = stream::iter(pairs.iter().copied())
            .map(|(backfill, guild)| self.process_pair(backfill, guild))
            .buffer_unordered(self.max_concurrent_pairs)
            .collect()
            .await;

        let mut report = CycleReport {
            pairs: pairs.len(),
            ..Default::default()
        };
        for result in &results {
            match result.status {
                PairStatus::Completed => {}
                PairStatus::Skipped => report.skipped += 1,
                PairStatus::Failed => report.failed += 1,
            }
            if result.audit_requested {
                report.audit_requests += 1;
            }
            report.patched += result.patched;
        }
        report.elapsed = started.elapsed();
        self.stats.record(&report);

        info!(
            pairs = report.pairs,
            skipped = report.skipped,
            failed = report.failed,
            "did {} audit log backfills, {} entries backfilled, took {:?}",
            report.audit_requests,
            report.patched,
            report.elapsed
        );
        report
    }

    #[instrument(skip(self), fields(guild = %guild))]
    async fn process_pair(&self, backfill: BackfillType, guild: GuildId) -> PairResult {
        let Some(rule) = rule_for(backfill) else {
            warn!("No backfill rule for category");
            return PairResult::failed(false, 0);
        };

        match tokio::time::timeout(self.fetch_timeout, self.settings.should_backfill(guild)).await
        {
            Ok(Ok(true)) => {}
            Ok(Ok(false)) => {
                debug!("Backfill not allowed for guild");
                return PairResult::skipped(false);
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Failed to check backfill settings");
                return PairResult::failed(false, 0);
            }
            Err(_) => {
                warn!("Backfill settings check timed out");
                return PairResult::failed(false, 0);
            }
        }

        let fetched = tokio::time::timeout(
            self.fetch_timeout,
            self.audit.fetch_audit_log(guild, rule.audit_action, self.page_size),
        )
        .await;
        let mut audit_entries = match fetched {
            Ok(Ok(entries)) => entries,
            Ok(Err(e)) if e.is_permission_denied() => {
                debug!("Missing audit log permission");
                return PairResult::skipped(true);
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Failed to fetch audit log");
                return PairResult::failed(true, 0);
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.fetch_timeout.as_millis() as u64,
                    "Audit log fetch timed out"
                );
                return PairResult::failed(true, 0);
            }
        };

        // oldest audit entry pairs with the oldest pending entry
        audit_entries.sort_by_key(|audit| audit.id);

        let mut patched = 0;
        for audit in &audit_entries {
            for target in rule.targets {
                match self.resolve(guild, rule, target, audit).await {
                    Ok(true) => patched += 1,
                    Ok(false) => {}
                    Err(e) => {
                        warn!(error = %e, audit_id = %audit.id, "Backfill abandoned");
                        return PairResult::failed(true, patched);
                    }
                }
            }
        }

        PairResult {
            status: PairStatus::Completed,
            audit_requested: true,
            patched,
        }
    }

    /// Patch the oldest pending entry `audit` accounts for through `target`
    async fn resolve(
        &self,
        guild: GuildId,
        rule: &BackfillRule,
        target: &MatchTarget,
        audit: &AuditEntry,
    ) -> EventlogResult<bool> {
        let candidates = self
            .bounded(self.store.find_pending(guild, &audit.target_id, &[target.action]))
            .await?;

        let audit_at = audit.created_at();
        let Some(entry) = candidates
            .into_iter()
            .find(|e| self.within_window(e.created_at, audit_at))
        else {
            return Ok(false);
        };

        let patch = EntryPatch::backfill(audit.actor_user_id)
            .with_reason(audit.reason.clone())
            .with_options(rule.options_for(target, audit));
        let outcome = self.patch_locked(entry.id, patch).await?;

        debug!(
            entry = %entry.id,
            actor = %audit.actor_user_id,
            action = %target.action,
            ?outcome,
            "Backfill matched"
        );
        Ok(outcome.is_applied())
    }

    fn within_window(&self, created_at: DateTime<Utc>, audit_at: DateTime<Utc>) -> bool {
        match self.match_window {
            Some(window) => (created_at - audit_at).abs() <= window,
            None => true,
        }
    }

    async fn patch_locked(&self, id: EntryId, patch: EntryPatch) -> EventlogResult<PatchOutcome> {
        let lock = self.entry_locks.entry(id).or_default().clone();
        let result = {
            let _held = lock.lock().await;
            self.bounded(self.store.patch(id, patch)).await
        };
        drop(lock);
        self.entry_locks.remove_if(&id, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    /// Await a store call under the store timeout
    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, StorageError>>,
    ) -> EventlogResult<T> {
        tokio::time::timeout(self.store_timeout, call)
            .await
            .map_err(|_| EventlogError::TransientFetch("event store call timed out".into()))?
            .map_err(EventlogError::from)
    }

    /// Spawn the supervised cycle loop
    pub fn spawn(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let mut worker = tokio::spawn(Arc::clone(&self).run(shutdown_rx.resubscribe()));

                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        // the worker may have subscribed after the signal went out
                        if tokio::time::timeout(SHUTDOWN_GRACE, &mut worker).await.is_err() {
                            worker.abort();
                        }
                        break;
                    }
                    result = &mut worker => {
                        if let Err(e) = result {
                            self.stats.restarts.fetch_add(1, Ordering::Relaxed);
                            error!(
                                error = %e,
                                backoff_secs = self.restart_backoff.as_secs(),
                                "Backfill loop died, restarting after backoff"
                            );
                        } else {
                            break;
                        }
                    }
                }

                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = tokio::time::sleep(self.restart_backoff) => {}
                }
            }
            info!("Backfill supervisor stopped");
        })
    }

    async fn run(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(interval_secs = self.interval.as_secs(), "Backfill loop started");

        let first = tokio::time::Instant::now() + self.interval;
        let mut interval = tokio::time::interval_at(first, self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Backfill loop shutting down");
                    break;
                }
                _ = interval.tick() => {
                    self.run_cycle().await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use modlog_core::{
        ActionType, AuditLogAction, Capability, EventEntry, FixedClock, MockPlatform,
        PlatformError, Snowflake, TargetType,
    };
    use modlog_storage::InMemoryEventStore;

    struct Harness {
        platform: Arc<MockPlatform>,
        store: Arc<InMemoryEventStore>,
        queue: Arc<BackfillQueue>,
        correlator: Correlator,
    }

    fn harness(config: ModlogConfig) -> Harness {
        let platform = Arc::new(MockPlatform::new());
        let store = Arc::new(InMemoryEventStore::new());
        let queue = Arc::new(BackfillQueue::new());
        let settings = Arc::new(SettingsCache::new(
            platform.clone(),
            platform.clone(),
            Arc::new(FixedClock::new(Utc::now())),
            Duration::from_secs(60),
        ));
        let correlator = Correlator::new(
            queue.clone(),
            store.clone(),
            platform.clone(),
            settings,
            &config,
        );
        Harness {
            platform,
            store,
            queue,
            correlator,
        }
    }

    fn pending(
        guild: GuildId,
        target: &str,
        action: ActionType,
        at: DateTime<Utc>,
    ) -> EventEntry {
        EventEntry {
            id: EntryId::new(),
            created_at: at,
            guild_id: guild,
            target_id: target.to_string(),
            target_type: TargetType::User,
            actor_user_id: None,
            action_type: action,
            reason: String::new(),
            changes: Vec::new(),
            options: Vec::new(),
            waiting_for_backfill: true,
            reverted: false,
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_600_000_000 + secs, 0).unwrap()
    }

    #[tokio::test]
    async fn test_oldest_pending_entry_wins() {
        let h = harness(ModlogConfig::default());
        let guild = Snowflake(1);
        let older = pending(guild, "77", ActionType::BanAdd, at(0));
        let newer = pending(guild, "77", ActionType::BanAdd, at(10));
        h.store.insert(newer.clone()).await.unwrap();
        h.store.insert(older.clone()).await.unwrap();

        h.platform.set_audit_log(
            guild,
            AuditLogAction::MemberBanAdd,
            vec![
                AuditEntry::new(Snowflake::from_timestamp(at(11)), "77", Snowflake(9))
                    .with_reason("raid"),
            ],
        );
        h.queue.request(guild, BackfillType::BanAdd);

        let report = h.correlator.run_cycle().await;
        assert_eq!(report.pairs, 1);
        assert_eq!(report.patched, 1);

        let older = h.store.get(older.id).await.unwrap().unwrap();
        assert_eq!(older.actor_user_id, Some(Snowflake(9)));
        assert_eq!(older.reason, "raid");
        assert!(!older.waiting_for_backfill);
        assert!(h.store.get(newer.id).await.unwrap().unwrap().waiting_for_backfill);
    }

    #[tokio::test]
    async fn test_audit_entries_pair_oldest_first() {
        let h = harness(ModlogConfig::default());
        let guild = Snowflake(1);
        let first = pending(guild, "20", ActionType::ChannelUpdate, at(0));
        let second = pending(guild, "20", ActionType::ChannelUpdate, at(30));
        h.store.insert(first.clone()).await.unwrap();
        h.store.insert(second.clone()).await.unwrap();

        // platform pages are newest first
        h.platform.set_audit_log(
            guild,
            AuditLogAction::ChannelUpdate,
            vec![
                AuditEntry::new(Snowflake::from_timestamp(at(30)), "20", Snowflake(222)),
                AuditEntry::new(Snowflake::from_timestamp(at(0)), "20", Snowflake(111)),
            ],
        );
        h.queue.request(guild, BackfillType::ChannelUpdate);

        assert_eq!(h.correlator.run_cycle().await.patched, 2);
        let first = h.store.get(first.id).await.unwrap().unwrap();
        let second = h.store.get(second.id).await.unwrap().unwrap();
        assert_eq!(first.actor_user_id, Some(Snowflake(111)));
        assert_eq!(second.actor_user_id, Some(Snowflake(222)));
    }

    #[tokio::test]
    async fn test_permission_denied_skips_pair() {
        let h = harness(ModlogConfig::default());
        let guild = Snowflake(1);
        h.platform.fail_audit_log(
            guild,
            AuditLogAction::RoleCreate,
            PlatformError::MissingPermissions,
        );
        h.queue.request(guild, BackfillType::RoleCreate);

        let report = h.correlator.run_cycle().await;
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, 0);
    }

    #[tokio::test]
    async fn test_missing_capability_never_fetches() {
        let h = harness(ModlogConfig::default());
        let guild = Snowflake(1);
        h.platform.deny_capabilities_by_default();
        h.queue.request(guild, BackfillType::RoleCreate);

        let report = h.correlator.run_cycle().await;
        assert_eq!(report.skipped, 1);
        assert_eq!(h.platform.audit_requests(), 0);

        h.platform.set_capability(guild, Capability::Administrator, true);
        h.queue.request(guild, BackfillType::RoleCreate);
        // capability answer is still cached
        assert_eq!(h.correlator.run_cycle().await.skipped, 1);
    }

    #[tokio::test]
    async fn test_failed_pair_does_not_block_others() {
        let h = harness(ModlogConfig::default());
        let entry = pending(Snowflake(2), "5", ActionType::RoleCreate, at(0));
        h.store.insert(entry.clone()).await.unwrap();

        h.platform.fail_audit_log(
            Snowflake(1),
            AuditLogAction::RoleCreate,
            PlatformError::Unavailable("gateway".into()),
        );
        h.platform.set_audit_log(
            Snowflake(2),
            AuditLogAction::RoleCreate,
            vec![AuditEntry::new(Snowflake(100), "5", Snowflake(3))],
        );
        h.queue.request(Snowflake(1), BackfillType::RoleCreate);
        h.queue.request(Snowflake(2), BackfillType::RoleCreate);

        let report = h.correlator.run_cycle().await;
        assert_eq!(report.failed, 1);
        assert_eq!(report.patched, 1);
        assert_eq!(h.correlator.stats().failed(), 1);
        assert!(!h.store.get(entry.id).await.unwrap().unwrap().waiting_for_backfill);
    }

    #[tokio::test]
    async fn test_match_window_rejects_distant_entries() {
        let config = ModlogConfig::default().with_match_window(Some(Duration::from_secs(30)));
        let h = harness(config);
        let guild = Snowflake(1);
        let stale = pending(guild, "5", ActionType::ChannelDelete, at(0));
        h.store.insert(stale.clone()).await.unwrap();

        h.platform.set_audit_log(
            guild,
            AuditLogAction::ChannelDelete,
            vec![AuditEntry::new(Snowflake::from_timestamp(at(600)), "5", Snowflake(3))],
        );
        h.queue.request(guild, BackfillType::ChannelDelete);

        assert_eq!(h.correlator.run_cycle().await.patched, 0);
        assert!(h.store.get(stale.id).await.unwrap().unwrap().waiting_for_backfill);
    }

    #[tokio::test]
    async fn test_empty_queue_cycle() {
        let h = harness(ModlogConfig::default());
        let report = h.correlator.run_cycle().await;
        assert_eq!(report.pairs, 0);
        assert_eq!(h.correlator.stats().cycles(), 1);
    }

    #[tokio::test]
    async fn test_entry_locks_are_released() {
        let h = harness(ModlogConfig::default());
        let guild = Snowflake(1);
        h.store
            .insert(pending(guild, "5", ActionType::EmojiCreate, at(0)))
            .await
            .unwrap();
        h.platform.set_audit_log(
            guild,
            AuditLogAction::EmojiCreate,
            vec![AuditEntry::new(Snowflake(100), "5", Snowflake(3))],
        );
        h.queue.request(guild, BackfillType::EmojiCreate);

        assert_eq!(h.correlator.run_cycle().await.patched, 1);
        assert!(h.correlator.entry_locks.is_empty());
    }
}
