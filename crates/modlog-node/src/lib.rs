//! # Modlog Node
//!
//! Guild event log coordinator.
//!
//! This crate provides [`ModlogNode`], which ties together:
//! - Recording (guard + normalization + event store)
//! - Audit-log backfill (request queue + supervised correlator loop)
//! - Reverting logged channel and role updates
//!
//! ## Example
//!
//! ```rust,ignore
//! use modlog_node::{ModlogConfig, ModlogNode, PlatformHandles};
//!
//! let config = ModlogConfig::from_file("modlog.toml")?;
//! let node = ModlogNode::open(config, PlatformHandles::from_platform(client)).await?;
//! node.start().await?;
//!
//! // A gateway handler saw a member disappear; the actor comes later
//! let leave = NewEvent::new(guild, user.to_string(), TargetType::User, ActionType::MemberLeave)
//!     .awaiting_backfill();
//! node.record_event(leave).await;
//!
//! // Later, from a moderation command
//! node.revert_by_id(entry_id, moderator).await?;
//! ```

pub mod backfill_rules;
mod config;
pub mod correlator;
mod error;
pub mod guard;
pub mod queue;
pub mod recorder;
pub mod revert;
pub mod settings_cache;

pub use backfill_rules::{BACKFILL_RULES, BackfillRule, MatchTarget, rule_for};
pub use config::{ConfigError, ModlogConfig};
pub use correlator::{Correlator, CorrelatorStats, CycleReport};
pub use error::{EventlogError, EventlogResult};
pub use guard::{Guard, SuppressReason, is_music_status_update};
pub use queue::BackfillQueue;
pub use recorder::{EventRecorder, RecordOutcome};
pub use revert::{REVERTED_BY_OPTION, RevertEngine, can_revert};
pub use settings_cache::SettingsCache;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use modlog_core::{
    ActionType, AuditLogSource, BackfillType, CapabilityCheck, ChannelSnapshot, Clock, EntryId,
    EventEntry, GuildId, GuildSettings, NewEvent, PlatformObjects, RoleSnapshot, SystemClock,
    TargetType, UserId, diff_channel, diff_role,
};
use modlog_storage::{EventStore, RedbEventStore};
use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;
use tracing::{info, instrument};

/// Platform collaborators the node talks to
#[derive(Clone)]
pub struct PlatformHandles {
    pub settings: Arc<dyn GuildSettings>,
    pub capabilities: Arc<dyn CapabilityCheck>,
    pub audit_log: Arc<dyn AuditLogSource>,
    pub objects: Arc<dyn PlatformObjects>,
}

impl PlatformHandles {
    /// Use one client for every collaborator
    pub fn from_platform<P>(platform: Arc<P>) -> Self
    where
        P: GuildSettings + CapabilityCheck + AuditLogSource + PlatformObjects + 'static,
    {
        Self {
            settings: platform.clone(),
            capabilities: platform.clone(),
            audit_log: platform.clone(),
            objects: platform,
        }
    }
}

/// Event log node
///
/// Records administrative occurrences, resolves their actors from the audit
/// log in the background, and reverts logged channel and role updates.
pub struct ModlogNode {
    /// Node configuration
    config: ModlogConfig,
    store: Arc<dyn EventStore>,
    queue: Arc<BackfillQueue>,
    settings: Arc<SettingsCache>,
    recorder: EventRecorder,
    correlator: Arc<Correlator>,
    reverter: RevertEngine,
    /// Shutdown signal sender
    shutdown_tx: broadcast::Sender<()>,
    /// Background task handles
    background_tasks: RwLock<Vec<JoinHandle<()>>>,
    /// Whether the node has been started
    started: AtomicBool,
}

impl ModlogNode {
    /// Create a node over an existing store
    ///
    /// Call [`start`](Self::start) to run the backfill loop.
    pub fn new(
        config: ModlogConfig,
        platform: PlatformHandles,
        store: Arc<dyn EventStore>,
        clock: Arc<dyn Clock>,
    ) -> EventlogResult<Self> {
        config.validate()?;

        let settings = Arc::new(SettingsCache::new(
            platform.settings,
            platform.capabilities,
            clock.clone(),
            config.settings_cache_ttl(),
        ));
        let queue = Arc::new(BackfillQueue::new());
        let recorder = EventRecorder::new(
            store.clone(),
            Guard::new(settings.clone()),
            queue.clone(),
            clock,
            config.store_timeout(),
        );
        let correlator = Arc::new(Correlator::new(
            queue.clone(),
            store.clone(),
            platform.audit_log,
            settings.clone(),
            &config,
        ));
        let reverter = RevertEngine::new(
            platform.objects,
            recorder.clone(),
            store.clone(),
            config.store_timeout(),
        );
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config,
            store,
            queue,
            settings,
            recorder,
            correlator,
            reverter,
            shutdown_tx,
            background_tasks: RwLock::new(Vec::new()),
            started: AtomicBool::new(false),
        })
    }

    /// Create a node backed by the redb store named in `config`
    #[instrument(skip_all, fields(db_path = %config.store.db_path.display()))]
    pub async fn open(config: ModlogConfig, platform: PlatformHandles) -> EventlogResult<Self> {
        let store = RedbEventStore::open(config.store.clone())?;
        let node = Self::new(config, platform, Arc::new(store), Arc::new(SystemClock))?;
        info!("Node created");
        Ok(node)
    }

    /// Start the supervised backfill loop
    #[instrument(skip(self))]
    pub async fn start(&self) -> EventlogResult<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(EventlogError::AlreadyStarted);
        }

        let correlator_task =
            Arc::clone(&self.correlator).spawn(self.shutdown_tx.subscribe());
        self.background_tasks.write().await.push(correlator_task);

        info!(
            interval_secs = self.config.backfill_interval_secs,
            "Node started"
        );
        Ok(())
    }

    /// Stop background tasks
    ///
    /// Pending backfill requests stay queued; a restarted node picks them up.
    #[instrument(skip(self))]
    pub async fn stop(&self) -> EventlogResult<()> {
        if !self.started.swap(false, Ordering::SeqCst) {
            return Ok(()); // Already stopped
        }

        // Signal shutdown
        let _ = self.shutdown_tx.send(());

        let mut tasks = self.background_tasks.write().await;
        for task in tasks.drain(..) {
            let _ = task.await;
        }

        info!("Node stopped");
        Ok(())
    }

    /// Check if the node is started
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &ModlogConfig {
        &self.config
    }

    /// Record an occurrence; never fails, see [`RecordOutcome`]
    pub async fn record_event(&self, event: NewEvent) -> RecordOutcome {
        self.recorder.record(event).await
    }

    /// Queue a backfill pass for `guild`
    ///
    /// Returns `false` when the request was already pending.
    pub fn request_backfill(&self, guild: GuildId, backfill: BackfillType) -> bool {
        self.queue.request(guild, backfill)
    }

    /// Record a channel update observed on the gateway
    ///
    /// Nothing is recorded when the snapshots differ in no logged field.
    pub async fn on_channel_update(
        &self,
        old: &ChannelSnapshot,
        new: &ChannelSnapshot,
    ) -> RecordOutcome {
        let changes = diff_channel(old, new);
        if changes.is_empty() {
            return RecordOutcome::skipped();
        }
        let event = NewEvent::new(
            new.guild_id,
            new.id.to_string(),
            TargetType::Channel,
            ActionType::ChannelUpdate,
        )
        .changes(changes)
        .awaiting_backfill();
        self.recorder.record(event).await
    }

    /// Record a role update observed on the gateway
    pub async fn on_role_update(&self, old: &RoleSnapshot, new: &RoleSnapshot) -> RecordOutcome {
        let changes = diff_role(old, new);
        if changes.is_empty() {
            return RecordOutcome::skipped();
        }
        let event = NewEvent::new(
            new.guild_id,
            new.id.to_string(),
            TargetType::Role,
            ActionType::RoleUpdate,
        )
        .changes(changes)
        .awaiting_backfill();
        self.recorder.record(event).await
    }

    /// Whether `entry` can be reverted
    pub fn can_revert(&self, entry: &EventEntry) -> bool {
        can_revert(entry)
    }

    /// Revert a logged channel or role update
    pub async fn revert(
        &self,
        entry_id: EntryId,
        actor: UserId,
        entry: &EventEntry,
    ) -> EventlogResult<()> {
        self.reverter.revert(entry_id, actor, entry).await
    }

    /// Load an entry and revert it
    pub async fn revert_by_id(&self, entry_id: EntryId, actor: UserId) -> EventlogResult<()> {
        self.reverter.revert_by_id(entry_id, actor).await
    }

    /// Up to `limit` entries of `guild`, newest first
    pub async fn list_entries(
        &self,
        guild: GuildId,
        limit: usize,
    ) -> EventlogResult<Vec<EventEntry>> {
        Ok(self.store.list_for_guild(guild, limit).await?)
    }

    /// Fetch one entry
    pub async fn entry(&self, id: EntryId) -> EventlogResult<Option<EventEntry>> {
        Ok(self.store.get(id).await?)
    }

    /// Run one backfill cycle immediately
    pub async fn run_backfill_cycle(&self) -> CycleReport {
        self.correlator.run_cycle().await
    }

    pub fn correlator_stats(&self) -> &CorrelatorStats {
        self.correlator.stats()
    }

    /// Drop cached settings and capabilities of `guild`
    ///
    /// Call when the guild's settings or the bot's roles change.
    pub fn invalidate_guild(&self, guild: GuildId) {
        self.settings.invalidate(guild);
    }

    /// Pending (category, guild) backfill pairs
    pub fn pending_backfills(&self) -> usize {
        self.queue.pending_count()
    }
}
