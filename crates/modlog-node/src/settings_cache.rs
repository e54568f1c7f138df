//! TTL cache in front of guild settings and capability lookups
//!
//! The guard runs for every gateway occurrence and the correlator checks
//! every pending guild each cycle, so both read through this cache instead of
//! hitting the settings source directly.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use modlog_core::{
    Capability, CapabilityCheck, Clock, GuildId, GuildSettings, GuildSettingsRecord,
    PlatformError,
};
use tracing::trace;

#[derive(Debug, Clone, Copy)]
struct Cached<T> {
    value: T,
    fetched_at: DateTime<Utc>,
}

/// Settings and capability cache shared by the guard and correlator
pub struct SettingsCache {
    settings_source: Arc<dyn GuildSettings>,
    capability_source: Arc<dyn CapabilityCheck>,
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
    settings: DashMap<GuildId, Cached<GuildSettingsRecord>>,
    capabilities: DashMap<(GuildId, Capability), Cached<bool>>,
}

impl SettingsCache {
    pub fn new(
        settings_source: Arc<dyn GuildSettings>,
        capability_source: Arc<dyn CapabilityCheck>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
    ) -> Self {
        Self {
            settings_source,
            capability_source,
            clock,
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX),
            settings: DashMap::new(),
            capabilities: DashMap::new(),
        }
    }

    fn is_fresh(&self, fetched_at: DateTime<Utc>) -> bool {
        self.clock.now_utc() - fetched_at < self.ttl
    }

    /// Settings of `guild`, from cache while fresh
    pub async fn settings(&self, guild: GuildId) -> Result<GuildSettingsRecord, PlatformError> {
        if let Some(cached) = self.settings.get(&guild)
            && self.is_fresh(cached.fetched_at)
        {
            return Ok(cached.value);
        }

        trace!(guild = %guild, "Settings cache miss");
        let value = self.settings_source.settings(guild).await?;
        self.settings.insert(
            guild,
            Cached {
                value,
                fetched_at: self.clock.now_utc(),
            },
        );
        Ok(value)
    }

    /// Whether the bot holds `capability` in `guild`, from cache while fresh
    pub async fn has_capability(
        &self,
        guild: GuildId,
        capability: Capability,
    ) -> Result<bool, PlatformError> {
        let key = (guild, capability);
        if let Some(cached) = self.capabilities.get(&key)
            && self.is_fresh(cached.fetched_at)
        {
            return Ok(cached.value);
        }

        trace!(guild = %guild, ?capability, "Capability cache miss");
        let value = self
            .capability_source
            .has_capability(guild, capability)
            .await?;
        self.capabilities.insert(
            key,
            Cached {
                value,
                fetched_at: self.clock.now_utc(),
            },
        );
        Ok(value)
    }

    /// Whether the audit log may be read in `guild`
    ///
    /// Requires event logging to be enabled and either `Administrator` or
    /// `ViewAuditLog`.
    pub async fn should_backfill(&self, guild: GuildId) -> Result<bool, PlatformError> {
        if self.settings(guild).await?.eventlog_disabled {
            return Ok(false);
        }
        if self.has_capability(guild, Capability::Administrator).await? {
            return Ok(true);
        }
        self.has_capability(guild, Capability::ViewAuditLog).await
    }

    /// Drop every cached value of `guild`
    pub fn invalidate(&self, guild: GuildId) {
        self.settings.remove(&guild);
        self.capabilities.retain(|(g, _), _| *g != guild);
    }
}
