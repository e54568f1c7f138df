//! Collaborator traits consumed by the event log
//!
//! Everything the event log needs from the outside world goes through one of
//! these seams, so the recorder, correlator and revert engine can run against
//! the real platform client or against [`MockPlatform`](crate::MockPlatform).
//!
//! ## Key Traits
//!
//! - [`GuildSettings`]: per-guild settings lookup
//! - [`CapabilityCheck`]: whether the bot holds a capability in a guild
//! - [`AuditLogSource`]: platform audit-log query
//! - [`PlatformObjects`]: live channel/role read and update
//! - [`Clock`]: time abstraction for testability

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::audit::AuditEntry;
use crate::backfill::AuditLogAction;
use crate::error::PlatformError;
use crate::platform::{
    Capability, ChannelEdit, ChannelSnapshot, GuildSettingsRecord, RoleEdit, RoleSnapshot,
};
use crate::snowflake::{GuildId, Snowflake};

/// Per-guild settings lookup
#[async_trait]
pub trait GuildSettings: Send + Sync {
    async fn settings(&self, guild: GuildId) -> Result<GuildSettingsRecord, PlatformError>;
}

/// Capability check for the bot's own member in a guild
#[async_trait]
pub trait CapabilityCheck: Send + Sync {
    async fn has_capability(
        &self,
        guild: GuildId,
        capability: Capability,
    ) -> Result<bool, PlatformError>;
}

/// Platform audit-log query
#[async_trait]
pub trait AuditLogSource: Send + Sync {
    /// Fetch up to `limit` of the most recent entries of `action`, newest first
    async fn fetch_audit_log(
        &self,
        guild: GuildId,
        action: AuditLogAction,
        limit: usize,
    ) -> Result<Vec<AuditEntry>, PlatformError>;
}

/// Live object read/update used by revert
#[async_trait]
pub trait PlatformObjects: Send + Sync {
    async fn channel(
        &self,
        guild: GuildId,
        channel: Snowflake,
    ) -> Result<ChannelSnapshot, PlatformError>;

    async fn edit_channel(
        &self,
        guild: GuildId,
        channel: Snowflake,
        edit: &ChannelEdit,
    ) -> Result<ChannelSnapshot, PlatformError>;

    async fn role(&self, guild: GuildId, role: Snowflake) -> Result<RoleSnapshot, PlatformError>;

    async fn edit_role(
        &self,
        guild: GuildId,
        role: Snowflake,
        edit: &RoleEdit,
    ) -> Result<RoleSnapshot, PlatformError>;
}

/// Time abstraction for testability
pub trait Clock: Send + Sync {
    /// Get the current UTC datetime
    fn now_utc(&self) -> DateTime<Utc>;
}

/// Real clock implementation using system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to a settable instant
#[derive(Debug)]
pub struct FixedClock {
    now: parking_lot::Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: parking_lot::Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn _assert_object_safe(
        _: &dyn GuildSettings,
        _: &dyn CapabilityCheck,
        _: &dyn AuditLogSource,
        _: &dyn PlatformObjects,
        _: &dyn Clock,
    ) {
    }

    #[test]
    fn test_fixed_clock_advance() {
        let start = Utc::now();
        let clock = FixedClock::new(start);
        clock.advance(chrono::Duration::seconds(5));
        assert_eq!(clock.now_utc(), start + chrono::Duration::seconds(5));
    }
}
