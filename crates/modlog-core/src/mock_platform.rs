//! Mock platform implementation for testing
//!
//! Provides an in-memory stand-in for every collaborator trait so the
//! recorder, correlator and revert engine can be exercised without a live
//! platform connection.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use modlog_core::{AuditEntry, AuditLogAction, MockPlatform, Snowflake};
//!
//! let platform = MockPlatform::new();
//! let guild = Snowflake::new(1);
//!
//! // Script the audit log for a guild
//! platform.set_audit_log(guild, AuditLogAction::MemberBanAdd, vec![
//!     AuditEntry::new(Snowflake::new(99), "42", Snowflake::new(7)).with_reason("spam"),
//! ]);
//!
//! // Disable event logging for another guild
//! platform.disable_eventlog(Snowflake::new(2));
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::audit::AuditEntry;
use crate::backfill::AuditLogAction;
use crate::error::PlatformError;
use crate::platform::{
    Capability, ChannelEdit, ChannelSnapshot, GuildSettingsRecord, RoleEdit, RoleSnapshot,
};
use crate::snowflake::{GuildId, Snowflake};
use crate::traits::{AuditLogSource, CapabilityCheck, GuildSettings, PlatformObjects};

/// Scripted audit-log response
type AuditResponse = Result<Vec<AuditEntry>, PlatformError>;

/// In-memory platform for tests
///
/// Capabilities default to granted; audit logs default to empty.
#[derive(Debug, Default)]
pub struct MockPlatform {
    settings: DashMap<GuildId, GuildSettingsRecord>,
    capabilities: DashMap<(GuildId, Capability), bool>,
    deny_by_default: AtomicBool,
    audit_logs: DashMap<(GuildId, AuditLogAction), AuditResponse>,
    audit_delay: Mutex<Option<Duration>>,
    channels: DashMap<Snowflake, ChannelSnapshot>,
    roles: DashMap<Snowflake, RoleSnapshot>,
    fail_edits: Mutex<Option<PlatformError>>,
    channel_edits: Mutex<Vec<(Snowflake, ChannelEdit)>>,
    role_edits: Mutex<Vec<(Snowflake, RoleEdit)>>,
    settings_lookups: AtomicUsize,
    capability_lookups: AtomicUsize,
    audit_requests: AtomicUsize,
    audit_request_log: Mutex<Vec<(GuildId, AuditLogAction, usize)>>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the settings of a guild
    pub fn set_settings(&self, guild: GuildId, settings: GuildSettingsRecord) {
        self.settings.insert(guild, settings);
    }

    pub fn disable_eventlog(&self, guild: GuildId) {
        self.settings.entry(guild).or_default().eventlog_disabled = true;
    }

    pub fn enable_eventlog(&self, guild: GuildId) {
        self.settings.entry(guild).or_default().eventlog_disabled = false;
    }

    pub fn set_capability(&self, guild: GuildId, capability: Capability, granted: bool) {
        self.capabilities.insert((guild, capability), granted);
    }

    /// Treat capabilities without an explicit entry as missing
    pub fn deny_capabilities_by_default(&self) {
        self.deny_by_default.store(true, Ordering::SeqCst);
    }

    /// Script the entries returned for `(guild, action)`
    pub fn set_audit_log(&self, guild: GuildId, action: AuditLogAction, entries: Vec<AuditEntry>) {
        self.audit_logs.insert((guild, action), Ok(entries));
    }

    /// Script a failure for `(guild, action)`
    pub fn fail_audit_log(&self, guild: GuildId, action: AuditLogAction, error: PlatformError) {
        self.audit_logs.insert((guild, action), Err(error));
    }

    /// Delay every audit-log response (for timeout tests)
    pub fn set_audit_delay(&self, delay: Option<Duration>) {
        *self.audit_delay.lock() = delay;
    }

    pub fn insert_channel(&self, channel: ChannelSnapshot) {
        self.channels.insert(channel.id, channel);
    }

    pub fn insert_role(&self, role: RoleSnapshot) {
        self.roles.insert(role.id, role);
    }

    /// Make every subsequent edit fail with `error`
    pub fn fail_edits(&self, error: Option<PlatformError>) {
        *self.fail_edits.lock() = error;
    }

    pub fn channel_snapshot(&self, id: Snowflake) -> Option<ChannelSnapshot> {
        self.channels.get(&id).map(|c| c.clone())
    }

    pub fn role_snapshot(&self, id: Snowflake) -> Option<RoleSnapshot> {
        self.roles.get(&id).map(|r| r.clone())
    }

    pub fn channel_edits(&self) -> Vec<(Snowflake, ChannelEdit)> {
        self.channel_edits.lock().clone()
    }

    pub fn role_edits(&self) -> Vec<(Snowflake, RoleEdit)> {
        self.role_edits.lock().clone()
    }

    pub fn settings_lookups(&self) -> usize {
        self.settings_lookups.load(Ordering::SeqCst)
    }

    pub fn capability_lookups(&self) -> usize {
        self.capability_lookups.load(Ordering::SeqCst)
    }

    pub fn audit_requests(&self) -> usize {
        self.audit_requests.load(Ordering::SeqCst)
    }

    /// Every audit request made so far, in order
    pub fn audit_request_log(&self) -> Vec<(GuildId, AuditLogAction, usize)> {
        self.audit_request_log.lock().clone()
    }

    fn edit_error(&self) -> Option<PlatformError> {
        self.fail_edits.lock().clone()
    }
}

#[async_trait]
impl GuildSettings for MockPlatform {
    async fn settings(&self, guild: GuildId) -> Result<GuildSettingsRecord, PlatformError> {
        self.settings_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.settings.get(&guild).map(|s| *s).unwrap_or_default())
    }
}

#[async_trait]
impl CapabilityCheck for MockPlatform {
    async fn has_capability(
        &self,
        guild: GuildId,
        capability: Capability,
    ) -> Result<bool, PlatformError> {
        self.capability_lookups.fetch_add(1, Ordering::SeqCst);
        let default = !self.deny_by_default.load(Ordering::SeqCst);
        Ok(self
            .capabilities
            .get(&(guild, capability))
            .map(|granted| *granted)
            .unwrap_or(default))
    }
}

#[async_trait]
impl AuditLogSource for MockPlatform {
    async fn fetch_audit_log(
        &self,
        guild: GuildId,
        action: AuditLogAction,
        limit: usize,
    ) -> Result<Vec<AuditEntry>, PlatformError> {
        self.audit_requests.fetch_add(1, Ordering::SeqCst);
        self.audit_request_log.lock().push((guild, action, limit));

        let delay = *self.audit_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match self.audit_logs.get(&(guild, action)) {
            Some(response) => response
                .clone()
                .map(|entries| entries.into_iter().take(limit).collect()),
            None => Ok(Vec::new()),
        }
    }
}

#[async_trait]
impl PlatformObjects for MockPlatform {
    async fn channel(
        &self,
        _guild: GuildId,
        channel: Snowflake,
    ) -> Result<ChannelSnapshot, PlatformError> {
        self.channels
            .get(&channel)
            .map(|c| c.clone())
            .ok_or_else(|| PlatformError::NotFound(format!("channel {}", channel)))
    }

    async fn edit_channel(
        &self,
        _guild: GuildId,
        channel: Snowflake,
        edit: &ChannelEdit,
    ) -> Result<ChannelSnapshot, PlatformError> {
        if let Some(err) = self.edit_error() {
            return Err(err);
        }
        let mut current = self
            .channels
            .get_mut(&channel)
            .ok_or_else(|| PlatformError::NotFound(format!("channel {}", channel)))?;
        current.apply(edit);
        self.channel_edits.lock().push((channel, edit.clone()));
        Ok(current.clone())
    }

    async fn role(&self, _guild: GuildId, role: Snowflake) -> Result<RoleSnapshot, PlatformError> {
        self.roles
            .get(&role)
            .map(|r| r.clone())
            .ok_or_else(|| PlatformError::NotFound(format!("role {}", role)))
    }

    async fn edit_role(
        &self,
        _guild: GuildId,
        role: Snowflake,
        edit: &RoleEdit,
    ) -> Result<RoleSnapshot, PlatformError> {
        if let Some(err) = self.edit_error() {
            return Err(err);
        }
        let mut current = self
            .roles
            .get_mut(&role)
            .ok_or_else(|| PlatformError::NotFound(format!("role {}", role)))?;
        current.name = edit.name.clone();
        current.color = edit.color;
        current.hoist = edit.hoist;
        current.mentionable = edit.mentionable;
        current.permissions = edit.permissions;
        self.role_edits.lock().push((role, edit.clone()));
        Ok(current.clone())
    }
}
