//! Live platform objects and settings as seen by the event log

use serde::{Deserialize, Serialize};

use crate::snowflake::{GuildId, Snowflake};

/// Per-guild settings relevant to event logging
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildSettingsRecord {
    pub eventlog_disabled: bool,
    pub blacklisted: bool,
    /// Guild is on the limited feature tier
    pub limited: bool,
}

/// Platform capability held by the bot in a guild
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    Administrator,
    ViewAuditLog,
    ManageChannels,
    ManageRoles,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelKind {
    Text,
    Voice,
    Category,
    Other,
}

/// Current state of a guild channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSnapshot {
    pub id: Snowflake,
    pub guild_id: GuildId,
    pub kind: ChannelKind,
    pub name: String,
    pub topic: String,
    pub nsfw: bool,
    /// Voice channels only
    pub bitrate: Option<u32>,
    pub parent_id: Option<Snowflake>,
}

impl ChannelSnapshot {
    pub fn text(id: Snowflake, guild_id: GuildId, name: impl Into<String>) -> Self {
        Self {
            id,
            guild_id,
            kind: ChannelKind::Text,
            name: name.into(),
            topic: String::new(),
            nsfw: false,
            bitrate: None,
            parent_id: None,
        }
    }

    /// Apply an edit in place (used by test doubles and caches)
    pub fn apply(&mut self, edit: &ChannelEdit) {
        if let Some(name) = &edit.name {
            self.name = name.clone();
        }
        if let Some(topic) = &edit.topic {
            self.topic = topic.clone();
        }
        if let Some(nsfw) = edit.nsfw {
            self.nsfw = nsfw;
        }
        if let Some(bitrate) = edit.bitrate {
            self.bitrate = Some(bitrate);
        }
        if let Some(parent_id) = edit.parent_id {
            self.parent_id = parent_id;
        }
    }
}

/// Partial channel update; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelEdit {
    pub name: Option<String>,
    pub topic: Option<String>,
    pub nsfw: Option<bool>,
    pub bitrate: Option<u32>,
    /// `Some(None)` moves the channel out of its category
    pub parent_id: Option<Option<Snowflake>>,
}

impl ChannelEdit {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.topic.is_none()
            && self.nsfw.is_none()
            && self.bitrate.is_none()
            && self.parent_id.is_none()
    }
}

/// Current state of a guild role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSnapshot {
    pub id: Snowflake,
    pub guild_id: GuildId,
    pub name: String,
    pub color: u32,
    pub hoist: bool,
    pub mentionable: bool,
    pub managed: bool,
    pub permissions: u64,
}

/// Full role update; the platform replaces every field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleEdit {
    pub name: String,
    pub color: u32,
    pub hoist: bool,
    pub mentionable: bool,
    pub permissions: u64,
}

impl From<&RoleSnapshot> for RoleEdit {
    fn from(role: &RoleSnapshot) -> Self {
        Self {
            name: role.name.clone(),
            color: role.color,
            hoist: role.hoist,
            mentionable: role.mentionable,
            permissions: role.permissions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_apply_edit() {
        let mut channel = ChannelSnapshot::text(Snowflake(2), Snowflake(1), "general");
        channel.parent_id = Some(Snowflake(9));

        let edit = ChannelEdit {
            name: Some("lobby".into()),
            parent_id: Some(None),
            ..Default::default()
        };
        assert!(!edit.is_empty());
        channel.apply(&edit);

        assert_eq!(channel.name, "lobby");
        assert_eq!(channel.parent_id, None);
        assert_eq!(channel.topic, "");
    }
}
