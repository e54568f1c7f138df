//! Change lists for channel and role updates
//!
//! Gateway handlers receive the previous and current state of an object;
//! these helpers turn the pair into the change keys stored on an entry.

use crate::event::{Change, TargetType, bool_to_str, color_to_hex};
use crate::platform::{ChannelKind, ChannelSnapshot, RoleSnapshot};
use crate::snowflake::Snowflake;

pub const CHANNEL_NAME: &str = "channel_name";
pub const CHANNEL_TOPIC: &str = "channel_topic";
pub const CHANNEL_NSFW: &str = "channel_nsfw";
pub const CHANNEL_BITRATE: &str = "channel_bitrate";
pub const CHANNEL_PARENT_ID: &str = "channel_parentid";

pub const ROLE_NAME: &str = "role_name";
pub const ROLE_MANAGED: &str = "role_managed";
pub const ROLE_MENTIONABLE: &str = "role_mentionable";
pub const ROLE_HOIST: &str = "role_hoist";
pub const ROLE_COLOR: &str = "role_color";
pub const ROLE_PERMISSIONS: &str = "role_permissions";

fn parent_str(parent: Option<Snowflake>) -> String {
    parent.map(|p| p.to_string()).unwrap_or_default()
}

/// Changes between two states of the same channel
pub fn diff_channel(old: &ChannelSnapshot, new: &ChannelSnapshot) -> Vec<Change> {
    let mut changes = Vec::new();

    if old.name != new.name {
        changes.push(Change::new(CHANNEL_NAME, &old.name, &new.name));
    }
    if old.topic != new.topic {
        changes.push(Change::new(CHANNEL_TOPIC, &old.topic, &new.topic));
    }
    if old.nsfw != new.nsfw {
        changes.push(Change::new(
            CHANNEL_NSFW,
            bool_to_str(old.nsfw),
            bool_to_str(new.nsfw),
        ));
    }
    if new.kind == ChannelKind::Voice && old.bitrate != new.bitrate {
        changes.push(Change::new(
            CHANNEL_BITRATE,
            old.bitrate.map(|b| b.to_string()).unwrap_or_default(),
            new.bitrate.map(|b| b.to_string()).unwrap_or_default(),
        ));
    }
    if old.parent_id != new.parent_id {
        changes.push(
            Change::new(
                CHANNEL_PARENT_ID,
                parent_str(old.parent_id),
                parent_str(new.parent_id),
            )
            .with_kind(TargetType::Channel),
        );
    }

    changes
}

/// Changes between two states of the same role
pub fn diff_role(old: &RoleSnapshot, new: &RoleSnapshot) -> Vec<Change> {
    let mut changes = Vec::new();

    if old.name != new.name {
        changes.push(Change::new(ROLE_NAME, &old.name, &new.name));
    }
    if old.managed != new.managed {
        changes.push(Change::new(
            ROLE_MANAGED,
            bool_to_str(old.managed),
            bool_to_str(new.managed),
        ));
    }
    if old.mentionable != new.mentionable {
        changes.push(Change::new(
            ROLE_MENTIONABLE,
            bool_to_str(old.mentionable),
            bool_to_str(new.mentionable),
        ));
    }
    if old.hoist != new.hoist {
        changes.push(Change::new(
            ROLE_HOIST,
            bool_to_str(old.hoist),
            bool_to_str(new.hoist),
        ));
    }
    if old.color != new.color {
        changes.push(Change::new(
            ROLE_COLOR,
            color_to_hex(old.color),
            color_to_hex(new.color),
        ));
    }
    if old.permissions != new.permissions {
        changes.push(
            Change::new(
                ROLE_PERMISSIONS,
                old.permissions.to_string(),
                new.permissions.to_string(),
            )
            .with_kind(TargetType::RolePermissions),
        );
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role() -> RoleSnapshot {
        RoleSnapshot {
            id: Snowflake(5),
            guild_id: Snowflake(1),
            name: "mods".into(),
            color: 0x00ff00,
            hoist: false,
            mentionable: true,
            managed: false,
            permissions: 8,
        }
    }

    #[test]
    fn test_diff_channel() {
        let old = ChannelSnapshot::text(Snowflake(2), Snowflake(1), "general");
        let mut new = old.clone();
        new.name = "lobby".into();
        new.nsfw = true;
        new.bitrate = Some(64000); // ignored for text channels
        new.parent_id = Some(Snowflake(7));

        let changes = diff_channel(&old, &new);
        let keys: Vec<_> = changes.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec![CHANNEL_NAME, CHANNEL_NSFW, CHANNEL_PARENT_ID]);
        assert_eq!(changes[1].new_value, "yes");
        assert_eq!(changes[2].old_value, "");
        assert_eq!(changes[2].new_value, "7");
    }

    #[test]
    fn test_diff_voice_bitrate() {
        let mut old = ChannelSnapshot::text(Snowflake(3), Snowflake(1), "voice");
        old.kind = ChannelKind::Voice;
        old.bitrate = Some(64000);
        let mut new = old.clone();
        new.bitrate = Some(96000);

        let changes = diff_channel(&old, &new);
        assert_eq!(changes, vec![Change::new(CHANNEL_BITRATE, "64000", "96000")]);
    }

    #[test]
    fn test_diff_role() {
        let old = role();
        let mut new = role();
        new.color = 0xff0000;
        new.permissions = 0;

        let changes = diff_role(&old, &new);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0], Change::new(ROLE_COLOR, "#00ff00", "#ff0000"));
        assert_eq!(changes[1].key, ROLE_PERMISSIONS);
        assert_eq!(changes[1].kind, Some(TargetType::RolePermissions));
    }

    #[test]
    fn test_diff_identical_is_empty() {
        assert!(diff_role(&role(), &role()).is_empty());
    }
}
