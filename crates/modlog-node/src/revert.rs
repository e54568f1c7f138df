//! Revert engine
//!
//! Restores the previous state of a channel or role from a logged update and
//! records the revert in the log itself.

use std::sync::Arc;
use std::time::Duration;

use modlog_core::{
    ActionType, ChannelEdit, EntryId, EventEntry, EventOption, NewEvent, PlatformObjects,
    RoleEdit, Snowflake, TargetType, UserId, diff, hex_to_color, str_to_bool,
};
use modlog_storage::{EntryPatch, EventStore};
use tracing::{debug, info, instrument, warn};

use crate::error::{EventlogError, EventlogResult};
use crate::recorder::EventRecorder;

/// Option linking an entry to the user who reverted it
pub const REVERTED_BY_OPTION: &str = "reverted_by_userid";

/// Channel change keys that can be restored
pub const REVERTIBLE_CHANNEL_KEYS: [&str; 5] = [
    diff::CHANNEL_NAME,
    diff::CHANNEL_TOPIC,
    diff::CHANNEL_NSFW,
    diff::CHANNEL_BITRATE,
    diff::CHANNEL_PARENT_ID,
];

/// Role change keys that can be restored
pub const REVERTIBLE_ROLE_KEYS: [&str; 5] = [
    diff::ROLE_NAME,
    diff::ROLE_MENTIONABLE,
    diff::ROLE_HOIST,
    diff::ROLE_COLOR,
    diff::ROLE_PERMISSIONS,
];

/// Whether `entry` can be reverted
///
/// Only channel and role updates carrying at least one restorable change
/// qualify, and only once.
pub fn can_revert(entry: &EventEntry) -> bool {
    if entry.reverted || entry.changes.is_empty() {
        return false;
    }
    let keys: &[&str] = match entry.action_type {
        ActionType::ChannelUpdate => &REVERTIBLE_CHANNEL_KEYS,
        ActionType::RoleUpdate => &REVERTIBLE_ROLE_KEYS,
        _ => return false,
    };
    entry
        .changes
        .iter()
        .any(|change| keys.contains(&change.key.as_str()))
}

fn unparsable(key: &str, value: &str) {
    warn!(key, value, "Skipping unparsable value in revert");
}

/// Edit restoring the old values of a channel update
fn channel_edit(entry: &EventEntry) -> ChannelEdit {
    let mut edit = ChannelEdit::default();
    for change in &entry.changes {
        let old = change.old_value.as_str();
        match change.key.as_str() {
            diff::CHANNEL_NAME => edit.name = Some(old.to_string()),
            diff::CHANNEL_TOPIC => edit.topic = Some(old.to_string()),
            diff::CHANNEL_NSFW => match str_to_bool(old) {
                Some(nsfw) => edit.nsfw = Some(nsfw),
                None => unparsable(&change.key, old),
            },
            diff::CHANNEL_BITRATE => match old.parse::<u32>() {
                Ok(bitrate) => edit.bitrate = Some(bitrate),
                Err(_) => unparsable(&change.key, old),
            },
            diff::CHANNEL_PARENT_ID if old.is_empty() => edit.parent_id = Some(None),
            diff::CHANNEL_PARENT_ID => match old.parse::<Snowflake>() {
                Ok(parent) => edit.parent_id = Some(Some(parent)),
                Err(_) => unparsable(&change.key, old),
            },
            _ => {}
        }
    }
    edit
}

/// Overlay the old values of a role update onto the role's current state
fn overlay_role(edit: &mut RoleEdit, entry: &EventEntry) {
    for change in &entry.changes {
        let old = change.old_value.as_str();
        match change.key.as_str() {
            diff::ROLE_NAME => edit.name = old.to_string(),
            diff::ROLE_MENTIONABLE => match str_to_bool(old) {
                Some(mentionable) => edit.mentionable = mentionable,
                None => unparsable(&change.key, old),
            },
            diff::ROLE_HOIST => match str_to_bool(old) {
                Some(hoist) => edit.hoist = hoist,
                None => unparsable(&change.key, old),
            },
            diff::ROLE_COLOR => match hex_to_color(old) {
                Some(color) => edit.color = color,
                None => unparsable(&change.key, old),
            },
            diff::ROLE_PERMISSIONS => match old.parse::<u64>() {
                Ok(permissions) => edit.permissions = permissions,
                Err(_) => unparsable(&change.key, old),
            },
            _ => {}
        }
    }
}

/// Applies reverts against the live platform
#[derive(Clone)]
pub struct RevertEngine {
    platform: Arc<dyn PlatformObjects>,
    recorder: EventRecorder,
    store: Arc<dyn EventStore>,
    store_timeout: Duration,
}

impl RevertEngine {
    pub fn new(
        platform: Arc<dyn PlatformObjects>,
        recorder: EventRecorder,
        store: Arc<dyn EventStore>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            platform,
            recorder,
            store,
            store_timeout,
        }
    }

    /// Revert the change logged by `entry` on behalf of `actor`
    ///
    /// # Errors
    ///
    /// - [`EventlogError::Validation`] if the entry cannot be reverted
    /// - [`EventlogError::Platform`] if the live object could not be read or updated
    #[instrument(skip(self, entry), fields(guild = %entry.guild_id, action = %entry.action_type))]
    pub async fn revert(
        &self,
        entry_id: EntryId,
        actor: UserId,
        entry: &EventEntry,
    ) -> EventlogResult<()> {
        if !can_revert(entry) {
            return Err(EventlogError::validation(format!(
                "entry {} cannot be reverted",
                entry_id
            )));
        }
        let target: Snowflake = entry.target_id.parse().map_err(|_| {
            EventlogError::validation(format!("invalid target id {:?}", entry.target_id))
        })?;

        match entry.action_type {
            ActionType::ChannelUpdate => {
                // confirms the channel still exists
                self.platform.channel(entry.guild_id, target).await?;
                let edit = channel_edit(entry);
                if edit.is_empty() {
                    return Err(EventlogError::validation(
                        "no restorable channel values",
                    ));
                }
                self.platform
                    .edit_channel(entry.guild_id, target, &edit)
                    .await?;
            }
            ActionType::RoleUpdate => {
                let live = self.platform.role(entry.guild_id, target).await?;
                let mut edit = RoleEdit::from(&live);
                overlay_role(&mut edit, entry);
                self.platform.edit_role(entry.guild_id, target, &edit).await?;
            }
            other => {
                return Err(EventlogError::validation(format!(
                    "{} entries cannot be reverted",
                    other
                )));
            }
        }

        let reverted_by = EventOption::new(REVERTED_BY_OPTION, actor.to_string())
            .with_kind(TargetType::User);

        let revert_event = NewEvent::new(
            entry.guild_id,
            entry_id.to_string(),
            TargetType::EventlogItem,
            ActionType::Revert,
        )
        .actor(actor)
        .option(reverted_by.clone());
        let recorded = self.recorder.record(revert_event).await;
        debug!(created = recorded.created, "Recorded revert entry");

        let patch = EntryPatch::revert().with_option(reverted_by);
        match tokio::time::timeout(self.store_timeout, self.store.patch(entry_id, patch)).await {
            Ok(Ok(outcome)) if outcome.is_applied() => {
                info!(entry = %entry_id, actor = %actor, "Reverted entry");
            }
            Ok(Ok(_)) => debug!(entry = %entry_id, "Entry was already marked reverted"),
            Ok(Err(e)) => warn!(entry = %entry_id, error = %e, "Failed to mark entry reverted"),
            Err(_) => warn!(entry = %entry_id, "Marking entry reverted timed out"),
        }
        Ok(())
    }

    /// Load an entry and revert it
    ///
    /// # Errors
    ///
    /// Returns [`EventlogError::NotFound`] when no entry has this id, and
    /// otherwise the same errors as [`revert`](Self::revert).
    pub async fn revert_by_id(&self, entry_id: EntryId, actor: UserId) -> EventlogResult<()> {
        let entry = tokio::time::timeout(self.store_timeout, self.store.get(entry_id))
            .await
            .map_err(|_| EventlogError::TransientFetch("event store call timed out".into()))??
            .ok_or_else(|| EventlogError::not_found(format!("entry {}", entry_id)))?;
        self.revert(entry_id, actor, &entry).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use modlog_core::{Change, GuildId};

    fn entry(action: ActionType, changes: Vec<Change>) -> EventEntry {
        EventEntry {
            id: EntryId::new(),
            created_at: Utc::now(),
            guild_id: GuildId::new(1),
            target_id: "20".into(),
            target_type: TargetType::Channel,
            actor_user_id: None,
            action_type: action,
            reason: String::new(),
            changes,
            options: Vec::new(),
            waiting_for_backfill: false,
            reverted: false,
        }
    }

    #[test]
    fn test_can_revert() {
        let name = Change::new(diff::CHANNEL_NAME, "a", "b");
        assert!(can_revert(&entry(ActionType::ChannelUpdate, vec![name.clone()])));
        assert!(!can_revert(&entry(ActionType::ChannelUpdate, vec![])));
        assert!(!can_revert(&entry(ActionType::ChannelCreate, vec![name.clone()])));
        // channel key on a role update
        assert!(!can_revert(&entry(ActionType::RoleUpdate, vec![name.clone()])));
        assert!(!can_revert(&entry(
            ActionType::RoleUpdate,
            vec![Change::new(diff::ROLE_MANAGED, "no", "yes")]
        )));

        let mut reverted = entry(ActionType::ChannelUpdate, vec![name]);
        reverted.reverted = true;
        assert!(!can_revert(&reverted));
    }

    #[test]
    fn test_channel_edit_from_old_values() {
        let edit = channel_edit(&entry(
            ActionType::ChannelUpdate,
            vec![
                Change::new(diff::CHANNEL_NAME, "general", "chat"),
                Change::new(diff::CHANNEL_NSFW, "no", "yes"),
                Change::new(diff::CHANNEL_BITRATE, "fast", "64000"),
                Change::new(diff::CHANNEL_PARENT_ID, "", "99"),
                Change::new("channel_slowmode", "0", "5"),
            ],
        ));
        assert_eq!(
            edit,
            ChannelEdit {
                name: Some("general".into()),
                nsfw: Some(false),
                parent_id: Some(None),
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_role_overlay_keeps_untouched_fields() {
        let mut edit = RoleEdit {
            name: "Mods".into(),
            color: 0xff0000,
            hoist: true,
            mentionable: true,
            permissions: 8,
        };
        overlay_role(
            &mut edit,
            &entry(
                ActionType::RoleUpdate,
                vec![
                    Change::new(diff::ROLE_COLOR, "#00ff00", "#ff0000"),
                    Change::new(diff::ROLE_PERMISSIONS, "0", "8"),
                ],
            ),
        );
        assert_eq!(edit.color, 0x00ff00);
        assert_eq!(edit.permissions, 0);
        assert_eq!(edit.name, "Mods");
        assert!(edit.hoist);
    }
}
