//! Event log records
//!
//! An [`EventEntry`] is the persisted record of one administrative
//! occurrence in a guild. Entries are created once, then only patched by
//! audit-log backfill or flagged as reverted.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::backfill::BackfillType;
use crate::snowflake::{GuildId, UserId};

/// Globally unique identifier of an event entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntryId(Uuid);

impl EntryId {
    /// Generate a fresh random identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Raw 16 bytes (used as storage key)
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Rebuild from raw bytes
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for EntryId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for EntryId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Kind of administrative action an entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ActionType {
    MemberJoin,
    MemberLeave,
    MemberUpdate,
    ChannelCreate,
    ChannelUpdate,
    ChannelDelete,
    RoleCreate,
    RoleUpdate,
    RoleDelete,
    BanAdd,
    BanRemove,
    EmojiCreate,
    EmojiUpdate,
    EmojiDelete,
    GuildUpdate,
    /// A previously logged change was reverted through the log
    Revert,
}

impl ActionType {
    /// Stable display name
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::MemberJoin => "Member_Join",
            ActionType::MemberLeave => "Member_Leave",
            ActionType::MemberUpdate => "Member_Update",
            ActionType::ChannelCreate => "Channel_Create",
            ActionType::ChannelUpdate => "Channel_Update",
            ActionType::ChannelDelete => "Channel_Delete",
            ActionType::RoleCreate => "Role_Create",
            ActionType::RoleUpdate => "Role_Update",
            ActionType::RoleDelete => "Role_Delete",
            ActionType::BanAdd => "Ban_Add",
            ActionType::BanRemove => "Ban_Remove",
            ActionType::EmojiCreate => "Emoji_Create",
            ActionType::EmojiUpdate => "Emoji_Update",
            ActionType::EmojiDelete => "Emoji_Delete",
            ActionType::GuildUpdate => "Guild_Update",
            ActionType::Revert => "Action_Revert",
        }
    }

    /// Backfill category used when an entry of this type waits for its actor
    ///
    /// `MemberLeave` resolves through kick entries; bans are requested
    /// explicitly by the ban handler.
    pub fn default_backfill(&self) -> Option<BackfillType> {
        match self {
            ActionType::ChannelCreate => Some(BackfillType::ChannelCreate),
            ActionType::ChannelUpdate => Some(BackfillType::ChannelUpdate),
            ActionType::ChannelDelete => Some(BackfillType::ChannelDelete),
            ActionType::RoleCreate => Some(BackfillType::RoleCreate),
            ActionType::RoleUpdate => Some(BackfillType::RoleUpdate),
            ActionType::RoleDelete => Some(BackfillType::RoleDelete),
            ActionType::BanAdd => Some(BackfillType::BanAdd),
            ActionType::BanRemove => Some(BackfillType::BanRemove),
            ActionType::MemberLeave => Some(BackfillType::MemberRemove),
            ActionType::MemberUpdate => Some(BackfillType::MemberUpdate),
            ActionType::EmojiCreate => Some(BackfillType::EmojiCreate),
            ActionType::EmojiUpdate => Some(BackfillType::EmojiUpdate),
            ActionType::EmojiDelete => Some(BackfillType::EmojiDelete),
            ActionType::GuildUpdate => Some(BackfillType::GuildUpdate),
            ActionType::MemberJoin | ActionType::Revert => None,
        }
    }
}

impl Display for ActionType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of object an entry (or a change/option value) refers to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetType {
    User,
    Channel,
    Role,
    Guild,
    Emoji,
    Message,
    /// Another event log entry (target of a revert)
    EventlogItem,
    /// Role permission bitset
    RolePermissions,
    /// Feed or object owned by a feature plugin
    CustomFeed(String),
}

impl TargetType {
    pub fn as_str(&self) -> &str {
        match self {
            TargetType::User => "user",
            TargetType::Channel => "channel",
            TargetType::Role => "role",
            TargetType::Guild => "guild",
            TargetType::Emoji => "emoji",
            TargetType::Message => "message",
            TargetType::EventlogItem => "eventlog-item",
            TargetType::RolePermissions => "role-permissions",
            TargetType::CustomFeed(name) => name,
        }
    }
}

impl Display for TargetType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One field difference recorded by an entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub key: String,
    pub old_value: String,
    pub new_value: String,
    /// What the values refer to, when they are ids
    pub kind: Option<TargetType>,
}

impl Change {
    pub fn new(key: impl Into<String>, old: impl Into<String>, new: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            old_value: old.into(),
            new_value: new.into(),
            kind: None,
        }
    }

    pub fn with_kind(mut self, kind: TargetType) -> Self {
        self.kind = Some(kind);
        self
    }
}

/// Auxiliary, non-diff metadata attached to an entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventOption {
    pub key: String,
    pub value: String,
    pub kind: Option<TargetType>,
}

impl EventOption {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            kind: None,
        }
    }

    pub fn with_kind(mut self, kind: TargetType) -> Self {
        self.kind = Some(kind);
        self
    }
}

/// Persisted record of one administrative occurrence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEntry {
    pub id: EntryId,
    pub created_at: DateTime<Utc>,
    pub guild_id: GuildId,
    pub target_id: String,
    pub target_type: TargetType,
    /// Responsible user; `None` until known
    pub actor_user_id: Option<UserId>,
    pub action_type: ActionType,
    pub reason: String,
    pub changes: Vec<Change>,
    pub options: Vec<EventOption>,
    pub waiting_for_backfill: bool,
    pub reverted: bool,
}

impl EventEntry {
    /// Value of the first option with `key`
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|o| o.key == key)
            .map(|o| o.value.as_str())
    }

    /// First change with `key`
    pub fn change(&self, key: &str) -> Option<&Change> {
        self.changes.iter().find(|c| c.key == key)
    }
}

/// An occurrence about to be recorded
///
/// Built by gateway handlers and passed to the recorder, which assigns the
/// id and normalizes the change and option lists.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub created_at: Option<DateTime<Utc>>,
    pub guild_id: GuildId,
    pub target_id: String,
    pub target_type: TargetType,
    pub actor_user_id: Option<UserId>,
    pub action_type: ActionType,
    pub reason: String,
    pub changes: Vec<Change>,
    pub options: Vec<EventOption>,
    pub waiting_for_backfill: bool,
    /// Backfill category to request; falls back to the action's default
    pub backfill: Option<BackfillType>,
}

impl NewEvent {
    pub fn new(
        guild_id: GuildId,
        target_id: impl Into<String>,
        target_type: TargetType,
        action_type: ActionType,
    ) -> Self {
        Self {
            created_at: None,
            guild_id,
            target_id: target_id.into(),
            target_type,
            actor_user_id: None,
            action_type,
            reason: String::new(),
            changes: Vec::new(),
            options: Vec::new(),
            waiting_for_backfill: false,
            backfill: None,
        }
    }

    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn actor(mut self, user: UserId) -> Self {
        self.actor_user_id = Some(user);
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn changes(mut self, changes: Vec<Change>) -> Self {
        self.changes = changes;
        self
    }

    pub fn change(mut self, change: Change) -> Self {
        self.changes.push(change);
        self
    }

    pub fn options(mut self, options: Vec<EventOption>) -> Self {
        self.options = options;
        self
    }

    pub fn option(mut self, option: EventOption) -> Self {
        self.options.push(option);
        self
    }

    /// Mark the entry as waiting for its actor, using the action's default
    /// backfill category
    pub fn awaiting_backfill(mut self) -> Self {
        self.waiting_for_backfill = true;
        self
    }

    /// Mark the entry as waiting for its actor via a specific category
    pub fn awaiting_backfill_via(mut self, backfill: BackfillType) -> Self {
        self.waiting_for_backfill = true;
        self.backfill = Some(backfill);
        self
    }

    /// Backfill category to enqueue once recorded, if any
    pub fn backfill_type(&self) -> Option<BackfillType> {
        if !self.waiting_for_backfill {
            return None;
        }
        self.backfill.or_else(|| self.action_type.default_backfill())
    }
}

/// Drop changes that carry no information
///
/// Removes changes with an empty key, with both values empty, or whose old
/// and new values are equal.
pub fn clean_changes(changes: Vec<Change>) -> Vec<Change> {
    changes
        .into_iter()
        .filter(|c| !c.key.is_empty())
        .filter(|c| !(c.old_value.is_empty() && c.new_value.is_empty()))
        .filter(|c| c.old_value != c.new_value)
        .collect()
}

/// Drop options with an empty key or value
pub fn clean_options(options: Vec<EventOption>) -> Vec<EventOption> {
    options
        .into_iter()
        .filter(|o| !o.key.is_empty() && !o.value.is_empty())
        .collect()
}

/// Merge `extra` into `options`, replacing values of existing keys
pub fn merge_options(options: &mut Vec<EventOption>, extra: Vec<EventOption>) {
    for option in extra {
        match options.iter_mut().find(|o| o.key == option.key) {
            Some(existing) => *existing = option,
            None => options.push(option),
        }
    }
}

/// Stored form of a boolean value
pub fn bool_to_str(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

/// Parse a stored boolean value
pub fn str_to_bool(value: &str) -> Option<bool> {
    match value {
        "yes" => Some(true),
        "no" => Some(false),
        _ => None,
    }
}

/// Stored form of an RGB color (`#rrggbb`)
pub fn color_to_hex(color: u32) -> String {
    format!("#{:06x}", color & 0x00FF_FFFF)
}

/// Parse a stored `#rrggbb` color
pub fn hex_to_color(value: &str) -> Option<u32> {
    let digits = value.trim().trim_start_matches('#');
    if digits.len() != 6 {
        return None;
    }
    u32::from_str_radix(digits, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snowflake::Snowflake;

    #[test]
    fn test_clean_changes() {
        let cleaned = clean_changes(vec![
            Change::new("", "a", "b"),
            Change::new("channel_name", "", ""),
            Change::new("channel_topic", "same", "same"),
            Change::new("channel_nsfw", "no", "yes"),
        ]);
        assert_eq!(cleaned, vec![Change::new("channel_nsfw", "no", "yes")]);
    }

    #[test]
    fn test_clean_options() {
        let cleaned = clean_options(vec![
            EventOption::new("", "x"),
            EventOption::new("channel_type", ""),
            EventOption::new("channel_type", "voice"),
        ]);
        assert_eq!(cleaned, vec![EventOption::new("channel_type", "voice")]);
    }

    #[test]
    fn test_merge_options_replaces_existing_keys() {
        let mut options = vec![EventOption::new("a", "1"), EventOption::new("b", "2")];
        merge_options(
            &mut options,
            vec![EventOption::new("b", "3"), EventOption::new("c", "4")],
        );
        assert_eq!(
            options,
            vec![
                EventOption::new("a", "1"),
                EventOption::new("b", "3"),
                EventOption::new("c", "4"),
            ]
        );
    }

    #[test]
    fn test_backfill_type_resolution() {
        let guild = Snowflake::new(1);
        let plain = NewEvent::new(guild, "2", TargetType::User, ActionType::BanAdd);
        assert_eq!(plain.backfill_type(), None);

        let waiting = plain.clone().awaiting_backfill();
        assert_eq!(waiting.backfill_type(), Some(BackfillType::BanAdd));

        let leave = NewEvent::new(guild, "2", TargetType::User, ActionType::MemberLeave)
            .awaiting_backfill_via(BackfillType::BanAdd);
        assert_eq!(leave.backfill_type(), Some(BackfillType::BanAdd));
    }

    #[test]
    fn test_value_encodings() {
        assert_eq!(bool_to_str(true), "yes");
        assert_eq!(str_to_bool("no"), Some(false));
        assert_eq!(str_to_bool("maybe"), None);
        assert_eq!(color_to_hex(0x3498db), "#3498db");
        assert_eq!(hex_to_color("#3498db"), Some(0x3498db));
        assert_eq!(hex_to_color("#fff"), None);
    }

    #[test]
    fn test_entry_id_parse() {
        let id = EntryId::new();
        let parsed: EntryId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }
}
