//! Backfill categories and platform audit-log actions

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Category of pending audit-log backfill
///
/// Each category maps to exactly one platform audit-log action; several
/// event action types may resolve through the same category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BackfillType {
    ChannelCreate,
    ChannelUpdate,
    ChannelDelete,
    RoleCreate,
    RoleUpdate,
    RoleDelete,
    BanAdd,
    BanRemove,
    MemberRemove,
    MemberRoleUpdate,
    MemberUpdate,
    EmojiCreate,
    EmojiUpdate,
    EmojiDelete,
    GuildUpdate,
}

impl BackfillType {
    /// Every category, in declaration order
    pub const ALL: [BackfillType; 15] = [
        BackfillType::ChannelCreate,
        BackfillType::ChannelUpdate,
        BackfillType::ChannelDelete,
        BackfillType::RoleCreate,
        BackfillType::RoleUpdate,
        BackfillType::RoleDelete,
        BackfillType::BanAdd,
        BackfillType::BanRemove,
        BackfillType::MemberRemove,
        BackfillType::MemberRoleUpdate,
        BackfillType::MemberUpdate,
        BackfillType::EmojiCreate,
        BackfillType::EmojiUpdate,
        BackfillType::EmojiDelete,
        BackfillType::GuildUpdate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackfillType::ChannelCreate => "channel-create",
            BackfillType::ChannelUpdate => "channel-update",
            BackfillType::ChannelDelete => "channel-delete",
            BackfillType::RoleCreate => "role-create",
            BackfillType::RoleUpdate => "role-update",
            BackfillType::RoleDelete => "role-delete",
            BackfillType::BanAdd => "ban-add",
            BackfillType::BanRemove => "ban-remove",
            BackfillType::MemberRemove => "member-remove",
            BackfillType::MemberRoleUpdate => "member-role-update",
            BackfillType::MemberUpdate => "member-update",
            BackfillType::EmojiCreate => "emoji-create",
            BackfillType::EmojiUpdate => "emoji-update",
            BackfillType::EmojiDelete => "emoji-delete",
            BackfillType::GuildUpdate => "guild-update",
        }
    }

    /// Audit-log action queried for this category
    pub fn audit_action(&self) -> AuditLogAction {
        match self {
            BackfillType::ChannelCreate => AuditLogAction::ChannelCreate,
            BackfillType::ChannelUpdate => AuditLogAction::ChannelUpdate,
            BackfillType::ChannelDelete => AuditLogAction::ChannelDelete,
            BackfillType::RoleCreate => AuditLogAction::RoleCreate,
            BackfillType::RoleUpdate => AuditLogAction::RoleUpdate,
            BackfillType::RoleDelete => AuditLogAction::RoleDelete,
            BackfillType::BanAdd => AuditLogAction::MemberBanAdd,
            BackfillType::BanRemove => AuditLogAction::MemberBanRemove,
            BackfillType::MemberRemove => AuditLogAction::MemberKick,
            BackfillType::MemberRoleUpdate => AuditLogAction::MemberRoleUpdate,
            BackfillType::MemberUpdate => AuditLogAction::MemberUpdate,
            BackfillType::EmojiCreate => AuditLogAction::EmojiCreate,
            BackfillType::EmojiUpdate => AuditLogAction::EmojiUpdate,
            BackfillType::EmojiDelete => AuditLogAction::EmojiDelete,
            BackfillType::GuildUpdate => AuditLogAction::GuildUpdate,
        }
    }
}

impl Display for BackfillType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Platform audit-log action category (wire values of the platform API)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AuditLogAction {
    GuildUpdate = 1,
    ChannelCreate = 10,
    ChannelUpdate = 11,
    ChannelDelete = 12,
    MemberKick = 20,
    MemberBanAdd = 22,
    MemberBanRemove = 23,
    MemberUpdate = 24,
    MemberRoleUpdate = 25,
    RoleCreate = 30,
    RoleUpdate = 31,
    RoleDelete = 32,
    EmojiCreate = 60,
    EmojiUpdate = 61,
    EmojiDelete = 62,
}

impl AuditLogAction {
    /// Numeric value sent as the `action_type` query parameter
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_audit_actions_are_distinct() {
        let actions: HashSet<_> = BackfillType::ALL.iter().map(|t| t.audit_action()).collect();
        assert_eq!(actions.len(), BackfillType::ALL.len());
    }

    #[test]
    fn test_audit_action_codes() {
        assert_eq!(AuditLogAction::MemberBanAdd.code(), 22);
        assert_eq!(AuditLogAction::RoleDelete.code(), 32);
        assert_eq!(BackfillType::MemberRemove.audit_action(), AuditLogAction::MemberKick);
    }
}
