//! Backfill rule table
//!
//! For each backfill category: which audit-log action to query, which pending
//! entries an audit entry resolves, and which extra options it contributes.

use modlog_core::{
    ActionType, AuditEntry, AuditLogAction, BackfillType, EventOption, bool_to_str, color_to_hex,
};

/// Pending entries resolved by one audit entry
#[derive(Debug, Clone, Copy)]
pub struct MatchTarget {
    pub action: ActionType,
    /// Options merged into the matched entry
    pub options: &'static [(&'static str, &'static str)],
}

impl MatchTarget {
    const fn plain(action: ActionType) -> Self {
        Self {
            action,
            options: &[],
        }
    }

    /// Also tags the matched entry with `options`
    const fn tagged(action: ActionType, options: &'static [(&'static str, &'static str)]) -> Self {
        Self { action, options }
    }
}

/// Extra options read from the audit entry itself
pub type OptionExtractor = fn(&AuditEntry) -> Vec<EventOption>;

/// How one backfill category is resolved
#[derive(Debug, Clone, Copy)]
pub struct BackfillRule {
    pub backfill: BackfillType,
    pub audit_action: AuditLogAction,
    pub targets: &'static [MatchTarget],
    pub extract: Option<OptionExtractor>,
}

impl BackfillRule {
    /// Options to merge into an entry matched through `target`
    pub fn options_for(&self, target: &MatchTarget, audit: &AuditEntry) -> Vec<EventOption> {
        let mut options: Vec<EventOption> = target
            .options
            .iter()
            .map(|(key, value)| EventOption::new(*key, *value))
            .collect();
        if let Some(extract) = self.extract {
            options.extend(extract(audit));
        }
        options
    }
}

const fn rule(
    backfill: BackfillType,
    audit_action: AuditLogAction,
    targets: &'static [MatchTarget],
) -> BackfillRule {
    BackfillRule {
        backfill,
        audit_action,
        targets,
        extract: None,
    }
}

/// Prior fields of a deleted role, carried by the audit entry's changes
fn deleted_role_options(audit: &AuditEntry) -> Vec<EventOption> {
    let mut options = Vec::new();
    for change in &audit.changes {
        match change.key.as_str() {
            "color" => {
                if let Some(color) = change.old_u64().filter(|c| *c > 0) {
                    options.push(EventOption::new("role_color", color_to_hex(color as u32)));
                }
            }
            "mentionable" => {
                if let Some(value) = change.old_bool() {
                    options.push(EventOption::new("role_mentionable", bool_to_str(value)));
                }
            }
            "hoist" => {
                if let Some(value) = change.old_bool() {
                    options.push(EventOption::new("role_hoist", bool_to_str(value)));
                }
            }
            "name" => {
                if let Some(name) = change.old_str().filter(|n| !n.is_empty()) {
                    options.push(EventOption::new("role_name", name));
                }
            }
            _ => {}
        }
    }
    options
}

pub static BACKFILL_RULES: [BackfillRule; 15] = [
    rule(
        BackfillType::ChannelCreate,
        AuditLogAction::ChannelCreate,
        &[MatchTarget::plain(ActionType::ChannelCreate)],
    ),
    rule(
        BackfillType::ChannelUpdate,
        AuditLogAction::ChannelUpdate,
        &[MatchTarget::plain(ActionType::ChannelUpdate)],
    ),
    rule(
        BackfillType::ChannelDelete,
        AuditLogAction::ChannelDelete,
        &[MatchTarget::plain(ActionType::ChannelDelete)],
    ),
    rule(
        BackfillType::RoleCreate,
        AuditLogAction::RoleCreate,
        &[MatchTarget::plain(ActionType::RoleCreate)],
    ),
    rule(
        BackfillType::RoleUpdate,
        AuditLogAction::RoleUpdate,
        &[MatchTarget::plain(ActionType::RoleUpdate)],
    ),
    BackfillRule {
        backfill: BackfillType::RoleDelete,
        audit_action: AuditLogAction::RoleDelete,
        targets: &[MatchTarget::plain(ActionType::RoleDelete)],
        extract: Some(deleted_role_options),
    },
    rule(
        BackfillType::BanAdd,
        AuditLogAction::MemberBanAdd,
        &[
            MatchTarget::plain(ActionType::BanAdd),
            MatchTarget::tagged(ActionType::MemberLeave, &[("member_leave_type", "ban")]),
        ],
    ),
    rule(
        BackfillType::BanRemove,
        AuditLogAction::MemberBanRemove,
        &[MatchTarget::plain(ActionType::BanRemove)],
    ),
    rule(
        BackfillType::MemberRemove,
        AuditLogAction::MemberKick,
        &[MatchTarget::tagged(ActionType::MemberLeave, &[("member_leave_type", "kick")])],
    ),
    rule(
        BackfillType::MemberRoleUpdate,
        AuditLogAction::MemberRoleUpdate,
        &[MatchTarget::plain(ActionType::MemberUpdate)],
    ),
    rule(
        BackfillType::MemberUpdate,
        AuditLogAction::MemberUpdate,
        &[MatchTarget::plain(ActionType::MemberUpdate)],
    ),
    rule(
        BackfillType::EmojiCreate,
        AuditLogAction::EmojiCreate,
        &[MatchTarget::plain(ActionType::EmojiCreate)],
    ),
    rule(
        BackfillType::EmojiUpdate,
        AuditLogAction::EmojiUpdate,
        &[MatchTarget::plain(ActionType::EmojiUpdate)],
    ),
    rule(
        BackfillType::EmojiDelete,
        AuditLogAction::EmojiDelete,
        &[MatchTarget::plain(ActionType::EmojiDelete)],
    ),
    rule(
        BackfillType::GuildUpdate,
        AuditLogAction::GuildUpdate,
        &[MatchTarget::plain(ActionType::GuildUpdate)],
    ),
];

/// Rule for a backfill category
pub fn rule_for(backfill: BackfillType) -> Option<&'static BackfillRule> {
    BACKFILL_RULES.iter().find(|r| r.backfill == backfill)
}
