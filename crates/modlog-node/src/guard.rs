//! Guard deciding whether an occurrence is recorded at all
//!
//! Rejection is silent: the caller only learns that nothing was written.

use std::fmt::{Display, Formatter};
use std::sync::Arc;

use modlog_core::{ActionType, Change, EventOption, GuildId, diff};
use tracing::{debug, warn};

use crate::settings_cache::SettingsCache;

const PLAYBACK_GLYPHS: [&str; 2] = ["▶", "⏹"];
const VOLUME_GLYPHS: [&str; 4] = ["🔇", "🔈", "🔉", "🔊"];

/// Why an occurrence was not recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    /// Zero guild id
    InvalidGuild,
    Blacklisted,
    /// Guild is on the limited feature tier
    Limited,
    EventlogDisabled,
    /// Guild settings could not be read; nothing is recorded blind
    SettingsUnavailable,
    /// Topic rewrite by a music bot's status bar
    MusicStatusTopic,
}

impl Display for SuppressReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            SuppressReason::InvalidGuild => "invalid guild",
            SuppressReason::Blacklisted => "guild blacklisted",
            SuppressReason::Limited => "guild limited",
            SuppressReason::EventlogDisabled => "eventlog disabled",
            SuppressReason::SettingsUnavailable => "settings unavailable",
            SuppressReason::MusicStatusTopic => "music status topic",
        };
        f.write_str(reason)
    }
}

/// Whether the change set is a music bot rewriting the channel topic
///
/// Matches a `ChannelUpdate` without options whose only change is the topic,
/// with the new topic showing a playback glyph and a volume glyph.
pub fn is_music_status_update(
    action: ActionType,
    changes: &[Change],
    options: &[EventOption],
) -> bool {
    if action != ActionType::ChannelUpdate || !options.is_empty() {
        return false;
    }
    let [change] = changes else {
        return false;
    };
    if change.key != diff::CHANNEL_TOPIC {
        return false;
    }
    let topic = change.new_value.as_str();
    PLAYBACK_GLYPHS.iter().any(|g| topic.contains(g))
        && VOLUME_GLYPHS.iter().any(|g| topic.contains(g))
}

/// Recording gate backed by the settings cache
#[derive(Clone)]
pub struct Guard {
    cache: Arc<SettingsCache>,
}

impl Guard {
    pub fn new(cache: Arc<SettingsCache>) -> Self {
        Self { cache }
    }

    /// Check an occurrence, returning why it must not be recorded
    ///
    /// `changes` and `options` are expected to be normalized already.
    pub async fn check(
        &self,
        guild: GuildId,
        action: ActionType,
        changes: &[Change],
        options: &[EventOption],
    ) -> Result<(), SuppressReason> {
        if guild.is_zero() {
            return Err(SuppressReason::InvalidGuild);
        }

        let settings = self.cache.settings(guild).await.map_err(|e| {
            warn!(guild = %guild, error = %e, "Failed to read guild settings");
            SuppressReason::SettingsUnavailable
        })?;
        if settings.blacklisted {
            return Err(SuppressReason::Blacklisted);
        }
        if settings.limited {
            return Err(SuppressReason::Limited);
        }
        if settings.eventlog_disabled {
            return Err(SuppressReason::EventlogDisabled);
        }

        if is_music_status_update(action, changes, options) {
            return Err(SuppressReason::MusicStatusTopic);
        }

        Ok(())
    }

    /// Whether an occurrence should be recorded
    pub async fn should_record(
        &self,
        guild: GuildId,
        action: ActionType,
        changes: &[Change],
        options: &[EventOption],
    ) -> bool {
        match self.check(guild, action, changes, options).await {
            Ok(()) => true,
            Err(reason) => {
                debug!(guild = %guild, action = %action, %reason, "Suppressed event");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use modlog_core::{FixedClock, GuildSettingsRecord, MockPlatform, PlatformError, Snowflake};
    use std::time::Duration;

    fn guard(platform: &Arc<MockPlatform>) -> Guard {
        let cache = SettingsCache::new(
            platform.clone(),
            platform.clone(),
            Arc::new(FixedClock::new(Utc::now())),
            Duration::from_secs(60),
        );
        Guard::new(Arc::new(cache))
    }

    fn topic(new: &str) -> Vec<Change> {
        vec![Change::new(diff::CHANNEL_TOPIC, "", new)]
    }

    #[test]
    fn test_music_status_detection() {
        let action = ActionType::ChannelUpdate;
        assert!(is_music_status_update(action, &topic("▶ Song 🔊 80%"), &[]));
        assert!(is_music_status_update(action, &topic("⏹ 🔇"), &[]));

        // one glyph family only
        assert!(!is_music_status_update(action, &topic("▶ Song"), &[]));
        assert!(!is_music_status_update(action, &topic("🔊 loud"), &[]));

        // extra change, option, or other action
        let mut two = topic("▶ Song 🔊");
        two.push(Change::new(diff::CHANNEL_NAME, "a", "b"));
        assert!(!is_music_status_update(action, &two, &[]));
        assert!(!is_music_status_update(
            action,
            &topic("▶ Song 🔊"),
            &[EventOption::new("channel_type", "text")]
        ));
        assert!(!is_music_status_update(
            ActionType::ChannelCreate,
            &topic("▶ Song 🔊"),
            &[]
        ));
        assert!(!is_music_status_update(
            action,
            &[Change::new(diff::CHANNEL_NAME, "", "▶ 🔊")],
            &[]
        ));
    }

    #[tokio::test]
    async fn test_guild_settings_rejections() {
        let platform = Arc::new(MockPlatform::new());
        let guard = guard(&platform);
        let action = ActionType::RoleCreate;

        assert_eq!(
            guard.check(Snowflake(0), action, &[], &[]).await,
            Err(SuppressReason::InvalidGuild)
        );

        platform.set_settings(
            Snowflake(1),
            GuildSettingsRecord {
                blacklisted: true,
                ..Default::default()
            },
        );
        platform.set_settings(
            Snowflake(2),
            GuildSettingsRecord {
                limited: true,
                ..Default::default()
            },
        );
        platform.disable_eventlog(Snowflake(3));

        assert_eq!(
            guard.check(Snowflake(1), action, &[], &[]).await,
            Err(SuppressReason::Blacklisted)
        );
        assert_eq!(
            guard.check(Snowflake(2), action, &[], &[]).await,
            Err(SuppressReason::Limited)
        );
        assert_eq!(
            guard.check(Snowflake(3), action, &[], &[]).await,
            Err(SuppressReason::EventlogDisabled)
        );
        assert!(guard.should_record(Snowflake(4), action, &[], &[]).await);
    }

    #[tokio::test]
    async fn test_settings_failure_suppresses() {
        struct Failing;

        #[async_trait::async_trait]
        impl modlog_core::GuildSettings for Failing {
            async fn settings(
                &self,
                _guild: GuildId,
            ) -> Result<GuildSettingsRecord, PlatformError> {
                Err(PlatformError::Timeout)
            }
        }

        let platform = Arc::new(MockPlatform::new());
        let cache = SettingsCache::new(
            Arc::new(Failing),
            platform,
            Arc::new(FixedClock::new(Utc::now())),
            Duration::from_secs(60),
        );
        let guard = Guard::new(Arc::new(cache));
        assert_eq!(
            guard
                .check(Snowflake(1), ActionType::RoleCreate, &[], &[])
                .await,
            Err(SuppressReason::SettingsUnavailable)
        );
    }
}
