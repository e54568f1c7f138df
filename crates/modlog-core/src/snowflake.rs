//! Platform snowflake identifiers
//!
//! Guilds, users, channels, roles and audit entries are all addressed by
//! 64-bit snowflakes. The upper 42 bits carry milliseconds since the
//! platform epoch, which is how audit entries get their creation instant.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Platform epoch (2015-01-01T00:00:00Z) in Unix milliseconds
pub const PLATFORM_EPOCH_MILLIS: i64 = 1_420_070_400_000;

/// A 64-bit platform identifier
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Snowflake(pub u64);

/// Guild (community) identifier
pub type GuildId = Snowflake;

/// User identifier
pub type UserId = Snowflake;

impl Snowflake {
    /// Create a snowflake from its raw value
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw integer value
    pub const fn get(&self) -> u64 {
        self.0
    }

    /// Whether this is the zero (unset) snowflake
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Creation instant encoded in the snowflake
    pub fn timestamp(&self) -> DateTime<Utc> {
        let millis = (self.0 >> 22) as i64 + PLATFORM_EPOCH_MILLIS;
        Utc.timestamp_millis_opt(millis)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Build a snowflake whose timestamp is `at` (worker/sequence bits zero)
    pub fn from_timestamp(at: DateTime<Utc>) -> Self {
        let millis = (at.timestamp_millis() - PLATFORM_EPOCH_MILLIS).max(0) as u64;
        Self(millis << 22)
    }
}

impl Display for Snowflake {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Snowflake {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(Self)
    }
}

impl From<u64> for Snowflake {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_decoding() {
        // 175928847299117063 is the documented example: 2016-04-30 11:18:25.796 UTC
        let id = Snowflake::new(175_928_847_299_117_063);
        assert_eq!(id.timestamp().timestamp_millis(), 1_462_015_105_796);
    }

    #[test]
    fn test_from_timestamp_round_trips_millis() {
        let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let id = Snowflake::from_timestamp(at);
        assert_eq!(id.timestamp(), at);
    }

    #[test]
    fn test_parse_and_display() {
        let id: Snowflake = " 42 ".parse().unwrap();
        assert_eq!(id, Snowflake(42));
        assert_eq!(id.to_string(), "42");
        assert!("abc".parse::<Snowflake>().is_err());
        assert!(Snowflake::default().is_zero());
    }
}
