//! Configuration for the event log node

use std::path::Path;
use std::time::Duration;

use modlog_logging::LogConfig;
use modlog_storage::RedbStoreConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Configuration for a ModlogNode
///
/// Every field has a default, so a TOML file only needs the values it
/// changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModlogConfig {
    /// Period of the backfill cycle
    pub backfill_interval_secs: u64,
    /// Delay before restarting a backfill loop that died
    pub restart_backoff_secs: u64,
    /// Audit entries fetched per (category, guild) pair
    pub audit_page_size: usize,
    /// (category, guild) pairs processed concurrently within a cycle
    pub max_concurrent_pairs: usize,
    /// Bound on one audit-log request
    pub fetch_timeout_ms: u64,
    /// Bound on one event store call
    pub store_timeout_ms: u64,
    /// Maximum distance between an entry and the audit entry that resolves it
    pub match_window_secs: Option<u64>,
    /// Lifetime of cached guild settings and capabilities
    pub settings_cache_ttl_secs: u64,
    /// Persistent store location
    pub store: RedbStoreConfig,
    /// Logging setup for binaries embedding the node
    pub logging: LogConfig,
}

impl Default for ModlogConfig {
    fn default() -> Self {
        Self {
            backfill_interval_secs: 60,
            restart_backoff_secs: 60,
            audit_page_size: 5,
            max_concurrent_pairs: 4,
            fetch_timeout_ms: 10_000,
            store_timeout_ms: 5_000,
            match_window_secs: None,
            settings_cache_ttl_secs: 60,
            store: RedbStoreConfig::default(),
            logging: LogConfig::default(),
        }
    }
}

impl ModlogConfig {
    /// Parse a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Reject values the node cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backfill_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "backfill_interval_secs must be positive".into(),
            ));
        }
        if self.audit_page_size == 0 {
            return Err(ConfigError::Invalid("audit_page_size must be positive".into()));
        }
        if self.max_concurrent_pairs == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_pairs must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn backfill_interval(&self) -> Duration {
        Duration::from_secs(self.backfill_interval_secs)
    }

    pub fn restart_backoff(&self) -> Duration {
        Duration::from_secs(self.restart_backoff_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn settings_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.settings_cache_ttl_secs)
    }

    pub fn match_window(&self) -> Option<chrono::Duration> {
        self.match_window_secs
            .map(|secs| chrono::Duration::seconds(secs.min(i64::MAX as u64) as i64))
    }

    /// Set the backfill interval
    pub fn with_backfill_interval(mut self, interval: Duration) -> Self {
        self.backfill_interval_secs = interval.as_secs().max(1);
        self
    }

    /// Set the restart backoff of the backfill supervisor
    pub fn with_restart_backoff(mut self, backoff: Duration) -> Self {
        self.restart_backoff_secs = backoff.as_secs();
        self
    }

    /// Set the audit page size
    pub fn with_audit_page_size(mut self, size: usize) -> Self {
        self.audit_page_size = size;
        self
    }

    /// Set the number of pairs processed concurrently
    pub fn with_max_concurrent_pairs(mut self, n: usize) -> Self {
        self.max_concurrent_pairs = n;
        self
    }

    /// Set the audit-log request timeout
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the event store call timeout
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Restrict matches to entries within `window` of the audit entry
    pub fn with_match_window(mut self, window: Option<Duration>) -> Self {
        self.match_window_secs = window.map(|w| w.as_secs());
        self
    }

    /// Set the settings cache lifetime
    pub fn with_settings_cache_ttl(mut self, ttl: Duration) -> Self {
        self.settings_cache_ttl_secs = ttl.as_secs();
        self
    }

    /// Set the persistent store configuration
    pub fn with_store(mut self, store: RedbStoreConfig) -> Self {
        self.store = store;
        self
    }

    /// Set the logging configuration
    pub fn with_logging(mut self, logging: LogConfig) -> Self {
        self.logging = logging;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_defaults() {
        let config = ModlogConfig::default();
        assert_eq!(config.backfill_interval(), Duration::from_secs(60));
        assert_eq!(config.restart_backoff(), Duration::from_secs(60));
        assert_eq!(config.audit_page_size, 5);
        assert_eq!(config.match_window(), None);
        tokio_test::assert_ok!(config.validate());
    }

    #[test]
    fn test_from_toml_partial() {
        let config = ModlogConfig::from_toml_str(
            r#"
            backfill_interval_secs = 30
            match_window_secs = 3

            [store]
            db_path = "/var/lib/modlog/events.redb"

            [logging]
            default_level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.backfill_interval(), Duration::from_secs(30));
        assert_eq!(config.match_window(), Some(chrono::Duration::seconds(3)));
        assert_eq!(
            config.store.db_path,
            PathBuf::from("/var/lib/modlog/events.redb")
        );
        assert_eq!(config.logging.default_level, "debug");
        assert_eq!(config.max_concurrent_pairs, 4);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            ModlogConfig::from_toml_str("audit_page_size = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            ModlogConfig::from_toml_str("backfill_interval_secs = \"soon\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("modlog.toml");
        std::fs::write(&path, "max_concurrent_pairs = 8\n").unwrap();
        let config = ModlogConfig::from_file(&path).unwrap();
        assert_eq!(config.max_concurrent_pairs, 8);
    }
}
