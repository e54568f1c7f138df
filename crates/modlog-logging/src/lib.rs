//! Structured logging setup for the modlog event log
//!
//! The recorder, correlator and revert engine log through `tracing` with
//! structured fields (`guild`, `entry`, `backfill`). This crate installs the
//! subscriber that turns those into JSONL for aggregation or pretty console
//! lines while developing.
//!
//! ```ignore
//! use modlog_logging::{LogConfig, ModlogSubscriberBuilder};
//!
//! let config = ModlogConfig::from_file("modlog.toml")?;
//! let _guard = ModlogSubscriberBuilder::new()
//!     .with_config(config.logging.clone())
//!     .init();
//! ```
//!
//! The returned guard flushes the file writer on drop; keep it alive for the
//! lifetime of the process. `RUST_LOG`, when set, replaces the configured
//! filter entirely.

pub mod config;

pub use config::{ConsoleConfig, FileConfig, JsonlConfig, LogConfig, RotationStrategy};

use std::fs::{self, File};

use thiserror::Error;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Errors raised while installing the global subscriber
#[derive(Debug, Error)]
pub enum LogInitError {
    #[error("Failed to open log file: {0}")]
    File(#[from] std::io::Error),

    #[error("Failed to create rolling appender: {0}")]
    Appender(String),

    #[error("A global subscriber is already set: {0}")]
    AlreadySet(String),
}

/// Installs the global subscriber described by a [`LogConfig`]
pub struct ModlogSubscriberBuilder {
    config: LogConfig,
}

impl ModlogSubscriberBuilder {
    pub fn new() -> Self {
        Self {
            config: LogConfig::default(),
        }
    }

    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Override the base level, keeping module directives
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.default_level = level.into();
        self
    }

    pub fn with_console(mut self, enabled: bool) -> Self {
        self.config.console.enabled = enabled;
        self
    }

    pub fn with_file_output(mut self, config: FileConfig) -> Self {
        self.config.file = Some(config);
        self
    }

    /// Initialize the subscriber globally, reporting failures on stderr
    ///
    /// Returns the file writer guard when file output is configured.
    pub fn init(self) -> Option<WorkerGuard> {
        match self.try_init() {
            Ok(guard) => guard,
            Err(e) => {
                eprintln!("Warning: Failed to initialize logging: {}", e);
                None
            }
        }
    }

    /// Try to initialize the subscriber globally
    pub fn try_init(self) -> Result<Option<WorkerGuard>, LogInitError> {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.config.filter_spec()));

        let console = &self.config.console;
        let jsonl = &self.config.jsonl;

        let pretty_console = (console.enabled && console.pretty).then(|| {
            tracing_subscriber::fmt::layer()
                .with_ansi(console.ansi)
                .with_target(true)
        });

        let jsonl_console = (console.enabled && !console.pretty).then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(jsonl.include_spans)
                .flatten_event(jsonl.flatten_events)
                .with_file(jsonl.include_location)
                .with_line_number(jsonl.include_location)
        });

        let (file_layer, guard) = match &self.config.file {
            Some(file_config) => {
                let (writer, guard) = file_writer(file_config)?;
                let layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(jsonl.include_spans)
                    .flatten_event(jsonl.flatten_events)
                    .with_file(jsonl.include_location)
                    .with_line_number(jsonl.include_location)
                    .with_writer(writer);
                (Some(layer), Some(guard))
            }
            None => (None, None),
        };

        Registry::default()
            .with(env_filter)
            .with(pretty_console)
            .with(jsonl_console)
            .with(file_layer)
            .try_init()
            .map_err(|e| LogInitError::AlreadySet(e.to_string()))?;

        Ok(guard)
    }
}

impl Default for ModlogSubscriberBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Non-blocking writer for the configured file output
///
/// `Never` truncates a single file; the other strategies append to rolling
/// files pruned to `max_files`.
fn file_writer(config: &FileConfig) -> Result<(NonBlocking, WorkerGuard), LogInitError> {
    fs::create_dir_all(&config.directory)?;

    let rotation = match config.rotation {
        RotationStrategy::Never => {
            let path = config.directory.join(format!("{}.log", config.prefix));
            let file = File::create(path)?;
            return Ok(tracing_appender::non_blocking(file));
        }
        RotationStrategy::Daily => Rotation::DAILY,
        RotationStrategy::Hourly => Rotation::HOURLY,
    };

    let mut builder = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(&config.prefix)
        .filename_suffix("log");
    if let Some(max_files) = config.max_files {
        builder = builder.max_log_files(max_files);
    }
    let appender = builder
        .build(&config.directory)
        .map_err(|e| LogInitError::Appender(e.to_string()))?;

    Ok(tracing_appender::non_blocking(appender))
}

/// Initialize logging with default settings (JSONL to console)
pub fn init_default() -> Option<WorkerGuard> {
    ModlogSubscriberBuilder::new().init()
}

/// Initialize logging for development (verbose, pretty console output)
pub fn init_development() -> Option<WorkerGuard> {
    ModlogSubscriberBuilder::new()
        .with_config(LogConfig::development())
        .init()
}

/// Initialize logging for testing (minimal output, repeated calls are fine)
pub fn init_testing() {
    let _ = ModlogSubscriberBuilder::new()
        .with_config(LogConfig::testing())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_level_override_keeps_directives() {
        let builder = ModlogSubscriberBuilder::new()
            .with_level("trace")
            .with_console(false);
        assert_eq!(
            builder.config.filter_spec(),
            "trace,modlog_node::guard=info,redb=warn"
        );
        assert!(!builder.config.console.enabled);
    }

    #[test]
    fn test_rolling_writer_creates_directory() {
        let temp = TempDir::new().unwrap();
        let config = FileConfig {
            directory: temp.path().join("nested/logs"),
            ..FileConfig::default()
        };
        let (_writer, _guard) = file_writer(&config).unwrap();
        assert!(temp.path().join("nested/logs").is_dir());
    }

    #[test]
    fn test_single_file_writer_creates_file() {
        let temp = TempDir::new().unwrap();
        let config = FileConfig {
            directory: temp.path().join("logs"),
            prefix: "test".into(),
            rotation: RotationStrategy::Never,
            max_files: None,
        };
        let (_writer, _guard) = file_writer(&config).unwrap();
        assert!(temp.path().join("logs/test.log").exists());
    }
}
