//! Logging configuration
//!
//! Loaded as the `[logging]` table of the node's TOML file.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Per-module filter directives applied by every preset except development
///
/// The guard logs each suppressed occurrence at debug, which on a busy
/// gateway drowns out the correlator's cycle summaries.
const QUIET_MODULES: [&str; 2] = ["modlog_node::guard=info", "redb=warn"];

/// Subscriber configuration for processes embedding the event log
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Base level; `RUST_LOG` replaces the whole filter when set
    pub default_level: String,
    /// Extra `target=level` directives layered over `default_level`
    pub directives: Vec<String>,
    pub console: ConsoleConfig,
    /// Rolling JSONL file output; disabled when absent
    pub file: Option<FileConfig>,
    pub jsonl: JsonlConfig,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_level: "info".to_string(),
            directives: QUIET_MODULES.iter().map(|d| d.to_string()).collect(),
            console: ConsoleConfig::default(),
            file: None,
            jsonl: JsonlConfig::default(),
        }
    }
}

impl LogConfig {
    /// Pretty console at debug with every module audible
    pub fn development() -> Self {
        Self {
            default_level: "debug".to_string(),
            directives: Vec::new(),
            console: ConsoleConfig {
                enabled: true,
                pretty: true,
                ansi: true,
            },
            ..Default::default()
        }
    }

    /// JSONL files under `log_dir`, no console
    pub fn production(log_dir: PathBuf) -> Self {
        Self {
            console: ConsoleConfig {
                enabled: false,
                ..ConsoleConfig::default()
            },
            file: Some(FileConfig {
                directory: log_dir,
                ..FileConfig::default()
            }),
            ..Default::default()
        }
    }

    /// Plain console at warn, for test binaries
    pub fn testing() -> Self {
        Self {
            default_level: "warn".to_string(),
            directives: Vec::new(),
            ..Default::default()
        }
    }

    /// Filter string handed to `EnvFilter`
    pub fn filter_spec(&self) -> String {
        std::iter::once(self.default_level.as_str())
            .chain(self.directives.iter().map(String::as_str))
            .filter(|d| !d.is_empty())
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub enabled: bool,
    /// Human-readable lines instead of JSONL
    pub pretty: bool,
    pub ansi: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pretty: false,
            ansi: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub directory: PathBuf,
    /// File name prefix; rotated files get a date suffix
    pub prefix: String,
    pub rotation: RotationStrategy,
    /// Rotated files kept on disk; unlimited when absent
    pub max_files: Option<usize>,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./logs"),
            prefix: "modlog".to_string(),
            rotation: RotationStrategy::Daily,
            max_files: Some(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RotationStrategy {
    #[default]
    Daily,
    Hourly,
    /// Single file, truncated on start
    Never,
}

/// Shape of each JSONL record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonlConfig {
    /// Put event fields (`guild`, `backfill`, ...) at the top level
    pub flatten_events: bool,
    pub include_spans: bool,
    /// Source file and line of each event
    pub include_location: bool,
}

impl Default for JsonlConfig {
    fn default() -> Self {
        Self {
            flatten_events: true,
            include_spans: true,
            include_location: false,
        }
    }
}
