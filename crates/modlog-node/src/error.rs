//! Error types for the event log node

use modlog_core::PlatformError;
use modlog_storage::StorageError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur in the event log
///
/// Only `Validation`, `NotFound` and `Platform` reach interactive callers
/// (revert). The recorder and correlator log the rest and carry on.
#[derive(Debug, Error)]
pub enum EventlogError {
    /// The bot lacks the capability the operation needs
    #[error("Permission denied")]
    PermissionDenied,

    /// Audit-log fetch failed or timed out; retried on a later request
    #[error("Transient fetch failure: {0}")]
    TransientFetch(String),

    /// Event store error
    #[error("Storage error: {0}")]
    Store(#[from] StorageError),

    /// The request is not allowed for this entry
    #[error("Validation error: {0}")]
    Validation(String),

    /// Platform rejected a read or update
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    /// Entry or platform object not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid or unreadable configuration
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Node already started
    #[error("Node already started")]
    AlreadyStarted,
}

impl EventlogError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(item: impl Into<String>) -> Self {
        Self::NotFound(item.into())
    }
}

/// Result type alias for event log operations
pub type EventlogResult<T> = Result<T, EventlogError>;
