//! Error types shared by modlog crates

use thiserror::Error;

/// Errors returned by platform collaborators
///
/// Produced by the audit-log query, settings and capability lookups, and
/// live channel/role reads and updates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    /// The bot lacks the capability required for the request
    #[error("Missing permissions")]
    MissingPermissions,

    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Platform unavailable: {0}")]
    Unavailable(String),
}

impl PlatformError {
    /// Whether this is a permission failure (skipped, never retried)
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, PlatformError::MissingPermissions)
            || matches!(self, PlatformError::Http { status: 403, .. })
    }

    /// Create a new HTTP error
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }
}
