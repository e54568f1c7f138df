//! # Modlog Core
//!
//! Core types, traits, and errors for the guild event log.
//!
//! This crate provides the shared vocabulary of the event log so the
//! recorder, correlator and revert engine can run against the real platform
//! client or against [`MockPlatform`] in tests.
//!
//! ## Key Traits
//!
//! - [`GuildSettings`]: Per-guild settings lookup
//! - [`CapabilityCheck`]: Bot capability lookup
//! - [`AuditLogSource`]: Platform audit-log query
//! - [`PlatformObjects`]: Live channel/role read and update
//! - [`Clock`]: Time abstraction for testability
//!
//! ## Key Types
//!
//! - [`EventEntry`]: Persisted record of one administrative occurrence
//! - [`NewEvent`]: An occurrence about to be recorded
//! - [`BackfillType`]: Category of pending audit-log backfill
//! - [`AuditEntry`]: One entry of the platform audit log
//! - [`Snowflake`]: Platform identifier with embedded timestamp

pub mod audit;
pub mod backfill;
pub mod diff;
pub mod error;
pub mod event;
pub mod mock_platform;
pub mod platform;
pub mod snowflake;
pub mod traits;

// Re-export main types
pub use audit::*;
pub use backfill::*;
pub use diff::{diff_channel, diff_role};
pub use error::*;
pub use event::*;
pub use mock_platform::*;
pub use platform::*;
pub use snowflake::*;
pub use traits::*;
