//! Platform audit-log entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::snowflake::{Snowflake, UserId};

/// One entry returned by the platform's audit-log endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Audit entry id; its timestamp is the instant the action happened
    pub id: Snowflake,
    pub target_id: String,
    pub actor_user_id: UserId,
    pub reason: String,
    pub changes: Vec<AuditChange>,
}

impl AuditEntry {
    pub fn new(id: Snowflake, target_id: impl Into<String>, actor_user_id: UserId) -> Self {
        Self {
            id,
            target_id: target_id.into(),
            actor_user_id,
            reason: String::new(),
            changes: Vec::new(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn with_change(mut self, change: AuditChange) -> Self {
        self.changes.push(change);
        self
    }

    /// Platform-computed creation instant
    pub fn created_at(&self) -> DateTime<Utc> {
        self.id.timestamp()
    }
}

/// A field change carried by an audit entry
///
/// Values are untyped on the wire (strings, integers, booleans).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditChange {
    pub key: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

impl AuditChange {
    pub fn new(key: impl Into<String>, old_value: Option<Value>, new_value: Option<Value>) -> Self {
        Self {
            key: key.into(),
            old_value,
            new_value,
        }
    }

    pub fn old_str(&self) -> Option<&str> {
        self.old_value.as_ref().and_then(Value::as_str)
    }

    pub fn old_u64(&self) -> Option<u64> {
        self.old_value.as_ref().and_then(|v| match v {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        })
    }

    pub fn old_bool(&self) -> Option<bool> {
        self.old_value.as_ref().and_then(Value::as_bool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_old_value_accessors() {
        let color = AuditChange::new("color", Some(json!(3447003)), None);
        assert_eq!(color.old_u64(), Some(3447003));

        let perms = AuditChange::new("permissions", Some(json!("104324161")), None);
        assert_eq!(perms.old_u64(), Some(104324161));

        let hoist = AuditChange::new("hoist", Some(json!(true)), Some(json!(false)));
        assert_eq!(hoist.old_bool(), Some(true));
        assert_eq!(hoist.old_str(), None);
    }
}
