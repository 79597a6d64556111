//! Lock held while a run modifies state

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Lock lifetime when none is given (15 minutes)
pub const DEFAULT_LOCK_TIMEOUT_SECS: i64 = 900;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockInfo {
    pub id: String,
    /// Operation holding the lock ("apply", "destroy", "import")
    pub operation: String,
    /// `user@host`
    pub who: String,
    pub created: DateTime<Utc>,
    pub expires: DateTime<Utc>,
}

impl LockInfo {
    pub fn new(operation: impl Into<String>) -> Self {
        Self::with_timeout(operation, DEFAULT_LOCK_TIMEOUT_SECS)
    }

    pub fn with_timeout(operation: impl Into<String>, timeout_secs: i64) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            operation: operation.into(),
            who: lock_owner(),
            created: now,
            expires: now + Duration::seconds(timeout_secs),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires
    }
}

fn lock_owner() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());
    format!("{}@{}", user, host)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_lock_is_live() {
        let lock = LockInfo::new("apply");
        assert!(!lock.id.is_empty());
        assert!(lock.who.contains('@'));
        assert!(!lock.is_expired());
        assert_eq!((lock.expires - lock.created).num_seconds(), DEFAULT_LOCK_TIMEOUT_SECS);
    }

    #[test]
    fn negative_timeout_is_already_expired() {
        assert!(LockInfo::with_timeout("destroy", -1).is_expired());
    }
}
