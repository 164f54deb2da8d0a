//! Lock information for state backend locking

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Default lock timeout in seconds (15 minutes)
pub const DEFAULT_LOCK_TIMEOUT_SECS: i64 = 900;

/// Information about a state lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    pub id: String,
    /// The operation holding the lock (e.g., "apply", "destroy", "import")
    pub operation: String,
    /// username@hostname
    pub who: String,
    pub created: DateTime<Utc>,
    pub expires: DateTime<Utc>,
}

impl LockInfo {
    pub fn new(operation: impl Into<String>) -> Self {
        Self::with_timeout(operation, DEFAULT_LOCK_TIMEOUT_SECS)
    }

    /// Out-of-range timeouts saturate at the latest representable time
    pub fn with_timeout(operation: impl Into<String>, timeout_secs: i64) -> Self {
        let now = Utc::now();
        let expires = Duration::try_seconds(timeout_secs)
            .and_then(|timeout| now.checked_add_signed(timeout))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            operation: operation.into(),
            who: lock_owner(),
            created: now,
            expires,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires
    }
}

fn lock_owner() -> String {
    let username = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    format!("{}@{}", username, hostname)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_lock_expires_in_fifteen_minutes() {
        let lock = LockInfo::new("apply");
        assert_eq!(lock.operation, "apply");
        assert!(!lock.id.is_empty());
        assert!(lock.who.contains('@'));
        assert_eq!((lock.expires - lock.created).num_minutes(), 15);
        assert!(!lock.is_expired());
    }

    #[test]
    fn negative_timeout_is_already_expired() {
        let lock = LockInfo::with_timeout("apply", -1);
        assert!(lock.is_expired());
    }

    #[test]
    fn huge_timeout_does_not_overflow() {
        let lock = LockInfo::with_timeout("apply", i64::MAX);
        assert_eq!(lock.expires, DateTime::<Utc>::MAX_UTC);
        assert!(!lock.is_expired());
    }

    #[test]
    fn lock_serialization() {
        let lock = LockInfo::new("destroy");
        let json = serde_json::to_string_pretty(&lock).unwrap();
        let deserialized: LockInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, lock);
    }
}
