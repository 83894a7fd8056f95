//! External identity tracking.
//!
//! Maps an activity identifier to the external id a resource handler
//! returned from `create`, so that later runs can read, update or delete the
//! same external object.

mod sqlite;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::OwnedMutexGuard;

use crate::error::{Result, WfeError};

pub use sqlite::SqliteIdentity;

/// One `(activity, external id)` association.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub activity_id: String,
    pub external_id: String,
    pub created_at: DateTime<Utc>,
}

/// Storage backend for identity records.
///
/// An activity has at most one external id and an external id belongs to at
/// most one activity.
pub trait Identity: Send + Sync {
    /// Look up the external id recorded for `activity_id`.
    fn lookup(&self, activity_id: &str) -> Result<Option<String>>;

    /// Record `external_id` for `activity_id`, replacing any previous record
    /// of either.
    fn associate(&self, activity_id: &str, external_id: &str) -> Result<()>;

    /// Forget the record holding `external_id`.
    fn remove_external(&self, external_id: &str) -> Result<()>;

    /// All records, oldest first.
    fn records(&self) -> Result<Vec<IdentityRecord>>;

    /// Look up an external id, failing with `MissingIdentity` when
    /// `require_exists` is set and nothing is recorded.
    fn get_external(&self, activity_id: &str, require_exists: bool) -> Result<Option<String>> {
        match self.lookup(activity_id)? {
            None if require_exists => Err(WfeError::MissingIdentity(activity_id.to_string())),
            found => Ok(found),
        }
    }
}

/// Identity records held in memory.
#[derive(Debug, Default)]
pub struct MemoryIdentity {
    records: RwLock<Vec<IdentityRecord>>,
}

impl MemoryIdentity {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Identity for MemoryIdentity {
    fn lookup(&self, activity_id: &str) -> Result<Option<String>> {
        Ok(self
            .records
            .read()
            .iter()
            .find(|r| r.activity_id == activity_id)
            .map(|r| r.external_id.clone()))
    }

    fn associate(&self, activity_id: &str, external_id: &str) -> Result<()> {
        let mut records = self.records.write();
        records.retain(|r| r.activity_id != activity_id && r.external_id != external_id);
        records.push(IdentityRecord {
            activity_id: activity_id.to_string(),
            external_id: external_id.to_string(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    fn remove_external(&self, external_id: &str) -> Result<()> {
        self.records.write().retain(|r| r.external_id != external_id);
        Ok(())
    }

    fn records(&self) -> Result<Vec<IdentityRecord>> {
        Ok(self.records.read().clone())
    }
}

/// Shared identity store with per-activity locking.
///
/// Reconciliation of one activity identifier holds [`IdentityStore::lock`]
/// for its whole read-decide-write sequence, so concurrent runs of the same
/// activity never interleave their writes.
pub struct IdentityStore {
    backend: Arc<dyn Identity>,
    locks: Arc<Mutex<ActivityLocks>>,
}

type ActivityLocks = HashMap<String, Arc<tokio::sync::Mutex<()>>>;

/// Held while one activity identifier is reconciled.
///
/// Dropping the last guard or waiter for an identifier frees its lock entry.
pub struct IdentityGuard {
    activity_id: String,
    locks: Arc<Mutex<ActivityLocks>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for IdentityGuard {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.locks.lock();
        if locks
            .get(&self.activity_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.activity_id);
        }
    }
}

impl IdentityStore {
    pub fn new(backend: Arc<dyn Identity>) -> Self {
        Self {
            backend,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryIdentity::new()))
    }

    /// Open (or create) a SQLite-backed store.
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(Arc::new(SqliteIdentity::open(path)?)))
    }

    /// Acquire the lock for `activity_id`.
    pub async fn lock(&self, activity_id: &str) -> IdentityGuard {
        let lock = self
            .locks
            .lock()
            .entry(activity_id.to_string())
            .or_default()
            .clone();
        IdentityGuard {
            activity_id: activity_id.to_string(),
            locks: self.locks.clone(),
            guard: Some(lock.lock_owned().await),
        }
    }

    pub fn get_external(&self, activity_id: &str, require_exists: bool) -> Result<Option<String>> {
        self.backend.get_external(activity_id, require_exists)
    }

    pub fn associate(&self, activity_id: &str, external_id: &str) -> Result<()> {
        tracing::debug!(activity_id, external_id, "associating external id");
        self.backend.associate(activity_id, external_id)
    }

    pub fn remove_external(&self, external_id: &str) -> Result<()> {
        tracing::debug!(external_id, "removing external id");
        self.backend.remove_external(external_id)
    }

    pub fn records(&self) -> Result<Vec<IdentityRecord>> {
        self.backend.records()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_memory_associate_and_lookup() {
        let id = MemoryIdentity::new();
        assert_eq!(id.get_external("wfe:///s/a", false).unwrap(), None);

        id.associate("wfe:///s/a", "E1").unwrap();
        assert_eq!(id.get_external("wfe:///s/a", true).unwrap(), Some("E1".into()));

        // re-association replaces the old external id
        id.associate("wfe:///s/a", "E2").unwrap();
        assert_eq!(id.lookup("wfe:///s/a").unwrap(), Some("E2".into()));
        assert_eq!(id.records().unwrap().len(), 1);
    }

    #[test]
    fn test_external_id_is_unique() {
        let id = MemoryIdentity::new();
        id.associate("a", "E1").unwrap();
        id.associate("b", "E1").unwrap();
        assert_eq!(id.lookup("a").unwrap(), None);
        assert_eq!(id.lookup("b").unwrap(), Some("E1".into()));
    }

    #[test]
    fn test_require_exists() {
        let id = MemoryIdentity::new();
        let err = id.get_external("wfe:///s/missing", true).unwrap_err();
        assert!(matches!(err, WfeError::MissingIdentity(ref a) if a == "wfe:///s/missing"));

        id.associate("wfe:///s/x", "E1").unwrap();
        id.remove_external("E1").unwrap();
        assert!(id.get_external("wfe:///s/x", true).is_err());
    }

    #[tokio::test]
    async fn test_lock_serializes_same_identifier() {
        let store = Arc::new(IdentityStore::in_memory());
        let guard = store.lock("wfe:///s/a").await;

        let contender = {
            let store = store.clone();
            tokio::spawn(async move {
                let _g = store.lock("wfe:///s/a").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        // other identifiers are not blocked
        let _other = store.lock("wfe:///s/b").await;

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_released_locks_are_forgotten() {
        let store = Arc::new(IdentityStore::in_memory());
        let guard = store.lock("wfe:///s/a").await;

        let contender = {
            let store = store.clone();
            tokio::spawn(async move {
                let _g = store.lock("wfe:///s/a").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // the waiter keeps the entry alive
        drop(guard);
        contender.await.unwrap();
        assert!(store.locks.lock().is_empty());

        for n in 0..5 {
            let _g = store.lock(&format!("wfe:///genesis/disk-{n}")).await;
        }
        assert!(store.locks.lock().is_empty());
    }
}
