//! # Release Tracker Module
//!
//! Persists the release identifier of the last fully reconciled spec.
//! This is the only durable core state besides the database itself.
//!
//! The tracker gates reconciliation: when the source's current release
//! equals the tracked one, the pass is skipped entirely (the idempotence
//! fast path). A forced reconcile bypasses the gate for drift repair.
//!
//! ## Storage Backends
//!
//! - `InMemory`: volatile, for tests and dry runs.
//! - `Persistent`: a single-table redb database holding one
//!   postcard-encoded stamp; survives process restarts.

use crate::primitives::RELEASE_STAMP_VERSION;
use crate::types::RespecError;
use redb::{Database, ReadableDatabase, TableDefinition};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Table for the tracker: key string -> postcard-encoded stamp bytes.
const RELEASE: TableDefinition<&str, &[u8]> = TableDefinition::new("release");

/// The single key under which the current stamp is stored.
const CURRENT_KEY: &str = "current";

// =============================================================================
// STAMP
// =============================================================================

/// The durable record of one completed reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseStamp {
    /// Storage format version.
    version: u8,
    /// The reconciled release identifier.
    pub release_id: String,
    /// Completion time, epoch milliseconds.
    pub applied_at_ms: i64,
}

impl ReleaseStamp {
    fn new(release_id: &str) -> Self {
        Self {
            version: RELEASE_STAMP_VERSION,
            release_id: release_id.to_string(),
            applied_at_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as i64)
                .unwrap_or_default(),
        }
    }

    fn to_bytes(&self) -> Result<Vec<u8>, RespecError> {
        postcard::to_allocvec(self).map_err(|e| RespecError::Serialization(e.to_string()))
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, RespecError> {
        let stamp: Self =
            postcard::from_bytes(bytes).map_err(|e| RespecError::Serialization(e.to_string()))?;
        if stamp.version != RELEASE_STAMP_VERSION {
            return Err(RespecError::Serialization(format!(
                "unsupported release stamp version: {} (expected {})",
                stamp.version, RELEASE_STAMP_VERSION
            )));
        }
        Ok(stamp)
    }
}

// =============================================================================
// TRACKER
// =============================================================================

/// Storage backend for a [`ReleaseTracker`].
#[derive(Debug)]
enum TrackerBackend {
    /// Volatile stamp (tests, dry runs).
    InMemory(Option<ReleaseStamp>),
    /// Disk-backed stamp using redb (ACID, persistent).
    Persistent(Database),
}

/// Tracks the last successfully reconciled release identifier.
#[derive(Debug)]
pub struct ReleaseTracker {
    backend: TrackerBackend,
}

impl ReleaseTracker {
    /// Create a volatile tracker with no recorded release.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            backend: TrackerBackend::InMemory(None),
        }
    }

    /// Open or create a persistent tracker at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RespecError> {
        let db = Database::create(path.as_ref()).map_err(|e| RespecError::Io(e.to_string()))?;
        // Initialize the table so first reads see an empty tracker, not an error.
        {
            let write_txn = db.begin_write().map_err(|e| RespecError::Io(e.to_string()))?;
            let _ = write_txn
                .open_table(RELEASE)
                .map_err(|e| RespecError::Io(e.to_string()))?;
            write_txn.commit().map_err(|e| RespecError::Io(e.to_string()))?;
        }
        Ok(Self {
            backend: TrackerBackend::Persistent(db),
        })
    }

    /// The full stamp of the last completed reconciliation, if any.
    pub fn stamp(&self) -> Result<Option<ReleaseStamp>, RespecError> {
        match &self.backend {
            TrackerBackend::InMemory(stamp) => Ok(stamp.clone()),
            TrackerBackend::Persistent(db) => {
                let read_txn = db.begin_read().map_err(|e| RespecError::Io(e.to_string()))?;
                let table = read_txn
                    .open_table(RELEASE)
                    .map_err(|e| RespecError::Io(e.to_string()))?;
                let Some(raw) = table
                    .get(CURRENT_KEY)
                    .map_err(|e| RespecError::Io(e.to_string()))?
                else {
                    return Ok(None);
                };
                Ok(Some(ReleaseStamp::from_bytes(raw.value())?))
            }
        }
    }

    /// The last completed release identifier, if any.
    pub fn current(&self) -> Result<Option<String>, RespecError> {
        Ok(self.stamp()?.map(|s| s.release_id))
    }

    /// Whether the given release is already reconciled.
    pub fn is_current(&self, release_id: &str) -> Result<bool, RespecError> {
        Ok(self.current()?.as_deref() == Some(release_id))
    }

    /// Record a completed reconciliation of `release_id`.
    ///
    /// Only called on a `Complete` result; a partial pass leaves the tracker
    /// unchanged so the next pass retries the same release.
    pub fn mark_complete(&mut self, release_id: &str) -> Result<(), RespecError> {
        let stamp = ReleaseStamp::new(release_id);
        match &mut self.backend {
            TrackerBackend::InMemory(slot) => {
                *slot = Some(stamp);
                Ok(())
            }
            TrackerBackend::Persistent(db) => {
                let bytes = stamp.to_bytes()?;
                let write_txn = db.begin_write().map_err(|e| RespecError::Io(e.to_string()))?;
                {
                    let mut table = write_txn
                        .open_table(RELEASE)
                        .map_err(|e| RespecError::Io(e.to_string()))?;
                    table
                        .insert(CURRENT_KEY, bytes.as_slice())
                        .map_err(|e| RespecError::Io(e.to_string()))?;
                }
                write_txn.commit().map_err(|e| RespecError::Io(e.to_string()))?;
                Ok(())
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_starts_empty() {
        let tracker = ReleaseTracker::in_memory();
        assert_eq!(tracker.current().expect("current"), None);
        assert!(!tracker.is_current("v1").expect("is_current"));
    }

    #[test]
    fn mark_complete_updates_current() {
        let mut tracker = ReleaseTracker::in_memory();
        tracker.mark_complete("v1").expect("mark");
        assert!(tracker.is_current("v1").expect("is_current"));
        assert!(!tracker.is_current("v2").expect("is_current"));
    }

    #[test]
    fn persistent_tracker_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("release.redb");

        {
            let mut tracker = ReleaseTracker::open(&path).expect("open");
            assert_eq!(tracker.current().expect("current"), None);
            tracker.mark_complete("2024.05").expect("mark");
        }

        let tracker = ReleaseTracker::open(&path).expect("reopen");
        assert_eq!(
            tracker.current().expect("current").as_deref(),
            Some("2024.05")
        );
        let stamp = tracker.stamp().expect("stamp").expect("present");
        assert!(stamp.applied_at_ms > 0);
    }

    #[test]
    fn corrupted_stamp_reported_not_masked() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("release.redb");
        {
            let db = Database::create(&path).expect("create");
            let txn = db.begin_write().expect("begin");
            {
                let mut table = txn.open_table(RELEASE).expect("table");
                let garbage = [0xffu8, 0xff, 0xff];
                table
                    .insert(CURRENT_KEY, garbage.as_slice())
                    .expect("insert");
            }
            txn.commit().expect("commit");
        }

        let tracker = ReleaseTracker::open(&path).expect("open");
        let err = tracker.stamp().expect_err("must fail");
        assert!(matches!(err, RespecError::Serialization(_)));
    }

    #[test]
    fn stamp_round_trips_through_postcard() {
        let stamp = ReleaseStamp::new("abc");
        let bytes = stamp.to_bytes().expect("encode");
        let back = ReleaseStamp::from_bytes(&bytes).expect("decode");
        assert_eq!(stamp, back);
    }
}
