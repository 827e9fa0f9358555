//! Durable upgrade outcome records.
//!
//! The upgrade coordinator persists one fact: which version it last
//! attempted, whether the attempt succeeded, and whether peers have been
//! told. A crash between "upgrade completed" and "notification sent" is the
//! expected failure mode; recovery must work from this record plus the
//! running binary's version alone, so the record has to survive restart and
//! support atomic read-modify-write of the notified flag.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use plinth_types::Version;

use crate::StoreError;

/// Persisted fact about the last upgrade attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeOutcomeRecord {
    pub last_attempted_version: Version,
    pub succeeded: bool,
    pub notified_peers: bool,
}

/// Durable storage for the upgrade outcome record.
pub trait UpgradeOutcomeStore: Send + Sync {
    /// Load the record, or `None` when no upgrade was ever attempted.
    fn load(&self) -> Result<Option<UpgradeOutcomeRecord>, StoreError>;

    /// Replace the record atomically.
    fn save(&self, record: &UpgradeOutcomeRecord) -> Result<(), StoreError>;
}

/// File-backed outcome store. Writes go to a temporary sibling file followed
/// by a rename, so a crash mid-write leaves the previous record intact.
pub struct FileOutcomeStore {
    path: PathBuf,
}

impl FileOutcomeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Conventional location inside a node's data directory.
    pub fn in_data_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join("upgrade_outcome.bin"))
    }
}

impl UpgradeOutcomeStore for FileOutcomeStore {
    fn load(&self) -> Result<Option<UpgradeOutcomeRecord>, StoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Backend(e.to_string())),
        };
        let record =
            bincode::deserialize(&bytes).map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(Some(record))
    }

    fn save(&self, record: &UpgradeOutcomeRecord) -> Result<(), StoreError> {
        let bytes =
            bincode::serialize(record).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, &bytes).map_err(|e| StoreError::Backend(e.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|e| StoreError::Backend(e.to_string()))?;
        tracing::debug!(
            version = %record.last_attempted_version,
            succeeded = record.succeeded,
            notified = record.notified_peers,
            "upgrade outcome record persisted"
        );
        Ok(())
    }
}

/// In-memory outcome store for tests.
pub struct MemoryOutcomeStore {
    record: Mutex<Option<UpgradeOutcomeRecord>>,
}

impl MemoryOutcomeStore {
    pub fn new() -> Self {
        Self {
            record: Mutex::new(None),
        }
    }
}

impl Default for MemoryOutcomeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl UpgradeOutcomeStore for MemoryOutcomeStore {
    fn load(&self) -> Result<Option<UpgradeOutcomeRecord>, StoreError> {
        let guard = self
            .record
            .lock()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(guard.clone())
    }

    fn save(&self, record: &UpgradeOutcomeRecord) -> Result<(), StoreError> {
        let mut guard = self
            .record
            .lock()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        *guard = Some(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(version: &str, succeeded: bool, notified: bool) -> UpgradeOutcomeRecord {
        UpgradeOutcomeRecord {
            last_attempted_version: Version::new(version),
            succeeded,
            notified_peers: notified,
        }
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileOutcomeStore::in_data_dir(dir.path());
        assert_eq!(store.load().unwrap(), None);

        store.save(&record("1.2.0", false, false)).unwrap();
        drop(store);

        // Simulated restart: a fresh store over the same path sees the record.
        let reopened = FileOutcomeStore::in_data_dir(dir.path());
        assert_eq!(reopened.load().unwrap(), Some(record("1.2.0", false, false)));
    }

    #[test]
    fn save_replaces_previous_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileOutcomeStore::in_data_dir(dir.path());
        store.save(&record("1.2.0", false, false)).unwrap();
        store.save(&record("1.2.0", true, true)).unwrap();
        assert_eq!(store.load().unwrap(), Some(record("1.2.0", true, true)));
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryOutcomeStore::new();
        assert_eq!(store.load().unwrap(), None);
        store.save(&record("2.0.0", true, false)).unwrap();
        assert_eq!(store.load().unwrap(), Some(record("2.0.0", true, false)));
    }
}
