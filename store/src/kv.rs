//! The key-value storage trait and an in-memory implementation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use crate::StoreError;

/// A narrow key-value interface over whatever backend the deployment uses.
///
/// Implementations must be safe to share across the node's components; the
/// node constructs each store once at composition time and passes it around
/// by shared reference, closing it explicitly on shutdown.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Vec<u8>, StoreError>;
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError>;
    fn delete(&self, key: &[u8]) -> Result<(), StoreError>;
    /// Release backend resources. Later operations fail with
    /// [`StoreError::Closed`].
    fn close(&self) -> Result<(), StoreError>;
}

/// In-memory key-value store used in tests and single-process deployments.
pub struct MemoryKv {
    entries: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
    closed: AtomicBool,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

impl Default for MemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for MemoryKv {
    fn get(&self, key: &[u8]) -> Result<Vec<u8>, StoreError> {
        self.ensure_open()?;
        let entries = self
            .entries
            .read()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        entries
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("{key:02x?}")))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.ensure_open()?;
        let mut entries = self
            .entries
            .write()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        entries.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        self.ensure_open()?;
        let mut entries = self
            .entries
            .write()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        entries.remove(key);
        Ok(())
    }

    fn close(&self) -> Result<(), StoreError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_delete() {
        let kv = MemoryKv::new();
        kv.put(b"k", b"v").unwrap();
        assert_eq!(kv.get(b"k").unwrap(), b"v");
        kv.delete(b"k").unwrap();
        assert!(kv.get(b"k").unwrap_err().is_not_found());
    }

    #[test]
    fn closed_store_rejects_operations() {
        let kv = MemoryKv::new();
        kv.put(b"k", b"v").unwrap();
        kv.close().unwrap();
        assert!(matches!(kv.get(b"k"), Err(StoreError::Closed)));
        assert!(matches!(kv.put(b"k", b"v"), Err(StoreError::Closed)));
    }
}
