//! Secondary attribute store.
//!
//! Bulky or sensitive attribute payloads (raw or encrypted) are kept outside
//! the ledger; the ledger records only a Blake2b digest of the value. This
//! store holds digest → value. A lookup miss is a distinguishable error and
//! is never papered over with a default value, since that would corrupt the
//! meaning of "transaction data".

use std::sync::Arc;

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};

use plinth_types::AttrHash;

use crate::{KeyValueStore, StoreError};

type Blake2b256 = Blake2b<U32>;

/// Compute the on-ledger digest of an attribute value.
pub fn attr_digest(value: &str) -> AttrHash {
    let mut hasher = Blake2b256::new();
    hasher.update(value.as_bytes());
    let result = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&result);
    AttrHash::new(out)
}

/// Digest-keyed store for externalized attribute payloads.
pub struct AttributeStore {
    kv: Arc<dyn KeyValueStore>,
}

impl AttributeStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Store a value and return the digest recorded on the ledger.
    pub fn put(&self, value: &str) -> Result<AttrHash, StoreError> {
        let hash = attr_digest(value);
        self.kv.put(hash.as_bytes(), value.as_bytes())?;
        Ok(hash)
    }

    /// Rehydrate a value from its on-ledger digest.
    ///
    /// Missing values surface as [`StoreError::NotFound`] carrying the
    /// digest, so read paths can report the miss loudly.
    pub fn get(&self, hash: &AttrHash) -> Result<String, StoreError> {
        let bytes = match self.kv.get(hash.as_bytes()) {
            Ok(bytes) => bytes,
            Err(StoreError::NotFound(_)) => return Err(StoreError::NotFound(hash.to_hex())),
            Err(e) => return Err(e),
        };
        String::from_utf8(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    pub fn close(&self) -> Result<(), StoreError> {
        self.kv.close()
    }
}
