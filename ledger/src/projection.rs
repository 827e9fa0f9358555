//! State projections: key-value mappings built by replaying a ledger.
//!
//! Writes accumulate in an uncommitted overlay; a batch commit folds the
//! overlay into the committed map, and a batch rejection discards it. This
//! makes batch application atomic relative to the projection.

use std::collections::BTreeMap;

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};

use plinth_types::StateRoot;

type Blake2b256 = Blake2b<U32>;

/// Mutable key-value view derived from a ledger.
pub trait StateProjection: Send + Sync {
    /// Read through the uncommitted overlay into committed state.
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    /// Stage a write into the uncommitted overlay.
    fn set(&mut self, key: &[u8], value: &[u8]);

    /// Root the projection would have if the overlay were committed now.
    fn uncommitted_root(&self) -> StateRoot;

    /// Fold the overlay into committed state.
    fn commit(&mut self);

    /// Discard the overlay.
    fn revert_uncommitted(&mut self);

    /// Root of the committed state.
    fn committed_root(&self) -> StateRoot;

    /// Whether any writes are staged.
    fn has_uncommitted(&self) -> bool;
}

/// In-memory projection with deterministic roots: the root is a Blake2b
/// digest over the sorted `(key, value)` pairs.
pub struct MemoryProjection {
    committed: BTreeMap<Vec<u8>, Vec<u8>>,
    overlay: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl MemoryProjection {
    pub fn new() -> Self {
        Self {
            committed: BTreeMap::new(),
            overlay: BTreeMap::new(),
        }
    }

    fn root_of<'a>(entries: impl Iterator<Item = (&'a Vec<u8>, &'a Vec<u8>)>) -> StateRoot {
        let mut hasher = Blake2b256::new();
        for (key, value) in entries {
            hasher.update((key.len() as u64).to_le_bytes());
            hasher.update(key);
            hasher.update((value.len() as u64).to_le_bytes());
            hasher.update(value);
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&hasher.finalize());
        StateRoot::new(out)
    }

    fn merged(&self) -> BTreeMap<Vec<u8>, Vec<u8>> {
        let mut merged = self.committed.clone();
        for (key, value) in &self.overlay {
            merged.insert(key.clone(), value.clone());
        }
        merged
    }
}

impl Default for MemoryProjection {
    fn default() -> Self {
        Self::new()
    }
}

impl StateProjection for MemoryProjection {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.overlay
            .get(key)
            .or_else(|| self.committed.get(key))
            .cloned()
    }

    fn set(&mut self, key: &[u8], value: &[u8]) {
        self.overlay.insert(key.to_vec(), value.to_vec());
    }

    fn uncommitted_root(&self) -> StateRoot {
        let merged = self.merged();
        Self::root_of(merged.iter())
    }

    fn commit(&mut self) {
        let overlay = std::mem::take(&mut self.overlay);
        self.committed.extend(overlay);
    }

    fn revert_uncommitted(&mut self) {
        self.overlay.clear();
    }

    fn committed_root(&self) -> StateRoot {
        Self::root_of(self.committed.iter())
    }

    fn has_uncommitted(&self) -> bool {
        !self.overlay.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_see_staged_writes() {
        let mut state = MemoryProjection::new();
        state.set(b"k", b"v1");
        assert_eq!(state.get(b"k").as_deref(), Some(&b"v1"[..]));
        assert!(state.has_uncommitted());
    }

    #[test]
    fn revert_discards_overlay_only() {
        let mut state = MemoryProjection::new();
        state.set(b"committed", b"1");
        state.commit();
        state.set(b"staged", b"2");
        state.revert_uncommitted();
        assert_eq!(state.get(b"committed").as_deref(), Some(&b"1"[..]));
        assert_eq!(state.get(b"staged"), None);
        assert!(!state.has_uncommitted());
    }

    #[test]
    fn commit_moves_overlay_into_committed_root() {
        let mut state = MemoryProjection::new();
        state.set(b"k", b"v");
        let expected = state.uncommitted_root();
        state.commit();
        assert_eq!(state.committed_root(), expected);
        assert!(!state.has_uncommitted());
    }

    #[test]
    fn roots_are_order_independent() {
        let mut a = MemoryProjection::new();
        a.set(b"x", b"1");
        a.set(b"y", b"2");
        a.commit();

        let mut b = MemoryProjection::new();
        b.set(b"y", b"2");
        b.set(b"x", b"1");
        b.commit();

        assert_eq!(a.committed_root(), b.committed_root());
    }
}
