//! Ledger catch-up sequencing.
//!
//! The three ledgers carry dependencies: Pool membership decides who we
//! trust, Config decides how we behave, Domain carries application state.
//! Catch-up therefore runs strictly Pool, then Config, then Domain. The
//! sequencer is a small explicit state machine; the actual transfer of
//! transactions is the sync subsystem's job.

use std::collections::BTreeMap;

use plinth_types::{LedgerId, LedgerSyncState, NodeId};

use crate::NodeError;

/// Tracks per-ledger sync state and enforces the dependency order.
pub struct CatchupSequencer {
    states: BTreeMap<LedgerId, LedgerSyncState>,
    /// Status queries from peers that arrived before the queried ledger
    /// finished syncing, answered once it does.
    stashed: BTreeMap<LedgerId, Vec<NodeId>>,
}

impl CatchupSequencer {
    pub fn new() -> Self {
        let mut states = BTreeMap::new();
        for id in LedgerId::ALL {
            states.insert(id, LedgerSyncState::NotSynced);
        }
        Self {
            states,
            stashed: BTreeMap::new(),
        }
    }

    pub fn state(&self, id: LedgerId) -> LedgerSyncState {
        self.states[&id]
    }

    pub fn fully_synced(&self) -> bool {
        self.states.values().all(|s| *s == LedgerSyncState::Synced)
    }

    /// Begin syncing `id`. Fails unless its dependency (if any) has already
    /// reached `Synced` and `id` itself has not started. Returns the peers
    /// whose status queries were stashed while we were not ready.
    pub fn start_sync(&mut self, id: LedgerId) -> Result<Vec<NodeId>, NodeError> {
        if let Some(dep) = id.sync_dependency() {
            if self.states[&dep] != LedgerSyncState::Synced {
                return Err(NodeError::CatchupOrder(format!(
                    "cannot sync {id} before {dep} is synced"
                )));
            }
        }
        if self.states[&id] != LedgerSyncState::NotSynced {
            return Err(NodeError::CatchupOrder(format!(
                "ledger {id} sync already started"
            )));
        }
        self.states.insert(id, LedgerSyncState::Syncing);
        tracing::info!(ledger = %id, "starting catch-up");
        Ok(self.stashed.remove(&id).unwrap_or_default())
    }

    /// Record that `id` finished syncing and return the next ledger to
    /// sync, if any remains.
    pub fn on_ledger_synced(&mut self, id: LedgerId) -> Result<Option<LedgerId>, NodeError> {
        if self.states[&id] != LedgerSyncState::Syncing {
            return Err(NodeError::CatchupOrder(format!(
                "ledger {id} reported synced but was not syncing"
            )));
        }
        self.states.insert(id, LedgerSyncState::Synced);
        tracing::info!(ledger = %id, "catch-up complete");
        Ok(id.next_in_sync_order())
    }

    /// Remember a peer's status query for `id` until that ledger is ready.
    pub fn stash_status_query(&mut self, id: LedgerId, peer: NodeId) {
        tracing::debug!(ledger = %id, peer = %peer, "stashing status query until synced");
        self.stashed.entry(id).or_default().push(peer);
    }
}

impl Default for CatchupSequencer {
    fn default() -> Self {
        Self::new()
    }
}
